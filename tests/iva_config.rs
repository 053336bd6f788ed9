use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use iva_kernel::config::IvaConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "IVA_CONFIG",
        "IVA_DB_PATH",
        "IVA_JOURNAL_PATH",
        "IVA_MODEL_PATH",
        "IVA_TESSDATA_PATH",
        "IVA_CONSOLIDATION_INTERVAL_SECS",
        "IVA_FRAME_TIMEOUT_MS",
        "IVA_OCR_ENABLED",
        "GEMINI_API_KEY",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_apply_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = IvaConfig::load().expect("load defaults");
    assert_eq!(cfg.db_path, "iva.db");
    assert_eq!(cfg.journal_path.to_str(), Some("logs/iva.log"));
    assert_eq!(cfg.detector.model_path.to_str(), Some("nets/object_detector.onnx"));
    assert_eq!(cfg.detector.input_size, 640);
    assert_eq!(cfg.detector.confidence_threshold, 0.5);
    assert_eq!(cfg.detector.nms_threshold, 0.4);
    assert_eq!(cfg.ocr.language, "eng");
    assert!(cfg.ocr.binarize);
    assert!(cfg.ocr.enabled);
    assert_eq!(cfg.consolidation_interval, Duration::from_secs(10));
    assert_eq!(cfg.frame_timeout, None);
    assert_eq!(cfg.enrichment.api_key, None);

    let settings = cfg.detector_settings().expect("settings");
    assert_eq!(settings.labels.len(), 80);
    assert_eq!(settings.labels[0], "person");
}

#[test]
fn loads_json_config_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "db_path": "frames.db",
        "journal_path": "/var/lib/iva/journal.log",
        "frame_timeout_ms": 1500,
        "detector": {
            "model_path": "/models/yolo.onnx",
            "input_size": 320,
            "confidence_threshold": 0.35
        },
        "ocr": { "language": "deu", "binarize": false },
        "consolidation": { "interval_secs": 30 }
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("IVA_CONFIG", file.path());
    std::env::set_var("IVA_DB_PATH", "override.db");
    std::env::set_var("IVA_CONSOLIDATION_INTERVAL_SECS", "5");
    std::env::set_var("GEMINI_API_KEY", "k-123");

    let cfg = IvaConfig::load().expect("load config");
    assert_eq!(cfg.db_path, "override.db");
    assert_eq!(cfg.journal_path.to_str(), Some("/var/lib/iva/journal.log"));
    assert_eq!(cfg.frame_timeout, Some(Duration::from_millis(1500)));
    assert_eq!(cfg.detector.model_path.to_str(), Some("/models/yolo.onnx"));
    assert_eq!(cfg.detector.input_size, 320);
    assert_eq!(cfg.detector.confidence_threshold, 0.35);
    assert_eq!(cfg.detector.nms_threshold, 0.4);
    assert_eq!(cfg.ocr.language, "deu");
    assert!(!cfg.ocr_settings().binarize);
    assert_eq!(cfg.consolidation_interval, Duration::from_secs(5));
    assert_eq!(cfg.enrichment.api_key.as_deref(), Some("k-123"));

    clear_env();
}

#[test]
fn loads_toml_config_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
db_path = "toml.db"

[detector]
nms_threshold = 0.6

[enrichment]
model = "gemini-test"
"#;
    file.write_all(toml.as_bytes()).expect("write config");
    std::env::set_var("IVA_CONFIG", file.path());

    let cfg = IvaConfig::load().expect("load toml config");
    assert_eq!(cfg.db_path, "toml.db");
    assert_eq!(cfg.detector.nms_threshold, 0.6);
    assert_eq!(cfg.enrichment.model, "gemini-test");

    clear_env();
}

#[test]
fn labels_file_replaces_builtin_classes() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut labels = NamedTempFile::new().expect("labels");
    labels.write_all(b"license_plate\n\ncar\n").expect("write labels");
    let mut file = NamedTempFile::new().expect("temp config");
    let json = format!(
        r#"{{ "detector": {{ "labels_path": "{}" }} }}"#,
        labels.path().display()
    );
    file.write_all(json.as_bytes()).expect("write config");
    std::env::set_var("IVA_CONFIG", file.path());

    let cfg = IvaConfig::load().expect("load config");
    let settings = cfg.detector_settings().expect("settings");
    assert_eq!(settings.labels, vec!["license_plate", "car"]);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(br#"{ "detector": { "confidence_threshold": 1.5 } }"#)
        .expect("write config");
    std::env::set_var("IVA_CONFIG", file.path());
    let err = IvaConfig::load().unwrap_err();
    assert!(err.to_string().contains("confidence_threshold"));

    std::env::remove_var("IVA_CONFIG");
    std::env::set_var("IVA_CONSOLIDATION_INTERVAL_SECS", "soon");
    assert!(IvaConfig::load().is_err());

    std::env::set_var("IVA_CONSOLIDATION_INTERVAL_SECS", "0");
    let err = IvaConfig::load().unwrap_err();
    assert!(err.to_string().contains("consolidation interval"));

    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("IVA_CONFIG", "/nonexistent/iva.json");
    let err = IvaConfig::load().unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));

    clear_env();
}

#[test]
fn ocr_can_be_switched_off_explicitly() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(br#"{ "ocr": { "enabled": false } }"#)
        .expect("write config");
    std::env::set_var("IVA_CONFIG", file.path());
    assert!(!IvaConfig::load().expect("load config").ocr.enabled);

    std::env::set_var("IVA_OCR_ENABLED", "true");
    assert!(IvaConfig::load().expect("load config").ocr.enabled);

    std::env::set_var("IVA_OCR_ENABLED", "maybe");
    assert!(IvaConfig::load().is_err());

    clear_env();
}
