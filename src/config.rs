use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::codec::{self, DecodeParams};
use crate::detect::DetectorSettings;
use crate::ocr::OcrSettings;

const DEFAULT_DB_PATH: &str = "iva.db";
const DEFAULT_JOURNAL_PATH: &str = "logs/iva.log";
const DEFAULT_MODEL_PATH: &str = "nets/object_detector.onnx";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DEFAULT_NMS_THRESHOLD: f32 = 0.4;
const DEFAULT_TESSDATA_PATH: &str = "tessdata";
const DEFAULT_OCR_LANGUAGE: &str = "eng";
const DEFAULT_CONSOLIDATION_SECS: u64 = 10;
const DEFAULT_ENRICHMENT_MODEL: &str = "gemini-2.5-flash-preview-05-20";
const DEFAULT_ENRICHMENT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Deserialize, Default)]
struct IvaConfigFile {
    db_path: Option<String>,
    journal_path: Option<PathBuf>,
    frame_timeout_ms: Option<u64>,
    detector: Option<DetectorConfigFile>,
    ocr: Option<OcrConfigFile>,
    consolidation: Option<ConsolidationConfigFile>,
    enrichment: Option<EnrichmentConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence_threshold: Option<f32>,
    nms_threshold: Option<f32>,
    labels_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct OcrConfigFile {
    enabled: Option<bool>,
    tessdata_path: Option<PathBuf>,
    language: Option<String>,
    binarize: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct ConsolidationConfigFile {
    interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct EnrichmentConfigFile {
    api_key: Option<String>,
    model: Option<String>,
    endpoint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IvaConfig {
    pub db_path: String,
    pub journal_path: PathBuf,
    pub frame_timeout: Option<Duration>,
    pub detector: DetectorConfig,
    pub ocr: OcrConfig,
    pub consolidation_interval: Duration,
    pub enrichment: EnrichmentConfig,
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub model_path: PathBuf,
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
    pub labels_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// `false` runs the pipeline with no recognizer; extracted text is empty.
    pub enabled: bool,
    pub tessdata_path: PathBuf,
    pub language: String,
    pub binarize: bool,
}

#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
}

impl Default for IvaConfig {
    /// Built-in defaults, ignoring `IVA_CONFIG` and the environment.
    fn default() -> Self {
        Self::from_file(IvaConfigFile::default())
    }
}

impl IvaConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("IVA_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: IvaConfigFile) -> Self {
        let detector = file.detector.unwrap_or_default();
        let ocr = file.ocr.unwrap_or_default();
        let enrichment = file.enrichment.unwrap_or_default();
        Self {
            db_path: file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            journal_path: file
                .journal_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_JOURNAL_PATH)),
            frame_timeout: file.frame_timeout_ms.map(Duration::from_millis),
            detector: DetectorConfig {
                model_path: detector
                    .model_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
                input_size: detector.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
                confidence_threshold: detector
                    .confidence_threshold
                    .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
                nms_threshold: detector.nms_threshold.unwrap_or(DEFAULT_NMS_THRESHOLD),
                labels_path: detector.labels_path,
            },
            ocr: OcrConfig {
                enabled: ocr.enabled.unwrap_or(true),
                tessdata_path: ocr
                    .tessdata_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_TESSDATA_PATH)),
                language: ocr
                    .language
                    .unwrap_or_else(|| DEFAULT_OCR_LANGUAGE.to_string()),
                binarize: ocr.binarize.unwrap_or(true),
            },
            consolidation_interval: Duration::from_secs(
                file.consolidation
                    .and_then(|c| c.interval_secs)
                    .unwrap_or(DEFAULT_CONSOLIDATION_SECS),
            ),
            enrichment: EnrichmentConfig {
                api_key: enrichment.api_key,
                model: enrichment
                    .model
                    .unwrap_or_else(|| DEFAULT_ENRICHMENT_MODEL.to_string()),
                endpoint: enrichment
                    .endpoint
                    .unwrap_or_else(|| DEFAULT_ENRICHMENT_ENDPOINT.to_string()),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("IVA_DB_PATH") {
            if !path.trim().is_empty() {
                self.db_path = path;
            }
        }
        if let Ok(path) = std::env::var("IVA_JOURNAL_PATH") {
            if !path.trim().is_empty() {
                self.journal_path = PathBuf::from(path);
            }
        }
        if let Ok(path) = std::env::var("IVA_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.detector.model_path = PathBuf::from(path);
            }
        }
        if let Ok(path) = std::env::var("IVA_TESSDATA_PATH") {
            if !path.trim().is_empty() {
                self.ocr.tessdata_path = PathBuf::from(path);
            }
        }
        if let Ok(flag) = std::env::var("IVA_OCR_ENABLED") {
            self.ocr.enabled = parse_flag(&flag)
                .ok_or_else(|| anyhow!("IVA_OCR_ENABLED must be true or false"))?;
        }
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            if !key.trim().is_empty() {
                self.enrichment.api_key = Some(key);
            }
        }
        if let Ok(secs) = std::env::var("IVA_CONSOLIDATION_INTERVAL_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                anyhow!("IVA_CONSOLIDATION_INTERVAL_SECS must be an integer number of seconds")
            })?;
            self.consolidation_interval = Duration::from_secs(secs);
        }
        if let Ok(ms) = std::env::var("IVA_FRAME_TIMEOUT_MS") {
            let ms: u64 = ms
                .parse()
                .map_err(|_| anyhow!("IVA_FRAME_TIMEOUT_MS must be an integer number of milliseconds"))?;
            self.frame_timeout = Some(Duration::from_millis(ms));
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let d = &self.detector;
        if d.input_size == 0 {
            return Err(anyhow!("detector input_size must be greater than zero"));
        }
        for (name, value) in [
            ("confidence_threshold", d.confidence_threshold),
            ("nms_threshold", d.nms_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("detector {} must be within [0, 1], got {}", name, value));
            }
        }
        if self.consolidation_interval.is_zero() {
            return Err(anyhow!("consolidation interval must be greater than zero"));
        }
        if matches!(self.frame_timeout, Some(t) if t.is_zero()) {
            return Err(anyhow!("frame timeout must be greater than zero"));
        }
        Ok(())
    }

    /// Detector settings, reading the label file when one is configured.
    pub fn detector_settings(&self) -> Result<DetectorSettings> {
        let labels = match &self.detector.labels_path {
            Some(path) => load_labels(path)?,
            None => codec::coco_labels(),
        };
        Ok(DetectorSettings {
            input_size: self.detector.input_size,
            params: DecodeParams {
                confidence_threshold: self.detector.confidence_threshold,
                nms_threshold: self.detector.nms_threshold,
            },
            labels,
        })
    }

    pub fn ocr_settings(&self) -> OcrSettings {
        OcrSettings {
            binarize: self.ocr.binarize,
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// One class name per line; blank lines are ignored.
pub fn load_labels(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read labels file {}", path.display()))?;
    let labels: Vec<String> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    if labels.is_empty() {
        return Err(anyhow!("labels file {} is empty", path.display()));
    }
    Ok(labels)
}

fn read_config_file(path: &Path) -> Result<IvaConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).with_context(|| format!("invalid config file {}", path.display()))?
    } else {
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))?
    };
    Ok(cfg)
}
