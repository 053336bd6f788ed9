//! Startup wiring shared by the binaries.
//!
//! Engines load once here. A missing model artifact is fatal at startup,
//! never a per-request error.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::IvaConfig;
use crate::coordinator::FrameCoordinator;
use crate::detect::Detector;
use crate::enrich::SceneEnricher;
use crate::journal::{EventJournal, FileJournal};
use crate::ocr::TextExtractor;

pub fn load_detector(cfg: &IvaConfig) -> Result<Detector> {
    let settings = cfg.detector_settings()?;
    #[cfg(feature = "backend-tract")]
    {
        let engine = crate::detect::TractEngine::new(&cfg.detector.model_path, settings.input_size)?;
        Detector::new(engine, settings)
    }
    #[cfg(not(feature = "backend-tract"))]
    {
        let _ = settings;
        Err(anyhow::anyhow!(
            "no inference backend compiled in (enable feature `backend-tract`) for {}",
            cfg.detector.model_path.display()
        ))
    }
}

pub fn load_text_extractor(cfg: &IvaConfig) -> Result<TextExtractor> {
    if !cfg.ocr.enabled {
        log::warn!("text extraction disabled by configuration; extracted text will be empty");
        return TextExtractor::new(crate::ocr::NullRecognizer, cfg.ocr_settings());
    }
    #[cfg(feature = "ocr-tesseract")]
    {
        let engine = crate::ocr::TesseractEngine::new(&cfg.ocr.tessdata_path, &cfg.ocr.language)?;
        TextExtractor::new(engine, cfg.ocr_settings())
    }
    #[cfg(not(feature = "ocr-tesseract"))]
    {
        Err(anyhow::anyhow!(
            "text extraction is enabled but no OCR backend is compiled in \
             (enable feature `ocr-tesseract`, or set ocr.enabled = false); tessdata {}",
            cfg.ocr.tessdata_path.display()
        ))
    }
}

pub fn build_enricher(cfg: &IvaConfig) -> Box<dyn SceneEnricher> {
    #[cfg(feature = "enrich-gemini")]
    {
        Box::new(crate::enrich::GeminiEnricher::new(
            cfg.enrichment.api_key.clone(),
            &cfg.enrichment.model,
            &cfg.enrichment.endpoint,
        ))
    }
    #[cfg(not(feature = "enrich-gemini"))]
    {
        let _ = cfg;
        Box::new(crate::enrich::StaticEnricher(
            "Scene enrichment not available in this build.".to_string(),
        ))
    }
}

pub fn open_journal(cfg: &IvaConfig) -> Result<Arc<dyn EventJournal>> {
    let journal = FileJournal::open(&cfg.journal_path)
        .with_context(|| format!("journal {}", cfg.journal_path.display()))?;
    Ok(Arc::new(journal))
}

/// Load both engines and build a coordinator writing to `journal`.
pub fn build_coordinator(
    cfg: &IvaConfig,
    journal: Arc<dyn EventJournal>,
) -> Result<FrameCoordinator> {
    let detector = Arc::new(load_detector(cfg)?);
    let extractor = Arc::new(load_text_extractor(cfg)?);
    Ok(FrameCoordinator::new(detector, extractor, journal).with_timeout(cfg.frame_timeout))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_ocr_loads_a_null_recognizer() {
        let mut cfg = IvaConfig::default();
        cfg.ocr.enabled = false;
        let extractor = load_text_extractor(&cfg).expect("extractor");
        let png = {
            let img = image::GrayImage::from_pixel(4, 4, image::Luma([200u8]));
            let mut out = std::io::Cursor::new(Vec::new());
            img.write_to(&mut out, image::ImageFormat::Png).unwrap();
            out.into_inner()
        };
        assert_eq!(extractor.extract_text(&png).unwrap(), "");
    }

    #[test]
    fn enabled_ocr_without_its_artifacts_fails_at_startup() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = IvaConfig::default();
        cfg.ocr.tessdata_path = dir.path().join("no-tessdata");
        assert!(cfg.ocr.enabled);
        // either no backend is compiled in, or its tessdata directory is missing
        assert!(load_text_extractor(&cfg).is_err());
    }
}
