use std::sync::Arc;

use anyhow::{Context, Result};

use crate::error::PipelineError;
use crate::ocr::{binarize, otsu_threshold, RecognitionEngine};
use crate::single_flight::{Pending, SingleFlight};

#[derive(Clone, Copy, Debug)]
pub struct OcrSettings {
    /// Apply Otsu binarization before recognition.
    pub binarize: bool,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self { binarize: true }
    }
}

struct ExtractorState {
    engine: Box<dyn RecognitionEngine>,
    settings: OcrSettings,
}

impl ExtractorState {
    fn extract(&mut self, image: &[u8]) -> Result<String, PipelineError> {
        let gray = image::load_from_memory(image)
            .map_err(|e| PipelineError::Decode(e.to_string()))?
            .into_luma8();
        let prepared = if self.settings.binarize {
            binarize(&gray, otsu_threshold(&gray))
        } else {
            gray
        };
        let text = self
            .engine
            .recognize(&prepared)
            .map_err(PipelineError::engine)?;
        Ok(text.trim().to_string())
    }
}

/// OCR front end behind its own single-flight executor.
pub struct TextExtractor {
    flight: SingleFlight<ExtractorState>,
}

impl TextExtractor {
    pub fn new<E: RecognitionEngine + 'static>(engine: E, settings: OcrSettings) -> Result<Self> {
        log::info!(
            "text extractor ready: engine={} binarize={}",
            engine.name(),
            settings.binarize
        );
        let state = ExtractorState {
            engine: Box::new(engine),
            settings,
        };
        let flight = SingleFlight::spawn("ocr", state).context("spawn ocr executor")?;
        Ok(Self { flight })
    }

    pub fn submit(&self, image: Arc<[u8]>) -> Pending<String> {
        self.flight
            .submit(move |state: &mut ExtractorState| state.extract(&image))
    }

    pub fn extract_text(&self, image: &[u8]) -> Result<String, PipelineError> {
        self.submit(Arc::from(image)).wait()
    }
}
