use std::sync::Arc;

use anyhow::{Context, Result};

use crate::codec::{self, DecodeParams};
use crate::detect::backend::InferenceEngine;
use crate::detect::result::Detection;
use crate::error::PipelineError;
use crate::single_flight::{Pending, SingleFlight};

/// Static detector configuration, fixed at startup.
#[derive(Clone, Debug)]
pub struct DetectorSettings {
    /// Square model input side, e.g. 640.
    pub input_size: u32,
    pub params: DecodeParams,
    /// Class names in model output order.
    pub labels: Vec<String>,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            input_size: 640,
            params: DecodeParams::default(),
            labels: codec::coco_labels(),
        }
    }
}

struct DetectorState {
    engine: Box<dyn InferenceEngine>,
    settings: DetectorSettings,
}

impl DetectorState {
    fn detect(&mut self, image: &[u8]) -> Result<Vec<Detection>, PipelineError> {
        let encoded = codec::encode(image, self.settings.input_size)?;
        let output = self
            .engine
            .run(encoded.tensor)
            .map_err(PipelineError::engine)?;
        codec::decode(
            output.view(),
            encoded.original,
            self.settings.input_size,
            &self.settings.params,
            &self.settings.labels,
        )
    }
}

/// Object detector behind a single-flight executor.
///
/// Concurrent callers queue on the executor; the engine only ever sees one
/// frame at a time.
pub struct Detector {
    flight: SingleFlight<DetectorState>,
}

impl Detector {
    pub fn new<E: InferenceEngine + 'static>(mut engine: E, settings: DetectorSettings) -> Result<Self> {
        engine
            .warm_up()
            .with_context(|| format!("{} engine warm-up failed", engine.name()))?;
        log::info!(
            "detector ready: engine={} input={}x{} conf>{} nms>{} classes={}",
            engine.name(),
            settings.input_size,
            settings.input_size,
            settings.params.confidence_threshold,
            settings.params.nms_threshold,
            settings.labels.len()
        );
        let state = DetectorState {
            engine: Box::new(engine),
            settings,
        };
        let flight = SingleFlight::spawn("detector", state).context("spawn detector executor")?;
        Ok(Self { flight })
    }

    /// Queue detection for `image` without waiting.
    pub fn submit(&self, image: Arc<[u8]>) -> Pending<Vec<Detection>> {
        self.flight
            .submit(move |state: &mut DetectorState| state.detect(&image))
    }

    pub fn detect(&self, image: &[u8]) -> Result<Vec<Detection>, PipelineError> {
        self.submit(Arc::from(image)).wait()
    }
}
