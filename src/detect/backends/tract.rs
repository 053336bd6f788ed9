#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use ndarray::{Array4, ArrayD};
use tract_onnx::prelude::*;

use crate::detect::backend::InferenceEngine;

/// Tract-based ONNX engine.
///
/// The model is loaded and optimized once for a fixed `[1, 3, S, S]` input.
/// Per-call work is a single forward pass; no network or disk I/O.
pub struct TractEngine {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
}

impl TractEngine {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            return Err(anyhow!("model artifact {} not found", model_path.display()));
        }
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self { model, input_size })
    }
}

impl InferenceEngine for TractEngine {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn run(&mut self, input: Array4<f32>) -> Result<ArrayD<f32>> {
        let side = self.input_size as usize;
        if input.shape() != [1, 3, side, side] {
            return Err(anyhow!(
                "input tensor {:?} does not match model input [1, 3, {}, {}]",
                input.shape(),
                side,
                side
            ));
        }
        let outputs = self
            .model
            .run(tvec!(input.into_tensor().into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        Ok(view.to_owned())
    }

    fn warm_up(&mut self) -> Result<()> {
        let side = self.input_size as usize;
        self.run(Array4::zeros((1, 3, side, side))).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_is_reported_at_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.onnx");
        let err = TractEngine::new(&path, 640).err().expect("load must fail");
        assert!(err.to_string().contains("not found"), "{}", err);
    }
}
