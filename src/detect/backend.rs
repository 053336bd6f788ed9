use anyhow::Result;
use ndarray::{Array4, ArrayD};

/// Black-box inference engine: fixed-shape f32 tensor in, f32 tensor out.
///
/// Implementations are not required to be safe for concurrent invocation;
/// `Detector` moves the engine onto a single-flight worker and never shares it.
pub trait InferenceEngine: Send {
    /// Engine identifier for diagnostics.
    fn name(&self) -> &'static str;

    /// Run one forward pass on a `[1, 3, S, S]` input.
    fn run(&mut self, input: Array4<f32>) -> Result<ArrayD<f32>>;

    /// Optional warm-up hook, invoked once before the detector goes live.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
