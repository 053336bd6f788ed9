use thiserror::Error;

/// Request-path failures surfaced by `FrameCoordinator::process_frame` and the
/// per-modality engines behind it.
///
/// Infrastructure code (config, journal I/O, storage, the consolidation loop)
/// uses `anyhow::Result`; this enum is reserved for errors a caller of
/// `process_frame` must be able to tell apart.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Empty or malformed request. Rejected before any processing.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Image bytes could not be decoded.
    #[error("image decode failed: {0}")]
    Decode(String),

    /// Inference or recognition engine failed (including a panicking engine).
    #[error("engine failure: {0}")]
    Engine(String),

    /// The event could not be written to the journal.
    #[error("journal append failed: {0}")]
    Journal(String),

    /// The caller's deadline elapsed before both sub-calls finished.
    #[error("frame processing timed out")]
    Timeout,
}

impl PipelineError {
    pub(crate) fn engine(err: anyhow::Error) -> Self {
        PipelineError::Engine(format!("{:#}", err))
    }
}
