use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process readiness: flips to ready once models are loaded.
#[derive(Clone, Debug, Default)]
pub struct ReadinessFlag {
    ready: Arc<AtomicBool>,
}

impl ReadinessFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> &'static str {
        if self.is_ready() {
            "ready"
        } else {
            "initializing"
        }
    }
}
