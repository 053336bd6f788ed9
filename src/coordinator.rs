use base64::Engine as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::detect::{Detection, Detector, FrameResult};
use crate::error::PipelineError;
use crate::event::{now_s, DetectionEvent};
use crate::journal::EventJournal;
use crate::ocr::TextExtractor;
use crate::single_flight::Pending;

/// Fans one frame out to detection and OCR, joins both, journals the event.
///
/// Safe to call from many request threads at once; each modality queues on
/// its own executor and the journal serializes writers.
pub struct FrameCoordinator {
    detector: Arc<Detector>,
    extractor: Arc<TextExtractor>,
    journal: Arc<dyn EventJournal>,
    timeout: Option<Duration>,
}

impl FrameCoordinator {
    pub fn new(
        detector: Arc<Detector>,
        extractor: Arc<TextExtractor>,
        journal: Arc<dyn EventJournal>,
    ) -> Self {
        Self {
            detector,
            extractor,
            journal,
            timeout: None,
        }
    }

    /// Bound the caller's wait. On expiry, sub-calls still queued are
    /// cancelled and one already running is waited out.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn process_frame(
        &self,
        image_base64: &str,
        subject_id: &str,
    ) -> Result<FrameResult, PipelineError> {
        let image = decode_request(image_base64, subject_id)?;

        let detections = self.detector.submit(image.clone());
        let text = self.extractor.submit(image);
        let (detections, text) = self.join(detections, text);

        let result = FrameResult {
            detections: detections?,
            extracted_text: text?,
        };

        let timestamp = now_s().map_err(|e| PipelineError::Journal(format!("{:#}", e)))?;
        let event = DetectionEvent::from_frame(&result, image_base64.trim(), subject_id, timestamp);
        self.journal
            .append(&event)
            .map_err(|e| PipelineError::Journal(format!("{:#}", e)))?;

        log::debug!(
            "frame processed for subject {}: {} objects, {} chars of text",
            subject_id,
            result.detections.len(),
            result.extracted_text.len()
        );
        Ok(result)
    }

    /// Wait for both sub-calls. Neither is abandoned, even if the other fails
    /// or the deadline passes: a running job is always joined.
    fn join(
        &self,
        detections: Pending<Vec<Detection>>,
        text: Pending<String>,
    ) -> (Result<Vec<Detection>, PipelineError>, Result<String, PipelineError>) {
        let Some(timeout) = self.timeout else {
            return (detections.wait(), text.wait());
        };

        let deadline = Instant::now() + timeout;
        let detections = detections.wait_timeout(remaining(deadline));
        let text = text.wait_timeout(remaining(deadline));
        match (detections, text) {
            (Ok(detections), Ok(text)) => (detections, text),
            (detections, text) => {
                // queued jobs are skipped; a job already on its engine is waited out
                let mut skipped = 0;
                if let Err(pending) = detections {
                    skipped += usize::from(pending.cancel());
                }
                if let Err(pending) = text {
                    skipped += usize::from(pending.cancel());
                }
                log::warn!(
                    "frame processing exceeded {:?} ({} queued job(s) cancelled)",
                    timeout,
                    skipped
                );
                (Err(PipelineError::Timeout), Err(PipelineError::Timeout))
            }
        }
    }
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

fn decode_request(image_base64: &str, subject_id: &str) -> Result<Arc<[u8]>, PipelineError> {
    if subject_id.trim().is_empty() {
        return Err(PipelineError::InvalidInput("subject id is empty".to_string()));
    }
    let trimmed = image_base64.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::InvalidInput("image data is empty".to_string()));
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(trimmed)
        .map_err(|e| PipelineError::InvalidInput(format!("image data is not valid base64: {}", e)))?;
    if bytes.is_empty() {
        return Err(PipelineError::InvalidInput("image data is empty".to_string()));
    }
    Ok(Arc::from(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_malformed_payloads_are_invalid_input() {
        for payload in ["", "   ", "%%%", "abc"] {
            let err = decode_request(payload, "s").unwrap_err();
            assert!(matches!(err, PipelineError::InvalidInput(_)), "{:?}", payload);
        }
        let err = decode_request("aW1n", " ").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
        assert_eq!(&*decode_request("aW1n", "s").unwrap(), b"img");
    }
}
