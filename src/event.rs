use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::detect::{Detection, FrameResult};

/// Separator used when joining class names into `objects_detected`.
pub const OBJECTS_SEPARATOR: &str = ", ";

pub fn now_s() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock before unix epoch")?
        .as_secs())
}

/// Journal-resident event, written once per processed frame.
///
/// Destroyed by the consolidation drain; never persisted directly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    /// Seconds since epoch at which the frame finished processing.
    pub timestamp: u64,
    pub objects_detected: String,
    pub object_count: u32,
    pub extracted_text: String,
    #[serde(default)]
    pub scene_description: Option<String>,
    /// Original request payload; present only until consolidation.
    #[serde(default)]
    pub image_base64: Option<String>,
    pub subject_id: String,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

impl DetectionEvent {
    pub fn from_frame(
        result: &FrameResult,
        image_base64: &str,
        subject_id: &str,
        timestamp: u64,
    ) -> Self {
        let objects_detected = result
            .detections
            .iter()
            .map(|d| d.class_name.as_str())
            .collect::<Vec<_>>()
            .join(OBJECTS_SEPARATOR);
        Self {
            timestamp,
            objects_detected,
            object_count: result.detections.len() as u32,
            extracted_text: result.extracted_text.clone(),
            scene_description: None,
            image_base64: Some(image_base64.to_string()),
            subject_id: subject_id.to_string(),
            detections: result.detections.clone(),
        }
    }

    /// `object_count > 0`. Only reliable events are consolidation candidates.
    pub fn is_reliable(&self) -> bool {
        self.object_count > 0
    }

    /// Detections for enrichment; falls back to label-only entries rebuilt
    /// from `objects_detected` when the full list was not journaled.
    pub fn enrichment_detections(&self) -> Vec<Detection> {
        if !self.detections.is_empty() {
            return self.detections.clone();
        }
        self.objects_detected
            .split(OBJECTS_SEPARATOR)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(Detection::labelled)
            .collect()
    }

    pub fn to_line(&self) -> Result<String> {
        serde_json::to_string(self).context("serialize detection event")
    }

    pub fn from_line(line: &str) -> Result<Self> {
        serde_json::from_str(line).context("parse detection event")
    }
}

/// Durable consolidated record. The store assigns `id` on insert.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionLog {
    pub id: i64,
    pub timestamp: u64,
    pub objects_detected: String,
    pub object_count: u32,
    pub extracted_text: String,
    pub scene_description: String,
    pub subject_id: String,
}

impl DetectionLog {
    /// Build the unsaved record from a representative event (`id` is 0).
    pub fn from_event(event: &DetectionEvent, scene_description: String) -> Self {
        Self {
            id: 0,
            timestamp: event.timestamp,
            objects_detected: event.objects_detected.clone(),
            object_count: event.object_count,
            extracted_text: event.extracted_text.clone(),
            scene_description,
            subject_id: event.subject_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn detection(name: &str) -> Detection {
        Detection {
            class_name: name.to_string(),
            confidence: 0.9,
            bounding_box: BoundingBox {
                x: 1,
                y: 2,
                width: 3,
                height: 4,
            },
        }
    }

    #[test]
    fn event_from_frame_joins_class_names() {
        let result = FrameResult {
            detections: vec![detection("person"), detection("dog")],
            extracted_text: "EXIT".to_string(),
        };
        let ev = DetectionEvent::from_frame(&result, "aGk=", "user-7", 1_700_000_000);
        assert_eq!(ev.objects_detected, "person, dog");
        assert_eq!(ev.object_count, 2);
        assert!(ev.is_reliable());
        assert_eq!(ev.image_base64.as_deref(), Some("aGk="));
        assert!(ev.scene_description.is_none());
    }

    #[test]
    fn legacy_line_without_detections_rebuilds_labels() {
        let line = r#"{"timestamp":1,"objects_detected":"car, bus","object_count":2,
            "extracted_text":"","subject_id":"s1","image_base64":null}"#;
        let ev = DetectionEvent::from_line(line).unwrap();
        let names: Vec<_> = ev
            .enrichment_detections()
            .into_iter()
            .map(|d| d.class_name)
            .collect();
        assert_eq!(names, vec!["car", "bus"]);
    }

    #[test]
    fn log_from_event_drops_image() {
        let result = FrameResult {
            detections: vec![detection("cat")],
            extracted_text: String::new(),
        };
        let ev = DetectionEvent::from_frame(&result, "aGk=", "s", 5);
        let log = DetectionLog::from_event(&ev, "a cat".to_string());
        assert_eq!(log.scene_description, "a cat");
        assert_eq!(log.object_count, 1);
        assert_eq!(log.id, 0);
    }
}
