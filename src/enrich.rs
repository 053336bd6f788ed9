//! Scene enrichment collaborator.
//!
//! `describe` never fails: every problem is folded into the returned text so
//! consolidation is never blocked by the enrichment service.

use std::collections::HashSet;

use crate::detect::Detection;

pub trait SceneEnricher: Send {
    fn describe(&self, image: &[u8], detections: &[Detection], text: &str) -> String;
}

/// Distinct class names in first-seen order.
pub fn distinct_objects(detections: &[Detection]) -> Vec<&str> {
    let mut seen = HashSet::new();
    detections
        .iter()
        .map(|d| d.class_name.as_str())
        .filter(|name| seen.insert(*name))
        .collect()
}

pub fn build_scene_prompt(detections: &[Detection], text: &str) -> String {
    let objects = distinct_objects(detections).join(", ");
    format!(
        "Analyze this scene based on the provided image.\n\
         - **Summary:** Briefly describe what is happening in the scene.\n\
         - **Key Objects:** The following objects were detected: {objects}. \
         Describe their appearance and relationship to each other.\n\
         - **Text in Scene:** The following text was found: '{text}'. \
         What is its likely purpose or context?\n\
         - **Inference:** What can you infer from the scene? \
         Is there a potential story, activity, or hazard?\n\
         Provide the output as a concise, well-formatted analysis.",
        objects = objects,
        text = text
    )
}

/// Returns a fixed description. For offline runs and tests.
#[derive(Clone, Debug)]
pub struct StaticEnricher(pub String);

impl SceneEnricher for StaticEnricher {
    fn describe(&self, _image: &[u8], _detections: &[Detection], _text: &str) -> String {
        self.0.clone()
    }
}

#[cfg(feature = "enrich-gemini")]
pub use gemini::GeminiEnricher;

#[cfg(feature = "enrich-gemini")]
mod gemini {
    use std::time::Duration;

    use anyhow::{anyhow, Context, Result};
    use base64::Engine as _;
    use serde_json::{json, Value};

    use super::{build_scene_prompt, SceneEnricher};
    use crate::detect::Detection;

    const NOT_CONFIGURED: &str = "Gemini API key not configured.";
    const NO_IMAGE: &str = "No image data provided for analysis.";
    const PLACEHOLDER_KEY: &str = "YOUR_GEMINI_API_KEY";

    /// Gemini `generateContent` client (blocking, via ureq).
    pub struct GeminiEnricher {
        api_key: Option<String>,
        model: String,
        endpoint: String,
        agent: ureq::Agent,
    }

    impl GeminiEnricher {
        pub fn new(api_key: Option<String>, model: &str, endpoint: &str) -> Self {
            let agent = ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(60))
                .build();
            Self {
                api_key,
                model: model.to_string(),
                endpoint: endpoint.trim_end_matches('/').to_string(),
                agent,
            }
        }

        fn usable_key(&self) -> Option<&str> {
            self.api_key
                .as_deref()
                .map(str::trim)
                .filter(|key| !key.is_empty() && !key.contains(PLACEHOLDER_KEY))
        }

        fn request(&self, key: &str, image: &[u8], detections: &[Detection], text: &str) -> Result<String> {
            let body = json!({
                "contents": [{
                    "parts": [
                        { "text": build_scene_prompt(detections, text) },
                        { "inline_data": {
                            "mime_type": "image/jpeg",
                            "data": base64::engine::general_purpose::STANDARD.encode(image),
                        }}
                    ]
                }]
            });
            let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);
            let response: Value = self
                .agent
                .post(&url)
                .set("x-goog-api-key", key)
                .send_json(body)
                .map_err(|e| anyhow!("{}", e))?
                .into_json()
                .context("invalid response body")?;
            extract_text(&response)
        }
    }

    fn extract_text(response: &Value) -> Result<String> {
        let parts = response
            .pointer("/candidates/0/content/parts")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("response has no candidates"))?;
        let text: String = parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect();
        if text.trim().is_empty() {
            return Err(anyhow!("response contained no text"));
        }
        Ok(text)
    }

    impl SceneEnricher for GeminiEnricher {
        fn describe(&self, image: &[u8], detections: &[Detection], text: &str) -> String {
            let Some(key) = self.usable_key() else {
                return NOT_CONFIGURED.to_string();
            };
            if image.is_empty() {
                return NO_IMAGE.to_string();
            }
            match self.request(key, image, detections, text) {
                Ok(description) => description,
                Err(e) => {
                    log::error!("gemini enrichment failed: {:#}", e);
                    format!("Gemini API Error: {:#}", e)
                }
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn missing_or_placeholder_key_is_reported_in_text() {
            let none = GeminiEnricher::new(None, "m", "http://127.0.0.1:9");
            assert_eq!(none.describe(b"img", &[], ""), NOT_CONFIGURED);
            let placeholder =
                GeminiEnricher::new(Some("YOUR_GEMINI_API_KEY".into()), "m", "http://127.0.0.1:9");
            assert_eq!(placeholder.describe(b"img", &[], ""), NOT_CONFIGURED);
        }

        #[test]
        fn empty_image_short_circuits() {
            let enricher = GeminiEnricher::new(Some("k".into()), "m", "http://127.0.0.1:9");
            assert_eq!(enricher.describe(b"", &[], ""), NO_IMAGE);
        }

        #[test]
        fn unreachable_service_becomes_error_text() {
            let enricher = GeminiEnricher::new(Some("k".into()), "m", "http://127.0.0.1:9");
            let text = enricher.describe(b"img", &[], "");
            assert!(text.starts_with("Gemini API Error:"), "{}", text);
        }

        #[test]
        fn response_parts_are_concatenated() {
            let response = serde_json::json!({
                "candidates": [{ "content": { "parts": [{ "text": "A " }, { "text": "street." }] } }]
            });
            assert_eq!(extract_text(&response).unwrap(), "A street.");
            assert!(extract_text(&serde_json::json!({})).is_err());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_lists_distinct_objects_and_text() {
        let detections = vec![
            Detection::labelled("person"),
            Detection::labelled("car"),
            Detection::labelled("person"),
        ];
        let prompt = build_scene_prompt(&detections, "STOP");
        assert!(prompt.contains("detected: person, car."));
        assert!(prompt.contains("'STOP'"));
    }

    #[test]
    fn distinct_objects_keep_first_seen_order() {
        let detections: Vec<_> = ["zebra", "apple", "zebra", "kite", "apple"]
            .into_iter()
            .map(Detection::labelled)
            .collect();
        assert_eq!(distinct_objects(&detections), vec!["zebra", "apple", "kite"]);
    }
}
