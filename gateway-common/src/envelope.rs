//! JSON envelopes returned by the gateway for non-streaming responses.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `{success: true, model_used, response}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Success {
    pub success: bool,
    pub model_used: String,
    pub response: Value,
}

impl Success {
    pub fn new(model_used: impl Into<String>, response: Value) -> Self {
        Self {
            success: true,
            model_used: model_used.into(),
            response,
        }
    }
}

/// `{success: false, error, details?}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub success: bool,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl Failure {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Either shape, as seen by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Envelope {
    Success(Success),
    Failure(Failure),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_shape() {
        let value = serde_json::to_value(Success::new("m", json!("hi"))).unwrap();
        assert_eq!(value, json!({"success": true, "model_used": "m", "response": "hi"}));
    }

    #[test]
    fn test_failure_omits_missing_details() {
        let value = serde_json::to_value(Failure::new("Unauthorized")).unwrap();
        assert_eq!(value, json!({"success": false, "error": "Unauthorized"}));

        let value = serde_json::to_value(Failure::new("Generation failed").with_details("boom")).unwrap();
        assert_eq!(value["details"], "boom");
    }

    #[test]
    fn test_envelope_distinguishes_shapes() {
        let ok: Envelope =
            serde_json::from_value(json!({"success": true, "model_used": "m", "response": {"a": 1}}))
                .unwrap();
        assert!(matches!(ok, Envelope::Success(_)));

        let err: Envelope =
            serde_json::from_value(json!({"success": false, "error": "nope"})).unwrap();
        assert!(matches!(err, Envelope::Failure(f) if f.error == "nope"));
    }
}
