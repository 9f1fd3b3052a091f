//! Generate request and chat message types.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_TOP_P: f64 = 0.9;
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// A single conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }
}

impl From<ChatMessage> for Value {
    fn from(message: ChatMessage) -> Self {
        json!({"role": message.role, "content": message.content})
    }
}

/// Body of `POST /`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(rename = "systemPrompt", default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Prior turns, kept exactly as the caller sent them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<Value>,
    /// Data URL, http(s) URL or raw base64.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}
fn default_top_p() -> f64 {
    DEFAULT_TOP_P
}
fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

/// Why a JSON body could not become a [`GenerateRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestError {
    /// `prompt` is absent, empty or not a string.
    MissingPrompt,
    /// `image` is set to something other than a string.
    InvalidImage,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            history: Vec::new(),
            image: None,
            stream: false,
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Build a request from an arbitrary JSON body.
    ///
    /// Only `prompt` is mandatory and must be a non-empty string. `image`, when
    /// set to anything truthy, must be a string. Every other field falls back
    /// to its default when absent or of the wrong type; `history` entries are
    /// taken verbatim.
    pub fn from_value(body: &Value) -> Result<Self, RequestError> {
        let prompt = match body.get("prompt").and_then(Value::as_str) {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => return Err(RequestError::MissingPrompt),
        };

        let system_prompt = body
            .get("systemPrompt")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let history = body
            .get("history")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(Self {
            prompt,
            system_prompt,
            history,
            image: image_field(body.get("image"))?,
            stream: body.get("stream").and_then(Value::as_bool).unwrap_or(false),
            temperature: body
                .get("temperature")
                .and_then(Value::as_f64)
                .unwrap_or(DEFAULT_TEMPERATURE),
            top_p: body
                .get("top_p")
                .and_then(Value::as_f64)
                .unwrap_or(DEFAULT_TOP_P),
            max_tokens: body
                .get("max_tokens")
                .and_then(token_count)
                .unwrap_or(DEFAULT_MAX_TOKENS),
        })
    }

    /// True when the request carries an image and takes the vision path.
    pub fn is_vision(&self) -> bool {
        self.image.is_some()
    }

    /// Conversation sent to the text model: system prompt, history, then the prompt.
    pub fn messages(&self) -> Vec<Value> {
        let mut messages: Vec<Value> = Vec::with_capacity(self.history.len() + 2);
        if let Some(system) = self.system_prompt.as_deref().filter(|s| !s.is_empty()) {
            messages.push(ChatMessage::system(system).into());
        }
        messages.extend(self.history.iter().cloned());
        messages.push(ChatMessage::user(self.prompt.clone()).into());
        messages
    }
}

/// Falsy values (`null`, `false`, `0`, `""`) mean no image.
fn image_field(value: Option<&Value>) -> Result<Option<String>, RequestError> {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => Ok(None),
        Some(Value::Number(n)) if n.as_f64() == Some(0.0) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(RequestError::InvalidImage),
    }
}

/// Non-negative whole numbers that fit in `u32`; `256.0` counts as 256.
fn token_count(value: &Value) -> Option<u32> {
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).ok();
    }
    value
        .as_f64()
        .filter(|n| n.fract() == 0.0 && *n >= 0.0 && *n <= f64::from(u32::MAX))
        .map(|n| n as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_applied() {
        let req = GenerateRequest::from_value(&json!({"prompt": "hello"})).unwrap();
        assert_eq!(req.prompt, "hello");
        assert!(req.system_prompt.is_none());
        assert!(req.history.is_empty());
        assert!(req.image.is_none());
        assert!(!req.stream);
        assert_eq!(req.temperature, 0.7);
        assert_eq!(req.top_p, 0.9);
        assert_eq!(req.max_tokens, 4096);
    }

    #[test]
    fn test_prompt_required() {
        let missing = Err(RequestError::MissingPrompt);
        assert_eq!(GenerateRequest::from_value(&json!({})), missing);
        assert_eq!(GenerateRequest::from_value(&json!({"prompt": null})), missing);
        assert_eq!(GenerateRequest::from_value(&json!({"prompt": 42})), missing);
        assert_eq!(GenerateRequest::from_value(&json!({"prompt": ""})), missing);
        assert_eq!(GenerateRequest::from_value(&json!([1, 2])), missing);
        // Prompt is checked before the image.
        assert_eq!(
            GenerateRequest::from_value(&json!({"image": [1, 2, 3]})),
            missing
        );
    }

    #[test]
    fn test_sampling_overrides() {
        let req = GenerateRequest::from_value(&json!({
            "prompt": "p",
            "stream": true,
            "temperature": 0.2,
            "top_p": 0.5,
            "max_tokens": 128
        }))
        .unwrap();
        assert!(req.stream);
        assert_eq!(req.temperature, 0.2);
        assert_eq!(req.top_p, 0.5);
        assert_eq!(req.max_tokens, 128);
    }

    #[test]
    fn test_sampling_keeps_full_precision() {
        let req = GenerateRequest::from_value(&json!({
            "prompt": "p",
            "temperature": 0.123456789,
            "top_p": 0.987654321
        }))
        .unwrap();
        assert_eq!(req.temperature, 0.123456789);
        assert_eq!(req.top_p, 0.987654321);

        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["temperature"], json!(0.123456789));
        assert_eq!(value["top_p"], json!(0.987654321));
    }

    #[test]
    fn test_whole_float_max_tokens() {
        let parse = |v: Value| {
            GenerateRequest::from_value(&json!({"prompt": "p", "max_tokens": v}))
                .unwrap()
                .max_tokens
        };
        assert_eq!(parse(json!(256.0)), 256);
        assert_eq!(parse(json!(0)), 0);
        assert_eq!(parse(json!(256.5)), DEFAULT_MAX_TOKENS);
        assert_eq!(parse(json!(-3.0)), DEFAULT_MAX_TOKENS);
        assert_eq!(parse(json!(1e12)), DEFAULT_MAX_TOKENS);
        assert_eq!(parse(json!(u64::from(u32::MAX) + 1)), DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn test_wrong_types_fall_back_to_defaults() {
        let req = GenerateRequest::from_value(&json!({
            "prompt": "p",
            "stream": "yes",
            "temperature": "hot",
            "max_tokens": -1,
            "systemPrompt": 7,
            "history": "nope"
        }))
        .unwrap();
        assert!(!req.stream);
        assert_eq!(req.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(req.max_tokens, DEFAULT_MAX_TOKENS);
        assert!(req.system_prompt.is_none());
        assert!(req.history.is_empty());
    }

    #[test]
    fn test_empty_image_takes_text_path() {
        let req = GenerateRequest::from_value(&json!({"prompt": "p", "image": ""})).unwrap();
        assert!(!req.is_vision());

        let req = GenerateRequest::from_value(&json!({"prompt": "p", "image": "AAAA"})).unwrap();
        assert!(req.is_vision());

        for falsy in [json!(null), json!(false), json!(0)] {
            let req = GenerateRequest::from_value(&json!({"prompt": "p", "image": falsy})).unwrap();
            assert!(!req.is_vision());
        }
    }

    #[test]
    fn test_non_string_image_rejected() {
        for image in [json!([1, 2, 3]), json!({}), json!([]), json!(true), json!(12)] {
            assert_eq!(
                GenerateRequest::from_value(&json!({"prompt": "p", "image": image})),
                Err(RequestError::InvalidImage)
            );
        }
    }

    #[test]
    fn test_message_order() {
        let req = GenerateRequest::from_value(&json!({
            "prompt": "what now?",
            "systemPrompt": "be terse",
            "history": [{"role": "user", "content": "hi"}]
        }))
        .unwrap();

        assert_eq!(
            req.messages(),
            vec![
                json!({"role": "system", "content": "be terse"}),
                json!({"role": "user", "content": "hi"}),
                json!({"role": "user", "content": "what now?"}),
            ]
        );
    }

    #[test]
    fn test_history_forwarded_verbatim() {
        let history = json!([
            {"role": "user", "content": "hi", "name": "bob"},
            {"role": "user", "content": [{"type": "text", "text": "look"}]},
            {"role": "assistant", "content": null},
            "garbage"
        ]);
        let req = GenerateRequest::from_value(&json!({
            "prompt": "p",
            "history": history.clone()
        }))
        .unwrap();

        let messages = req.messages();
        assert_eq!(messages.len(), 5);
        assert_eq!(Value::Array(messages[..4].to_vec()), history);
        assert_eq!(messages[4], json!({"role": "user", "content": "p"}));
    }

    #[test]
    fn test_empty_history_array() {
        let req = GenerateRequest::from_value(&json!({"prompt": "p", "history": []})).unwrap();
        assert_eq!(req.messages(), vec![json!({"role": "user", "content": "p"})]);
    }

    #[test]
    fn test_serialize_uses_camel_case_system_prompt() {
        let mut req = GenerateRequest::new("hello");
        req.system_prompt = Some("be nice".to_string());
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["systemPrompt"], "be nice");
        assert!(value.get("image").is_none());
        assert!(value.get("history").is_none());
    }
}
