//! Inference engine abstraction layer.
//!
//! This module defines the `InferenceEngine` trait the handler talks to. The
//! production implementation calls a hosted inference REST API; tests swap in
//! a mock from `test_util`.

mod workers_ai;

pub use workers_ai::WorkersAiEngine;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use serde::Serialize;
use serde_json::Value;

/// Raw event-stream body produced by a streaming call.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Failure talking to the hosted model.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0}")]
    Communication(String),

    #[error("{status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Chat input for the text model. `messages` holds the caller's history
/// untouched between the system and user turns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextInput {
    pub messages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
}

/// Captioning input for the vision model. `image` serializes as a plain
/// array of byte values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisionInput {
    pub prompt: String,
    pub image: Vec<u8>,
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ModelInput {
    Text(TextInput),
    Vision(VisionInput),
}

/// A hosted model runner.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Unique identifier for this engine type (e.g., "workers_ai").
    fn engine_type(&self) -> &'static str;

    /// Run a model to completion and return its output.
    async fn run(&self, model_id: &str, input: &ModelInput) -> Result<Value, EngineError>;

    /// Run a text model in streaming mode and hand back its event stream untouched.
    async fn run_stream(&self, model_id: &str, input: &TextInput) -> Result<ByteStream, EngineError>;
}
