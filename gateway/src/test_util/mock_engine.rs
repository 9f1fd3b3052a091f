use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use serde_json::Value;

use crate::engine::{ByteStream, EngineError, InferenceEngine, ModelInput, TextInput};

/// One call seen by the mock, with its payload as JSON.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model_id: String,
    pub payload: Value,
    pub streamed: bool,
}

#[derive(Debug, Clone)]
enum Reply {
    Output(Value),
    Chunks(Vec<Bytes>),
    Fail(String),
}

/// In-memory engine that replays a canned reply and records what it was sent.
pub struct MockEngine {
    reply: Reply,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockEngine {
    fn with_reply(reply: Reply) -> Self {
        Self {
            reply,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn returning(output: Value) -> Self {
        Self::with_reply(Reply::Output(output))
    }

    pub fn streaming(chunks: &[&str]) -> Self {
        Self::with_reply(Reply::Chunks(
            chunks.iter().map(|c| Bytes::from(c.to_string())).collect(),
        ))
    }

    pub fn failing(message: &str) -> Self {
        Self::with_reply(Reply::Fail(message.to_string()))
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, model_id: &str, payload: Value, streamed: bool) {
        self.calls.lock().unwrap().push(RecordedCall {
            model_id: model_id.to_string(),
            payload,
            streamed,
        });
    }
}

#[async_trait]
impl InferenceEngine for MockEngine {
    fn engine_type(&self) -> &'static str {
        "mock"
    }

    async fn run(&self, model_id: &str, input: &ModelInput) -> Result<Value, EngineError> {
        self.record(model_id, serde_json::to_value(input).unwrap(), false);
        match &self.reply {
            Reply::Output(value) => Ok(value.clone()),
            Reply::Chunks(_) => Err(EngineError::InvalidResponse(
                "mock only streams".to_string(),
            )),
            Reply::Fail(message) => Err(EngineError::Communication(message.clone())),
        }
    }

    async fn run_stream(&self, model_id: &str, input: &TextInput) -> Result<ByteStream, EngineError> {
        self.record(model_id, serde_json::to_value(input).unwrap(), true);
        match &self.reply {
            Reply::Chunks(chunks) => Ok(stream::iter(chunks.clone().into_iter().map(Ok)).boxed()),
            Reply::Output(value) => {
                let body = Bytes::from(value.to_string());
                Ok(stream::iter(vec![Ok(body)]).boxed())
            }
            Reply::Fail(message) => Err(EngineError::Communication(message.clone())),
        }
    }
}
