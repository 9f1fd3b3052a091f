//! Hosted inference engine backed by the Workers AI REST API.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;

use super::{ByteStream, EngineError, InferenceEngine, ModelInput, TextInput};
use crate::config::UpstreamConfig;

/// Runs models through `POST {base_url}/accounts/{account_id}/ai/run/{model}`.
pub struct WorkersAiEngine {
    http_client: Client,
    base_url: String,
    account_id: String,
    api_token: String,
    timeout: Option<Duration>,
}

impl WorkersAiEngine {
    pub fn new(http_client: Client, config: &UpstreamConfig) -> Self {
        Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            account_id: config.account_id.clone(),
            api_token: config.api_token.clone(),
            timeout: config.timeout(),
        }
    }

    fn run_url(&self, model_id: &str) -> String {
        format!(
            "{}/accounts/{}/ai/run/{}",
            self.base_url, self.account_id, model_id
        )
    }

    fn post(&self, model_id: &str) -> RequestBuilder {
        let request = self
            .http_client
            .post(self.run_url(model_id))
            .bearer_auth(&self.api_token);
        match self.timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }
}

// ============================================================================
// REST API types
// ============================================================================

/// `{success, result, errors}` wrapper around every non-streaming reply.
#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    errors: Vec<ApiMessage>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: Option<i64>,
    message: String,
}

fn join_errors(errors: &[ApiMessage]) -> Option<String> {
    if errors.is_empty() {
        return None;
    }
    let joined = errors
        .iter()
        .map(|e| match e.code {
            Some(code) => format!("{} (code {})", e.message, code),
            None => e.message.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ");
    Some(joined)
}

/// Turn a non-2xx reply into an error, preferring the API's own messages.
async fn upstream_error(response: Response) -> EngineError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiEnvelope>(&body)
        .ok()
        .and_then(|env| join_errors(&env.errors))
        .unwrap_or(body);
    EngineError::Upstream { status, message }
}

// ============================================================================
// InferenceEngine implementation
// ============================================================================

#[async_trait]
impl InferenceEngine for WorkersAiEngine {
    fn engine_type(&self) -> &'static str {
        "workers_ai"
    }

    async fn run(&self, model_id: &str, input: &ModelInput) -> Result<Value, EngineError> {
        tracing::debug!("Running model {} via {}", model_id, self.base_url);

        let response = self
            .post(model_id)
            .json(input)
            .send()
            .await
            .map_err(|e| EngineError::Communication(e.to_string()))?;

        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }

        let status = response.status().as_u16();
        let envelope: ApiEnvelope = response
            .json()
            .await
            .map_err(|e| EngineError::InvalidResponse(e.to_string()))?;

        if envelope.success == Some(false) {
            return Err(EngineError::Upstream {
                status,
                message: join_errors(&envelope.errors)
                    .unwrap_or_else(|| "request was not successful".to_string()),
            });
        }

        envelope
            .result
            .ok_or_else(|| EngineError::InvalidResponse("missing result".to_string()))
    }

    async fn run_stream(&self, model_id: &str, input: &TextInput) -> Result<ByteStream, EngineError> {
        tracing::debug!("Streaming model {} via {}", model_id, self.base_url);

        let response = self
            .post(model_id)
            .json(input)
            .send()
            .await
            .map_err(|e| EngineError::Communication(e.to_string()))?;

        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other))
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::VisionInput;
    use gateway_common::ChatMessage;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MODEL: &str = "@cf/meta/llama-3.3-70b-instruct-fp8-fast";

    fn engine(base_url: &str) -> WorkersAiEngine {
        let config = UpstreamConfig {
            base_url: format!("{}/", base_url),
            account_id: "acct".to_string(),
            api_token: "tok".to_string(),
            timeout_secs: None,
        };
        WorkersAiEngine::new(Client::new(), &config)
    }

    fn text_input(stream: Option<bool>) -> TextInput {
        TextInput {
            messages: vec![ChatMessage::user("hi").into()],
            stream,
            max_tokens: 16,
            temperature: 0.5,
            top_p: 0.5,
        }
    }

    #[test]
    fn test_url_normalization() {
        let engine = engine("http://localhost:9000");
        assert_eq!(engine.base_url, "http://localhost:9000");
        assert_eq!(
            engine.run_url(MODEL),
            format!("http://localhost:9000/accounts/acct/ai/run/{}", MODEL)
        );
    }

    #[tokio::test]
    async fn test_run_unwraps_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/accounts/acct/ai/run/{}", MODEL)))
            .and(header("authorization", "Bearer tok"))
            .and(body_partial_json(json!({"messages": [{"role": "user", "content": "hi"}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "result": {"response": "hello there"},
                "errors": [],
                "messages": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let output = engine(&server.uri())
            .run(MODEL, &ModelInput::Text(text_input(None)))
            .await
            .unwrap();
        assert_eq!(output, json!({"response": "hello there"}));
    }

    #[tokio::test]
    async fn test_run_sends_image_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"image": [1, 2, 3], "prompt": "caption"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "result": {"description": "three pixels"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let input = ModelInput::Vision(VisionInput {
            prompt: "caption".to_string(),
            image: vec![1, 2, 3],
            max_tokens: 16,
            temperature: 0.5,
            top_p: 0.5,
        });
        let output = engine(&server.uri()).run("vision", &input).await.unwrap();
        assert_eq!(output["description"], "three pixels");
    }

    #[tokio::test]
    async fn test_run_surfaces_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "success": false,
                "result": null,
                "errors": [{"code": 5006, "message": "Error: required properties at '/' are 'prompt'"}]
            })))
            .mount(&server)
            .await;

        let err = engine(&server.uri())
            .run(MODEL, &ModelInput::Text(text_input(None)))
            .await
            .unwrap_err();
        match err {
            EngineError::Upstream { status, message } => {
                assert_eq!(status, 400);
                assert!(message.contains("required properties"));
                assert!(message.contains("5006"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_plain_text_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream busy"))
            .mount(&server)
            .await;

        let err = engine(&server.uri())
            .run(MODEL, &ModelInput::Text(text_input(None)))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "503: upstream busy");
    }

    #[tokio::test]
    async fn test_run_unsuccessful_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "errors": [{"message": "capacity"}]
            })))
            .mount(&server)
            .await;

        let err = engine(&server.uri())
            .run(MODEL, &ModelInput::Text(text_input(None)))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "200: capacity");
    }

    #[tokio::test]
    async fn test_run_stream_passes_bytes_through() {
        let sse = "data: {\"response\":\"he\"}\n\ndata: {\"response\":\"llo\"}\n\ndata: [DONE]\n\n";
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut stream = engine(&server.uri())
            .run_stream(MODEL, &text_input(Some(true)))
            .await
            .unwrap();

        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, sse.as_bytes());
    }

    #[tokio::test]
    async fn test_run_stream_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "success": false,
                "errors": [{"message": "Authentication error"}]
            })))
            .mount(&server)
            .await;

        let result = engine(&server.uri())
            .run_stream(MODEL, &text_input(Some(true)))
            .await;
        match result {
            Err(EngineError::Upstream { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "Authentication error");
            }
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("expected an error"),
        }
    }
}
