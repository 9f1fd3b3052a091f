//! The gateway handler: `POST /` for chat and image captioning.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    AUTHORIZATION, CACHE_CONTROL, CONNECTION, CONTENT_TYPE,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{middleware, Json, Router};
use gateway_common::{GenerateRequest, RequestError, Success};
use http_body_util::LengthLimitError;
use serde_json::Value;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::Config;
use crate::engine::{ModelInput, TextInput, VisionInput};
use crate::error::{Error, Result};
use crate::extract::{first_field, TEXT_FIELDS, VISION_FIELDS};
use crate::image::ImageError;
use crate::logging::request_logger;
use crate::AppState;

/// Names the model behind a streamed reply.
pub const X_MODEL_USED: HeaderName = HeaderName::from_static("x-model-used");

/// Build the gateway router. Every method and path lands in [`handle`]; the
/// CORS headers are attached to every response, errors included.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .fallback(handle)
        .with_state(state)
        .layer(SetResponseHeaderLayer::if_not_present(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("POST, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type, Authorization"),
        ))
        .layer(middleware::from_fn(request_logger))
}

async fn handle(State(state): State<Arc<AppState>>, request: Request) -> Response {
    // Preflight short-circuits before auth, on any path.
    if request.method() == Method::OPTIONS {
        return StatusCode::NO_CONTENT.into_response();
    }

    match generate(&state, request).await {
        Ok(response) => response,
        Err(e) => {
            if e.status().is_server_error() {
                tracing::warn!("Request failed: {}", e);
            } else {
                tracing::debug!("Request rejected: {}", e);
            }
            e.into_response()
        }
    }
}

async fn generate(state: &AppState, request: Request) -> Result<Response> {
    authorize(&state.config, request.headers())?;

    if request.method() != Method::POST || request.uri().path() != "/" {
        return Err(Error::MethodNotAllowed);
    }

    let body = read_body(request, state.config.server.max_body_bytes).await?;
    let body: Value = serde_json::from_slice(&body).map_err(|_| Error::InvalidJson)?;
    let request = GenerateRequest::from_value(&body).map_err(|e| match e {
        RequestError::MissingPrompt => Error::MissingPrompt,
        RequestError::InvalidImage => Error::ImageDecode(ImageError::NotAString),
    })?;

    match request.image.as_deref() {
        Some(image) => vision(state, &request, image).await,
        None if request.stream => text_stream(state, &request).await,
        None => text(state, &request).await,
    }
}

/// The `Authorization` header must be exactly `Bearer <api_key>`.
fn authorize(config: &Config, headers: &HeaderMap) -> Result<()> {
    let expected = config.expected_authorization().ok_or(Error::Unauthorized)?;
    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if presented == expected {
        Ok(())
    } else {
        Err(Error::Unauthorized)
    }
}

async fn read_body(request: Request, limit: usize) -> Result<axum::body::Bytes> {
    to_bytes(request.into_body(), limit).await.map_err(|e| {
        let inner = e.into_inner();
        if inner.is::<LengthLimitError>() {
            Error::PayloadTooLarge
        } else {
            Error::Internal(inner.to_string())
        }
    })
}

async fn vision(state: &AppState, request: &GenerateRequest, image: &str) -> Result<Response> {
    let model = &state.config.models.vision;
    if request.stream {
        tracing::debug!("Streaming is not supported for vision requests, answering in one piece");
    }

    let image = state.image_decoder.decode(image).await?;
    tracing::debug!("Vision request: model={} image_bytes={}", model, image.len());

    let input = ModelInput::Vision(VisionInput {
        prompt: request.prompt.clone(),
        image,
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        top_p: request.top_p,
    });

    let output = state
        .engine
        .run(model, &input)
        .await
        .map_err(Error::VisionModel)?;

    Ok(Json(Success::new(model.clone(), first_field(output, VISION_FIELDS))).into_response())
}

fn text_input(request: &GenerateRequest, stream: Option<bool>) -> TextInput {
    TextInput {
        messages: request.messages(),
        stream,
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        top_p: request.top_p,
    }
}

async fn text(state: &AppState, request: &GenerateRequest) -> Result<Response> {
    let model = &state.config.models.text;
    let input = text_input(request, None);
    tracing::debug!("Text request: model={} messages={}", model, input.messages.len());

    let output = state
        .engine
        .run(model, &ModelInput::Text(input))
        .await
        .map_err(Error::TextModel)?;

    Ok(Json(Success::new(model.clone(), first_field(output, TEXT_FIELDS))).into_response())
}

async fn text_stream(state: &AppState, request: &GenerateRequest) -> Result<Response> {
    let model = &state.config.models.text;
    let input = text_input(request, Some(true));
    tracing::debug!("Streaming text request: model={} messages={}", model, input.messages.len());

    let stream = state
        .engine
        .run_stream(model, &input)
        .await
        .map_err(Error::Stream)?;

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache")
        .header(CONNECTION, "keep-alive")
        .header(X_MODEL_USED, model.as_str())
        .body(Body::from_stream(stream))
        .map_err(|e| Error::Internal(e.to_string()))
}
