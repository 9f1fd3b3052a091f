//! Error types for the gateway handler.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gateway_common::Failure;

use crate::engine::EngineError;
use crate::image::ImageError;

/// Every way a request can fail. Each variant maps to one status code and a
/// `{success: false, error}` body.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Method or path not allowed")]
    MethodNotAllowed,

    #[error("Invalid JSON body")]
    InvalidJson,

    #[error("Request body too large")]
    PayloadTooLarge,

    #[error("prompt is required and must be a string")]
    MissingPrompt,

    #[error("Image decode failed: {0}")]
    ImageDecode(#[from] ImageError),

    #[error("Vision model error: {0}")]
    VisionModel(#[source] EngineError),

    #[error("Text model error: {0}")]
    TextModel(#[source] EngineError),

    #[error("Stream error: {0}")]
    Stream(#[source] EngineError),

    #[error("Generation failed")]
    Internal(String),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Error::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Error::InvalidJson | Error::MissingPrompt | Error::ImageDecode(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::VisionModel(_) | Error::TextModel(_) | Error::Stream(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Error::Internal(details) => Failure::new(self.to_string()).with_details(details.clone()),
            _ => Failure::new(self.to_string()),
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
