//! Image input decoding for the vision path.
//!
//! Callers may send an image three ways: a `data:` URL, an `http(s)://` URL the
//! gateway downloads, or a bare base64 string. All three end up as raw bytes.

use std::time::Duration;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use reqwest::Client;

use crate::config::ImageFetchConfig;

/// Standard alphabet, padding optional. Mirrors what browsers accept in `atob`.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("image must be a string")]
    NotAString,

    #[error("Invalid data URL")]
    InvalidDataUrl,

    #[error("Invalid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("Failed to fetch image ({0})")]
    FetchStatus(u16),

    #[error("Failed to fetch image: {0}")]
    Fetch(String),

    #[error("Image exceeds {0} bytes")]
    TooLarge(u64),
}

/// Where the image bytes come from, decided by prefix alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource<'a> {
    /// Whole `data:...;base64,<payload>` string.
    DataUrl(&'a str),
    RemoteUrl(&'a str),
    RawBase64(&'a str),
}

impl<'a> ImageSource<'a> {
    pub fn classify(input: &'a str) -> Self {
        if input.starts_with("data:") {
            ImageSource::DataUrl(input)
        } else if input.starts_with("http://") || input.starts_with("https://") {
            ImageSource::RemoteUrl(input)
        } else {
            ImageSource::RawBase64(input)
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ImageSource::DataUrl(_) => "data_url",
            ImageSource::RemoteUrl(_) => "remote_url",
            ImageSource::RawBase64(_) => "raw_base64",
        }
    }
}

/// Decode base64 the forgiving way: embedded ASCII whitespace is dropped and
/// trailing `=` padding may be omitted.
pub fn decode_base64(input: &str) -> Result<Vec<u8>, ImageError> {
    let compact: String = input
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    Ok(LENIENT_BASE64.decode(compact)?)
}

/// Payload segment of a data URL: the text between the first and second comma.
fn data_url_payload(url: &str) -> Result<&str, ImageError> {
    url.split(',')
        .nth(1)
        .filter(|p| !p.is_empty())
        .ok_or(ImageError::InvalidDataUrl)
}

/// Turns image inputs into bytes, downloading remote URLs when needed.
#[derive(Clone)]
pub struct ImageDecoder {
    http_client: Client,
    timeout: Option<Duration>,
    max_bytes: Option<u64>,
}

impl ImageDecoder {
    pub fn new(http_client: Client, config: &ImageFetchConfig) -> Self {
        Self {
            http_client,
            timeout: config.timeout(),
            max_bytes: config.max_bytes,
        }
    }

    pub async fn decode(&self, input: &str) -> Result<Vec<u8>, ImageError> {
        let source = ImageSource::classify(input);
        tracing::debug!("Decoding image from {}", source.kind());
        match source {
            ImageSource::DataUrl(url) => decode_base64(data_url_payload(url)?),
            ImageSource::RemoteUrl(url) => self.fetch(url).await,
            ImageSource::RawBase64(raw) => decode_base64(raw),
        }
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ImageError> {
        let mut request = self.http_client.get(url);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ImageError::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ImageError::FetchStatus(response.status().as_u16()));
        }

        if let (Some(limit), Some(len)) = (self.max_bytes, response.content_length()) {
            if len > limit {
                return Err(ImageError::TooLarge(limit));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ImageError::Fetch(e.to_string()))?;

        if let Some(limit) = self.max_bytes {
            if bytes.len() as u64 > limit {
                return Err(ImageError::TooLarge(limit));
            }
        }

        tracing::debug!("Fetched remote image {} ({} bytes)", url, bytes.len());
        Ok(bytes.to_vec())
    }
}
