pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod handler;
pub mod image;
pub mod logging;
pub mod test_util;

pub use config::Config;
pub use engine::{InferenceEngine, WorkersAiEngine};
pub use error::Error;
pub use handler::router;
pub use image::ImageDecoder;

use std::sync::Arc;

/// Shared application state. Immutable after startup.
pub struct AppState {
    pub config: Config,
    pub engine: Arc<dyn InferenceEngine>,
    pub image_decoder: ImageDecoder,
}

impl AppState {
    pub fn new(config: Config, engine: Arc<dyn InferenceEngine>, http_client: reqwest::Client) -> Self {
        let image_decoder = ImageDecoder::new(http_client, &config.image_fetch);
        Self {
            config,
            engine,
            image_decoder,
        }
    }
}
