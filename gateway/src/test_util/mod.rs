pub mod mock_engine;

pub use mock_engine::{MockEngine, RecordedCall};

use std::sync::Arc;

use crate::config::Config;
use crate::AppState;

pub const TEST_API_KEY: &str = "test-key";

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.auth.api_key = Some(TEST_API_KEY.to_string());
    config.logging.level = "debug".to_string();
    config
}

pub fn test_state(engine: Arc<MockEngine>) -> Arc<AppState> {
    Arc::new(AppState::new(test_config(), engine, reqwest::Client::new()))
}

pub fn bearer() -> String {
    format!("Bearer {}", TEST_API_KEY)
}
