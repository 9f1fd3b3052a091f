//! AI Worker Gateway - authenticated chat and vision proxy for hosted inference models.

use std::env;
use std::sync::Arc;

use ai_gateway::{logging, router, AppState, Config, InferenceEngine, WorkersAiEngine};
use tokio::net::TcpListener;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_version() {
    println!("ai-gateway {}", VERSION);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle --version / -V
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        print_version();
        return Ok(());
    }

    // Load configuration
    let config = Config::load().map_err(|e| {
        format!(
            "Failed to load configuration: {}. \
             Make sure config.toml is valid or use GATEWAY__SECTION__KEY environment variables.",
            e
        )
    })?;

    logging::init(&config.logging.level);
    tracing::info!("Starting AI worker gateway");

    if config.expected_authorization().is_none() {
        tracing::warn!("No API key configured (API_KEY or GATEWAY__AUTH__API_KEY); every request will be rejected");
    }
    if config.upstream.account_id.is_empty() || config.upstream.api_token.is_empty() {
        tracing::warn!("Upstream account_id or api_token is empty; model calls will fail");
    }
    tracing::info!(
        "Models: text={} vision={}",
        config.models.text,
        config.models.vision
    );

    let http_client = reqwest::Client::new();
    let engine = Arc::new(WorkersAiEngine::new(http_client.clone(), &config.upstream));
    tracing::info!(
        "Registered {} engine at {}",
        engine.engine_type(),
        config.upstream.base_url
    );
    let state = Arc::new(AppState::new(config.clone(), engine, http_client));

    let app = router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
