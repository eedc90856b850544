use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use chat_relay_server::config::Settings;
use chat_relay_server::logging;
use chat_relay_server::router::build_router;
use chat_relay_server::services::LlmService;
use chat_relay_server::state::AppState;
use chat_relay_server::utils::limiters::Limiters;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::load()?;

    // Initialize logging
    let _log_guard = logging::init(&settings.logging)?;

    info!("🚀 Starting chat relay server...");
    info!(
        "✅ Configuration loaded (file: {}, log: {})",
        settings.config_path().display(),
        settings.log_file_path().display()
    );

    if settings.llm.api_key.is_none() {
        // Not fatal: every turn reports the configuration error on its own stream
        warn!("No upstream API key configured; chat turns will fail until one is set");
    }

    // Initialize services
    let limiters = Arc::new(Limiters::new(&settings.llm));
    let llm_service = Arc::new(LlmService::new(settings.llm.clone(), limiters)?);

    // Server address
    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    let state = AppState::new(settings, llm_service);
    let app = build_router(state);

    info!("🎯 Server listening on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
}
