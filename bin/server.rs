// SWIFT Code Registry - Web Server

use anyhow::{Context, Result};
use std::sync::Arc;
use swift_registry::{api, config, Config, RegistryService, SqliteStore};

#[tokio::main]
async fn main() -> Result<()> {
    config::init_tracing();

    let config = Config::from_env();

    // Open database (schema is created on first use)
    let store = SqliteStore::open(&config.db_path)?;
    tracing::info!(path = %config.db_path.display(), "Database opened");

    let service = Arc::new(RegistryService::new(Arc::new(store)));
    let app = api::build_router(service);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    tracing::info!("Server running on http://{}", config.bind_addr);
    tracing::info!("API: http://{}/v1/swift-codes", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
