use std::error::Error;
use std::fs;

use tracing_subscriber::EnvFilter;

use safe_health::api::{build_router, ApiContext};
use safe_health::config::{ServerConfig, StorageBackend};
use safe_health::db::{open_database, open_memory_database};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("safe_health=info,tower_http=info")),
        )
        .init();

    let config = ServerConfig::from_env();

    let conn = match &config.storage {
        StorageBackend::File(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            tracing::info!(path = %path.display(), "opening database");
            open_database(path, config.busy_timeout_ms)?
        }
        StorageBackend::InMemory => {
            tracing::warn!("in-memory storage: all data is lost on shutdown");
            open_memory_database()?
        }
    };

    let bind_addr = config.bind_addr;
    let router = build_router(ApiContext::new(conn, config));

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install shutdown handler");
    }
    tracing::info!("shutting down");
}
