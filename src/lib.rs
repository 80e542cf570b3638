//! Tableside: order lifecycle and staff-call workflow engine for QR table
//! ordering.
//!
//! Domain modules own their SQLite queries and return [`error::EngineResult`].
//! [`commands`] maps named JSON commands onto them and [`server`] serves the
//! commands over HTTP.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub mod commands;
pub mod config;
pub mod credit;
pub mod db;
pub mod error;
pub mod identity;
pub mod logging;
pub mod notifications;
pub mod orders;
pub mod presence;
pub mod restaurants;
pub mod server;
pub mod staff;
pub mod staff_calls;
pub mod workload;

pub use config::AppConfig;
pub use error::{EngineError, EngineResult};

// ============================================================================
// Entry point
// ============================================================================

pub async fn run() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let config = AppConfig::from_env();
    let _log_guard = logging::init_logging(&config).context("failed to initialize logging")?;

    info!("Starting Tableside v{}", env!("CARGO_PKG_VERSION"));

    let db = Arc::new(
        db::init(&config.data_dir)
            .with_context(|| format!("failed to open database in {}", config.data_dir.display()))?,
    );
    let shutdown = CancellationToken::new();

    let sweeper = presence::spawn_presence_sweeper(
        db.clone(),
        config.presence_ttl_secs,
        Duration::from_secs(config.presence_sweep_secs.max(1)),
        shutdown.clone(),
    );

    let listener = tokio::net::TcpListener::bind(&config.http_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.http_addr))?;
    info!(addr = %config.http_addr, "HTTP listening");

    let app = server::router(server::AppState {
        db,
        config: Arc::new(config),
    });

    let token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {e}");
            }
            info!("Shutdown signal received");
            token.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        warn!("Presence sweeper ended abnormally: {e}");
    }
    info!("Tableside stopped");
    Ok(())
}
