//! Orderly sync API server.
//!
//! Binds the synchronization engine to an HTTP surface. Devices push
//! offline mutation batches, pull incremental changes, and operators
//! inspect and resolve conflicts.
//!
//! ```text
//! ┌──────────┐  upload-batch   ┌──────────────┐        ┌────────────┐
//! │  device  │ ──────────────► │   sync-api   │ ─────► │ SyncEngine │
//! │  queue   │ ◄────────────── │  (axum HTTP) │ ◄───── │  (SQLite)  │
//! └──────────┘ download-changes└──────────────┘        └────────────┘
//! ```

mod config;
mod context;
mod error;
mod routes;
mod state;

use std::process;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use orderly_db::{Database, DbConfig};
use orderly_sync::SyncEngine;

use crate::config::ApiConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "server failed");
        process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ApiConfig::load()?;
    tracing::info!(
        bind = %config.bind_address,
        port = config.port,
        database = %config.database_path,
        "starting sync API"
    );

    let db = Database::new(DbConfig::new(&config.database_path)).await?;
    let engine = SyncEngine::new(&db, config.engine.clone());
    let state = AppState::new(engine, db);

    let app = routes::router(state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    } else {
        tracing::info!("shutdown signal received");
    }
}
