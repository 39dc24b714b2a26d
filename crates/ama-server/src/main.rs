//! # AMA Server
//!
//! Ask-me-anything rooms with live question updates.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! ama
//!
//! # Run with custom config
//! ama --config /path/to/ama.toml
//!
//! # Run with environment variables
//! AMA_PORT=8080 AMA_HOST=0.0.0.0 ama
//! ```

mod config;
mod error;
mod handlers;
mod metrics;
mod store;

use anyhow::{bail, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn load_config() -> Result<config::Config> {
    let mut args = std::env::args().skip(1);
    match (args.next().as_deref(), args.next()) {
        (None, _) => config::Config::load(),
        (Some("--config"), Some(path)) => config::Config::from_file(path),
        (Some(arg), _) => bail!("Unexpected argument: {arg}. Usage: ama [--config <path>]"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ama=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config()?;

    info!("Starting AMA server on {}:{}", config.host, config.port);

    metrics::init_metrics();

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        info!("Shutdown signal received");
        signal.cancel();
    });

    handlers::run_server(config, Arc::new(store::MemoryStore::new()), shutdown).await?;

    Ok(())
}
