//! tailnet-listener
//!
//! Serves HTTP on an overlay network node and tells every handler who the
//! caller is.
//!
//! # Architecture Overview
//!
//! ```text
//!     Overlay peer                ┌───────────────────────────────────────────────┐
//!     ────────────────────────────┼─▶ engine ──▶ net ──▶ transport ──▶ http        │
//!                                 │  (native)  (session, (adapter,    (hyper +     │
//!                                 │            listener)  identity)   axum)        │
//!                                 │                │                                │
//!                                 │                ▼                                │
//!                                 │          loopback whois                         │
//!                                 │                                                 │
//!                                 │  config · observability · lifecycle             │
//!                                 └───────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use tailnet_listener::config::{load_config, OverlayConfig};
use tailnet_listener::engine::Engine;
use tailnet_listener::lifecycle::{signals, startup, Shutdown};
use tailnet_listener::observability::logging;

#[derive(Debug, Parser)]
#[command(name = "tailnet-listener", version, about = "HTTP server on an overlay network node")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `observability.log_level`.
    #[arg(long)]
    log_level: Option<String>,
}

#[cfg(feature = "libtailscale")]
fn native_engine() -> Result<Arc<dyn Engine>, Box<dyn std::error::Error>> {
    Ok(Arc::new(tailnet_listener::engine::ffi::Libtailscale))
}

#[cfg(not(feature = "libtailscale"))]
fn native_engine() -> Result<Arc<dyn Engine>, Box<dyn std::error::Error>> {
    Err("built without the `libtailscale` feature; rebuild with --features libtailscale".into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => OverlayConfig::default(),
    };
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "tailnet-listener starting");
    tracing::info!(
        network = %config.listener.network,
        address = %config.listener.address,
        hostname = ?config.engine.hostname,
        ephemeral = config.engine.ephemeral,
        "Configuration loaded"
    );

    let engine = native_engine()?;
    let shutdown = Shutdown::new();
    tokio::spawn(signals::shutdown_on_signal(shutdown.clone()));

    startup::run(config, engine, shutdown).await?;
    Ok(())
}
