//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize metrics
//! - Bind the overlay endpoint through the factory
//! - Serve until shutdown, then dispose the factory
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::OverlayConfig;
use crate::engine::Engine;
use crate::error::OverlayError;
use crate::http;
use crate::lifecycle::shutdown::Shutdown;
use crate::observability::metrics;
use crate::transport::{BindEndpoint, ConnectionListenerFactory, ListenerFactory};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid metrics address {0}")]
    MetricsAddress(String),
    #[error("metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
    #[error(transparent)]
    Overlay(#[from] OverlayError),
}

/// Run the service on `engine` until `shutdown` fires.
///
/// Logging must already be initialized.
pub async fn run(
    config: OverlayConfig,
    engine: Arc<dyn Engine>,
    shutdown: Shutdown,
) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(config.observability.metrics_address.clone()))?;
        metrics::init_metrics(addr)?;
    }

    let mut factory = ListenerFactory::new(engine, &config);
    let endpoint = BindEndpoint::overlay(&config.listener);
    let listener = match factory.bind(&endpoint) {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(endpoint = %endpoint, error = %e, "Failed to bind overlay endpoint");
            if let Err(close) = factory.dispose() {
                tracing::warn!(error = %close, "Failed to close overlay session");
            }
            return Err(e.into());
        }
    };

    let served = http::serve(
        listener,
        http::router(),
        shutdown.token(),
        Duration::from_secs(config.server.drain_timeout_secs),
    )
    .await;

    let disposed = factory.dispose();
    served?;
    disposed?;
    tracing::info!("Shutdown complete");
    Ok(())
}
