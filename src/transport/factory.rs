//! Listener factory owning the overlay session.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{EngineConfig, OverlayConfig};
use crate::engine::Engine;
use crate::error::{OverlayError, OverlayResult};
use crate::net::OverlaySession;
use crate::transport::{BindEndpoint, ConnectionListenerAdapter, ConnectionListenerFactory};

/// Binds overlay endpoints. The first bind brings the session up; `dispose`
/// (or drop) tears it down.
#[derive(Debug)]
pub struct ListenerFactory {
    session: OverlaySession,
    engine_config: EngineConfig,
    whois_timeout: Duration,
}

impl ListenerFactory {
    pub fn new(engine: Arc<dyn Engine>, config: &OverlayConfig) -> Self {
        Self {
            session: OverlaySession::create(engine),
            engine_config: config.engine.clone(),
            whois_timeout: Duration::from_secs(config.identity.whois_timeout_secs),
        }
    }

    pub fn session(&self) -> &OverlaySession {
        &self.session
    }

    /// Close the session. Listeners bound from this factory stop working.
    pub fn dispose(&mut self) -> OverlayResult<()> {
        if self.session.is_open() {
            self.session.close()?;
        }
        Ok(())
    }
}

impl ConnectionListenerFactory for ListenerFactory {
    type Listener = ConnectionListenerAdapter;

    fn can_bind(&self, endpoint: &BindEndpoint) -> bool {
        matches!(endpoint, BindEndpoint::Overlay { .. })
    }

    fn bind(&mut self, endpoint: &BindEndpoint) -> OverlayResult<ConnectionListenerAdapter> {
        let BindEndpoint::Overlay { network, address } = endpoint else {
            return Err(OverlayError::UnsupportedEndpoint(endpoint.to_string()));
        };

        if !self.session.is_started() {
            self.session.configure(&self.engine_config)?;
            self.session.start()?;
        }
        let listener = self.session.listen(network, address)?;
        if !self.session.is_loopback_started() {
            self.session.start_loopback(self.whois_timeout)?;
        }

        tracing::info!(endpoint = %endpoint, listener = %listener.handle(), "Endpoint bound");
        Ok(ConnectionListenerAdapter::new(endpoint.clone(), listener))
    }
}
