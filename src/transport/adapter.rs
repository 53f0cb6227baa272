//! Accept loop that turns overlay connections into identified host connections.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::http::Extensions;
use tokio_util::sync::CancellationToken;

use crate::engine::ListenerHandle;
use crate::error::{OverlayError, OverlayResult};
use crate::identity::IdentityFeature;
use crate::net::{OverlayConnection, OverlayListener};
use crate::observability::metrics;
use crate::transport::{BindEndpoint, ConnectionContext, ConnectionListener};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindState {
    Bound,
    Unbound,
}

/// Unbinds an adapter from another task.
#[derive(Debug, Clone)]
pub struct UnbindHandle(Arc<AtomicBool>);

impl UnbindHandle {
    pub fn unbind(&self) {
        if !self.0.swap(true, Ordering::AcqRel) {
            tracing::debug!("Listener unbound");
        }
    }

    pub fn is_unbound(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Host listener backed by one overlay listener.
#[derive(Debug)]
pub struct ConnectionListenerAdapter {
    endpoint: BindEndpoint,
    listener: Option<OverlayListener>,
    unbind: UnbindHandle,
}

impl ConnectionListenerAdapter {
    pub(crate) fn new(endpoint: BindEndpoint, listener: OverlayListener) -> Self {
        Self {
            endpoint,
            listener: Some(listener),
            unbind: UnbindHandle(Arc::new(AtomicBool::new(false))),
        }
    }

    pub fn state(&self) -> BindState {
        if self.unbind.is_unbound() || self.listener.is_none() {
            BindState::Unbound
        } else {
            BindState::Bound
        }
    }

    /// Handle of the native listener while it is held.
    pub fn listener_handle(&self) -> Option<ListenerHandle> {
        self.listener.as_ref().map(OverlayListener::handle)
    }

    pub fn unbind_handle(&self) -> UnbindHandle {
        self.unbind.clone()
    }

    /// Identity lookup for one connection. Lookup failures drop the connection
    /// and yield `Ok(None)`; anything else is returned to the caller.
    async fn identify(connection: OverlayConnection) -> OverlayResult<Option<ConnectionContext>> {
        let started = Instant::now();
        let result = connection.resolve_identity().await;

        let record = match result {
            Ok(record) => {
                metrics::record_identity_lookup(started, "ok");
                record
            }
            Err(OverlayError::IdentityResolutionFailed { address, reason }) => {
                metrics::record_identity_lookup(started, "failed");
                metrics::record_dropped(reason.label());
                if reason.is_transient() {
                    tracing::warn!(
                        connection_id = %connection.id(),
                        address = %address,
                        reason = %reason,
                        "Identity lookup failed; dropping connection"
                    );
                } else {
                    tracing::info!(
                        connection_id = %connection.id(),
                        address = %address,
                        reason = %reason,
                        "Peer has no usable identity; dropping connection"
                    );
                }
                connection.dispose();
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let feature = IdentityFeature::new(record);
        tracing::info!(
            connection_id = %connection.id(),
            login = %feature.record().user_profile.login_name,
            node = %feature.record().node.computed_name,
            "Connection identified"
        );

        let connection_id = connection.id().to_string();
        let mut features = Extensions::new();
        features.insert(feature);
        Ok(Some(ConnectionContext {
            connection_id,
            transport: connection.into_stream(),
            features,
        }))
    }
}

impl ConnectionListener for ConnectionListenerAdapter {
    fn endpoint(&self) -> &BindEndpoint {
        &self.endpoint
    }

    async fn accept_next(
        &mut self,
        cancellation: &CancellationToken,
    ) -> OverlayResult<Option<ConnectionContext>> {
        loop {
            if self.unbind.is_unbound() || cancellation.is_cancelled() {
                return Ok(None);
            }
            let Some(listener) = self.listener.as_mut() else {
                return Ok(None);
            };

            let Some(connection) = listener.accept().await? else {
                continue;
            };
            metrics::record_accepted();

            if !connection.is_duplex() {
                tracing::warn!(connection_id = %connection.id(), "Accepted stream is not duplex");
                metrics::record_dropped("not_duplex");
                connection.dispose();
                return Ok(None);
            }

            if let Some(context) = Self::identify(connection).await? {
                return Ok(Some(context));
            }
        }
    }

    fn is_bound(&self) -> bool {
        self.state() == BindState::Bound
    }

    fn unbind(&self) {
        self.unbind.unbind();
    }

    fn dispose(&mut self) {
        self.unbind.unbind();
        if let Some(listener) = self.listener.take() {
            tracing::debug!(listener = %listener.handle(), "Listener disposed");
        }
    }
}
