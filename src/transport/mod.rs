//! Host-facing listener contract.
//!
//! # Data Flow
//! ```text
//! Host
//!     → ConnectionListenerFactory::bind(BindEndpoint::Overlay { .. })
//!     → factory.rs (configure + start session, listen, start loopback)
//!     → adapter.rs (accept → duplex check → identity → ConnectionContext)
//!     → Host serves the transport with the identity in its features
//! ```
//!
//! # Design Decisions
//! - The overlay is selected by an explicit endpoint variant, not by a
//!   magic socket address
//! - Features are a type map so hosts can carry their own entries next to
//!   the identity

use std::future::Future;
use std::net::SocketAddr;

use axum::http::Extensions;
use tokio_util::sync::CancellationToken;

use crate::config::ListenerConfig;
use crate::error::OverlayResult;
use crate::identity::IdentityFeature;
use crate::net::OverlayStream;

pub mod adapter;
pub mod factory;

pub use adapter::{BindState, ConnectionListenerAdapter, UnbindHandle};
pub use factory::ListenerFactory;

/// Where a host asks to listen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindEndpoint {
    /// A listener on the overlay network.
    Overlay { network: String, address: String },
    /// An ordinary socket address; not served by this crate.
    Socket(SocketAddr),
}

impl BindEndpoint {
    pub fn overlay(config: &ListenerConfig) -> Self {
        BindEndpoint::Overlay {
            network: config.network.clone(),
            address: config.address.clone(),
        }
    }
}

impl std::fmt::Display for BindEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindEndpoint::Overlay { network, address } => write!(f, "overlay {} {}", network, address),
            BindEndpoint::Socket(addr) => write!(f, "socket {}", addr),
        }
    }
}

/// One accepted, identified connection handed to the host.
#[derive(Debug)]
pub struct ConnectionContext {
    pub connection_id: String,
    pub transport: OverlayStream,
    pub features: Extensions,
}

impl ConnectionContext {
    /// The verified peer identity, if one was attached.
    pub fn identity(&self) -> Option<&IdentityFeature> {
        self.features.get::<IdentityFeature>()
    }
}

/// A bound listener driven by the host's accept loop.
pub trait ConnectionListener: Send {
    fn endpoint(&self) -> &BindEndpoint;

    /// Next connection, or `None` once cancelled, unbound, or when the accepted
    /// stream was unusable.
    fn accept_next(
        &mut self,
        cancellation: &CancellationToken,
    ) -> impl Future<Output = OverlayResult<Option<ConnectionContext>>> + Send;

    fn is_bound(&self) -> bool;

    /// Stop accepting. In-flight identity lookups finish normally.
    fn unbind(&self);

    /// Unbind and release the native listener.
    fn dispose(&mut self);
}

/// Creates listeners for the endpoints it recognizes.
pub trait ConnectionListenerFactory {
    type Listener: ConnectionListener;

    fn can_bind(&self, endpoint: &BindEndpoint) -> bool;

    fn bind(&mut self, endpoint: &BindEndpoint) -> OverlayResult<Self::Listener>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_endpoint_from_config() {
        let endpoint = BindEndpoint::overlay(&ListenerConfig::default());
        assert_eq!(
            endpoint,
            BindEndpoint::Overlay {
                network: "tcp".to_string(),
                address: ":80".to_string()
            }
        );
        assert_eq!(endpoint.to_string(), "overlay tcp :80");
    }
}
