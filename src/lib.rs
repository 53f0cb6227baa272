//! Overlay network listener with peer identity.
//!
//! Accepts connections from an embedded overlay engine, resolves who is on
//! the other end through the engine's loopback service, and hands each
//! connection to a host with the peer's identity attached.

pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod identity;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod transport;

pub use config::OverlayConfig;
pub use error::{OverlayError, OverlayResult};
pub use identity::{IdentityFeature, Principal};
pub use lifecycle::Shutdown;
pub use transport::{
    BindEndpoint, ConnectionContext, ConnectionListener, ConnectionListenerAdapter,
    ConnectionListenerFactory, ListenerFactory,
};
