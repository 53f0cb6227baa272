//! Overlay network layer.
//!
//! # Data Flow
//! ```text
//! OverlaySession (create → configure → start → start_loopback)
//!     → listen(network, address) → OverlayListener
//!     → accept() every ≤100 ms → OverlayConnection (duplex stream)
//!     → remote_address() → resolve_identity() via the loopback service
//!     → Hand off to the transport adapter
//!
//! Session States:
//!     Created → Started → LoopbackStarted → Closed
//! ```
//!
//! # Design Decisions
//! - Listeners and connections hold the session's shared state, never the
//!   session itself; closing the session invalidates them
//! - Accept is cooperative: it yields "no connection yet" instead of blocking

pub mod connection;
pub mod listener;
pub mod session;

pub use connection::{ConnectionId, OverlayConnection, OverlayStream};
pub use listener::{OverlayListener, POLL_INTERVAL};
pub use session::OverlaySession;
