//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Metrics → Factory bind (configure, start, listen, loopback) → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Unbind → Drain connections → Close session → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then engine, then listeners
//! - Ordered shutdown: stop accept, drain, close
//! - Shutdown has timeout: stragglers are abandoned after the drain deadline

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
