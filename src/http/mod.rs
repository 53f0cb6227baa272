//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! ConnectionContext (stream + IdentityFeature)
//!     → server.rs (hyper auto builder, identity copied into request extensions)
//!     → handlers.rs (Axum router, `Request::extensions().get::<IdentityFeature>()`)
//!     → Send to client
//! ```

pub mod handlers;
pub mod server;
pub mod tracker;

pub use handlers::router;
pub use server::serve;
pub use tracker::{ConnectionGuard, ConnectionTracker};
