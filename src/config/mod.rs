//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → OverlayConfig (validated, immutable)
//!     → handed to the factory, server and observability at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Secrets are never stored in the file; the auth key is read from the
//!   environment variable the file names

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    EngineConfig, IdentityConfig, ListenerConfig, LogFormat, ObservabilityConfig, OverlayConfig,
    ServerConfig,
};
