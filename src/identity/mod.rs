//! Peer identity subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted connection remote address
//!     → whois.rs (GET /localapi/v0/whois on the session's loopback service)
//!     → types.rs (IdentityRecord: node, user profile, capabilities)
//!     → principal.rs (name / email / picture claims, IdentityFeature)
//!     → attached to the connection handed to the host
//! ```

pub mod principal;
pub mod types;
pub mod whois;

pub use principal::{IdentityFeature, Principal};
pub use types::IdentityRecord;
pub use whois::{Credential, LoopbackIdentityClient};
