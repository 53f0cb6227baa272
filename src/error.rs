//! Error taxonomy shared by the engine boundary, the accept loop and the factory.

use thiserror::Error;

/// Why an identity lookup produced no usable identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WhoIsFailure {
    /// The request never produced a response (connect error, reset, deadline).
    Transport(String),
    /// The loopback service answered with a non-success status.
    Status(u16),
    /// The body was not a valid identity record.
    Decode(String),
    /// The body decoded to `null`.
    Empty,
}

impl WhoIsFailure {
    /// Transport errors and server-side statuses may succeed on a later connection.
    pub fn is_transient(&self) -> bool {
        match self {
            WhoIsFailure::Transport(_) => true,
            WhoIsFailure::Status(code) => *code >= 500,
            WhoIsFailure::Decode(_) | WhoIsFailure::Empty => false,
        }
    }

    /// Short label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            WhoIsFailure::Transport(_) => "transport",
            WhoIsFailure::Status(_) => "status",
            WhoIsFailure::Decode(_) => "decode",
            WhoIsFailure::Empty => "empty",
        }
    }
}

impl std::fmt::Display for WhoIsFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WhoIsFailure::Transport(e) => write!(f, "transport error: {}", e),
            WhoIsFailure::Status(code) => write!(f, "loopback service returned status {}", code),
            WhoIsFailure::Decode(e) => write!(f, "invalid identity payload: {}", e),
            WhoIsFailure::Empty => write!(f, "no identity for address"),
        }
    }
}

/// Errors that can occur while driving the overlay engine.
#[derive(Debug, Error)]
pub enum OverlayError {
    /// A session, listener or connection handle is stale or unknown.
    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    /// A fixed scratch buffer was too small for a native string result.
    #[error("insufficient buffer size ({capacity} bytes) for call to {call}")]
    InsufficientBuffer { call: &'static str, capacity: usize },

    /// The engine reported a failure; the message is the engine's own error text.
    #[error("engine fault: {0}")]
    EngineFault(String),

    /// Identity lookup attempted before the loopback service was started.
    #[error("the loopback server must be started before performing identity lookups")]
    LoopbackUnavailable,

    /// The loopback service could not resolve the address to a usable identity.
    #[error("identity resolution failed for {address}: {reason}")]
    IdentityResolutionFailed { address: String, reason: WhoIsFailure },

    /// The endpoint is not an overlay endpoint.
    #[error("unsupported endpoint: {0}")]
    UnsupportedEndpoint(String),

    /// Wrapping a native descriptor or waiting on it failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The loopback HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    Http(String),
}

impl OverlayError {
    /// True for failures that only affect the connection being accepted.
    pub fn is_per_connection(&self) -> bool {
        matches!(self, OverlayError::IdentityResolutionFailed { .. })
    }
}

/// Result type for overlay operations.
pub type OverlayResult<T> = Result<T, OverlayError>;
