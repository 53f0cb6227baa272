//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: OverlayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::OverlayConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// One failed check, naming the offending field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check `config` and report every problem found.
pub fn validate_config(config: &OverlayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.network.trim().is_empty() {
        errors.push(ValidationError::new("listener.network", "must not be empty"));
    }
    if config.listener.address.trim().is_empty() {
        errors.push(ValidationError::new("listener.address", "must not be empty"));
    }

    let engine = &config.engine;
    let strings = [
        ("engine.hostname", engine.hostname.as_deref()),
        ("engine.control_url", engine.control_url.as_deref()),
        ("engine.auth_key_env", engine.auth_key_env.as_deref()),
    ];
    for (field, value) in strings {
        match value {
            Some(v) if v.is_empty() => errors.push(ValidationError::new(field, "must not be empty when set")),
            Some(v) if v.contains('\0') => errors.push(ValidationError::new(field, "must not contain NUL")),
            _ => {}
        }
    }
    if let Some(url) = &engine.control_url {
        if !url.is_empty() && url::Url::parse(url).is_err() {
            errors.push(ValidationError::new("engine.control_url", format!("not a valid URL: {}", url)));
        }
    }
    if let Some(dir) = &engine.state_dir {
        if dir.as_os_str().is_empty() {
            errors.push(ValidationError::new("engine.state_dir", "must not be empty when set"));
        }
    }

    if config.identity.whois_timeout_secs == 0 {
        errors.push(ValidationError::new("identity.whois_timeout_secs", "must be greater than 0"));
    }
    if config.server.drain_timeout_secs == 0 {
        errors.push(ValidationError::new("server.drain_timeout_secs", "must be greater than 0"));
    }

    let observability = &config.observability;
    if !LOG_LEVELS.contains(&observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level {:?}", observability.log_level),
        ));
    }
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("not a socket address: {}", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
