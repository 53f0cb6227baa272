//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::OverlayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<OverlayConfig, ConfigError> {
    let config: OverlayConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<OverlayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    tracing::debug!(path = %path.display(), "Configuration loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::config::schema::LogFormat;

    #[test]
    fn empty_file_yields_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.listener.network, "tcp");
        assert_eq!(config.listener.address, ":80");
        assert_eq!(config.identity.whois_timeout_secs, 10);
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
    }

    #[test]
    fn loads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[listener]
address = ":443"

[engine]
hostname = "web-1"
state_dir = "/var/lib/tailnet-listener"
ephemeral = true
auth_key_env = "TS_AUTHKEY"

[identity]
whois_timeout_secs = 3

[observability]
log_level = "debug"
log_format = "json"
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.listener.address, ":443");
        assert_eq!(config.listener.network, "tcp");
        assert_eq!(config.engine.hostname.as_deref(), Some("web-1"));
        assert!(config.engine.ephemeral);
        assert_eq!(config.engine.auth_key_env.as_deref(), Some("TS_AUTHKEY"));
        assert_eq!(config.identity.whois_timeout_secs, 3);
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn syntax_error_is_parse_error() {
        assert!(matches!(
            parse_config("[listener\naddress = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn validation_errors_are_joined() {
        let err = parse_config("[identity]\nwhois_timeout_secs = 0\n[server]\ndrain_timeout_secs = 0\n")
            .unwrap_err();
        match &err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(
            err.to_string(),
            "Validation failed: identity.whois_timeout_secs: must be greater than 0, \
             server.drain_timeout_secs: must be greater than 0"
        );
    }
}
