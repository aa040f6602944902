//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Pure function: `NodeConfig → Result<(), Vec<ValidationError>>`
//! - Runs before the config is accepted

use std::net::SocketAddr;

use crate::config::schema::NodeConfig;

const LOG_LEVELS: &[&str] = &["debug", "info", "warning", "error", "none"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &NodeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.log.level.as_str()) {
        errors.push(ValidationError::new(
            "log.level",
            format!("expected one of {}", LOG_LEVELS.join(", ")),
        ));
    }

    if config.source.nodes_file.as_os_str().is_empty() {
        errors.push(ValidationError::new("source.nodes_file", "must not be empty"));
    }

    if config.sync.retry_base_delay_ms == 0 {
        errors.push(ValidationError::new("sync.retry_base_delay_ms", "must be > 0"));
    }
    if config.sync.retry_max_delay_ms < config.sync.retry_base_delay_ms {
        errors.push(ValidationError::new(
            "sync.retry_max_delay_ms",
            "must be >= retry_base_delay_ms",
        ));
    }

    if config.admin.enabled {
        if config.admin.api_key.trim().is_empty() {
            errors.push(ValidationError::new("admin.api_key", "required when admin is enabled"));
        }
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new("admin.bind_address", "not a socket address"));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "not a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(validate_config(&NodeConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = NodeConfig::default();
        config.log.level = "loud".into();
        config.sync.retry_base_delay_ms = 0;
        config.admin.enabled = true;
        config.admin.bind_address = "nowhere".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["log.level", "sync.retry_base_delay_ms", "admin.api_key", "admin.bind_address"]
        );
    }
}
