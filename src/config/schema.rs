//! Configuration schema definitions.
//!
//! Process-level settings only. Node descriptors come from the node
//! source and are never part of this file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::config::LogPolicy;

/// Root configuration for the node process.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct NodeConfig {
    /// Engine and process logging.
    pub log: LogConfig,

    /// Where node descriptors come from.
    pub source: SourceConfig,

    /// Retry policy for engine start and reload.
    pub sync: SyncConfig,

    pub admin: AdminConfig,

    pub observability: ObservabilityConfig,
}

/// Log configuration. Also handed to the engine as its log policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// debug, info, warning, error or none.
    pub level: String,

    /// Engine access log path.
    pub access_log: Option<String>,

    /// Engine error log path.
    pub error_log: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warning".to_string(),
            access_log: None,
            error_log: None,
        }
    }
}

impl LogConfig {
    pub fn to_policy(&self) -> LogPolicy {
        LogPolicy {
            level: self.level.clone(),
            access_log: self.access_log.clone(),
            error_log: self.error_log.clone(),
        }
    }
}

/// Node source configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceConfig {
    /// TOML or JSON file holding the node list.
    pub nodes_file: PathBuf,

    /// Reload when the nodes file changes.
    pub watch: bool,

    /// Re-read the nodes file periodically (0 disables polling).
    pub poll_interval_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            nodes_file: PathBuf::from("nodes.toml"),
            watch: true,
            poll_interval_secs: 60,
        }
    }
}

impl SourceConfig {
    pub fn poll_interval(&self) -> Option<Duration> {
        (self.poll_interval_secs > 0).then(|| Duration::from_secs(self.poll_interval_secs))
    }
}

/// Retry configuration for bringing the engine up.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base delay between attempts in milliseconds.
    pub retry_base_delay_ms: u64,

    /// Upper bound on the delay in milliseconds.
    pub retry_max_delay_ms: u64,

    /// Attempts before giving up (0 retries forever).
    pub max_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 30_000,
            max_attempts: 0,
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let config: NodeConfig = toml::from_str("").unwrap();
        assert_eq!(config.log.level, "warning");
        assert_eq!(config.source.nodes_file, PathBuf::from("nodes.toml"));
        assert_eq!(config.source.poll_interval(), Some(Duration::from_secs(60)));
        assert!(!config.admin.enabled);
    }

    #[test]
    fn test_partial_sections() {
        let config: NodeConfig = toml::from_str(
            r#"
            [log]
            level = "debug"
            access_log = "/var/log/node/access.log"

            [source]
            nodes_file = "/etc/node/nodes.json"
            poll_interval_secs = 0

            [admin]
            enabled = true
            api_key = "secret"
            "#,
        )
        .unwrap();

        let policy = config.log.to_policy();
        assert_eq!(policy.level, "debug");
        assert_eq!(policy.access_log.as_deref(), Some("/var/log/node/access.log"));
        assert_eq!(config.source.poll_interval(), None);
        assert!(config.source.watch);
        assert_eq!(config.admin.bind_address, "127.0.0.1:8081");
        assert_eq!(config.sync.retry_base_delay_ms, 500);
    }
}
