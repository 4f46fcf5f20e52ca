//! Configuration types for the Ledge MCP server.
//!
//! This module provides the unified configuration types used across all Ledge
//! crates. Configuration is loaded from a `ledge.yaml` file at the project
//! root and combined into a single `LedgeConfig` structure.
//!
//! # Configuration Files
//!
//! - **ledge.yaml**: Main configuration file with project metadata and audit
//!   engine settings. Endpoint definitions and policies live in their own
//!   files and are consumed by other subsystems.

pub mod audit;

use serde::{Deserialize, Serialize};
use std::path::Path;

pub use audit::{AuditConfig, BackpressurePolicy};

/// Complete Ledge configuration loaded from files.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LedgeConfig {
    /// Project name.
    #[serde(default)]
    pub project: Option<String>,

    /// Configuration version.
    #[serde(default)]
    pub version: Option<String>,

    /// Default environment for runs (prod/staging/dev).
    #[serde(default)]
    pub environment: Option<String>,

    /// Audit logging configuration.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl LedgeConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.display().to_string(), e))?;
        let config: LedgeConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load `ledge.yaml` from the current directory.
    pub fn from_cwd() -> Result<Self, ConfigError> {
        let path = Path::new("ledge.yaml");
        if !path.exists() {
            return Err(ConfigError::NotFound);
        }
        Self::from_file(path)
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("ledge.yaml not found in current directory")]
    NotFound,

    #[error("failed to read config file {0}: {1}")]
    Read(String, #[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let yaml = r#"
project: demo
audit:
  directory: /var/log/ledge
  batch_max_records: 50
"#;
        let config: LedgeConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.project.as_deref(), Some("demo"));
        assert_eq!(config.audit.directory, "/var/log/ledge");
        assert_eq!(config.audit.batch_max_records, 50);
        // Unspecified fields fall back to defaults.
        assert!(config.audit.enabled);
        assert_eq!(config.audit.flush_interval_ms, 50);
    }

    #[test]
    fn empty_config_is_all_defaults() {
        let config: LedgeConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.audit.enabled);
        assert_eq!(config.audit.queue_capacity, 10_000);
    }
}
