//! # Delegated Ops Configuration
//!
//! Typed configuration for the batch executor and the PostgreSQL repository.
//!
//! ## Sources
//!
//! Values are layered, later sources winning:
//!
//! 1. Built-in defaults (`DelegatedOpsConfig::default()`)
//! 2. An optional TOML file (`config/delegated_ops.toml`, or the path in
//!    `DELEGATED_OPS_CONFIG`)
//! 3. Environment variables such as `DELEGATED_OPS__EXECUTOR__DEFAULT_LIMIT`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use delegated_ops::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let timeout = manager.config().executor.operation_timeout();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DelegatedOpsConfig {
    /// Batch execution settings
    pub executor: ExecutorConfig,

    /// PostgreSQL repository settings
    pub database: DatabaseConfig,
}

impl DelegatedOpsConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        self.executor.validate()?;
        self.database.validate()
    }
}

/// Settings for `execute_queued_operations` and the polling loop
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Batch size used when a caller does not pass a limit; `None` is unlimited
    pub default_limit: Option<usize>,
    /// Per-operation execution timeout; `None` lets operators run indefinitely
    pub operation_timeout_ms: Option<u64>,
    /// Emit per-document lifecycle log lines for every batch
    pub log_executions: bool,
    /// Delay between batches in the polling loop
    pub poll_interval_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_limit: None,
            operation_timeout_ms: None,
            log_executions: false,
            poll_interval_ms: 5_000,
        }
    }
}

impl ExecutorConfig {
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.default_limit == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "executor.default_limit",
                "0",
                "must be positive when set",
            ));
        }
        if self.operation_timeout_ms == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "executor.operation_timeout_ms",
                "0",
                "must be positive when set",
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "executor.poll_interval_ms",
                "0",
                "must be positive",
            ));
        }
        Ok(())
    }
}

/// Connection settings for the PostgreSQL operation repository
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
    /// Table holding operation documents; interpolated into SQL, so it must be
    /// a plain identifier
    pub table_name: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
            acquire_timeout_ms: 30_000,
            table_name: crate::constants::DEFAULT_TABLE_NAME.to_string(),
        }
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_connections == 0 {
            return Err(ConfigurationError::invalid_value(
                "database.max_connections",
                "0",
                "must be positive",
            ));
        }
        if !is_valid_identifier(&self.table_name) {
            return Err(ConfigurationError::invalid_value(
                "database.table_name",
                self.table_name.clone(),
                "must start with a letter or underscore and contain only ASCII letters, digits and underscores",
            ));
        }
        Ok(())
    }
}

fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DelegatedOpsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.executor.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.executor.operation_timeout(), None);
        assert_eq!(config.database.table_name, "delegated_operations");
    }

    #[test]
    fn test_zero_limits_rejected() {
        let executor = ExecutorConfig {
            default_limit: Some(0),
            ..ExecutorConfig::default()
        };
        assert!(executor.validate().is_err());

        let executor = ExecutorConfig {
            poll_interval_ms: 0,
            ..ExecutorConfig::default()
        };
        assert!(executor.validate().is_err());

        let database = DatabaseConfig {
            max_connections: 0,
            ..DatabaseConfig::default()
        };
        assert!(database.validate().is_err());
    }

    #[test]
    fn test_table_name_must_be_identifier() {
        assert!(is_valid_identifier("delegated_operations"));
        assert!(is_valid_identifier("_ops2"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("2ops"));
        assert!(!is_valid_identifier("ops; DROP TABLE users"));
        assert!(!is_valid_identifier("public.ops"));
    }
}
