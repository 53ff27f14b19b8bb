//! Configuration Loader
//!
//! Environment-aware configuration loading built on the `config` crate.
//! Defaults, an optional TOML file and `DELEGATED_OPS__*` environment
//! variables are merged in that order and validated before use.

use super::error::ConfigResult;
use super::DelegatedOpsConfig;
use crate::constants::{env as env_keys, DEFAULT_CONFIG_FILE};
use config::{Config, Environment, File};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Loaded and validated configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: DelegatedOpsConfig,
    environment: String,
    config_file: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        let config_file = env::var(env_keys::CONFIG_FILE)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_from(&config_file, None)
    }

    /// Load configuration from a specific file.
    ///
    /// `env_overrides` replaces the process environment as the source of
    /// `DELEGATED_OPS__*` variables, which keeps tests independent of global
    /// state.
    pub fn load_from(
        config_file: &Path,
        env_overrides: Option<HashMap<String, String>>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();

        debug!(
            "Loading configuration for environment '{}' from: {}",
            environment,
            config_file.display()
        );

        let env_source = Environment::with_prefix(env_keys::CONFIG_PREFIX)
            .separator("__")
            .try_parsing(true)
            .source(env_overrides);

        let config: DelegatedOpsConfig = Config::builder()
            .add_source(Config::try_from(&DelegatedOpsConfig::default())?)
            .add_source(File::from(config_file).required(false))
            .add_source(env_source)
            .build()?
            .try_deserialize()?;

        config.validate()?;

        debug!(
            environment = %environment,
            default_limit = ?config.executor.default_limit,
            operation_timeout_ms = ?config.executor.operation_timeout_ms,
            database_configured = config.database.url.is_some(),
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment,
            config_file: config_file.to_path_buf(),
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &DelegatedOpsConfig {
        &self.config
    }

    /// Get the current environment
    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Detect current environment: DELEGATED_OPS_ENV || APP_ENV || 'development'
    pub fn detect_environment() -> String {
        env::var(env_keys::ENVIRONMENT)
            .or_else(|_| env::var(env_keys::FALLBACK_ENVIRONMENT))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }
}
