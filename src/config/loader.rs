//! Configuration loading
//!
//! Layered sources, later wins: struct defaults, then an optional TOML file
//! (`WORKBUS_CONFIG_PATH`, falling back to `workbus.toml` in the working
//! directory), then `WORKBUS_*` environment variables with `__` section
//! separators (e.g. `WORKBUS_QUEUE__POLL_INTERVAL_MS=250`).

use super::WorkbusConfig;
use config::{Config, Environment, File};
use thiserror::Error;
use tracing::debug;

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration load error: {0}")]
    Load(#[from] config::ConfigError),
}

/// Loads [`WorkbusConfig`] from file and environment sources
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration using the default file location
    pub fn load() -> Result<WorkbusConfig, ConfigError> {
        let path = std::env::var("WORKBUS_CONFIG_PATH")
            .unwrap_or_else(|_| "workbus.toml".to_string());
        Self::load_from(&path)
    }

    /// Load configuration from an explicit file path (the file may be
    /// absent; environment overrides still apply)
    pub fn load_from(path: &str) -> Result<WorkbusConfig, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("WORKBUS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config = settings.try_deserialize::<WorkbusConfig>()?;
        debug!(config_path = path, "configuration loaded");
        Ok(config)
    }
}
