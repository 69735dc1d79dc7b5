//! Configuration management for writebuffer.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "writebuffer";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "pizza_hunt.db";

/// Allowed shape of the resource path segment.
const RESOURCE_PATTERN: &str = r"^[A-Za-z0-9_-]+$";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `WRITEBUFFER_`)
/// 2. TOML config file at `~/.config/writebuffer/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local store configuration.
    pub store: StoreConfig,
    /// Remote API configuration.
    pub remote: RemoteConfig,
    /// Connectivity probe configuration.
    pub connectivity: ConnectivityConfig,
}

/// Local store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/writebuffer/pizza_hunt.db`
    pub database_path: Option<PathBuf>,
    /// Maximum number of pending records.
    /// Set to 0 for unlimited.
    pub max_pending: usize,
}

/// Remote API configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the API server.
    pub base_url: String,
    /// Resource name; requests go to `/api/<resource>`.
    pub resource: String,
    /// Top-level response field whose presence marks a failed request.
    pub error_field: String,
}

/// Connectivity probe configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// Interval between reachability checks in milliseconds.
    pub probe_interval_ms: u64,
    /// Timeout for a single reachability check in milliseconds.
    pub probe_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: None, // Will be resolved to default at runtime
            max_pending: 10_000,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3001".to_string(),
            resource: "pizzas".to_string(),
            error_field: "message".to_string(),
        }
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_interval_ms: 2_000,
            probe_timeout_ms: 1_000,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("WRITEBUFFER_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        let base = reqwest::Url::parse(&self.remote.base_url).map_err(|e| {
            Error::ConfigValidation {
                message: format!("invalid base_url {}: {e}", self.remote.base_url),
            }
        })?;
        if base.host_str().is_none() {
            return Err(Error::ConfigValidation {
                message: format!("base_url has no host: {}", self.remote.base_url),
            });
        }

        let resource_re = regex::Regex::new(RESOURCE_PATTERN)
            .map_err(|e| Error::internal(format!("bad resource pattern: {e}")))?;
        if !resource_re.is_match(&self.remote.resource) {
            return Err(Error::ConfigValidation {
                message: format!(
                    "resource must be a single path segment matching {RESOURCE_PATTERN}: {:?}",
                    self.remote.resource
                ),
            });
        }

        if self.remote.error_field.trim().is_empty() {
            return Err(Error::ConfigValidation {
                message: "error_field must not be empty".to_string(),
            });
        }

        if self.connectivity.probe_interval_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "probe_interval_ms must be greater than 0".to_string(),
            });
        }

        if self.connectivity.probe_timeout_ms == 0
            || self.connectivity.probe_timeout_ms >= self.connectivity.probe_interval_ms
        {
            return Err(Error::ConfigValidation {
                message: format!(
                    "probe_timeout_ms ({}) must be greater than 0 and less than probe_interval_ms ({})",
                    self.connectivity.probe_timeout_ms, self.connectivity.probe_interval_ms
                ),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.store
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the probe interval as a Duration.
    #[must_use]
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.connectivity.probe_interval_ms)
    }

    /// Get the probe timeout as a Duration.
    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.connectivity.probe_timeout_ms)
    }
}
