//! Configuration settings for offsync.
//!
//! Settings are loaded from `~/.offsync/config.yaml`. Every field has a
//! default, so a partial file (or none at all) is valid.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::args::OutputFormat;
use crate::error::OffsyncError;
use crate::features::queue::{ManagerConfig, DEFAULT_STORAGE_KEY, RETRY_CEILING};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// General settings.
    pub general: GeneralConfig,
    /// Backend endpoint settings.
    pub backend: BackendConfig,
    /// Queue persistence settings.
    pub queue: QueueConfig,
    /// Synchronization settings.
    pub sync: SyncConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Default output format.
    #[serde(default = "default_output_format")]
    pub default_output: OutputFormat,
    /// Color output setting.
    #[serde(default = "default_color")]
    pub color: ColorSetting,
    /// Log filter used when neither `RUST_LOG` nor `-v` is given.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Color output setting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ColorSetting {
    /// Auto-detect based on terminal.
    #[default]
    Auto,
    /// Always use colors.
    Always,
    /// Never use colors.
    Never,
}

impl ColorSetting {
    /// Apply this setting to the global `colored` override.
    pub fn apply(self) {
        match self {
            Self::Auto => colored::control::unset_override(),
            Self::Always => colored::control::set_override(true),
            Self::Never => colored::control::set_override(false),
        }
    }
}

/// Backend endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the REST API, e.g. `https://crm.example.com/api`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Path probed to decide whether the backend is reachable.
    #[serde(default = "default_health_path")]
    pub health_path: String,
    /// Bearer token sent with every delivery.
    #[serde(default)]
    pub auth_token: Option<String>,
    /// HTTP client timeout in seconds.
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
    /// Collection path per entity kind; unlisted kinds use `<entity>s`.
    #[serde(default)]
    pub collections: HashMap<String, String>,
}

/// Queue persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Key the serialized queue is stored under.
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
    /// Failed attempts after which an item is kept for manual review.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// Synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Upper bound on a single delivery attempt, in seconds.
    #[serde(default = "default_delivery_timeout")]
    pub delivery_timeout_secs: u64,
    /// How often `watch` probes connectivity, in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Minimum gap between automatic retries of a failed pass in `watch`,
    /// in seconds. 0 leaves failed passes to `offsync sync`.
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,
    /// Drain the queue automatically when connectivity returns.
    #[serde(default = "default_true")]
    pub auto_sync_on_reconnect: bool,
}

// Default value functions for serde
const fn default_output_format() -> OutputFormat {
    OutputFormat::Pretty
}

const fn default_color() -> ColorSetting {
    ColorSetting::Auto
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_base_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_health_path() -> String {
    "/health".to_string()
}

const fn default_http_timeout() -> u64 {
    30
}

fn default_storage_key() -> String {
    DEFAULT_STORAGE_KEY.to_string()
}

const fn default_max_retries() -> u32 {
    RETRY_CEILING
}

const fn default_delivery_timeout() -> u64 {
    15
}

const fn default_poll_interval() -> u64 {
    10
}

const fn default_retry_interval() -> u64 {
    60
}

const fn default_true() -> bool {
    true
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_output: default_output_format(),
            color: default_color(),
            log_level: default_log_level(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            health_path: default_health_path(),
            auth_token: None,
            timeout_secs: default_http_timeout(),
            collections: HashMap::new(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            storage_key: default_storage_key(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            delivery_timeout_secs: default_delivery_timeout(),
            poll_interval_secs: default_poll_interval(),
            retry_interval_secs: default_retry_interval(),
            auto_sync_on_reconnect: default_true(),
        }
    }
}

impl Config {
    /// Load configuration from a specific path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load_from_path(path: &std::path::Path) -> Result<Self, OffsyncError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            OffsyncError::Config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        serde_yaml::from_str(&contents).map_err(|e| {
            OffsyncError::Config(format!(
                "Failed to parse config file {}: {e}",
                path.display()
            ))
        })
    }

    /// Save configuration to a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save_to_path(&self, path: &std::path::Path) -> Result<(), OffsyncError> {
        let contents = self.to_yaml()?;

        std::fs::write(path, contents).map_err(|e| {
            OffsyncError::Config(format!(
                "Failed to write config file {}: {e}",
                path.display()
            ))
        })
    }

    /// Render the configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> Result<String, OffsyncError> {
        serde_yaml::to_string(self)
            .map_err(|e| OffsyncError::Config(format!("Failed to serialize config: {e}")))
    }

    /// Queue manager settings derived from this configuration.
    #[must_use]
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            storage_key: self.queue.storage_key.clone(),
            retry_ceiling: self.queue.max_retries,
            delivery_timeout: Duration::from_secs(self.sync.delivery_timeout_secs),
            auto_sync_on_reconnect: self.sync.auto_sync_on_reconnect,
        }
    }

    /// How often `watch` retries a failed pass, if at all.
    #[must_use]
    pub const fn retry_interval(&self) -> Option<Duration> {
        match self.sync.retry_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
