//! Configuration management for the mod runner.
//!
//! Loads runner settings from a TOML file, creating a default one on first
//! run, and validates them before any mod is started.

use mod_settings::{Backoff, RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Application configuration loaded from TOML file.
///
/// Covers where mods are installed, how settings persistence retries, and
/// how the runner logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Mod hosting settings
    pub mods: ModsSettings,
    /// Settings persistence settings
    #[serde(default)]
    pub persistence: PersistenceSettings,
    /// Logging configuration settings
    pub logging: LoggingSettings,
}

/// Mod hosting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModsSettings {
    /// Directory each mod gets its own sub-directory under
    pub directory: String,
    /// Whether to start all mods on startup
    pub auto_start: bool,
    /// Commands run once after startup, e.g. `"test"`
    #[serde(default)]
    pub startup_commands: Vec<String>,
}

/// Retry behaviour for reading and writing `Settings.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceSettings {
    /// Attempts per read or write, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay between attempts in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Growth of the delay between attempts
    #[serde(default)]
    pub backoff: Backoff,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY.as_millis() as u64
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            backoff: Backoff::default(),
        }
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mods: ModsSettings {
                directory: "Mods".to_string(),
                auto_start: true,
                startup_commands: vec![],
            },
            persistence: PersistenceSettings::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, writes the default configuration there and
    /// returns it.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    pub fn mods_directory(&self) -> PathBuf {
        PathBuf::from(&self.mods.directory)
    }

    /// Retry policy handed to every mod's settings store.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.persistence.max_attempts,
            Duration::from_millis(self.persistence.retry_delay_ms),
            self.persistence.backoff,
        )
    }

    /// Validates the configuration.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is valid, or an error string describing the issue.
    pub fn validate(&self) -> Result<(), String> {
        if self.mods.directory.is_empty() {
            return Err("Mods directory cannot be empty".to_string());
        }

        if self.persistence.max_attempts == 0 {
            return Err("Persistence max_attempts must be at least 1".to_string());
        }

        if let Some(blank) = self
            .mods
            .startup_commands
            .iter()
            .position(|c| c.trim().is_empty())
        {
            return Err(format!("Startup command #{} is empty", blank + 1));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}
