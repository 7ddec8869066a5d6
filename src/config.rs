use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::utils;

/// Current configuration version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Environment variable that overrides `api_key` from the config file.
pub const API_KEY_ENV: &str = "TMDB_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_refresh_pages")]
    pub refresh_pages: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_user")]
    pub default_user: String,
    #[serde(default = "default_config_version")]
    pub config_version: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            api_key: String::new(),
            api_base_url: default_api_base_url(),
            language: default_language(),
            timeout_secs: default_timeout_secs(),
            retry_attempts: default_retry_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
            refresh_pages: default_refresh_pages(),
            page_size: default_page_size(),
            default_user: default_user(),
            config_version: Some(CURRENT_CONFIG_VERSION),
        }
    }
}

// Default value functions
fn default_database_path() -> String {
    // This is a fallback - actual profile will be determined at load time
    if let Some(data_dir) = utils::get_data_dir(utils::Profile::Prod) {
        data_dir.join("reeljournal.db").to_string_lossy().to_string()
    } else {
        "~/.local/share/reeljournal/reeljournal.db".to_string()
    }
}

fn default_api_base_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_language() -> String {
    "en-US".to_string()
}

fn default_timeout_secs() -> u64 {
    6
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    2
}

fn default_refresh_pages() -> u32 {
    5
}

fn default_page_size() -> u32 {
    20
}

fn default_user() -> String {
    "me".to_string()
}

fn default_config_version() -> Option<u32> {
    Some(CURRENT_CONFIG_VERSION)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config directory: {0}")]
    ConfigDirError(String),
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to write config file: {0}")]
    WriteError(String),
    #[error("Invalid setting {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

impl Config {
    /// Load configuration from file, or create default if missing
    /// Uses the provided profile to determine config and database paths
    pub fn load_with_profile(profile: utils::Profile) -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path(profile)?;

        let mut config = if config_path.exists() {
            Self::read_file(&config_path)?
        } else {
            let mut config = Config::default();
            config.database_path = Self::default_database_path_for_profile(profile);
            if let Err(e) = config.save_to(&config_path) {
                tracing::error!(path = %config_path.display(), "Failed to save config file: {e}");
                return Err(e);
            }
            config
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit file path (the `--config` flag).
    /// The file must exist.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read_file(path)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        Ok(toml::from_str(&contents)?)
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.api_key = key.trim().to_string();
            }
        }
    }

    /// Reject settings the rest of the application cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "retry_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.page_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "page_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.default_user.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "default_user",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Save configuration to the given file, creating parent directories
    pub fn save_to(&mut self, config_path: &Path) -> Result<(), ConfigError> {
        // Ensure config version is set before saving
        self.config_version = Some(CURRENT_CONFIG_VERSION);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteError(e.to_string()))?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::WriteError(format!("Failed to serialize config: {}", e)))?;

        fs::write(config_path, toml_string)
            .map_err(|e| ConfigError::WriteError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the config file
    pub fn get_config_path(profile: utils::Profile) -> Result<PathBuf, ConfigError> {
        let config_dir = utils::get_config_dir(profile)
            .ok_or_else(|| ConfigError::ConfigDirError("Could not determine config directory".to_string()))?;
        Ok(config_dir.join("config.toml"))
    }

    /// Get default database path for a specific profile
    fn default_database_path_for_profile(profile: utils::Profile) -> String {
        if let Some(data_dir) = utils::get_data_dir(profile) {
            data_dir.join("reeljournal.db").to_string_lossy().to_string()
        } else {
            match profile {
                utils::Profile::Dev => "~/.local/share/reeljournal-dev/reeljournal.db".to_string(),
                utils::Profile::Prod => "~/.local/share/reeljournal/reeljournal.db".to_string(),
            }
        }
    }

    /// Get the expanded database path (with ~ expansion)
    pub fn get_database_path(&self) -> PathBuf {
        utils::expand_path(&self.database_path)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}
