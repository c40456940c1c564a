use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::utils;

/// Current configuration version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// API key value shipped in the default config; means "no remote configured"
pub const PLACEHOLDER_API_KEY: &str = "YOUR_API_KEY_HERE";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_storage_path")]
    pub storage_path: String,
    /// Preferred current user (member id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_user: Option<String>,
    #[serde(default)]
    pub currency: CurrencySettings,
    #[serde(default)]
    pub remote: RemoteSettings,
    #[serde(default = "default_config_version")]
    pub config_version: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencySettings {
    #[serde(default = "default_base_currency")]
    pub base: String,
    #[serde(default = "default_foreign_currency")]
    pub foreign: String,
    /// Foreign-to-base rate used until one is saved
    #[serde(default = "default_exchange_rate")]
    pub default_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_project_id")]
    pub project_id: String,
    #[serde(default = "default_remote_database_path")]
    pub database_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            current_user: None,
            currency: CurrencySettings::default(),
            remote: RemoteSettings::default(),
            config_version: Some(CURRENT_CONFIG_VERSION),
        }
    }
}

impl Default for CurrencySettings {
    fn default() -> Self {
        Self {
            base: default_base_currency(),
            foreign: default_foreign_currency(),
            default_rate: default_exchange_rate(),
        }
    }
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            api_key: default_api_key(),
            project_id: default_project_id(),
            database_path: default_remote_database_path(),
        }
    }
}

impl RemoteSettings {
    /// Remote mode is used only when real credentials are present
    pub fn is_configured(&self) -> bool {
        let key = self.api_key.trim();
        !key.is_empty() && key != PLACEHOLDER_API_KEY && !self.project_id.trim().is_empty()
    }

    /// Get the expanded document database path (with ~ expansion)
    pub fn get_database_path(&self) -> PathBuf {
        utils::expand_path(&self.database_path)
    }
}

// Default value functions
fn default_storage_path() -> String {
    data_file_path(utils::Profile::Prod, "local_storage.db")
}

fn default_remote_database_path() -> String {
    data_file_path(utils::Profile::Prod, "remote.db")
}

fn default_base_currency() -> String {
    "HKD".to_string()
}

fn default_foreign_currency() -> String {
    "KRW".to_string()
}

fn default_exchange_rate() -> f64 {
    0.0058
}

fn default_api_key() -> String {
    PLACEHOLDER_API_KEY.to_string()
}

fn default_project_id() -> String {
    "your-project".to_string()
}

fn default_config_version() -> Option<u32> {
    Some(CURRENT_CONFIG_VERSION)
}

fn data_file_path(profile: utils::Profile, file_name: &str) -> String {
    if let Some(data_dir) = utils::get_data_dir(profile) {
        data_dir.join(file_name).to_string_lossy().to_string()
    } else {
        // Fallback paths - platform-specific
        let app_name = profile.app_name();
        #[cfg(target_os = "macos")]
        {
            format!("~/Library/Application Support/{}/{}", app_name, file_name)
        }
        #[cfg(not(target_os = "macos"))]
        {
            format!("~/.local/share/{}/{}", app_name, file_name)
        }
    }
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
}

impl Config {
    /// Load configuration from an explicit file; a missing file is created with defaults
    pub fn load_from(config_path: &Path, profile: utils::Profile) -> Result<Self, ConfigError> {
        if config_path.exists() {
            let contents = fs::read_to_string(config_path)
                .map_err(|e| ConfigError::ReadError(e.to_string()))?;
            let config: Config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            let mut config = Config::default_for_profile(profile);
            let save_result = config.save_to(config_path);
            if let Err(ref e) = save_result {
                tracing::error!(error = %e, path = ?config_path, "Failed to save config file");
            }
            save_result?;
            tracing::info!("Created default config at {:?}", config_path);
            Ok(config)
        }
    }

    /// Defaults with storage paths pointing into the profile's data directory
    pub fn default_for_profile(profile: utils::Profile) -> Self {
        Self {
            storage_path: data_file_path(profile, "local_storage.db"),
            remote: RemoteSettings {
                database_path: data_file_path(profile, "remote.db"),
                ..RemoteSettings::default()
            },
            ..Config::default()
        }
    }

    pub fn save_to(&mut self, config_path: &Path) -> Result<(), ConfigError> {
        // Ensure config version is set before saving
        self.config_version = Some(CURRENT_CONFIG_VERSION);

        // Create parent directory if it doesn't exist
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

    /// Get the expanded local storage path (with ~ expansion)
    pub fn get_storage_path(&self) -> PathBuf {
        utils::expand_path(&self.storage_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_placeholder_credentials_mean_local_mode() {
        let config = Config::default();
        assert!(!config.remote.is_configured());

        let mut remote = RemoteSettings::default();
        remote.api_key = "   ".to_string();
        assert!(!remote.is_configured());

        remote.api_key = "live-key".to_string();
        assert!(remote.is_configured());

        remote.project_id = String::new();
        assert!(!remote.is_configured());
    }

    #[test]
    fn test_missing_config_is_created_with_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tpp").join("config.toml");

        let config = Config::load_from(&path, utils::Profile::Dev).unwrap();
        assert!(path.exists());
        assert_eq!(config.currency.foreign, "KRW");
        assert_eq!(config.currency.default_rate, 0.0058);
        assert_eq!(config.config_version, Some(CURRENT_CONFIG_VERSION));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            "storage_path = \"/tmp/trip.db\"\ncurrent_user = \"mem_2\"\n\n[remote]\napi_key = \"abc\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path, utils::Profile::Prod).unwrap();
        assert_eq!(config.storage_path, "/tmp/trip.db");
        assert_eq!(config.current_user.as_deref(), Some("mem_2"));
        assert_eq!(config.currency.base, "HKD");
        assert!(config.remote.is_configured());
    }

    #[test]
    fn test_save_and_reload_current_user() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let mut config = Config::load_from(&path, utils::Profile::Dev).unwrap();
        config.current_user = Some("mem_4".to_string());
        config.save_to(&path).unwrap();

        let reloaded = Config::load_from(&path, utils::Profile::Dev).unwrap();
        assert_eq!(reloaded.current_user.as_deref(), Some("mem_4"));
    }
}
