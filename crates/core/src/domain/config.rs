//! Configuration management for SoundMaster
//!
//! This module provides:
//! - Configuration structs for routing rules, detection polling and storage
//! - TOML serialization with factory defaults
//! - [`ConfigManager`] for the main config file with corrupt-file recovery

use crate::domain::detector::PollingSchedule;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, instrument};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration and state file operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Mirror the registry to disk after every successful mutation
    pub persist_state: bool,

    /// Registry state file; relative paths resolve against the config directory
    pub state_file: PathBuf,

    /// Capacity of the notification broadcast channel
    pub notification_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            persist_state: true,
            state_file: PathBuf::from("sources.toml"),
            notification_capacity: 64,
        }
    }
}

/// Rules used by the routing resolver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Priority applied by the "Set High Priority" confirmation choice
    pub high_priority: u32,

    /// Volume above which a high volume warning is raised
    pub high_volume_threshold: f32,

    /// Notify when a refresh brings in a source that was not known before
    pub announce_new_sources: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            high_priority: 2,
            high_volume_threshold: 0.8,
            announce_new_sources: true,
        }
    }
}

/// Complete SoundMaster configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundmasterConfig {
    pub app: AppConfig,
    pub routing: RoutingConfig,
    pub detection: PollingSchedule,
}

impl SoundmasterConfig {
    /// Load configuration from TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }

    /// Create factory default configuration
    pub fn factory_default() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.routing.high_priority < 1 {
            return Err(ConfigError::Invalid(
                "routing.high_priority must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.routing.high_volume_threshold) {
            return Err(ConfigError::Invalid(format!(
                "routing.high_volume_threshold out of range: {} (must be 0.0 to 1.0)",
                self.routing.high_volume_threshold
            )));
        }
        if self.app.notification_capacity == 0 {
            return Err(ConfigError::Invalid(
                "app.notification_capacity must be greater than zero".to_string(),
            ));
        }
        self.detection.validate()
    }
}

/// Configuration manager for the main SoundMaster config
///
/// Manages `~/.config/soundmaster/config.toml` and resolves the path of the
/// registry state file next to it.
pub struct ConfigManager {
    config_dir: PathBuf,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_path = config_dir.join("config.toml");

        Self {
            config_dir,
            config_path,
        }
    }

    /// Get the default config directory path
    ///
    /// Returns `~/.config/soundmaster` on Linux, the platform equivalent elsewhere
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("soundmaster"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Absolute location of the registry state file for `config`
    pub fn state_path(&self, config: &SoundmasterConfig) -> PathBuf {
        if config.app.state_file.is_absolute() {
            config.app.state_file.clone()
        } else {
            self.config_dir.join(&config.app.state_file)
        }
    }

    /// Load configuration from file
    ///
    /// If the config file doesn't exist, writes and returns factory default.
    /// If the config file is corrupt, backs it up and returns factory default.
    #[instrument(skip(self))]
    pub async fn load(&self) -> SoundmasterConfig {
        if !self.config_path.exists() {
            info!(
                path = %self.config_path.display(),
                "Config file not found, creating factory default"
            );

            let config = SoundmasterConfig::factory_default();
            if let Err(e) = config.save_to_file(&self.config_path).await {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to save factory default config"
                );
            }

            return config;
        }

        match SoundmasterConfig::load_from_file(&self.config_path).await {
            Ok(config) => config,
            Err(e) => {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to load config, using factory default"
                );

                let backup_path = self.config_path.with_extension("toml.corrupt");
                if let Err(copy_err) = fs::copy(&self.config_path, &backup_path).await {
                    error!(
                        path = %backup_path.display(),
                        error = %copy_err,
                        "Failed to backup corrupt config"
                    );
                }

                SoundmasterConfig::factory_default()
            }
        }
    }

    #[instrument(skip(self, config))]
    pub async fn save(&self, config: &SoundmasterConfig) -> Result<()> {
        config.validate()?;
        fs::create_dir_all(&self.config_dir).await?;
        config.save_to_file(&self.config_path).await
    }

    /// Delete the config file
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<()> {
        if self.config_path.exists() {
            fs::remove_file(&self.config_path).await?;
            info!(path = %self.config_path.display(), "Configuration cleared");
        }

        Ok(())
    }

    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }
}
