//! On-disk JSON configuration
//!
//! The store owns `<dir>/config.json`. On first start it creates the
//! directory and the file and fills in the default lobby set; everything
//! else is read as-is.

use crate::config::app::{validate_config, AppConfig};
use crate::config::lobby::LobbySettings;
use crate::error::{Result, TransitError};
use anyhow::Context;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Default directory for the configuration file
pub const DEFAULT_CONFIG_DIR: &str = "config/lobby-transit";

/// File name inside the configuration directory
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Handle to the configuration file
#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIG_DIR)
    }
}

impl ConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the configuration file
    pub fn path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE_NAME)
    }

    /// Load the configuration, creating the directory, file and default
    /// lobby set when they do not exist yet
    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.ensure_directory()?;

        let path = self.path();
        let mut document = self.read_document(&path)?;
        let root = document
            .as_object_mut()
            .ok_or_else(|| TransitError::ConfigurationError {
                message: format!("{} must contain a JSON object", path.display()),
            })?;

        if !root.contains_key("configuration") {
            let defaults = serde_json::to_value(LobbySettings::default())
                .context("Failed to serialize default lobby settings")?;
            root.insert("configuration".to_string(), defaults);
            write_document(&path, &document)?;
            info!(
                "Wrote default lobby servers to {} (lobby1, lobby2, lobby3)",
                path.display()
            );
        }

        let mut config: AppConfig =
            serde_json::from_value(document).map_err(|e| TransitError::ConfigurationError {
                message: format!("Invalid configuration in {}: {}", path.display(), e),
            })?;

        for server in &config.configuration.servers {
            info!(
                "Loaded lobby server: {} with max players: {}",
                server.server_name, server.max_players
            );
        }
        if config.redis.is_some() {
            info!("Loaded redis configuration");
        } else {
            info!("No redis section configured, status channel disabled");
        }

        config.apply_env_overrides()?;
        validate_config(&config).map_err(|e| TransitError::ConfigurationError {
            message: e.to_string(),
        })?;

        Ok(config)
    }

    /// Write a configuration back to disk
    pub fn save(&self, config: &AppConfig) -> Result<()> {
        self.ensure_directory()?;
        let document = serde_json::to_value(config).context("Failed to serialize configuration")?;
        write_document(&self.path(), &document)
    }

    fn ensure_directory(&self) -> Result<()> {
        if self.dir.is_dir() {
            return Ok(());
        }
        info!(
            "Configuration directory {} does not exist. Creating...",
            self.dir.display()
        );
        fs::create_dir_all(&self.dir).map_err(|e| TransitError::ConfigurationError {
            message: format!(
                "Could not create configuration directory {}: {}",
                self.dir.display(),
                e
            ),
        })?;
        Ok(())
    }

    fn read_document(&self, path: &Path) -> Result<Value> {
        if !path.exists() {
            info!("Configuration file {} does not exist. Creating...", path.display());
            let empty = Value::Object(Map::new());
            write_document(path, &empty)?;
            return Ok(empty);
        }

        let raw = fs::read_to_string(path).map_err(|e| TransitError::ConfigurationError {
            message: format!("Could not read {}: {}", path.display(), e),
        })?;
        if raw.trim().is_empty() {
            return Ok(Value::Object(Map::new()));
        }

        serde_json::from_str(&raw).map_err(|e| {
            TransitError::ConfigurationError {
                message: format!("Could not parse {}: {}", path.display(), e),
            }
            .into()
        })
    }
}

fn write_document(path: &Path, document: &Value) -> Result<()> {
    let pretty = serde_json::to_string_pretty(document).context("Failed to render configuration")?;
    fs::write(path, pretty).map_err(|e| {
        TransitError::ConfigurationError {
            message: format!("Could not write {}: {}", path.display(), e),
        }
        .into()
    })
}
