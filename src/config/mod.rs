//! Configuration management for the lobby-transit coordinator
//!
//! This module handles loading the JSON configuration file, environment
//! variable overrides, validation, and default values.

pub mod app;
pub mod lobby;
pub mod store;

// Re-export commonly used types
pub use app::{validate_config, AppConfig, RedisSettings, RetrySettings, TransitSettings};
pub use lobby::LobbySettings;
pub use store::{ConfigStore, CONFIG_FILE_NAME, DEFAULT_CONFIG_DIR};
