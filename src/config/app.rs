//! Main application configuration
//!
//! This module defines the configuration document for the transit
//! coordinator, including environment variable overrides and validation.

use crate::config::lobby::LobbySettings;
use crate::transit::schedule::RetryPolicy;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configured lobby servers
    pub configuration: LobbySettings,
    /// Status channel connection; absent means timer-only mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisSettings>,
    /// Coordinator timings
    #[serde(default)]
    pub transit: TransitSettings,
}

/// Redis connection settings for the status channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    /// Empty means no AUTH
    pub password: String,
    pub database: i64,
    /// First reconnect delay after the channel drops, in milliseconds
    pub reconnect_initial_delay_ms: u64,
    /// Upper bound for the reconnect backoff, in milliseconds
    pub reconnect_max_delay_ms: u64,
}

/// Coordinator timing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransitSettings {
    /// Time a player is held on the lobby before being advanced, in milliseconds
    pub advance_delay_ms: u64,
    /// Placement retry behaviour when no lobby is available
    pub retry: RetrySettings,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// Placement retry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetrySettings {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub max_attempts: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            configuration: LobbySettings::default(),
            redis: None,
            transit: TransitSettings::default(),
        }
    }
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: String::new(),
            database: 0,
            reconnect_initial_delay_ms: 1000,
            reconnect_max_delay_ms: 30_000,
        }
    }
}

impl Default for TransitSettings {
    fn default() -> Self {
        Self {
            advance_delay_ms: 5000, // 5 seconds
            retry: RetrySettings::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: 2000, // 2 seconds
            max_delay_ms: 30_000,
            multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

impl RedisSettings {
    /// Get the first reconnect delay as Duration
    pub fn reconnect_initial_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_delay_ms)
    }

    /// Get the reconnect backoff cap as Duration
    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }
}

impl AppConfig {
    /// Load a configuration file without creating defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: AppConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env_overrides()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Apply environment variable overrides on top of file values
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(log_level) = env::var("TRANSIT_LOG_LEVEL") {
            self.transit.log_level = log_level;
        }
        if let Ok(delay) = env::var("TRANSIT_ADVANCE_DELAY_MS") {
            self.transit.advance_delay_ms = delay
                .parse()
                .map_err(|_| anyhow!("Invalid TRANSIT_ADVANCE_DELAY_MS value: {}", delay))?;
        }
        if let Ok(attempts) = env::var("TRANSIT_RETRY_MAX_ATTEMPTS") {
            self.transit.retry.max_attempts = attempts
                .parse()
                .map_err(|_| anyhow!("Invalid TRANSIT_RETRY_MAX_ATTEMPTS value: {}", attempts))?;
        }

        // Redis settings; REDIS_HOST alone is enough to enable the channel
        if let Ok(host) = env::var("REDIS_HOST") {
            self.redis.get_or_insert_with(RedisSettings::default).host = host;
        }
        if let Some(redis) = self.redis.as_mut() {
            if let Ok(port) = env::var("REDIS_PORT") {
                redis.port = port
                    .parse()
                    .map_err(|_| anyhow!("Invalid REDIS_PORT value: {}", port))?;
            }
            if let Ok(password) = env::var("REDIS_PASSWORD") {
                redis.password = password;
            }
            if let Ok(database) = env::var("REDIS_DATABASE") {
                redis.database = database
                    .parse()
                    .map_err(|_| anyhow!("Invalid REDIS_DATABASE value: {}", database))?;
            }
        }

        Ok(())
    }

    /// Whether the status channel is configured
    pub fn status_channel_enabled(&self) -> bool {
        self.redis.is_some()
    }

    /// Get the lobby hold time as Duration
    pub fn advance_delay(&self) -> Duration {
        Duration::from_millis(self.transit.advance_delay_ms)
    }

    /// Build the placement retry policy
    pub fn retry_policy(&self) -> RetryPolicy {
        let retry = &self.transit.retry;
        RetryPolicy {
            initial_delay: Duration::from_millis(retry.initial_delay_ms),
            max_delay: Duration::from_millis(retry.max_delay_ms),
            multiplier: retry.multiplier,
            max_attempts: retry.max_attempts,
        }
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.transit.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.transit.log_level)),
    }

    // Validate lobby set
    let servers = &config.configuration.servers;
    if servers.is_empty() {
        return Err(anyhow!("At least one lobby server must be configured"));
    }
    let mut seen = HashSet::new();
    for server in servers {
        if server.server_name.trim().is_empty() {
            return Err(anyhow!("Lobby server name cannot be empty"));
        }
        if server.max_players == 0 {
            return Err(anyhow!(
                "Lobby server {} must allow at least one player",
                server.server_name
            ));
        }
        if !seen.insert(server.server_name.as_str()) {
            return Err(anyhow!(
                "Lobby server {} is configured more than once",
                server.server_name
            ));
        }
    }

    // Validate timings
    if config.transit.advance_delay_ms == 0 {
        return Err(anyhow!("Advance delay must be greater than 0"));
    }
    let retry = &config.transit.retry;
    if retry.initial_delay_ms == 0 {
        return Err(anyhow!("Retry initial delay must be greater than 0"));
    }
    if retry.max_delay_ms < retry.initial_delay_ms {
        return Err(anyhow!("Retry max delay cannot be below the initial delay"));
    }
    if retry.multiplier.is_nan() || retry.multiplier < 1.0 {
        return Err(anyhow!("Retry multiplier must be at least 1.0"));
    }
    if retry.max_attempts == 0 {
        return Err(anyhow!("Retry max attempts must be at least 1"));
    }

    // Validate redis settings
    if let Some(redis) = &config.redis {
        if redis.host.is_empty() {
            return Err(anyhow!("Redis host cannot be empty"));
        }
        if redis.port == 0 {
            return Err(anyhow!("Redis port cannot be 0"));
        }
        if redis.database < 0 {
            return Err(anyhow!("Redis database cannot be negative"));
        }
        if redis.reconnect_initial_delay_ms == 0 {
            return Err(anyhow!("Redis reconnect delay must be greater than 0"));
        }
        if redis.reconnect_max_delay_ms < redis.reconnect_initial_delay_ms {
            return Err(anyhow!(
                "Redis reconnect max delay cannot be below the initial delay"
            ));
        }
    }

    Ok(())
}
