//! Configuration management for grouplog
//!
//! Configuration comes from defaults, an optional TOML file, and
//! `GROUPLOG_<SECTION>_<KEY>` environment variables, in that order.

use serde::{Deserialize, Serialize};
use std::env;

mod error;

pub use error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Group state machine limits
    #[serde(default)]
    pub group: GroupConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include target module
    pub with_target: bool,
}

/// Limits enforced by `ServerGroup::modify`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Maximum members plus pending members
    pub max_group_size: usize,

    /// Maximum encrypted title length in bytes
    pub max_title_bytes: usize,

    /// Maximum encrypted description length in bytes
    pub max_description_bytes: usize,

    /// Cap on entries returned by a bounded history fetch (0 = unlimited)
    pub max_changes_per_fetch: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json_format: false, with_target: true }
    }
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            max_group_size: 1000,
            max_title_bytes: 1024,
            max_description_bytes: 8192,
            max_changes_per_fetch: 0,
        }
    }
}

fn parse_var<T>(name: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| ConfigError::InvalidValue(format!("Invalid {}: {}", name, e)))
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Example: `GROUPLOG_GROUP_MAX_GROUP_SIZE=250`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `GROUPLOG_*` overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Logging config
        if let Some(level) = lookup("GROUPLOG_LOGGING_LEVEL") {
            self.logging.level = level.to_lowercase();
        }
        if let Some(json) = lookup("GROUPLOG_LOGGING_JSON_FORMAT") {
            self.logging.json_format = parse_var("JSON flag", &json)?;
        }
        if let Some(target) = lookup("GROUPLOG_LOGGING_WITH_TARGET") {
            self.logging.with_target = parse_var("target flag", &target)?;
        }

        // Group config
        if let Some(size) = lookup("GROUPLOG_GROUP_MAX_GROUP_SIZE") {
            self.group.max_group_size = parse_var("max group size", &size)?;
        }
        if let Some(bytes) = lookup("GROUPLOG_GROUP_MAX_TITLE_BYTES") {
            self.group.max_title_bytes = parse_var("max title bytes", &bytes)?;
        }
        if let Some(bytes) = lookup("GROUPLOG_GROUP_MAX_DESCRIPTION_BYTES") {
            self.group.max_description_bytes = parse_var("max description bytes", &bytes)?;
        }
        if let Some(count) = lookup("GROUPLOG_GROUP_MAX_CHANGES_PER_FETCH") {
            self.group.max_changes_per_fetch = parse_var("max changes per fetch", &count)?;
        }

        Ok(())
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError(e.to_string()))?;

        let config: Self = toml::from_str(&contents)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.group.max_group_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_group_size must be greater than 0".to_string(),
            ));
        }

        if self.group.max_title_bytes == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_title_bytes must be greater than 0".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::FileWriteError(e.to_string()))?;

        Ok(())
    }
}
