//! Errors raised while loading or validating grouplog configuration

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML file could not be read
    #[error("Failed to read configuration file: {0}")]
    FileReadError(String),

    #[error("Failed to write configuration file: {0}")]
    FileWriteError(String),

    /// The TOML file is malformed or has wrong types
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Failed to serialize configuration: {0}")]
    SerializeError(String),

    /// An environment override did not parse
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// Values parsed but break a limit (zero group size, unknown log level)
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::ParseError(e.to_string())
    }
}
