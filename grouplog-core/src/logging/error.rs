//! Errors raised while installing the tracing subscriber

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum LoggingError {
    /// A global subscriber is already installed
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    #[error("Invalid logging configuration: {0}")]
    InvalidConfiguration(String),
}
