//! Logging setup for grouplog
//!
//! All diagnostics go through `tracing`. Hosts call [`init_logging_with_config`]
//! once at startup; `RUST_LOG`, when set, takes precedence over the configured
//! level.

use crate::config::LoggingConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod error;
mod level;

pub use error::LoggingError;
pub use level::LogLevel;

/// Subscriber settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: LogLevel,
    /// Include the emitting module in each line
    pub with_target: bool,
    /// One JSON object per event instead of human-readable lines
    pub json_format: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: LogLevel::Info, with_target: true, json_format: false }
    }
}

impl LogConfig {
    pub fn new(level: LogLevel) -> Self {
        Self { level, ..Default::default() }
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    pub fn json_format(mut self, enabled: bool) -> Self {
        self.json_format = enabled;
        self
    }
}

impl TryFrom<&LoggingConfig> for LogConfig {
    type Error = LoggingError;

    fn try_from(config: &LoggingConfig) -> Result<Self, Self::Error> {
        Ok(LogConfig::new(config.level.parse()?)
            .with_target(config.with_target)
            .json_format(config.json_format))
    }
}

/// Install a subscriber at `info`
pub fn init_logging() -> Result<(), LoggingError> {
    init_logging_with_config(LogConfig::default())
}

/// Install the global subscriber
///
/// Fails if one is already installed, which is common in tests; callers
/// there should ignore the error.
///
/// # Example
/// ```
/// use grouplog_core::logging::{init_logging_with_config, LogConfig, LogLevel};
///
/// let config = LogConfig::new(LogLevel::Debug).with_target(false);
/// let _ = init_logging_with_config(config);
/// ```
pub fn init_logging_with_config(config: LogConfig) -> Result<(), LoggingError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let fmt_layer = fmt::layer().with_target(config.with_target);

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if config.json_format {
        registry.with(fmt_layer.json()).try_init()
    } else {
        registry.with(fmt_layer).try_init()
    };

    result.map_err(|e| LoggingError::InitializationFailed(e.to_string()))
}
