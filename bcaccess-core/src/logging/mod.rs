//! Logging subsystem for bcaccess
//!
//! Structured logging on `tracing`. Output goes to stderr so a terminal
//! front end keeps stdout for its prompts. `RUST_LOG` overrides the
//! configured level.

use crate::config::LoggingConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod error;
mod level;

pub use error::LoggingError;
pub use level::LogLevel;

/// Configuration for the logging subsystem
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    pub with_timestamp: bool,
    pub with_target: bool,
    pub json_format: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            with_timestamp: true,
            with_target: true,
            json_format: false,
        }
    }
}

impl LogConfig {
    pub fn new(level: LogLevel) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    pub fn with_timestamp(mut self, enabled: bool) -> Self {
        self.with_timestamp = enabled;
        self
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
        let level: LogLevel = config.level.parse()?;
        Ok(LogConfig::new(level).json_format(config.json_format))
    }
}

/// Initialize logging with the default configuration
pub fn init_logging() -> Result<(), LoggingError> {
    init_logging_with_config(LogConfig::default())
}

/// Initialize logging with custom configuration
///
/// # Example
/// ```
/// use bcaccess_core::logging::{init_logging_with_config, LogConfig, LogLevel};
///
/// let config = LogConfig::new(LogLevel::Debug).with_target(false);
/// init_logging_with_config(config).expect("Failed to initialize logging");
/// ```
pub fn init_logging_with_config(config: LogConfig) -> Result<(), LoggingError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(config.with_target);

    let result = match (config.json_format, config.with_timestamp) {
        (true, true) => registry.with(layer.json()).try_init(),
        (true, false) => registry.with(layer.json().without_time()).try_init(),
        (false, true) => registry.with(layer).try_init(),
        (false, false) => registry.with(layer.without_time()).try_init(),
    };
    result.map_err(|e| LoggingError::InitializationFailed(e.to_string()))
}
