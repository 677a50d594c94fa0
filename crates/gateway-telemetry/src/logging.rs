//! Lightweight `tracing_subscriber` bootstrap, independent of the full OTel
//! pipeline in [`crate::tracing_setup`]. Used where a process wants readable
//! logs without standing up an OTLP exporter, e.g. integration tests.

use thiserror::Error;
use tracing_subscriber::{fmt, EnvFilter};

/// Failure initializing the global subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// A subscriber was already installed for this process.
    #[error("global tracing subscriber already set")]
    AlreadySet,
}

/// Minimal logging configuration: just level and format, no exporters.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, e.g. `"info"` or `"gateway_server=debug,warn"`.
    pub level: String,
    /// Emit newline-delimited JSON instead of the compact human-readable format.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Install a process-global `tracing` subscriber from `config`.
///
/// # Errors
/// Returns [`LoggingError::AlreadySet`] if a global subscriber is already
/// installed (calling this more than once per process, or alongside
/// [`crate::tracing_setup::init_tracing`]).
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let result = if config.json {
        fmt()
            .with_env_filter(filter)
            .json()
            .with_target(true)
            .try_init()
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    };

    result.map_err(|_| LoggingError::AlreadySet)
}
