//! Errors produced while loading and validating configuration.

use thiserror::Error;

/// Failure modes of [`crate::load_config`] and [`crate::loader::load_from_path`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read from disk.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path that was attempted.
        path: String,
        /// Underlying IO failure.
        #[source]
        source: std::io::Error,
    },

    /// The file extension wasn't `.yaml`, `.yml`, or `.toml`.
    #[error("unsupported config file extension: {0}")]
    UnsupportedFormat(String),

    /// The file content did not parse as YAML.
    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The file content did not parse as TOML.
    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    /// An environment variable override had a value of the wrong type.
    #[error("invalid value for environment variable {var}: {message}")]
    InvalidEnvOverride {
        /// Name of the environment variable.
        var: String,
        /// Description of why the value was rejected.
        message: String,
    },

    /// The assembled configuration failed semantic validation.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}
