//! Layered configuration loading: built-in defaults, an optional file, then
//! environment variable overrides. No hot-reload — a changed file or
//! variable takes effect on the next restart.

use crate::error::ConfigError;
use crate::schema::GatewayConfig;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use validator::Validate;

/// Environment variable naming the config file to load, if any.
pub const CONFIG_FILE_ENV: &str = "GATEWAY_CONFIG_FILE";

/// Paths checked, in order, when `GATEWAY_CONFIG_FILE` is unset.
const DEFAULT_CANDIDATE_PATHS: &[&str] = &[
    "config/gateway.yaml",
    "config/gateway.yml",
    "config/gateway.toml",
    "gateway.yaml",
    "gateway.toml",
];

/// Load the gateway configuration: defaults, optionally overridden by a file,
/// then by environment variables, then validated.
///
/// # Errors
/// Returns [`ConfigError`] if a file was found but failed to parse, if an
/// environment override had an invalid value, or if the assembled
/// configuration fails validation.
pub async fn load_config() -> Result<GatewayConfig, ConfigError> {
    let mut config = match config_file_path() {
        Some(path) => load_from_path(&path).await?,
        None => {
            info!("no config file found, starting from built-in defaults");
            GatewayConfig::default()
        }
    };

    apply_env_overrides(&mut config)?;

    config
        .validate()
        .map_err(|e| ConfigError::Validation(e.to_string()))?;

    Ok(config)
}

fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
        return Some(PathBuf::from(path));
    }
    DEFAULT_CANDIDATE_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

/// Load and parse a config file by its extension (`.yaml`/`.yml` or `.toml`).
///
/// # Errors
/// Returns [`ConfigError::Io`] if the file can't be read, or
/// [`ConfigError::Yaml`]/[`ConfigError::Toml`]/[`ConfigError::UnsupportedFormat`]
/// if it can't be parsed.
pub async fn load_from_path(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

    let config = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => serde_yaml::from_str(&content)?,
        Some("toml") => toml::from_str(&content)?,
        other => {
            return Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            ))
        }
    };

    info!(path = %path.display(), "loaded configuration file");
    Ok(config)
}

/// Environment variables consulted after the file is loaded. Each overrides
/// the corresponding field only when set.
fn apply_env_overrides(config: &mut GatewayConfig) -> Result<(), ConfigError> {
    if let Ok(host) = std::env::var("GATEWAY_HOST") {
        config.server.host = host;
    }
    if let Some(port) = parse_env_override::<u16>("GATEWAY_PORT")? {
        config.server.port = port;
    }
    if let Ok(level) = std::env::var("GATEWAY_LOG_LEVEL") {
        config.tracing.log_level = level;
    }
    if let Some(json) = parse_env_override::<bool>("GATEWAY_LOG_JSON")? {
        config.tracing.json = json;
    }
    if let Ok(endpoint) = std::env::var("GATEWAY_OTLP_ENDPOINT") {
        config.tracing.otlp_endpoint = Some(endpoint);
    }
    if let Some(required) = parse_env_override::<bool>("GATEWAY_AUTH_REQUIRED")? {
        config.auth.required = required;
    }
    if let Some(dev_mode) = parse_env_override::<bool>("GATEWAY_DEV_MODE")? {
        config.auth.dev_mode = dev_mode;
        if dev_mode {
            warn!("GATEWAY_DEV_MODE=true: relaxed credential validation is active");
        }
    }
    if let Some(limit) = parse_env_override::<f64>("GATEWAY_GLOBAL_DAILY_LIMIT_USD")? {
        config.budget.global_daily_limit_usd = Some(limit);
    }
    Ok(())
}

fn parse_env_override<T>(var: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidEnvOverride {
                var: var.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}
