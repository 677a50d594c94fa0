//! # Gateway Configuration
//!
//! Layered configuration for the LLM Inference Gateway: built-in defaults,
//! an optional YAML/TOML file, then environment variable overrides.
//! Deliberately has no hot-reload path — a change takes effect on the next
//! process restart, keeping the rest of the gateway free of the
//! synchronization concerns a live-swapped config would otherwise impose.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod schema;

pub use error::ConfigError;
pub use loader::{load_config, load_from_path, CONFIG_FILE_ENV};
pub use schema::{
    ApiKeySettings, AuthSettings, BudgetSettings, CacheSettings, CircuitBreakerSettings,
    GatewayConfig, HealthCheckSettings, JwtSettings, ModelCatalogEntry, ProviderSettings,
    RetrySettings, ServerSettings, TenantBudgetSettings, TracingSettings,
};
