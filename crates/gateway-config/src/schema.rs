//! The gateway's configuration shape.
//!
//! Every section carries a `Default` so an empty config file (or none at
//! all) still produces a runnable, single-process gateway. Secrets are never
//! stored inline; fields that reference credentials hold the name of an
//! environment variable to read at startup, not the value itself.

use gateway_core::provider::{ModelInfo, ProviderType};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// One model a provider instance serves, with the routing-relevant metadata
/// the model registry needs alongside the provider-specific reference
/// used to build the adapter's own deployment/model table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCatalogEntry {
    /// Provider-side reference: an Azure deployment name, or a Bedrock model id.
    pub upstream_ref: String,
    /// Relative ordering among providers serving the same model id; lower
    /// wins ties ahead of load-balancer weight.
    #[serde(default = "default_priority")]
    pub priority: u32,
    /// Share of least-requests traffic this candidate should receive
    /// relative to others at the same priority.
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// Registry-level description (id, capabilities, context length, cost).
    #[serde(flatten)]
    pub info: ModelInfo,
}

fn default_priority() -> u32 {
    100
}

fn default_weight() -> u32 {
    100
}

/// Static credential reference: the name of an environment variable holding
/// a secret, resolved at load time rather than stored in the file.
pub type EnvVar = String;

/// One configured upstream provider instance.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProviderSettings {
    /// Provider instance id, e.g. `"azure-eastus"`.
    #[validate(length(min = 1))]
    pub id: String,
    /// Which adapter family this instance uses.
    pub provider_type: ProviderType,
    /// Whether this instance participates in routing.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Environment variable holding the API key / secret access key.
    pub api_key_env: EnvVar,
    /// Azure resource name. Required when `provider_type` is `azure_openai`.
    #[serde(default)]
    pub resource_name: Option<String>,
    /// Azure API version override.
    #[serde(default)]
    pub api_version: Option<String>,
    /// AWS region. Required when `provider_type` is `bedrock`.
    #[serde(default)]
    pub region: Option<String>,
    /// Environment variable holding an AWS secret access key (bedrock).
    #[serde(default)]
    pub secret_access_key_env: Option<EnvVar>,
    /// Environment variable holding an AWS session token, if using temporary
    /// credentials (bedrock).
    #[serde(default)]
    pub session_token_env: Option<EnvVar>,
    /// Per-request timeout to the upstream API.
    #[serde(with = "humantime_serde", default = "default_provider_timeout")]
    pub timeout: Duration,
    /// Models this instance serves.
    #[serde(default)]
    pub models: Vec<ModelCatalogEntry>,
}

fn default_true() -> bool {
    true
}

fn default_provider_timeout() -> Duration {
    Duration::from_secs(120)
}

/// HTTP server binding and lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerSettings {
    /// Address to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum request body size, in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// How long the graceful shutdown drain phase waits for in-flight
    /// requests before force-closing.
    #[serde(with = "humantime_serde", default = "default_shutdown_grace_period")]
    pub shutdown_grace_period: Duration,
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_shutdown_grace_period() -> Duration {
    Duration::from_secs(30)
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
            shutdown_grace_period: default_shutdown_grace_period(),
        }
    }
}

/// One statically configured API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeySettings {
    /// Environment variable holding the raw key value.
    pub key_env: EnvVar,
    /// Tenant this key is scoped to.
    pub tenant_id: String,
    /// User id to attribute requests to, if distinct from the tenant.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Scopes granted to this key.
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// JWT/OIDC verification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtSettings {
    /// OIDC discovery issuer URL (fetches JWKS automatically).
    #[serde(default)]
    pub oidc_issuer_url: Option<String>,
    /// Direct JWKS endpoint URL, when not using OIDC discovery.
    #[serde(default)]
    pub jwks_url: Option<String>,
    /// Environment variable holding an HMAC secret, for symmetric verification.
    #[serde(default)]
    pub secret_env: Option<EnvVar>,
    /// Accepted issuers.
    #[serde(default)]
    pub issuers: Vec<String>,
    /// Accepted audiences.
    #[serde(default)]
    pub audiences: Vec<String>,
    /// Claim carrying the tenant id.
    #[serde(default = "default_tenant_claim")]
    pub tenant_claim: String,
    /// Claim carrying the user id.
    #[serde(default = "default_user_claim")]
    pub user_claim: String,
}

fn default_tenant_claim() -> String {
    "tenant_id".to_string()
}

fn default_user_claim() -> String {
    "sub".to_string()
}

/// Authentication settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// Whether authentication is enforced. When `false`, unauthenticated
    /// requests are treated as an anonymous entity rather than rejected.
    #[serde(default = "default_true")]
    pub required: bool,
    /// Relaxes credential-format strictness for local development
    /// (accepts unsigned/short-lived static keys). Never set in production.
    #[serde(default)]
    pub dev_mode: bool,
    /// JWT verification settings, if JWT auth is enabled.
    #[serde(default)]
    pub jwt: Option<JwtSettings>,
    /// Statically configured API keys.
    #[serde(default)]
    pub api_keys: Vec<ApiKeySettings>,
    /// Paths exempt from authentication (health checks, metrics).
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
}

fn default_public_paths() -> Vec<String> {
    vec![
        "/health".to_string(),
        "/health/ready".to_string(),
        "/metrics".to_string(),
    ]
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            required: false,
            dev_mode: true,
            jwt: None,
            api_keys: Vec::new(),
            public_paths: default_public_paths(),
        }
    }
}

/// Response cache settings, translated into `gateway_resilience::CacheConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Whether the response cache is consulted at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum number of cached entries before low-value eviction.
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
    /// Default entry lifetime.
    #[serde(with = "humantime_serde", default = "default_cache_ttl")]
    pub default_ttl: Duration,
    /// Whether streaming responses may be cached (assembled after the final chunk).
    #[serde(default)]
    pub cache_streaming: bool,
    /// Interval between expired-entry sweeps.
    #[serde(with = "humantime_serde", default = "default_cache_sweep_interval")]
    pub sweep_interval: Duration,
}

fn default_cache_max_entries() -> usize {
    10_000
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(300)
}

fn default_cache_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: default_cache_max_entries(),
            default_ttl: default_cache_ttl(),
            cache_streaming: false,
            sweep_interval: default_cache_sweep_interval(),
        }
    }
}

/// Per-tenant budget override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantBudgetSettings {
    /// Tenant this override applies to.
    pub tenant_id: String,
    /// Maximum USD spend per UTC day for this tenant.
    pub daily_limit_usd: f64,
    /// Fractions of `daily_limit_usd` at which an alert is logged.
    #[serde(default)]
    pub alert_thresholds: Vec<f64>,
}

/// Cost controller settings, translated into `gateway_telemetry::BudgetLimits`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetSettings {
    /// Global daily USD cap across all tenants. `None` is unlimited.
    #[serde(default)]
    pub global_daily_limit_usd: Option<f64>,
    /// Default per-user daily USD cap for tenants without an explicit entry.
    #[serde(default)]
    pub default_user_daily_limit_usd: Option<f64>,
    /// Alert thresholds applied to the global limit.
    #[serde(default)]
    pub global_alert_thresholds: Vec<f64>,
    /// Per-tenant overrides.
    #[serde(default)]
    pub tenants: Vec<TenantBudgetSettings>,
}

/// Circuit breaker settings, translated into `gateway_resilience::CircuitBreakerConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures before the circuit opens.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Consecutive successes in half-open before the circuit closes.
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    /// How long the circuit stays open before allowing a half-open probe.
    #[serde(with = "humantime_serde", default = "default_circuit_timeout")]
    pub timeout: Duration,
    /// Minimum requests observed before `failure_threshold` is evaluated.
    #[serde(default = "default_min_requests")]
    pub min_requests: u32,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_success_threshold() -> u32 {
    1
}

fn default_circuit_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_min_requests() -> u32 {
    1
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            timeout: default_circuit_timeout(),
            min_requests: default_min_requests(),
        }
    }
}

/// Retry settings, translated into `gateway_resilience::RetryConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Maximum retry attempts after the initial try.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry.
    #[serde(with = "humantime_serde", default = "default_base_delay")]
    pub base_delay: Duration,
    /// Ceiling on the backed-off delay.
    #[serde(with = "humantime_serde", default = "default_max_delay")]
    pub max_delay: Duration,
    /// Exponential backoff multiplier.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Jitter fraction applied to each delay.
    #[serde(default = "default_jitter")]
    pub jitter: f64,
    /// Upstream HTTP status codes that are retryable.
    #[serde(default = "default_retry_on_status")]
    pub retry_on_status: Vec<u16>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.25
}

fn default_retry_on_status() -> Vec<u16> {
    vec![429, 500, 502, 503, 504]
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
            retry_on_status: default_retry_on_status(),
        }
    }
}

/// Active background health-probing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckSettings {
    /// Interval between probe sweeps of all registered providers.
    #[serde(with = "humantime_serde", default = "default_probe_interval")]
    pub probe_interval: Duration,
    /// Per-probe timeout.
    #[serde(with = "humantime_serde", default = "default_probe_timeout")]
    pub probe_timeout: Duration,
    /// Consecutive probe failures before a provider is marked unhealthy.
    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: u32,
    /// Consecutive probe successes before an unhealthy provider recovers.
    #[serde(default = "default_healthy_threshold")]
    pub healthy_threshold: u32,
}

fn default_probe_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_unhealthy_threshold() -> u32 {
    3
}

fn default_healthy_threshold() -> u32 {
    1
}

impl Default for HealthCheckSettings {
    fn default() -> Self {
        Self {
            probe_interval: default_probe_interval(),
            probe_timeout: default_probe_timeout(),
            unhealthy_threshold: default_unhealthy_threshold(),
            healthy_threshold: default_healthy_threshold(),
        }
    }
}

/// Distributed tracing export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracingSettings {
    /// `error` / `warn` / `info` / `debug` / `trace`, or a full `tracing`
    /// filter directive string.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON rather than human-readable text.
    #[serde(default)]
    pub json: bool,
    /// OTLP collector endpoint. When unset, spans stay local to `tracing`.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
    /// Service name attached to exported spans.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "llm-inference-gateway".to_string()
}

impl Default for TracingSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json: false,
            otlp_endpoint: None,
            service_name: default_service_name(),
        }
    }
}

/// Top-level gateway configuration.
///
/// Loaded by [`crate::load_config`] from layered defaults, an optional
/// YAML/TOML file, and environment variable overrides. There is no
/// hot-reload: a changed file or environment variable takes effect on the
/// next process restart.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct GatewayConfig {
    /// HTTP server settings.
    #[serde(default)]
    #[validate(nested)]
    pub server: ServerSettings,
    /// Authentication settings.
    #[serde(default)]
    pub auth: AuthSettings,
    /// Configured upstream provider instances.
    #[serde(default)]
    #[validate(nested)]
    pub providers: Vec<ProviderSettings>,
    /// Response cache settings.
    #[serde(default)]
    pub cache: CacheSettings,
    /// Cost controller settings.
    #[serde(default)]
    pub budget: BudgetSettings,
    /// Circuit breaker settings, applied per provider.
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,
    /// Retry policy settings.
    #[serde(default)]
    pub retry: RetrySettings,
    /// Active health-probing settings.
    #[serde(default)]
    pub health_check: HealthCheckSettings,
    /// Tracing/logging export settings.
    #[serde(default)]
    pub tracing: TracingSettings,
}

impl GatewayConfig {
    /// Provider settings for providers that are enabled and have their
    /// referenced credential environment variables resolvable is left to the
    /// loader; this simply filters disabled entries.
    #[must_use]
    pub fn enabled_providers(&self) -> Vec<&ProviderSettings> {
        self.providers.iter().filter(|p| p.enabled).collect()
    }
}
