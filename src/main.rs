//! # LLM Inference Gateway
//!
//! Enterprise-grade, OpenAI-compatible API gateway for Large Language Models.
//!
//! ## Features
//!
//! - Azure OpenAI and AWS Bedrock provider adapters behind one wire format
//! - Priority/weighted routing with per-provider circuit breaking and retry
//! - Tenant-scoped response caching and budget admission
//! - Prometheus metrics and distributed tracing
//!
//! ## Usage
//!
//! ```bash
//! # Start with default configuration
//! llm-inference-gateway
//!
//! # Start with a custom config file
//! GATEWAY_CONFIG_FILE=/path/to/gateway.yaml llm-inference-gateway
//!
//! # Start with environment overrides
//! GATEWAY_PORT=9000 llm-inference-gateway
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use gateway_config::schema::{GatewayConfig, ProviderSettings};
use gateway_core::ProviderType;
use gateway_providers::registry::ProviderRegistry;
use gateway_resilience::{CacheConfig, CircuitBreakerConfig, ResponseCache, RetryConfig};
use gateway_routing::{HealthProber, ProviderSelector, Router, RouterConfig};
use gateway_server::state::{default_health_config, AppState, AuthGate};
use gateway_server::health::HealthChecker;
use gateway_server::shutdown::{ShutdownConfig, ShutdownCoordinator};
use gateway_server::{Server, ServerConfig};
use gateway_telemetry::{BudgetLimits, CostController, Metrics, MetricsConfig, TracingConfig};
use tracing::{info, warn};

#[cfg(feature = "azure")]
use gateway_providers::{AzureOpenAiConfig, AzureOpenAiProvider};

#[cfg(feature = "bedrock")]
use gateway_providers::{BedrockConfig, BedrockProvider};

#[tokio::main]
async fn main() -> Result<()> {
    let config = gateway_config::load_config()
        .await
        .context("failed to load gateway configuration")?;

    let tracing_config = TracingConfig::new(config.tracing.service_name.clone())
        .with_log_level(config.tracing.log_level.clone());
    let tracing_config = match &config.tracing.otlp_endpoint {
        Some(endpoint) => tracing_config.with_otlp_endpoint(endpoint.clone()),
        None => tracing_config,
    };
    let tracer_provider =
        gateway_telemetry::init_tracing(&tracing_config).context("failed to initialize tracing")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        "starting llm-inference-gateway"
    );

    let outcome = run(config).await;
    gateway_telemetry::shutdown_tracing(tracer_provider);

    if let Err(error) = &outcome {
        tracing::error!(error = %error, "gateway exited with an error");
    }
    outcome
}

async fn run(config: GatewayConfig) -> Result<()> {
    let config = Arc::new(config);

    let mut registry = ProviderRegistry::new();
    for provider_settings in config.enabled_providers() {
        match build_provider(provider_settings) {
            Ok(provider) => registry.register(provider),
            Err(error) => warn!(
                provider = %provider_settings.id,
                error = %error,
                "skipping provider, could not be constructed"
            ),
        }
    }
    if registry.is_empty() {
        warn!("no providers were registered; the gateway will reject every completion/embedding request");
    }
    let registry = Arc::new(registry);

    probe_adapter_catalogs(&registry).await;

    let selector = Arc::new(ProviderSelector::new(&config.providers));

    let cache = Arc::new(ResponseCache::new(CacheConfig {
        enabled: config.cache.enabled,
        max_entries: config.cache.max_entries,
        default_ttl: config.cache.default_ttl,
        cache_streaming: config.cache.cache_streaming,
        sweep_interval: config.cache.sweep_interval,
    }));
    spawn_cache_sweeper(Arc::clone(&cache), config.cache.sweep_interval);

    let cost_controller = Arc::new(build_cost_controller(&config));

    let health_prober = Arc::new(HealthProber::new(Arc::clone(&registry), config.health_check.clone()));
    spawn_health_prober(Arc::clone(&health_prober));

    let health_checker = Arc::new(HealthChecker::new(default_health_config()));
    health_checker.mark_initialized("config").await;
    health_checker.mark_initialized("providers").await;

    let router_config = RouterConfig {
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: config.circuit_breaker.failure_threshold,
            success_threshold: config.circuit_breaker.success_threshold,
            timeout: config.circuit_breaker.timeout,
            min_requests: config.circuit_breaker.min_requests,
        },
        retry: RetryConfig {
            max_retries: config.retry.max_retries,
            base_delay: config.retry.base_delay,
            max_delay: config.retry.max_delay,
            multiplier: config.retry.multiplier,
            jitter: config.retry.jitter,
            retry_on_status: config.retry.retry_on_status.clone(),
        },
        default_cache_ttl: config.cache.default_ttl,
    };
    let router = Arc::new(Router::new(
        Arc::clone(&registry),
        selector,
        Arc::clone(&cache),
        Arc::clone(&cost_controller),
        Arc::clone(&health_prober),
        router_config,
    ));
    health_checker.mark_initialized("router").await;

    let auth_gate = AuthGate::from_config(&config).await.context("failed to build auth gate")?;

    let metrics = Arc::new(Metrics::new(MetricsConfig::default()).context("failed to register metrics")?);
    health_checker.mark_initialized("metrics").await;

    let shutdown = Arc::new(ShutdownCoordinator::new(
        ShutdownConfig::new().with_graceful_timeout(config.server.shutdown_grace_period),
    ));

    let state = AppState::new(
        Arc::clone(&config),
        router,
        cost_controller,
        cache,
        health_checker,
        health_prober,
        auth_gate,
        metrics,
        shutdown,
    );

    let server_config = ServerConfig::new(config.server.host.clone(), config.server.port)
        .with_shutdown_grace_period(config.server.shutdown_grace_period);

    Server::new(server_config, state)
        .run()
        .await
        .context("server exited with an error")
}

/// Query `list_models` on every registered adapter at startup (§4.5: "query
/// `list_models` on every enabled adapter"). The routing catalog itself is
/// built from configuration (see `ProviderSelector`, which needs priority
/// and load-balancing weight metadata `list_models` doesn't carry) — this
/// pass exists to surface a misconfigured deployment early: a provider whose
/// live catalog doesn't include a model this gateway is configured to route
/// to it will fail every request for that model at request time instead of
/// at startup, so we log that mismatch now rather than silently.
async fn probe_adapter_catalogs(registry: &ProviderRegistry) {
    for provider in registry.providers() {
        match provider.list_models().await {
            Ok(models) => info!(
                provider = provider.id(),
                model_count = models.data.len(),
                "queried provider model catalog"
            ),
            Err(error) => warn!(
                provider = provider.id(),
                error = %error,
                "failed to query provider model catalog at startup"
            ),
        }
    }
}

/// Build one provider adapter from its configuration entry, dispatching on
/// [`ProviderType`]. The azure/bedrock feature gates mirror `gateway-providers`'s.
fn build_provider(settings: &ProviderSettings) -> Result<Arc<dyn gateway_core::LLMProvider>> {
    match settings.provider_type {
        ProviderType::AzureOpenAI => build_azure_provider(settings),
        ProviderType::Bedrock => build_bedrock_provider(settings),
    }
}

#[cfg(feature = "azure")]
fn build_azure_provider(settings: &ProviderSettings) -> Result<Arc<dyn gateway_core::LLMProvider>> {
    let resource_name = settings
        .resource_name
        .as_ref()
        .context("azure_openai provider is missing resource_name")?;
    let api_key = std::env::var(&settings.api_key_env)
        .with_context(|| format!("env var {} not set for provider {}", settings.api_key_env, settings.id))?;

    let mut provider_config = AzureOpenAiConfig::new(&settings.id, resource_name, api_key).with_timeout(settings.timeout);
    if let Some(api_version) = &settings.api_version {
        provider_config = provider_config.with_api_version(api_version.clone());
    }
    for model in &settings.models {
        provider_config = provider_config.with_deployment(model.upstream_ref.clone(), model.info.clone());
    }

    Ok(Arc::new(AzureOpenAiProvider::new(provider_config)?))
}

#[cfg(not(feature = "azure"))]
fn build_azure_provider(_settings: &ProviderSettings) -> Result<Arc<dyn gateway_core::LLMProvider>> {
    anyhow::bail!("azure_openai provider configured but the azure feature is not compiled in")
}

#[cfg(feature = "bedrock")]
fn build_bedrock_provider(settings: &ProviderSettings) -> Result<Arc<dyn gateway_core::LLMProvider>> {
    let region = settings.region.as_ref().context("bedrock provider is missing region")?;
    let access_key_id = std::env::var(&settings.api_key_env)
        .with_context(|| format!("env var {} not set for provider {}", settings.api_key_env, settings.id))?;
    let secret_env = settings
        .secret_access_key_env
        .as_ref()
        .context("bedrock provider is missing secret_access_key_env")?;
    let secret_access_key = std::env::var(secret_env)
        .with_context(|| format!("env var {secret_env} not set for provider {}", settings.id))?;

    let mut provider_config = BedrockConfig::new(&settings.id, region, access_key_id, secret_access_key);
    if let Some(session_token_env) = &settings.session_token_env {
        if let Ok(token) = std::env::var(session_token_env) {
            provider_config = provider_config.with_session_token(token);
        }
    }
    provider_config = provider_config.with_models(settings.models.iter().map(|m| m.info.clone()).collect());

    Ok(Arc::new(BedrockProvider::new(provider_config)?))
}

#[cfg(not(feature = "bedrock"))]
fn build_bedrock_provider(_settings: &ProviderSettings) -> Result<Arc<dyn gateway_core::LLMProvider>> {
    anyhow::bail!("bedrock provider configured but the bedrock feature is not compiled in")
}

/// Translate `BudgetSettings` into a [`CostController`], including per-tenant overrides.
fn build_cost_controller(config: &GatewayConfig) -> CostController {
    let global_limits = BudgetLimits {
        daily_limit_usd: config.budget.global_daily_limit_usd,
        alert_thresholds: config.budget.global_alert_thresholds.clone(),
    };
    let default_user_limits = BudgetLimits {
        daily_limit_usd: config.budget.default_user_daily_limit_usd,
        alert_thresholds: Vec::new(),
    };

    let controller = CostController::new(global_limits, default_user_limits);
    for tenant in &config.budget.tenants {
        controller.set_tenant_limits(
            tenant.tenant_id.clone(),
            BudgetLimits {
                daily_limit_usd: Some(tenant.daily_limit_usd),
                alert_thresholds: tenant.alert_thresholds.clone(),
            },
        );
    }
    controller
}

fn spawn_health_prober(prober: Arc<HealthProber>) {
    tokio::spawn(async move {
        prober.run().await;
    });
}

fn spawn_cache_sweeper(cache: Arc<ResponseCache>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            cache.sweep_expired().await;
        }
    });
}
