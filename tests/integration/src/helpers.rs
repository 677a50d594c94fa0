//! Test harness that serves the real gateway HTTP surface over a loopback
//! socket, wired to an `AppState` built from in-process [`ScriptedProvider`]s
//! instead of live Azure/Bedrock credentials.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use gateway_config::schema::{GatewayConfig, HealthCheckSettings, ModelCatalogEntry, ProviderSettings};
use gateway_core::{LLMProvider, ProviderType};
use gateway_providers::ProviderRegistry;
use gateway_resilience::{CacheConfig, ResponseCache};
use gateway_routing::{HealthProber, ProviderSelector, Router, RouterConfig};
use gateway_server::routes::create_router;
use gateway_server::state::AppState;
use gateway_server::{health::HealthChecker, shutdown::ShutdownCoordinator, state::AuthGate};
use gateway_telemetry::{BudgetLimits, CostController, Metrics};
use once_cell::sync::Lazy;
use reqwest::{Client, Response};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use crate::mock_providers::test_model_info;

static TRACING: Lazy<()> = Lazy::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
});

/// Initialize tracing for tests (idempotent, opt-in via `TEST_LOG`).
pub fn init_tracing() {
    Lazy::force(&TRACING);
}

/// One provider instance to register with a [`TestServer`].
pub struct ProviderEntry {
    /// The live adapter instance.
    pub provider: Arc<dyn LLMProvider>,
    /// Provider instance id, matching `provider.id()`.
    pub id: String,
    /// Provider family, for `ModelInfo.provider`.
    pub provider_type: ProviderType,
    /// Model ids this provider serves, in priority order (first = highest
    /// priority / lowest weight tie-break).
    pub models: Vec<&'static str>,
}

/// Builds an [`AppState`] (and, via [`Self::start`], a bound HTTP server)
/// from a declared set of providers plus cache/cost/circuit-breaker overrides.
pub struct TestServerBuilder {
    providers: Vec<ProviderEntry>,
    cache_config: CacheConfig,
    router_config: RouterConfig,
    global_budget: BudgetLimits,
    user_budget: BudgetLimits,
    tenant_budgets: Vec<(String, BudgetLimits)>,
    auth_required: bool,
    dev_mode: bool,
}

impl Default for TestServerBuilder {
    fn default() -> Self {
        Self {
            providers: vec![ProviderEntry {
                provider: crate::mock_providers::arc(crate::mock_providers::ScriptedProvider::always_succeeds(
                    "test-provider",
                )),
                id: "test-provider".to_string(),
                provider_type: ProviderType::AzureOpenAI,
                models: vec!["test-model"],
            }],
            cache_config: CacheConfig::default(),
            router_config: RouterConfig::default(),
            global_budget: BudgetLimits::unlimited(),
            user_budget: BudgetLimits::unlimited(),
            tenant_budgets: Vec::new(),
            auth_required: true,
            dev_mode: true,
        }
    }
}

impl TestServerBuilder {
    /// Start from an empty provider set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            ..Self::default()
        }
    }

    /// Register a provider instance and the models it serves.
    #[must_use]
    pub fn with_provider(mut self, entry: ProviderEntry) -> Self {
        self.providers.push(entry);
        self
    }

    /// Override the cache configuration (e.g. disable caching, shorten TTL).
    #[must_use]
    pub fn with_cache_config(mut self, cache_config: CacheConfig) -> Self {
        self.cache_config = cache_config;
        self
    }

    /// Override router-level knobs (circuit breaker thresholds, retry policy).
    #[must_use]
    pub fn with_router_config(mut self, router_config: RouterConfig) -> Self {
        self.router_config = router_config;
        self
    }

    /// Set a per-tenant daily budget, overriding the unlimited default.
    #[must_use]
    pub fn with_tenant_budget(mut self, tenant_id: impl Into<String>, limits: BudgetLimits) -> Self {
        self.tenant_budgets.push((tenant_id.into(), limits));
        self
    }

    /// Set the global daily budget.
    #[must_use]
    pub fn with_global_budget(mut self, limits: BudgetLimits) -> Self {
        self.global_budget = limits;
        self
    }

    fn provider_settings(&self) -> Vec<ProviderSettings> {
        self.providers
            .iter()
            .map(|entry| ProviderSettings {
                id: entry.id.clone(),
                provider_type: entry.provider_type,
                enabled: true,
                api_key_env: "TEST_API_KEY".to_string(),
                resource_name: Some("test-resource".to_string()),
                api_version: None,
                region: None,
                secret_access_key_env: None,
                session_token_env: None,
                timeout: Duration::from_secs(30),
                models: entry
                    .models
                    .iter()
                    .enumerate()
                    .map(|(i, model_id)| ModelCatalogEntry {
                        upstream_ref: format!("{model_id}-dep"),
                        priority: 100 - i as u32,
                        weight: 100,
                        info: test_model_info(model_id, entry.provider_type),
                    })
                    .collect(),
            })
            .collect()
    }

    /// Assemble the `AppState` without binding a socket, for handler-level
    /// (oneshot) tests that don't need a live TCP listener.
    #[must_use]
    pub fn build_state(self) -> AppState {
        let mut registry = ProviderRegistry::new();
        for entry in &self.providers {
            registry.register(Arc::clone(&entry.provider));
        }
        let registry = Arc::new(registry);

        let provider_settings = self.provider_settings();
        let selector = Arc::new(ProviderSelector::new(&provider_settings));

        let cache = Arc::new(ResponseCache::new(self.cache_config));
        let cost_controller = Arc::new(CostController::new(self.global_budget, self.user_budget));
        for (tenant_id, limits) in self.tenant_budgets {
            cost_controller.set_tenant_limits(tenant_id, limits);
        }
        let cost_controller = cost_controller;

        let health_prober = Arc::new(HealthProber::new(Arc::clone(&registry), HealthCheckSettings::default()));

        let router = Arc::new(Router::new(
            registry,
            selector,
            Arc::clone(&cache),
            Arc::clone(&cost_controller),
            Arc::clone(&health_prober),
            self.router_config,
        ));

        let health_checker = Arc::new(HealthChecker::with_defaults());
        let metrics = Arc::new(Metrics::with_defaults());
        let shutdown = Arc::new(ShutdownCoordinator::with_defaults());
        let config = Arc::new(GatewayConfig::default());

        let auth_gate = AuthGate::Simple {
            required: self.auth_required,
            dev_mode: self.dev_mode,
            public_paths: vec![
                "/health".to_string(),
                "/health/ready".to_string(),
                "/health/live".to_string(),
                "/metrics".to_string(),
            ],
        };

        AppState::new(
            config,
            router,
            cost_controller,
            cache,
            health_checker,
            health_prober,
            auth_gate,
            metrics,
            shutdown,
        )
    }

    /// Build the state and bind it to a loopback socket, returning a live
    /// [`TestServer`].
    pub async fn start(self) -> TestServer {
        let state = self.build_state();
        TestServer::serve(state).await
    }
}

/// A live gateway HTTP server bound to an OS-assigned loopback port, with
/// direct handles to its components for assertions that don't go through
/// HTTP (e.g. checking committed spend or circuit breaker state).
pub struct TestServer {
    addr: SocketAddr,
    /// Shared HTTP client, exposed for tests that need headers `post_json`
    /// doesn't cover (custom tenant/user headers, malformed bodies, etc).
    pub client: Client,
    state: AppState,
    server_task: JoinHandle<()>,
}

impl TestServer {
    /// Serve the given `AppState` on an ephemeral loopback port.
    pub async fn serve(state: AppState) -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");
        let app = create_router(state.clone());
        let server_task = tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .await
                .expect("test server exited unexpectedly");
        });

        // Give the listener a moment to start accepting connections.
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            client: Client::builder().build().expect("build reqwest client"),
            state,
            server_task,
        }
    }

    /// Start a server with a single default provider/model and dev-mode auth.
    pub async fn with_default_config() -> Self {
        TestServerBuilder::default().start().await
    }

    /// The `AppState` backing this server, for direct component inspection.
    #[must_use]
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Base URL of the running server, e.g. `http://127.0.0.1:54321`.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    /// `GET` a path with the default dev bearer token attached.
    pub async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .header("authorization", "Bearer test-token")
            .send()
            .await
            .expect("GET request should succeed at the transport level")
    }

    /// `POST` a JSON body with the default dev bearer token attached.
    pub async fn post_json(&self, path: &str, body: &Value) -> Response {
        self.client
            .post(self.url(path))
            .header("authorization", "Bearer test-token")
            .json(body)
            .send()
            .await
            .expect("POST request should succeed at the transport level")
    }

    /// `POST` a JSON body with an explicit bearer token (or no header, if
    /// `None`), for authentication-specific tests.
    pub async fn post_json_as(&self, path: &str, token: Option<&str>, body: &Value) -> Response {
        let mut request = self.client.post(self.url(path)).json(body);
        if let Some(token) = token {
            request = request.header("authorization", format!("Bearer {token}"));
        }
        request.send().await.expect("POST request should succeed at the transport level")
    }

    /// `POST` a streaming (`stream: true`) chat completion request and
    /// collect the raw SSE `data:` payloads in order, stopping at `[DONE]`.
    pub async fn post_streaming(&self, path: &str, body: &Value) -> Vec<String> {
        let response = self.post_json(path, body).await;
        assert_eq!(response.status(), reqwest::StatusCode::OK, "streaming request should succeed");

        let mut events = Vec::new();
        let mut buffer = String::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.expect("stream chunk read");
            buffer.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(pos) = buffer.find("\n\n") {
                let event = buffer[..pos].to_string();
                buffer.drain(..=pos + 1);
                for line in event.lines() {
                    if let Some(data) = line.strip_prefix("data: ") {
                        events.push(data.to_string());
                    }
                }
            }
        }
        events
    }

    /// Shut the server down, dropping its accept loop.
    pub fn shutdown(self) {
        self.server_task.abort();
    }
}

/// Assert a response has the given status, including the body in the panic
/// message on mismatch.
pub async fn assert_status(response: Response, expected: reqwest::StatusCode) -> Response {
    let status = response.status();
    if status != expected {
        let body = response.text().await.unwrap_or_default();
        panic!("expected status {expected}, got {status}: {body}");
    }
    response
}

/// A minimal OpenAI-compatible chat completion request body for a tenant.
#[must_use]
pub fn chat_request_for(model: &str, content: &str) -> Value {
    serde_json::json!({
        "model": model,
        "messages": [{"role": "user", "content": content}],
    })
}

#[must_use]
pub fn all_model_capabilities() -> HashSet<gateway_core::provider::ProviderCapabilities> {
    HashSet::from([
        gateway_core::provider::ProviderCapabilities::Completion,
        gateway_core::provider::ProviderCapabilities::Embedding,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_providers::ScriptedProvider;

    #[tokio::test]
    async fn default_server_serves_health_without_auth() {
        let server = TestServer::with_default_config().await;
        let response = server.client.get(server.url("/health")).send().await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
    }

    #[tokio::test]
    async fn default_server_requires_auth_on_v1_routes() {
        let server = TestServer::with_default_config().await;
        let response = server
            .client
            .get(server.url("/v1/models"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn chat_completion_round_trips_through_the_real_router() {
        let server = TestServer::with_default_config().await;
        let response = server
            .post_json("/v1/chat/completions", &chat_request_for("test-model", "hello"))
            .await;
        let response = assert_status(response, reqwest::StatusCode::OK).await;
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["choices"][0]["message"]["role"], "assistant");
    }

    #[tokio::test]
    async fn custom_provider_entry_is_reachable() {
        let server = TestServerBuilder::new()
            .with_provider(ProviderEntry {
                provider: crate::mock_providers::arc(ScriptedProvider::always_succeeds("custom")),
                id: "custom".to_string(),
                provider_type: ProviderType::Bedrock,
                models: vec!["custom-model"],
            })
            .start()
            .await;
        let response = server
            .post_json("/v1/chat/completions", &chat_request_for("custom-model", "hi"))
            .await;
        assert_status(response, reqwest::StatusCode::OK).await;
    }
}
