//! Request orchestration: cache lookup, candidate resolution, load
//! balancing, retry-with-reselection, and outcome recording.

use crate::health::HealthProber;
use crate::load_balancer::LoadBalancer;
use crate::rules::RuleSet;
use crate::selector::{ProviderCandidate, ProviderSelector, SelectionCriteria};
use dashmap::DashMap;
use futures::StreamExt;
use gateway_core::provider::{ChunkStream, ModelInfo};
use gateway_core::types::TenantId;
use gateway_core::{GatewayError, GatewayRequest, GatewayResponse, GatewayResult};
use gateway_providers::ProviderRegistry;
use gateway_resilience::{CircuitBreaker, CircuitBreakerConfig, ResponseCache, RetryConfig, RetryPolicy};
use gateway_telemetry::{CostController, UsageRecord};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Static knobs the Router applies uniformly across providers.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Circuit breaker parameters, applied per provider.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Retry policy for provider dispatch.
    pub retry: RetryConfig,
    /// Default cache TTL when a request doesn't override it.
    pub default_cache_ttl: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            circuit_breaker: CircuitBreakerConfig::default(),
            retry: RetryConfig::default(),
            default_cache_ttl: Duration::from_secs(300),
        }
    }
}

/// Which provider ultimately served a request, and what was tried before it.
#[derive(Debug, Clone)]
pub struct RouteDecision {
    /// Provider instance that served the request (or the cache, for a hit).
    pub provider_id: String,
    /// Number of dispatch attempts made, including the successful one.
    pub attempts: u32,
    /// Providers tried and abandoned before the one that served the request.
    pub retried_providers: Vec<String>,
    /// Whether the response was served from the cache.
    pub cache_hit: bool,
}

/// Orchestrates completion/embedding requests across providers.
pub struct Router {
    registry: Arc<ProviderRegistry>,
    selector: Arc<ProviderSelector>,
    cache: Arc<ResponseCache>,
    cost_controller: Arc<CostController>,
    health_prober: Arc<HealthProber>,
    load_balancer: LoadBalancer,
    circuit_breakers: DashMap<String, Arc<CircuitBreaker>>,
    retry_policy: RetryPolicy,
    rules: RuleSet,
    config: RouterConfig,
}

enum Call {
    Complete,
    Embed,
}

impl Router {
    /// Build a Router over the given collaborators.
    #[must_use]
    pub fn new(
        registry: Arc<ProviderRegistry>,
        selector: Arc<ProviderSelector>,
        cache: Arc<ResponseCache>,
        cost_controller: Arc<CostController>,
        health_prober: Arc<HealthProber>,
        config: RouterConfig,
    ) -> Self {
        Self {
            registry,
            selector,
            cache,
            cost_controller,
            health_prober,
            load_balancer: LoadBalancer::new(crate::load_balancer::LoadBalancerConfig::default()),
            circuit_breakers: DashMap::new(),
            retry_policy: RetryPolicy::new(config.retry.clone()),
            rules: RuleSet::default(),
            config,
        }
    }

    /// Attach tenant/model routing overrides.
    #[must_use]
    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    fn circuit_for(&self, provider_id: &str) -> Arc<CircuitBreaker> {
        self.circuit_breakers
            .entry(provider_id.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(provider_id, self.config.circuit_breaker.clone())))
            .clone()
    }

    /// Model metadata for a model id on a specific provider, if known.
    #[must_use]
    pub fn model_info(&self, model_id: &str, provider_id: &str) -> Option<ModelInfo> {
        self.selector
            .candidates(&SelectionCriteria::new(model_id))
            .ok()?
            .into_iter()
            .find(|c| c.provider_id == provider_id)
            .map(|c| c.model_info)
    }

    /// All models known across all providers, for `/v1/models`.
    #[must_use]
    pub fn all_models(&self) -> Vec<ModelInfo> {
        self.selector.all_models().into_iter().cloned().collect()
    }

    /// Total number of providers registered, for readiness reporting.
    #[must_use]
    pub fn provider_count(&self) -> usize {
        self.registry.len()
    }

    /// Number of providers the background prober currently considers usable.
    #[must_use]
    pub fn healthy_provider_count(&self) -> usize {
        self.health_prober.healthy_count()
    }

    /// Execute a non-streaming completion request.
    ///
    /// # Errors
    /// Returns [`GatewayError::ModelNotFound`] if no provider serves the
    /// model, [`GatewayError::ProviderUnavailable`] if every candidate is
    /// unhealthy/circuit-open, or the final provider error after retries are
    /// exhausted.
    pub async fn route_completion(
        &self,
        request: &GatewayRequest,
        tenant: &TenantId,
        user_id: &str,
    ) -> GatewayResult<(GatewayResponse, RouteDecision)> {
        self.route(request, tenant, user_id, Call::Complete).await
    }

    /// Execute an embedding request. Identical orchestration to
    /// [`Self::route_completion`], dispatched to `embed` instead of `complete`.
    ///
    /// # Errors
    /// See [`Self::route_completion`].
    pub async fn route_embedding(
        &self,
        request: &GatewayRequest,
        tenant: &TenantId,
        user_id: &str,
    ) -> GatewayResult<(GatewayResponse, RouteDecision)> {
        self.route(request, tenant, user_id, Call::Embed).await
    }

    async fn route(
        &self,
        request: &GatewayRequest,
        tenant: &TenantId,
        user_id: &str,
        call: Call,
    ) -> GatewayResult<(GatewayResponse, RouteDecision)> {
        let cacheable = self.cache.is_enabled()
            && matches!(call, Call::Complete)
            && self.cache.is_cacheable(request);
        let cache_key = cacheable.then(|| ResponseCache::fingerprint(tenant, request));

        if let Some(key) = &cache_key {
            if let Some(mut cached) = self.cache.get(tenant, key).await {
                cached.cache_hit = true;
                self.cost_controller
                    .record_cache_hit(tenant.as_str(), user_id, &request.model, &cached.provider);
                let decision = RouteDecision {
                    provider_id: cached.provider.clone(),
                    attempts: 0,
                    retried_providers: Vec::new(),
                    cache_hit: true,
                };
                return Ok((cached, decision));
            }
        }

        let mut tried: Vec<String> = Vec::new();
        let max_attempts = self.config.retry.config_max_attempts();

        for attempt in 0..max_attempts {
            let candidate = match self.pick_candidate(request, tenant, &tried) {
                Ok(candidate) => candidate,
                Err(error) => return Err(error),
            };

            let provider = self.registry.get(&candidate.provider_id)?;
            let circuit = self.circuit_for(&candidate.provider_id);
            if let Err(error) = circuit.check() {
                tried.push(candidate.provider_id.clone());
                if attempt + 1 == max_attempts {
                    return Err(error);
                }
                continue;
            }

            self.load_balancer.record_start(&candidate.provider_id);
            let outcome = match call {
                Call::Complete => provider.complete(request).await,
                Call::Embed => provider.embed(request).await,
            };
            self.load_balancer.record_finish(&candidate.provider_id);

            match outcome {
                Ok(response) => {
                    circuit.record_success();
                    self.record_usage(tenant, user_id, &response, &candidate.provider_id);
                    if let Some(key) = &cache_key {
                        let ttl = request
                            .metadata
                            .as_ref()
                            .and_then(|m| m.cache_ttl)
                            .unwrap_or(self.config.default_cache_ttl);
                        self.cache.set(tenant, key, response.clone(), Some(ttl)).await;
                    }
                    let decision = RouteDecision {
                        provider_id: candidate.provider_id,
                        attempts: attempt + 1,
                        retried_providers: tried,
                        cache_hit: false,
                    };
                    return Ok((response, decision));
                }
                Err(error) => {
                    circuit.record_failure();
                    tried.push(candidate.provider_id.clone());
                    let retryable = self.retry_policy.is_retryable(&error);
                    if !retryable || attempt + 1 == max_attempts {
                        warn!(
                            provider = %candidate.provider_id,
                            attempt = attempt + 1,
                            error = %error,
                            "request failed, not retrying"
                        );
                        return Err(error);
                    }
                    let delay = self.retry_policy.delay_for_attempt(attempt);
                    warn!(
                        provider = %candidate.provider_id,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "retrying request against a different provider"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(GatewayError::internal("retry loop exited without a result"))
    }

    /// Execute a streaming completion request. Retries apply only to
    /// establishing the stream; once chunks are flowing they are not
    /// buffered or retried.
    ///
    /// # Errors
    /// See [`Self::route_completion`].
    pub async fn route_completion_stream(
        &self,
        request: &GatewayRequest,
        tenant: &TenantId,
        user_id: &str,
    ) -> GatewayResult<ChunkStream> {
        let mut tried: Vec<String> = Vec::new();
        let max_attempts = self.config.retry.config_max_attempts();

        for attempt in 0..max_attempts {
            let candidate = self.pick_candidate(request, tenant, &tried)?;
            let provider = self.registry.get(&candidate.provider_id)?;
            let circuit = self.circuit_for(&candidate.provider_id);
            if let Err(error) = circuit.check() {
                tried.push(candidate.provider_id.clone());
                if attempt + 1 == max_attempts {
                    return Err(error);
                }
                continue;
            }

            self.load_balancer.record_start(&candidate.provider_id);
            match provider.complete_stream(request).await {
                Ok(stream) => {
                    info!(provider = %candidate.provider_id, "streaming completion established");
                    return Ok(self.wrap_stream(
                        stream,
                        candidate.provider_id,
                        tenant.clone(),
                        user_id.to_string(),
                        request.model.clone(),
                    ));
                }
                Err(error) => {
                    self.load_balancer.record_finish(&candidate.provider_id);
                    circuit.record_failure();
                    tried.push(candidate.provider_id.clone());
                    if !self.retry_policy.is_retryable(&error) || attempt + 1 == max_attempts {
                        return Err(error);
                    }
                    tokio::time::sleep(self.retry_policy.delay_for_attempt(attempt)).await;
                }
            }
        }

        Err(GatewayError::internal("retry loop exited without a result"))
    }

    fn wrap_stream(
        &self,
        mut upstream: ChunkStream,
        provider_id: String,
        tenant: TenantId,
        user_id: String,
        model: String,
    ) -> ChunkStream {
        let load_balancer_finished = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let circuit = self.circuit_for(&provider_id);
        let cost_controller = Arc::clone(&self.cost_controller);

        let finish_once = {
            let done = Arc::clone(&load_balancer_finished);
            let provider_id = provider_id.clone();
            move |lb: Option<&LoadBalancer>| {
                if !done.swap(true, std::sync::atomic::Ordering::SeqCst) {
                    if let Some(lb) = lb {
                        lb.record_finish(&provider_id);
                    }
                }
            }
        };

        // SAFETY/lifetime note: the stream only ever borrows data it owns or
        // has cloned; `self` is not captured.
        let stream = async_stream::stream! {
            let mut last_usage = None;
            let mut saw_error = false;
            loop {
                match upstream.next().await {
                    Some(Ok(chunk)) => {
                        if chunk.usage.is_some() {
                            last_usage = chunk.usage.clone();
                        }
                        let terminal = chunk.is_terminal();
                        yield Ok(chunk);
                        if terminal {
                            circuit.record_success();
                            finish_once(None);
                            if let Some(usage) = &last_usage {
                                cost_controller.record(
                                    usage.cost_usd,
                                    &UsageRecord {
                                        tenant_id: tenant.as_str().to_string(),
                                        user_id: user_id.clone(),
                                        model: model.clone(),
                                        provider: provider_id.clone(),
                                        cost_usd: usage.cost_usd,
                                        tokens: u64::from(usage.total_tokens),
                                    },
                                );
                            }
                            break;
                        }
                    }
                    Some(Err(error)) => {
                        saw_error = true;
                        circuit.record_failure();
                        finish_once(None);
                        yield Err(error);
                        break;
                    }
                    None => {
                        if !saw_error {
                            // Upstream closed without a terminal chunk: ambiguous
                            // outcome, record neither success nor failure.
                            finish_once(None);
                        }
                        break;
                    }
                }
            }
        };

        Box::pin(stream)
    }

    fn pick_candidate(
        &self,
        request: &GatewayRequest,
        tenant: &TenantId,
        tried: &[String],
    ) -> GatewayResult<ProviderCandidate> {
        let metadata = request.metadata.as_ref();
        let mut criteria = SelectionCriteria::new(request.model.clone());
        if let Some(preferred) = metadata.and_then(|m| m.preferred_provider.clone()) {
            if !tried.contains(&preferred) {
                criteria = criteria.preferred(preferred);
            }
        }

        let candidates = self.selector.candidates(&criteria)?;
        let eligible: Vec<ProviderCandidate> = candidates
            .into_iter()
            .filter(|c| self.health_prober.status(&c.provider_id).is_usable())
            .filter(|c| self.circuit_for(&c.provider_id).state() != gateway_resilience::CircuitState::Open)
            .collect();

        if eligible.is_empty() {
            return Err(GatewayError::provider_unavailable(format!(
                "no healthy provider serves model '{}'",
                request.model
            )));
        }

        // Tried providers are de-prioritized, not removed: a retry prefers a
        // provider it hasn't attempted yet this request, but falls back to
        // re-trying one it has (e.g. a transient failure) when it's the only
        // healthy candidate left.
        let untried: Vec<ProviderCandidate> = eligible
            .iter()
            .filter(|c| !tried.contains(&c.provider_id))
            .cloned()
            .collect();
        let pool = if untried.is_empty() { eligible } else { untried };

        let min_priority = pool.iter().map(|c| c.priority).min().unwrap_or(0);
        let mut top_tier: Vec<ProviderCandidate> =
            pool.into_iter().filter(|c| c.priority == min_priority).collect();

        let provider_ids: Vec<String> = top_tier.iter().map(|c| c.provider_id.clone()).collect();
        let ordered_ids = self.rules.apply(tenant.as_str(), &request.model, provider_ids);

        let weights: Vec<(&str, u32)> = ordered_ids
            .iter()
            .filter_map(|id| {
                top_tier
                    .iter()
                    .find(|c| &c.provider_id == id)
                    .map(|c| (id.as_str(), c.weight))
            })
            .collect();

        let chosen_id = self
            .load_balancer
            .select(&weights)
            .ok_or_else(|| GatewayError::provider_unavailable("no candidate survived routing rules"))?
            .to_string();

        let position = top_tier
            .iter()
            .position(|c| c.provider_id == chosen_id)
            .ok_or_else(|| GatewayError::internal("load balancer selected unknown candidate"))?;
        Ok(top_tier.swap_remove(position))
    }

    fn record_usage(&self, tenant: &TenantId, user_id: &str, response: &GatewayResponse, provider_id: &str) {
        self.cost_controller.record(
            response.usage.cost_usd,
            &UsageRecord {
                tenant_id: tenant.as_str().to_string(),
                user_id: user_id.to_string(),
                model: response.model.clone(),
                provider: provider_id.to_string(),
                cost_usd: response.usage.cost_usd,
                tokens: u64::from(response.usage.total_tokens),
            },
        );
    }
}

trait RetryConfigExt {
    fn config_max_attempts(&self) -> u32;
}

impl RetryConfigExt for RetryConfig {
    fn config_max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}
