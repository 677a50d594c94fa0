//! HTTP request handlers for the gateway API.

use std::collections::HashMap;
use std::convert::Infallible;
use std::time::{Duration, Instant};

use axum::{
    extract::{OriginalUri, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Extension, Json,
};
use futures::stream::StreamExt;
use gateway_core::{GatewayRequest, GatewayResponse, ModelObject, ModelsResponse, TenantId as CoreTenantId};
use gateway_telemetry::{AdmissionDecision, RequestMetrics, UsageBreakdown, UsageScope};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::AuthenticatedEntity,
    error::ApiError,
    extractors::{JsonBody, RequestId, TenantId},
    health::{LivenessResponse, ReadinessResponse},
    state::AppState,
};

/// Tenant attributed to requests that carry neither a header-derived nor a
/// request-body tenant id.
const DEFAULT_TENANT: &str = "default";

/// User attributed to requests with no authenticated entity and no
/// request-level user id.
const ANONYMOUS_USER: &str = "anonymous";

fn scope_label(scope: UsageScope) -> &'static str {
    match scope {
        UsageScope::Global => "global",
        UsageScope::Tenant => "tenant",
        UsageScope::User => "user",
    }
}

fn resolve_tenant(header_tenant: Option<String>, request: &GatewayRequest) -> CoreTenantId {
    let raw = header_tenant
        .or_else(|| request.metadata.as_ref().and_then(|m| m.tenant_id.clone()))
        .unwrap_or_else(|| DEFAULT_TENANT.to_string());
    CoreTenantId::new(raw).unwrap_or_else(|_| {
        CoreTenantId::new(DEFAULT_TENANT).expect("the default tenant id is a valid identifier")
    })
}

fn resolve_user(entity: &AuthenticatedEntity, request: &GatewayRequest) -> String {
    request
        .user
        .clone()
        .or_else(|| request.metadata.as_ref().and_then(|m| m.user_id.clone()))
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| entity.id.clone())
}

/// Deep health check: aggregates component status behind `/health`.
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    use crate::health::ComponentHealth;

    let provider_count = state.router.provider_count();
    let healthy_count = state.router.healthy_provider_count();
    let providers = if provider_count == 0 {
        ComponentHealth::unhealthy("providers", "no providers registered")
    } else if healthy_count == 0 {
        ComponentHealth::unhealthy("providers", "no provider is currently healthy")
    } else {
        ComponentHealth::healthy("providers")
    };
    let cache = ComponentHealth::healthy("cache");

    let response = state.health_checker.check_deep(vec![providers, cache]).await;
    let status = StatusCode::from_u16(response.http_status_code()).unwrap_or(StatusCode::OK);
    (status, Json(response))
}

/// Readiness check: whether the gateway has enough healthy providers to
/// accept traffic, consulted by orchestrators before routing load in.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let provider_count = state.router.provider_count();
    let healthy_count = state.router.healthy_provider_count();
    let response = state
        .health_checker
        .check_readiness(provider_count, healthy_count)
        .await;
    let status = if response.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

/// Liveness check: whether the process itself should be restarted.
pub async fn liveness_check(State(state): State<AppState>) -> Json<LivenessResponse> {
    Json(state.health_checker.check_liveness())
}

/// Prometheus text exposition for the process.
pub async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response(),
        Err(error) => {
            error!(%error, "failed to render metrics");
            ApiError::internal("failed to render metrics").into_response()
        }
    }
}

/// `GET /v1/models` — every model known across every registered provider.
#[instrument(skip(state))]
pub async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let data = state
        .router
        .all_models()
        .into_iter()
        .map(|model| ModelObject {
            id: model.id,
            object: "model".to_string(),
            created: 0,
            owned_by: model.provider.to_string(),
        })
        .collect();

    Json(ModelsResponse {
        object: "list".to_string(),
        data,
    })
}

/// `POST /v1/completions` and `POST /v1/chat/completions`.
///
/// Both OpenAI-compatible routes share this handler: the request shape is
/// identical, and `stream: true` switches to an SSE response.
#[instrument(skip(state, body), fields(model = %body.0.model))]
pub async fn create_completion(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Extension(entity): Extension<AuthenticatedEntity>,
    RequestId(request_id): RequestId,
    TenantId(header_tenant): TenantId,
    JsonBody(request): JsonBody<GatewayRequest>,
) -> Result<Response, ApiError> {
    request
        .validate()
        .map_err(|error| ApiError::from_gateway_error(&error, Some(request_id.clone())))?;

    let route = uri.path().to_string();
    let tenant = resolve_tenant(header_tenant, &request);
    let user_id = resolve_user(&entity, &request);

    if let Some(response) = check_budget(&state, &route, tenant.as_str(), &user_id) {
        return Ok(response);
    }

    if request.stream {
        return stream_completion(state, request, tenant, user_id, request_id, route).await;
    }

    state.metrics.request_started();
    let start = Instant::now();
    let outcome = state.router.route_completion(&request, &tenant, &user_id).await;
    state.metrics.request_finished();
    let duration = start.elapsed();

    handle_route_outcome(&state, &request_id, &route, duration, outcome)
}

/// `POST /v1/embeddings`.
#[instrument(skip(state, body), fields(model = %body.0.model))]
pub async fn create_embeddings(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Extension(entity): Extension<AuthenticatedEntity>,
    RequestId(request_id): RequestId,
    TenantId(header_tenant): TenantId,
    JsonBody(request): JsonBody<GatewayRequest>,
) -> Result<Response, ApiError> {
    request
        .validate()
        .map_err(|error| ApiError::from_gateway_error(&error, Some(request_id.clone())))?;

    let route = uri.path().to_string();
    let tenant = resolve_tenant(header_tenant, &request);
    let user_id = resolve_user(&entity, &request);

    if let Some(response) = check_budget(&state, &route, tenant.as_str(), &user_id) {
        return Ok(response);
    }

    state.metrics.request_started();
    let start = Instant::now();
    let outcome = state.router.route_embedding(&request, &tenant, &user_id).await;
    state.metrics.request_finished();
    let duration = start.elapsed();

    handle_route_outcome(&state, &request_id, &route, duration, outcome)
}

/// `?scope=` on `GET /v1/usage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageScopeParam {
    /// The calling tenant's committed spend only.
    Tenant,
    /// Spend across every tenant.
    Global,
    /// Both tenant and global figures together.
    Summary,
}

impl Default for UsageScopeParam {
    fn default() -> Self {
        Self::Summary
    }
}

/// `?period=` on `GET /v1/usage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsagePeriodParam {
    /// The rolling UTC-day window.
    Daily,
    /// The rolling UTC-month window.
    Monthly,
}

impl Default for UsagePeriodParam {
    fn default() -> Self {
        Self::Daily
    }
}

/// Query parameters accepted by `GET /v1/usage`.
#[derive(Debug, Default, serde::Deserialize)]
pub struct UsageQuery {
    /// `tenant`, `global`, or `summary` (default `summary`).
    #[serde(default)]
    pub scope: UsageScopeParam,
    /// `daily` or `monthly` (default `daily`).
    #[serde(default)]
    pub period: UsagePeriodParam,
}

/// Usage/spend summary for the calling tenant and/or the global total,
/// depending on the requested `scope`.
#[derive(Debug, Serialize)]
pub struct UsageResponse {
    /// Tenant this summary was computed for, when `scope` includes tenant figures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Committed spend for this tenant over `period`, in USD.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_spend_usd: Option<f64>,
    /// Requests recorded for this tenant over `period`, including cache hits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_requests: Option<u64>,
    /// Tokens recorded for this tenant over `period`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_tokens: Option<u64>,
    /// Per-model usage breakdown for this tenant, `period=daily` only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_by_model: Option<HashMap<String, UsageBreakdown>>,
    /// Per-provider usage breakdown for this tenant, `period=daily` only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_by_provider: Option<HashMap<String, UsageBreakdown>>,
    /// Committed spend across every tenant over `period`, in USD.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_spend_usd: Option<f64>,
    /// Requests recorded globally over `period`, including cache hits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_requests: Option<u64>,
    /// Tokens recorded globally over `period`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_tokens: Option<u64>,
    /// Global per-model usage breakdown, `period=daily` only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_by_model: Option<HashMap<String, UsageBreakdown>>,
    /// Global per-provider usage breakdown, `period=daily` only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_by_provider: Option<HashMap<String, UsageBreakdown>>,
    /// Accounting period this summary covers (`daily` or `monthly`).
    pub period: &'static str,
}

/// `GET /v1/usage` — committed spend for the calling tenant and/or globally,
/// over the requested accounting period (§6 `?scope=`, `&period=`).
pub async fn usage(
    State(state): State<AppState>,
    TenantId(header_tenant): TenantId,
    axum::extract::Query(query): axum::extract::Query<UsageQuery>,
) -> Json<UsageResponse> {
    let tenant_id = header_tenant.unwrap_or_else(|| DEFAULT_TENANT.to_string());
    let period = match query.period {
        UsagePeriodParam::Daily => "daily",
        UsagePeriodParam::Monthly => "monthly",
    };

    let tenant_spend = |t: &str| match query.period {
        UsagePeriodParam::Daily => state.cost_controller.tenant_spend_today(t),
        UsagePeriodParam::Monthly => state.cost_controller.tenant_spend_month(t),
    };
    let tenant_requests = |t: &str| match query.period {
        UsagePeriodParam::Daily => state.cost_controller.tenant_requests_today(t),
        UsagePeriodParam::Monthly => state.cost_controller.tenant_requests_month(t),
    };
    let tenant_tokens = |t: &str| match query.period {
        UsagePeriodParam::Daily => state.cost_controller.tenant_tokens_today(t),
        UsagePeriodParam::Monthly => state.cost_controller.tenant_tokens_month(t),
    };
    let tenant_breakdowns = |t: &str| match query.period {
        UsagePeriodParam::Daily => Some((
            state.cost_controller.tenant_model_breakdown_today(t),
            state.cost_controller.tenant_provider_breakdown_today(t),
        )),
        UsagePeriodParam::Monthly => None,
    };

    let global_spend = || match query.period {
        UsagePeriodParam::Daily => state.cost_controller.global_spend_today(),
        UsagePeriodParam::Monthly => state.cost_controller.global_spend_month(),
    };
    let global_requests = || match query.period {
        UsagePeriodParam::Daily => state.cost_controller.global_requests_today(),
        UsagePeriodParam::Monthly => state.cost_controller.global_requests_month(),
    };
    let global_tokens = || match query.period {
        UsagePeriodParam::Daily => state.cost_controller.global_tokens_today(),
        UsagePeriodParam::Monthly => state.cost_controller.global_tokens_month(),
    };
    let global_breakdowns = || match query.period {
        UsagePeriodParam::Daily => Some((
            state.cost_controller.global_model_breakdown_today(),
            state.cost_controller.global_provider_breakdown_today(),
        )),
        UsagePeriodParam::Monthly => None,
    };

    let mut response = UsageResponse {
        tenant_id: None,
        tenant_spend_usd: None,
        tenant_requests: None,
        tenant_tokens: None,
        tenant_by_model: None,
        tenant_by_provider: None,
        global_spend_usd: None,
        global_requests: None,
        global_tokens: None,
        global_by_model: None,
        global_by_provider: None,
        period,
    };

    if matches!(query.scope, UsageScopeParam::Tenant | UsageScopeParam::Summary) {
        response.tenant_id = Some(tenant_id.clone());
        response.tenant_spend_usd = Some(tenant_spend(&tenant_id));
        response.tenant_requests = Some(tenant_requests(&tenant_id));
        response.tenant_tokens = Some(tenant_tokens(&tenant_id));
        if let Some((by_model, by_provider)) = tenant_breakdowns(&tenant_id) {
            response.tenant_by_model = Some(by_model);
            response.tenant_by_provider = Some(by_provider);
        }
    }

    if matches!(query.scope, UsageScopeParam::Global | UsageScopeParam::Summary) {
        response.global_spend_usd = Some(global_spend());
        response.global_requests = Some(global_requests());
        response.global_tokens = Some(global_tokens());
        if let Some((by_model, by_provider)) = global_breakdowns() {
            response.global_by_model = Some(by_model);
            response.global_by_provider = Some(by_provider);
        }
    }

    Json(response)
}

/// Pre-dispatch budget admission. Estimated cost is `0.0`: no tokenizer is
/// available at the HTTP boundary to price a request before the provider
/// responds, so admission here only enforces that the tenant/user/global
/// daily totals aren't already exhausted; the real cost is settled by
/// [`gateway_routing::Router`] once the provider call completes.
fn check_budget(state: &AppState, route: &str, tenant: &str, user_id: &str) -> Option<Response> {
    match state.cost_controller.check(tenant, user_id, 0.0) {
        AdmissionDecision::Allowed => None,
        AdmissionDecision::Denied { scope, remaining } => {
            let scope = scope_label(scope);
            state.metrics.record_budget_denied(scope);
            state.metrics.record_request(&RequestMetrics {
                route: route.to_string(),
                provider: None,
                status: StatusCode::FORBIDDEN.as_u16(),
                cache_hit: false,
                duration: Duration::ZERO,
            });
            warn!(tenant, scope, remaining, "request denied by budget controller");
            Some(
                ApiError::forbidden(format!("{scope} daily budget exhausted, {remaining:.4} USD remaining"))
                    .into_response(),
            )
        }
    }
}

fn handle_route_outcome(
    state: &AppState,
    request_id: &str,
    route: &str,
    duration: Duration,
    outcome: gateway_core::GatewayResult<(GatewayResponse, gateway_routing::RouteDecision)>,
) -> Result<Response, ApiError> {
    match outcome {
        Ok((response, decision)) => {
            state.metrics.record_request(&RequestMetrics {
                route: route.to_string(),
                provider: Some(decision.provider_id.clone()),
                status: StatusCode::OK.as_u16(),
                cache_hit: decision.cache_hit,
                duration,
            });
            info!(
                request_id,
                provider = %decision.provider_id,
                attempts = decision.attempts,
                cache_hit = decision.cache_hit,
                duration_ms = duration.as_millis(),
                "request served"
            );
            Ok(Json(response).into_response())
        }
        Err(error) => {
            let api_error = ApiError::from_gateway_error(&error, Some(request_id.to_string()));
            state.metrics.record_request(&RequestMetrics {
                route: route.to_string(),
                provider: None,
                status: api_error.status.as_u16(),
                cache_hit: false,
                duration,
            });
            error!(request_id, error = %error, "request failed");
            Err(api_error)
        }
    }
}

async fn stream_completion(
    state: AppState,
    request: GatewayRequest,
    tenant: CoreTenantId,
    user_id: String,
    request_id: String,
    route: String,
) -> Result<Response, ApiError> {
    let stream = state
        .router
        .route_completion_stream(&request, &tenant, &user_id)
        .await
        .map_err(|error| {
            state.metrics.record_request(&RequestMetrics {
                route: route.clone(),
                provider: None,
                status: ApiError::from_gateway_error(&error, None).status.as_u16(),
                cache_hit: false,
                duration: Duration::ZERO,
            });
            ApiError::from_gateway_error(&error, Some(request_id.clone()))
        })?;

    info!(request_id, model = %request.model, "streaming completion established");

    let body_stream = stream.map(|chunk_result| match chunk_result {
        Ok(chunk) => {
            let data = serde_json::to_string(&chunk).unwrap_or_default();
            Ok::<Event, Infallible>(Event::default().data(data))
        }
        Err(error) => {
            let payload = serde_json::json!({
                "error": {
                    "message": error.to_string(),
                    "type": "stream_error",
                }
            });
            Ok::<Event, Infallible>(Event::default().data(payload.to_string()))
        }
    });

    let done = futures::stream::iter(vec![Ok::<Event, Infallible>(Event::default().data("[DONE]"))]);

    Ok(Sse::new(body_stream.chain(done))
        .keep_alive(KeepAlive::default())
        .into_response())
}
