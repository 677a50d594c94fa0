//! Route definitions for the gateway API.

use axum::{
    routing::{get, post},
    Router,
};

use crate::{handlers, middleware, state::AppState};

/// Build the full gateway router, with middleware applied outside-in:
/// request id, timing, logging, security headers, CORS, the auth gate, then
/// (for the `/v1` surface only) in-flight request tracking. Health and
/// metrics endpoints are deliberately left outside the tracking/drain gate so
/// liveness and readiness probes stay reachable while the server drains.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/health/ready", get(handlers::readiness_check))
        .route("/health/live", get(handlers::liveness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .nest("/v1", v1_routes(state.clone()))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_gate_middleware,
        ))
        .layer(middleware::cors_layer())
        .layer(axum::middleware::from_fn(middleware::security_headers_middleware))
        .layer(axum::middleware::from_fn(middleware::logging_middleware))
        .layer(axum::middleware::from_fn(middleware::response_time_middleware))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .with_state(state)
}

/// OpenAI-compatible v1 routes. Wrapped in its own in-flight tracking layer,
/// innermost relative to the auth gate, so tracked requests carry the
/// authenticated entity's tenant id and a shutdown in progress rejects them
/// with 503 instead of letting them through to a handler.
fn v1_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/models", get(handlers::list_models))
        .route("/completions", post(handlers::create_completion))
        .route("/chat/completions", post(handlers::create_completion))
        .route("/embeddings", post(handlers::create_embeddings))
        .route("/usage", get(handlers::usage))
        .layer(axum::middleware::from_fn_with_state(
            state,
            middleware::request_tracking_middleware,
        ))
}
