//! Request-scoped middleware: correlation ids, timing, structured logging,
//! security headers, CORS, and the authentication gate dispatch.

use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use gateway_telemetry::request_tracker::{RequestInfo, RequestOutcome};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::auth::{auth_middleware, AuthenticatedEntity, AuthError};
use crate::shutdown::RequestGuard;
use crate::state::{AppState, AuthGate};

const REQUEST_ID_HEADER: &str = "x-request-id";
const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Ensure every request carries a correlation id, generating one from
/// `X-Correlation-ID`/`X-Request-ID` if absent, and echo it back on the response.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let existing = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .or_else(|| request.headers().get(REQUEST_ID_HEADER))
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let request_id = existing.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        request.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
        let mut response = next.run(request).await;
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
        response
    } else {
        next.run(request).await
    }
}

/// Record request latency in the response's `x-response-time-ms` header.
pub async fn response_time_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let mut response = next.run(request).await;
    let elapsed = start.elapsed();
    if let Ok(value) = HeaderValue::from_str(&elapsed.as_millis().to_string()) {
        response.headers_mut().insert("x-response-time-ms", value);
    }
    response
}

/// Emit one structured log line per request at completion.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let start = Instant::now();
    let response = next.run(request).await;
    let status = response.status();
    let elapsed = start.elapsed();

    if status.is_server_error() {
        warn!(%method, %path, %request_id, status = status.as_u16(), elapsed_ms = elapsed.as_millis() as u64, "request completed");
    } else {
        info!(%method, %path, %request_id, status = status.as_u16(), elapsed_ms = elapsed.as_millis() as u64, "request completed");
    }

    response
}

/// Attach the baseline security headers recommended for a JSON API.
pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "referrer-policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    response
}

/// Permissive CORS suitable for a server-to-server JSON API. Operators that
/// need an origin allowlist construct their own `CorsLayer` in `main`.
#[must_use]
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Dispatches authentication to the posture selected at startup
/// ([`AuthGate::Enterprise`] or [`AuthGate::Simple`]), inserting an
/// `AuthenticatedEntity` into the request extensions on success.
pub async fn auth_gate_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    if state.auth_gate.is_public_path(&path) {
        return next.run(request).await;
    }

    match state.auth_gate.as_ref() {
        AuthGate::Enterprise(auth_state) => auth_middleware(State(auth_state.clone()), request, next).await,
        AuthGate::Simple {
            required,
            dev_mode,
            ..
        } => {
            let credential = extract_credential(&request);
            match AuthGate::authenticate_simple(*required, *dev_mode, credential.as_deref()) {
                Ok(entity) => {
                    let mut request = request;
                    request.extensions_mut().insert(entity);
                    next.run(request).await
                }
                Err(err) => auth_error_response(&err),
            }
        }
    }
}

fn extract_credential(request: &Request) -> Option<String> {
    if let Some(auth_header) = request.headers().get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }
    request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Track this request's lifecycle against both the graceful-shutdown drain
/// counter and the diagnostic [`RequestTracker`](gateway_telemetry::RequestTracker).
/// Layered innermost, after the auth gate, so a tracked request's `tenant_id`
/// reflects the authenticated entity rather than only a header guess.
pub async fn request_tracking_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(_guard) = RequestGuard::new(state.shutdown.clone()) else {
        let body = serde_json::json!({
            "error": {
                "type": "server_shutting_down",
                "message": "the server is shutting down and is no longer accepting new requests",
            }
        });
        return (StatusCode::SERVICE_UNAVAILABLE, axum::Json(body)).into_response();
    };

    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    let tenant_id = request
        .extensions()
        .get::<AuthenticatedEntity>()
        .and_then(|entity| entity.tenant_id.clone());

    state.request_tracker.start(RequestInfo {
        request_id: request_id.clone(),
        tenant_id,
        method: request.method().to_string(),
        path: request.uri().path().to_string(),
        started_at: Instant::now(),
    });

    let response = next.run(request).await;

    let outcome = if response.status().is_server_error() {
        RequestOutcome::Error
    } else {
        RequestOutcome::Success
    };
    state.request_tracker.finish(&request_id, outcome);

    response
}

fn auth_error_response(err: &AuthError) -> Response {
    let status = err.status_code();
    let body = serde_json::json!({
        "error": {
            "type": err.error_code(),
            "message": err.to_string(),
        }
    });
    let mut response = (status, axum::Json(body)).into_response();
    if status == StatusCode::UNAUTHORIZED {
        response.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Bearer realm=\"api\""),
        );
    }
    response
}
