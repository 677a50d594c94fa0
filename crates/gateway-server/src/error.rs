//! HTTP-facing error type: projects [`GatewayError`] (and a handful of
//! purely transport-level failures that never reach the core) onto the
//! `{"error": {...}}` response body and status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gateway_core::error::{ErrorEnvelope, GatewayError};
use serde_json::json;

/// An error as seen at the HTTP boundary.
#[derive(Debug, Clone)]
pub struct ApiError {
    /// HTTP status to return.
    pub status: StatusCode,
    /// Human-readable message, also embedded in the response body.
    pub message: String,
    /// Canonical error type string, when known (absent for raw transport errors).
    pub error_type: Option<String>,
    /// Machine-readable code, when one is attached.
    pub code: Option<String>,
    /// Correlation id of the request that failed, if known.
    pub request_id: Option<String>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            error_type: None,
            code: None,
            request_id: None,
        }
    }

    /// Attach the request's correlation id, surfaced back in the error body.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// 400 Bad Request.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message).with_type("invalid_request")
    }

    /// 401 Unauthorized.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message).with_type("authentication_error")
    }

    /// 403 Forbidden.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message).with_type("authorization_error")
    }

    /// 404 Not Found.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message).with_type("invalid_request")
    }

    /// 503 Service Unavailable.
    #[must_use]
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message).with_type("provider_unavailable")
    }

    /// 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message).with_type("internal_error")
    }

    fn with_type(mut self, error_type: &'static str) -> Self {
        self.error_type = Some(error_type.to_string());
        self
    }

    /// Project a core [`GatewayError`] into its HTTP representation, reusing
    /// the envelope the error already knows how to build for itself.
    #[must_use]
    pub fn from_gateway_error(error: &GatewayError, request_id: Option<String>) -> Self {
        let envelope = ErrorEnvelope::from_error(error, request_id.clone());
        Self {
            status: StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            message: envelope.message,
            error_type: Some(envelope.error_type),
            code: envelope.code,
            request_id,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<GatewayError> for ApiError {
    fn from(error: GatewayError) -> Self {
        Self::from_gateway_error(&error, None)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "type": self.error_type.unwrap_or_else(|| "internal_error".to_string()),
                "code": self.code,
                "message": self.message,
                "details": {},
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "request_id": self.request_id,
            }
        });
        (self.status, Json(body)).into_response()
    }
}
