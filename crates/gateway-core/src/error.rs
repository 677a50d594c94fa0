//! Canonical error taxonomy for the gateway.
//!
//! Every failure in the system, from request validation to a provider
//! timeout, is projected into one of the variants here before it crosses a
//! component boundary. `error_type()` and `status_code()` are the single
//! source of truth for the HTTP error-body shape and status code mapping.

use serde::Serialize;
use std::time::Duration;

/// Convenience alias used throughout the gateway.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Canonical gateway error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// Request failed domain validation (bad model, empty messages, out of
    /// range parameter, malformed tenant/user id, ...).
    #[error("validation error: {message}")]
    Validation {
        /// Human-readable description.
        message: String,
        /// Offending field, if attributable to one.
        field: Option<String>,
        /// Machine-readable validation code.
        code: String,
    },

    /// Missing or malformed credentials.
    #[error("authentication error: {message}")]
    Authentication {
        /// Human-readable description.
        message: String,
    },

    /// Authenticated but not authorized for the requested tenant/resource.
    #[error("authorization error: {message}")]
    Authorization {
        /// Human-readable description.
        message: String,
    },

    /// A configured budget/rate limit would be exceeded by this request.
    #[error("quota exceeded: {message}")]
    QuotaExceeded {
        /// Human-readable description.
        message: String,
        /// Remaining headroom at time of denial, if known.
        remaining: Option<f64>,
    },

    /// Provider-reported rate limiting (HTTP 429).
    #[error("rate limited")]
    RateLimit {
        /// Provider-suggested retry delay, if any.
        retry_after: Option<Duration>,
        /// Provider-reported limit, if any.
        limit: Option<u32>,
    },

    /// A model id is not known to the registry.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// A provider returned an error, or the request to it failed.
    #[error("provider error ({provider}): {message}")]
    Provider {
        /// Provider identifier.
        provider: String,
        /// Human-readable description.
        message: String,
        /// Upstream HTTP status code, if applicable.
        status_code: Option<u16>,
        /// Whether this failure is safe to retry.
        retryable: bool,
    },

    /// No healthy, circuit-closed provider is available for the request.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// A circuit breaker is open for the named provider.
    #[error("circuit breaker open for provider: {0}")]
    CircuitOpen(String),

    /// An operation exceeded its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// A streaming response failed mid-sequence.
    #[error("streaming error: {0}")]
    Streaming(String),

    /// The response cache failed to serve or store an entry.
    #[error("cache error: {0}")]
    Cache(String),

    /// Invalid or incomplete configuration.
    #[error("configuration error: {message}")]
    Configuration {
        /// Human-readable description.
        message: String,
    },

    /// The request's cancellation context fired before completion.
    #[error("request cancelled")]
    Cancelled,

    /// Anything else, not classifiable above.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Build a [`GatewayError::Validation`].
    #[must_use]
    pub fn validation(
        message: impl Into<String>,
        field: Option<String>,
        code: impl Into<String>,
    ) -> Self {
        Self::Validation {
            message: message.into(),
            field,
            code: code.into(),
        }
    }

    /// Build a [`GatewayError::Authentication`].
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Build a [`GatewayError::Authorization`].
    #[must_use]
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
        }
    }

    /// Build a [`GatewayError::QuotaExceeded`].
    #[must_use]
    pub fn quota_exceeded(message: impl Into<String>, remaining: Option<f64>) -> Self {
        Self::QuotaExceeded {
            message: message.into(),
            remaining,
        }
    }

    /// Build a [`GatewayError::RateLimit`].
    #[must_use]
    pub fn rate_limit(retry_after: Option<Duration>, limit: Option<u32>) -> Self {
        Self::RateLimit { retry_after, limit }
    }

    /// Build a [`GatewayError::ModelNotFound`].
    #[must_use]
    pub fn model_not_found(model: impl Into<String>) -> Self {
        Self::ModelNotFound(model.into())
    }

    /// Build a [`GatewayError::Provider`].
    #[must_use]
    pub fn provider(
        provider: impl Into<String>,
        message: impl Into<String>,
        status_code: Option<u16>,
        retryable: bool,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            status_code,
            retryable,
        }
    }

    /// Build a [`GatewayError::ProviderUnavailable`].
    #[must_use]
    pub fn provider_unavailable(message: impl Into<String>) -> Self {
        Self::ProviderUnavailable(message.into())
    }

    /// Build a [`GatewayError::CircuitOpen`].
    #[must_use]
    pub fn circuit_breaker_open(provider: impl Into<String>) -> Self {
        Self::CircuitOpen(provider.into())
    }

    /// Build a [`GatewayError::Timeout`].
    #[must_use]
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout(duration)
    }

    /// Build a [`GatewayError::Streaming`].
    #[must_use]
    pub fn streaming(message: impl Into<String>) -> Self {
        Self::Streaming(message.into())
    }

    /// Build a [`GatewayError::Cache`].
    #[must_use]
    pub fn cache_error(message: impl Into<String>) -> Self {
        Self::Cache(message.into())
    }

    /// Build a [`GatewayError::Configuration`].
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Build a [`GatewayError::Cancelled`].
    #[must_use]
    pub fn cancelled() -> Self {
        Self::Cancelled
    }

    /// Build a [`GatewayError::Internal`].
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the Router's retry loop may re-attempt on this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { retryable, .. } => *retryable,
            Self::Timeout(_) | Self::RateLimit { .. } | Self::Streaming(_) => true,
            Self::CircuitOpen(_)
            | Self::ProviderUnavailable(_)
            | Self::Validation { .. }
            | Self::Authentication { .. }
            | Self::Authorization { .. }
            | Self::QuotaExceeded { .. }
            | Self::ModelNotFound(_)
            | Self::Cache(_)
            | Self::Configuration { .. }
            | Self::Cancelled
            | Self::Internal(_) => false,
        }
    }

    /// The canonical error type string used in the response body and logs.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Validation { .. } | Self::ModelNotFound(_) => "invalid_request",
            Self::Authentication { .. } => "authentication_error",
            Self::Authorization { .. } => "authorization_error",
            Self::RateLimit { .. } => "rate_limit_exceeded",
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::Provider { .. } => "provider_error",
            Self::ProviderUnavailable(_) | Self::CircuitOpen(_) => "provider_unavailable",
            Self::Timeout(_) => "timeout",
            Self::Cache(_) => "cache_error",
            Self::Streaming(_) | Self::Configuration { .. } | Self::Cancelled | Self::Internal(_) => {
                "internal_error"
            }
        }
    }

    /// Machine-readable code, when one is attached.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Validation { code, .. } => Some(code),
            _ => None,
        }
    }

    /// The HTTP status this error projects to.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } | Self::ModelNotFound(_) => 400,
            Self::Authentication { .. } => 401,
            Self::Authorization { .. } => 403,
            Self::RateLimit { .. } | Self::QuotaExceeded { .. } => 429,
            Self::Provider { .. } => 502,
            Self::ProviderUnavailable(_) | Self::CircuitOpen(_) => 503,
            Self::Timeout(_) => 504,
            Self::Cache(_) | Self::Streaming(_) | Self::Configuration { .. } | Self::Internal(_) => {
                500
            }
            Self::Cancelled => 499,
        }
    }

    /// The provider this error originated from, if any.
    #[must_use]
    pub fn provider_id(&self) -> Option<&str> {
        match self {
            Self::Provider { provider, .. } => Some(provider),
            Self::ProviderUnavailable(p) | Self::CircuitOpen(p) => Some(p),
            _ => None,
        }
    }
}

/// JSON projection of a [`GatewayError`] for the `{"error": {...}}` response body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    /// Canonical error type string.
    #[serde(rename = "type")]
    pub error_type: String,
    /// Machine-readable code, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Human-readable message.
    pub message: String,
    /// Additional structured details.
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub details: serde_json::Map<String, serde_json::Value>,
    /// RFC 3339 timestamp of when the error was produced.
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Correlation id of the request that failed, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ErrorEnvelope {
    /// Project a [`GatewayError`] into its wire representation.
    #[must_use]
    pub fn from_error(error: &GatewayError, request_id: Option<String>) -> Self {
        let mut details = serde_json::Map::new();
        if let Self::Validation {
            field: Some(field), ..
        } = error
        {
            details.insert("field".to_string(), serde_json::Value::String(field.clone()));
        }
        if let Some(provider) = error.provider_id() {
            details.insert(
                "provider".to_string(),
                serde_json::Value::String(provider.to_string()),
            );
        }
        Self {
            error_type: error.error_type().to_string(),
            code: error.code().map(str::to_string),
            message: error.to_string(),
            details,
            timestamp: chrono::Utc::now(),
            request_id,
        }
    }
}
