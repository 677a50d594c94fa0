//! Shared application state threaded through every handler.

use std::sync::Arc;

use chrono::Utc;
use gateway_config::schema::GatewayConfig;
use gateway_resilience::ResponseCache;
use gateway_routing::{HealthProber, Router};
use gateway_telemetry::{CostController, Metrics, RequestTracker};

use crate::auth::{AuthenticatedEntity, AuthError, AuthMethod, AuthState};
use crate::health::{HealthChecker, HealthConfig};
use crate::shutdown::ShutdownCoordinator;

/// Minimum acceptable length for a bearer token or API key under
/// [`AuthGate::Simple`] in production mode. Chosen to reject obvious
/// placeholders (`"test"`, `"x"`) without implying any real entropy check.
pub const MIN_PROD_CREDENTIAL_LEN: usize = 20;

/// Prefix production credentials must carry under [`AuthGate::Simple`],
/// mirroring the `sk-<tenant>_<key>` shape the gateway already recognizes
/// when deriving a tenant id from an API key.
pub const PROD_CREDENTIAL_PREFIX: &str = "sk-";

/// How inbound requests are authenticated.
///
/// The gateway supports two authentication postures, chosen once at startup
/// from [`gateway_config::schema::AuthSettings`]:
///
/// - `Enterprise` delegates entirely to the existing JWT/OIDC + API-key
///   machinery in [`crate::auth`], used whenever an operator has configured
///   `auth.jwt` or `auth.api_keys`.
/// - `Simple` implements the minimal bearer/API-key presence-and-shape check:
///   development mode accepts any non-empty credential, production mode also
///   requires a minimum length and the `sk-` prefix. This is the posture for
///   an operator who has not wired up JWT/OIDC or a static key table.
#[derive(Clone)]
pub enum AuthGate {
    /// Full enterprise authentication (JWT/OIDC and/or API-key table).
    Enterprise(AuthState),
    /// Minimal presence-and-shape bearer/API-key check.
    Simple {
        /// Whether unauthenticated requests are rejected at all.
        required: bool,
        /// Relaxed validation (any non-empty credential) vs. production
        /// validation (minimum length + `sk-` prefix).
        dev_mode: bool,
        /// Paths exempt from authentication entirely.
        public_paths: Vec<String>,
    },
}

impl AuthGate {
    /// Build the gate appropriate for a loaded configuration.
    ///
    /// If `auth.jwt` or `auth.api_keys` are configured, authentication is
    /// delegated to the enterprise [`AuthState`] machinery. Otherwise the
    /// simple dev/prod bearer scheme is used, governed by `auth.dev_mode`.
    ///
    /// # Errors
    /// Propagates [`AuthError`] if building the enterprise `AuthState` fails
    /// (e.g. OIDC discovery or JWKS fetch failure at startup).
    pub async fn from_config(config: &GatewayConfig) -> Result<Self, AuthError> {
        let auth = &config.auth;
        if auth.jwt.is_some() || !auth.api_keys.is_empty() {
            let mut builder = crate::auth::AuthConfig::builder()
                .required(auth.required)
                .public_paths(auth.public_paths.clone());

            if let Some(jwt) = &auth.jwt {
                let jwt_config = build_jwt_config(jwt)?;
                builder = builder
                    .jwt(jwt_config)
                    .tenant_claim(jwt.tenant_claim.clone())
                    .user_claim(jwt.user_claim.clone());
            }

            if !auth.api_keys.is_empty() {
                builder = builder.api_keys(build_api_key_config(&auth.api_keys));
            }

            let auth_state = AuthState::new(builder.build()).await?;
            return Ok(Self::Enterprise(auth_state));
        }

        Ok(Self::Simple {
            required: auth.required,
            dev_mode: auth.dev_mode,
            public_paths: auth.public_paths.clone(),
        })
    }

    /// A gate that accepts every request, for tests and tooling.
    #[must_use]
    pub fn disabled() -> Self {
        Self::Enterprise(AuthState::disabled())
    }

    /// Whether `path` bypasses authentication under this gate.
    #[must_use]
    pub fn is_public_path(&self, path: &str) -> bool {
        match self {
            Self::Enterprise(state) => state.config().is_public_path(path),
            Self::Simple { public_paths, .. } => public_paths.iter().any(|p| p == path),
        }
    }

    /// Authenticate a request under the `Simple` scheme. No-op for
    /// `Enterprise`, which is authenticated via [`crate::auth::auth_middleware`]
    /// directly against its own `AuthState`.
    pub fn authenticate_simple(
        required: bool,
        dev_mode: bool,
        credential: Option<&str>,
    ) -> Result<AuthenticatedEntity, AuthError> {
        let Some(token) = credential.filter(|t| !t.is_empty()) else {
            return if required {
                Err(AuthError::MissingCredentials)
            } else {
                Ok(anonymous_entity())
            };
        };

        if dev_mode {
            return Ok(simple_authenticated_entity(token));
        }

        if token.len() < MIN_PROD_CREDENTIAL_LEN || !token.starts_with(PROD_CREDENTIAL_PREFIX) {
            return Err(AuthError::InvalidApiKey);
        }

        Ok(simple_authenticated_entity(token))
    }
}

fn anonymous_entity() -> AuthenticatedEntity {
    AuthenticatedEntity {
        id: "anonymous".to_string(),
        tenant_id: None,
        email: None,
        name: None,
        auth_method: AuthMethod::Anonymous,
        scopes: Vec::new(),
        expires_at: None,
        claims: std::collections::HashMap::new(),
    }
}

fn simple_authenticated_entity(token: &str) -> AuthenticatedEntity {
    AuthenticatedEntity {
        id: token.to_string(),
        tenant_id: None,
        email: None,
        name: None,
        auth_method: AuthMethod::ApiKey,
        scopes: Vec::new(),
        expires_at: None,
        claims: std::collections::HashMap::new(),
    }
}

fn build_jwt_config(jwt: &gateway_config::schema::JwtSettings) -> Result<crate::auth::JwtConfig, AuthError> {
    use crate::auth::JwtConfig;

    let mut config = if let Some(issuer_url) = &jwt.oidc_issuer_url {
        JwtConfig::oidc(issuer_url.clone())
    } else if let Some(jwks_url) = &jwt.jwks_url {
        JwtConfig::jwks(jwks_url.clone())
    } else if let Some(secret_env) = &jwt.secret_env {
        let secret = std::env::var(secret_env)
            .map_err(|_| AuthError::Configuration(format!("missing env var {secret_env} for JWT secret")))?;
        JwtConfig::secret(secret)
    } else {
        return Err(AuthError::Configuration(
            "jwt configured but none of oidc_issuer_url, jwks_url, secret_env set".to_string(),
        ));
    };

    if !jwt.issuers.is_empty() {
        config = config.with_issuers(jwt.issuers.clone());
    }
    if !jwt.audiences.is_empty() {
        config = config.with_audiences(jwt.audiences.clone());
    }

    Ok(config)
}

fn build_api_key_config(settings: &[gateway_config::schema::ApiKeySettings]) -> crate::auth::ApiKeyConfig {
    use crate::auth::{ApiKeyConfig, ApiKeyMetadata};

    settings.iter().fold(ApiKeyConfig::new(), |config, entry| {
        let Ok(key) = std::env::var(&entry.key_env) else {
            tracing::warn!(env_var = %entry.key_env, "api key env var not set, skipping entry");
            return config;
        };
        let metadata = ApiKeyMetadata::new()
            .with_tenant(entry.tenant_id.clone())
            .with_scopes(entry.scopes.clone());
        let metadata = match &entry.user_id {
            Some(user_id) => metadata.with_user(user_id.clone()),
            None => metadata,
        };
        config.with_key(key, metadata)
    })
}

/// Everything a handler needs to serve a request, cloned cheaply via `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration, for read-only reference (auth public paths, cache settings, etc).
    pub config: Arc<GatewayConfig>,
    /// Request router: provider selection, retries, circuit breaking, cost admission.
    pub router: Arc<Router>,
    /// Cost/budget accounting, also queried directly by the usage endpoints.
    pub cost_controller: Arc<CostController>,
    /// Response cache, queried directly only for administrative purposes; the
    /// router owns the read/write path during request handling.
    pub cache: Arc<ResponseCache>,
    /// HTTP-facing liveness/readiness/startup aggregator.
    pub health_checker: Arc<HealthChecker>,
    /// Background per-provider health prober.
    pub health_prober: Arc<HealthProber>,
    /// Authentication posture selected at startup.
    pub auth_gate: Arc<AuthGate>,
    /// Prometheus metrics registry.
    pub metrics: Arc<Metrics>,
    /// In-flight request bookkeeping.
    pub request_tracker: Arc<RequestTracker>,
    /// Graceful shutdown coordination.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Process start time, for uptime reporting independent of `health_checker`.
    pub started_at: chrono::DateTime<Utc>,
}

impl AppState {
    /// Assemble application state from its already-constructed components.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<GatewayConfig>,
        router: Arc<Router>,
        cost_controller: Arc<CostController>,
        cache: Arc<ResponseCache>,
        health_checker: Arc<HealthChecker>,
        health_prober: Arc<HealthProber>,
        auth_gate: AuthGate,
        metrics: Arc<Metrics>,
        shutdown: Arc<ShutdownCoordinator>,
    ) -> Self {
        Self {
            config,
            router,
            cost_controller,
            cache,
            health_checker,
            health_prober,
            auth_gate: Arc::new(auth_gate),
            metrics,
            request_tracker: Arc::new(RequestTracker::new()),
            shutdown,
            started_at: Utc::now(),
        }
    }
}

/// Convenience health-check configuration shared by `main` and tests.
#[must_use]
pub fn default_health_config() -> HealthConfig {
    HealthConfig::default()
}
