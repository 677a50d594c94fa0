//! Prometheus metrics for the gateway.
//!
//! A single [`Metrics`] instance owns one [`prometheus::Registry`] for the
//! process lifetime. Handlers record a [`RequestMetrics`] summary per request;
//! the router and resilience layers call the narrower `record_*` methods
//! directly at the point an event happens (a cache hit, a circuit trip, a
//! budget denial).

use prometheus::{
    exponential_buckets, Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Registry, TextEncoder,
};
use std::time::Duration;
use thiserror::Error;

/// Failure building or exporting the metrics registry.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// A collector could not be registered (name collision, invalid label set).
    #[error("failed to register metric: {0}")]
    Registration(#[from] prometheus::Error),
}

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether metrics collection is active at all. When `false`, `/metrics`
    /// still serves an empty exposition rather than erroring.
    pub enabled: bool,
    /// Prefix applied to every metric name, e.g. `"gateway"` -> `gateway_requests_total`.
    pub namespace: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: "gateway".to_string(),
        }
    }
}

/// Summary of one completed request, recorded after the response (or the
/// final stream chunk) is known.
#[derive(Debug, Clone)]
pub struct RequestMetrics {
    /// Route template, e.g. `"/v1/chat/completions"`.
    pub route: String,
    /// Provider that ultimately served the request, if any (absent on
    /// requests that failed before dispatch, e.g. auth/validation errors).
    pub provider: Option<String>,
    /// HTTP status code returned to the caller.
    pub status: u16,
    /// Whether the response was served from the response cache.
    pub cache_hit: bool,
    /// End-to-end request latency.
    pub duration: Duration,
}

/// Registered Prometheus collectors for the gateway.
pub struct Metrics {
    enabled: bool,
    registry: Registry,
    requests_total: IntCounterVec,
    request_duration_seconds: HistogramVec,
    cache_hits_total: IntCounter,
    cache_misses_total: IntCounter,
    circuit_state: IntGaugeVec,
    budget_denied_total: IntCounterVec,
    in_flight_requests: IntGauge,
}

impl Metrics {
    /// Build and register every collector against a fresh registry.
    ///
    /// # Errors
    /// Returns [`MetricsError`] if a collector fails to register.
    pub fn new(config: MetricsConfig) -> Result<Self, MetricsError> {
        let registry = Registry::new();
        let ns = config.namespace.as_str();

        let requests_total = IntCounterVec::new(
            prometheus::Opts::new("requests_total", "Total requests handled").namespace(ns),
            &["route", "status"],
        )?;
        let request_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new("request_duration_seconds", "Request latency in seconds")
                .namespace(ns)
                .buckets(exponential_buckets(0.01, 2.0, 12)?),
            &["route"],
        )?;
        let cache_hits_total = IntCounter::with_opts(
            prometheus::Opts::new("cache_hits_total", "Response cache hits").namespace(ns),
        )?;
        let cache_misses_total = IntCounter::with_opts(
            prometheus::Opts::new("cache_misses_total", "Response cache misses").namespace(ns),
        )?;
        let circuit_state = IntGaugeVec::new(
            prometheus::Opts::new("circuit_breaker_state", "0=closed 1=open 2=half_open").namespace(ns),
            &["provider"],
        )?;
        let budget_denied_total = IntCounterVec::new(
            prometheus::Opts::new("budget_denied_total", "Requests denied by the cost controller").namespace(ns),
            &["scope"],
        )?;
        let in_flight_requests = IntGauge::with_opts(
            prometheus::Opts::new("in_flight_requests", "Requests currently being served").namespace(ns),
        )?;

        if config.enabled {
            registry.register(Box::new(requests_total.clone()))?;
            registry.register(Box::new(request_duration_seconds.clone()))?;
            registry.register(Box::new(cache_hits_total.clone()))?;
            registry.register(Box::new(cache_misses_total.clone()))?;
            registry.register(Box::new(circuit_state.clone()))?;
            registry.register(Box::new(budget_denied_total.clone()))?;
            registry.register(Box::new(in_flight_requests.clone()))?;
        }

        Ok(Self {
            enabled: config.enabled,
            registry,
            requests_total,
            request_duration_seconds,
            cache_hits_total,
            cache_misses_total,
            circuit_state,
            budget_denied_total,
            in_flight_requests,
        })
    }

    /// Metrics with defaults, registration failures are not expected for the
    /// fixed collector set above.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(MetricsConfig::default()).unwrap_or_else(|_| Self {
            enabled: false,
            registry: Registry::new(),
            requests_total: IntCounterVec::new(prometheus::Opts::new("noop", "noop"), &["route", "status"])
                .expect("static metric definition is valid"),
            request_duration_seconds: HistogramVec::new(
                prometheus::HistogramOpts::new("noop_duration", "noop"),
                &["route"],
            )
            .expect("static metric definition is valid"),
            cache_hits_total: IntCounter::new("noop_hits", "noop").expect("static metric definition is valid"),
            cache_misses_total: IntCounter::new("noop_misses", "noop").expect("static metric definition is valid"),
            circuit_state: IntGaugeVec::new(prometheus::Opts::new("noop_circuit", "noop"), &["provider"])
                .expect("static metric definition is valid"),
            budget_denied_total: IntCounterVec::new(prometheus::Opts::new("noop_budget", "noop"), &["scope"])
                .expect("static metric definition is valid"),
            in_flight_requests: IntGauge::new("noop_in_flight", "noop").expect("static metric definition is valid"),
        })
    }

    /// Record a completed request's summary.
    pub fn record_request(&self, metrics: &RequestMetrics) {
        if !self.enabled {
            return;
        }
        let status = metrics.status.to_string();
        self.requests_total
            .with_label_values(&[&metrics.route, &status])
            .inc();
        self.request_duration_seconds
            .with_label_values(&[&metrics.route])
            .observe(metrics.duration.as_secs_f64());
        if metrics.cache_hit {
            self.cache_hits_total.inc();
        }
    }

    /// Record a response cache miss (hits are folded into `record_request`).
    pub fn record_cache_miss(&self) {
        if self.enabled {
            self.cache_misses_total.inc();
        }
    }

    /// Update the exported circuit breaker state gauge for a provider.
    pub fn set_circuit_state(&self, provider_id: &str, state_code: i64) {
        if self.enabled {
            self.circuit_state.with_label_values(&[provider_id]).set(state_code);
        }
    }

    /// Record a cost-controller denial for a scope (`"global"`, `"tenant"`, `"user"`).
    pub fn record_budget_denied(&self, scope: &str) {
        if self.enabled {
            self.budget_denied_total.with_label_values(&[scope]).inc();
        }
    }

    /// Increment the in-flight request gauge; call `request_finished` in all exit paths.
    pub fn request_started(&self) {
        if self.enabled {
            self.in_flight_requests.inc();
        }
    }

    /// Decrement the in-flight request gauge.
    pub fn request_finished(&self) {
        if self.enabled {
            self.in_flight_requests.dec();
        }
    }

    /// Render the current registry in Prometheus text exposition format, for
    /// the `/metrics` endpoint.
    ///
    /// # Errors
    /// Returns [`MetricsError`] if the text encoder fails to serialize a
    /// collected metric family.
    pub fn render(&self) -> Result<String, MetricsError> {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&families, &mut buffer)
            .map_err(MetricsError::Registration)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
