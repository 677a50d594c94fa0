//! In-flight request bookkeeping used by readiness checks and shutdown
//! diagnostics. Distinct from the counters `gateway_server::shutdown` keeps
//! for its own drain logic: this tracker answers "which requests, for which
//! tenants, are outstanding right now" rather than just "how many".

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Identifying detail for one in-flight request.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// Correlation id, usually the `X-Request-ID` header value.
    pub request_id: String,
    /// Tenant the request is attributed to, if known at start time.
    pub tenant_id: Option<String>,
    /// HTTP method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// When the request was admitted.
    pub started_at: Instant,
}

/// How a tracked request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Completed with a successful response.
    Success,
    /// Completed with an error response.
    Error,
    /// The client disconnected or the request was cancelled before completion.
    Cancelled,
}

#[derive(Default)]
struct Counters {
    completed: AtomicU64,
    errored: AtomicU64,
    cancelled: AtomicU64,
}

/// Tracks requests from admission to completion.
#[derive(Clone)]
pub struct RequestTracker {
    inner: Arc<Inner>,
}

struct Inner {
    active: DashMap<String, RequestInfo>,
    counters: Counters,
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestTracker {
    /// A tracker with no requests in flight yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                active: DashMap::new(),
                counters: Counters::default(),
            }),
        }
    }

    /// Record that a request was admitted.
    pub fn start(&self, info: RequestInfo) {
        self.inner.active.insert(info.request_id.clone(), info);
    }

    /// Record that a request finished, removing it from the active set.
    pub fn finish(&self, request_id: &str, outcome: RequestOutcome) {
        self.inner.active.remove(request_id);
        match outcome {
            RequestOutcome::Success => self.inner.counters.completed.fetch_add(1, Ordering::Relaxed),
            RequestOutcome::Error => self.inner.counters.errored.fetch_add(1, Ordering::Relaxed),
            RequestOutcome::Cancelled => self.inner.counters.cancelled.fetch_add(1, Ordering::Relaxed),
        };
    }

    /// Number of requests currently in flight.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.active.len()
    }

    /// Number of requests currently in flight for a given tenant.
    #[must_use]
    pub fn active_count_for_tenant(&self, tenant_id: &str) -> usize {
        self.inner
            .active
            .iter()
            .filter(|entry| entry.value().tenant_id.as_deref() == Some(tenant_id))
            .count()
    }

    /// Snapshot of every request currently in flight, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<RequestInfo> {
        let mut requests: Vec<RequestInfo> = self.inner.active.iter().map(|entry| entry.value().clone()).collect();
        requests.sort_by_key(|r| r.started_at);
        requests
    }

    /// Total requests completed successfully since the tracker was created.
    #[must_use]
    pub fn completed_total(&self) -> u64 {
        self.inner.counters.completed.load(Ordering::Relaxed)
    }

    /// Total requests that ended in an error response.
    #[must_use]
    pub fn errored_total(&self) -> u64 {
        self.inner.counters.errored.load(Ordering::Relaxed)
    }

    /// Total requests cancelled before completion.
    #[must_use]
    pub fn cancelled_total(&self) -> u64 {
        self.inner.counters.cancelled.load(Ordering::Relaxed)
    }
}
