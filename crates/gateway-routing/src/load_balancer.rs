//! Weighted least-requests load balancing across same-priority candidates.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};

/// Load balancer configuration. Reserved for future strategy parameters;
/// the current gateway only implements weighted least-requests.
#[derive(Debug, Clone, Default)]
pub struct LoadBalancerConfig {
    /// Minimum weight a candidate must have to receive traffic at all.
    pub min_weight: u32,
}

/// Tracks in-flight request counts per provider and picks the least-loaded
/// candidate, weighted by each candidate's configured share of traffic.
#[derive(Default)]
pub struct LoadBalancer {
    in_flight: DashMap<String, AtomicU32>,
}

impl LoadBalancer {
    /// Build a load balancer with no prior state.
    #[must_use]
    pub fn new(_config: LoadBalancerConfig) -> Self {
        Self::default()
    }

    /// Current in-flight request count for a provider.
    #[must_use]
    pub fn in_flight(&self, provider_id: &str) -> u32 {
        self.in_flight
            .get(provider_id)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// Record that a request has been dispatched to `provider_id`.
    pub fn record_start(&self, provider_id: &str) {
        self.in_flight
            .entry(provider_id.to_string())
            .or_insert_with(|| AtomicU32::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Record that a request dispatched to `provider_id` has completed
    /// (successfully or not).
    pub fn record_finish(&self, provider_id: &str) {
        if let Some(counter) = self.in_flight.get(provider_id) {
            counter
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                    Some(v.saturating_sub(1))
                })
                .ok();
        }
    }

    /// Pick the candidate id with the lowest `in_flight / weight` ratio.
    /// Ties broken by input order. Returns `None` for an empty slice.
    #[must_use]
    pub fn select<'a>(&self, candidate_ids: &[(&'a str, u32)]) -> Option<&'a str> {
        candidate_ids
            .iter()
            .filter(|(_, weight)| *weight > 0)
            .min_by(|(id_a, weight_a), (id_b, weight_b)| {
                let load_a = f64::from(self.in_flight(id_a)) / f64::from(*weight_a);
                let load_b = f64::from(self.in_flight(id_b)) / f64::from(*weight_b);
                load_a
                    .partial_cmp(&load_b)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(id, _)| *id)
    }
}
