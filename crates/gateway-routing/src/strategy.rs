//! Selectable load-balancing strategies.
//!
//! The gateway's default and only actively exercised strategy is weighted
//! least-requests (implemented in [`crate::load_balancer`]). The
//! alternatives here exist for providers/deployments where outstanding
//! request counts aren't a meaningful signal (e.g. a single-replica
//! deployment behind a fixed quota) and are selected per routing rule.

use crate::load_balancer::LoadBalancer;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A strategy for picking one candidate id from a weighted set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadBalancingStrategy {
    /// Weighted least-requests: minimizes `in_flight / weight` (default).
    LeastRequests,
    /// Round robin over the candidate list, ignoring weight.
    RoundRobin,
    /// Uniform random pick, ignoring weight.
    Random,
}

impl Default for LoadBalancingStrategy {
    fn default() -> Self {
        Self::LeastRequests
    }
}

/// Builds a selection function for a given strategy.
pub struct StrategyFactory {
    round_robin_cursor: AtomicUsize,
}

impl Default for StrategyFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyFactory {
    /// Construct a factory with a fresh round-robin cursor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            round_robin_cursor: AtomicUsize::new(0),
        }
    }

    /// Pick a candidate id from `candidate_ids` (id, weight pairs) per `strategy`.
    #[must_use]
    pub fn select<'a>(
        &self,
        strategy: LoadBalancingStrategy,
        candidate_ids: &[(&'a str, u32)],
        load_balancer: &LoadBalancer,
    ) -> Option<&'a str> {
        if candidate_ids.is_empty() {
            return None;
        }
        match strategy {
            LoadBalancingStrategy::LeastRequests => load_balancer.select(candidate_ids),
            LoadBalancingStrategy::RoundRobin => {
                let idx = self.round_robin_cursor.fetch_add(1, Ordering::Relaxed) % candidate_ids.len();
                Some(candidate_ids[idx].0)
            }
            LoadBalancingStrategy::Random => {
                let idx = rand::thread_rng().gen_range(0..candidate_ids.len());
                Some(candidate_ids[idx].0)
            }
        }
    }
}
