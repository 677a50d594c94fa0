//! Active background health probing.
//!
//! Distinct from `gateway_server::health`, which aggregates *reported*
//! liveness/readiness for the process itself. This module periodically calls
//! each registered provider's `health_probe` and maintains a per-provider
//! [`HealthStatus`] the [`crate::router::Router`] consults before dispatch,
//! so a provider that starts failing synthetic probes is avoided even before
//! its circuit breaker has seen a real failure.

use dashmap::DashMap;
use gateway_config::HealthCheckSettings;
use gateway_core::provider::HealthStatus;
use gateway_providers::ProviderRegistry;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::timeout;
use tracing::{debug, info, warn};

#[derive(Default)]
struct ProviderHealthEntry {
    status: parking_lot::RwLock<HealthStatus>,
    consecutive_successes: AtomicU32,
    consecutive_failures: AtomicU32,
}

/// Periodically probes every registered provider and tracks its health.
pub struct HealthProber {
    registry: Arc<ProviderRegistry>,
    config: HealthCheckSettings,
    states: DashMap<String, Arc<ProviderHealthEntry>>,
    shutdown: Notify,
}

impl HealthProber {
    /// Build a prober over `registry`. All providers start `Unknown` until
    /// their first probe completes.
    #[must_use]
    pub fn new(registry: Arc<ProviderRegistry>, config: HealthCheckSettings) -> Self {
        let states = DashMap::new();
        for id in registry.providers().map(|p| p.id().to_string()) {
            states.insert(id, Arc::new(ProviderHealthEntry::default()));
        }
        Self {
            registry,
            config,
            states,
            shutdown: Notify::new(),
        }
    }

    /// Current health status of a provider. Providers never probed, or not
    /// registered, report `Unknown`.
    #[must_use]
    pub fn status(&self, provider_id: &str) -> HealthStatus {
        self.states
            .get(provider_id)
            .map_or(HealthStatus::Unknown, |entry| *entry.status.read())
    }

    /// Run the probe loop until `stop` is called. Intended to be spawned as
    /// a background task for the lifetime of the process.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.config.probe_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => self.probe_all().await,
                () = self.shutdown.notified() => {
                    info!("health prober stopping");
                    break;
                }
            }
        }
    }

    /// Signal [`Self::run`] to stop at the next loop iteration.
    pub fn stop(&self) {
        self.shutdown.notify_one();
    }

    /// Number of providers this prober tracks.
    #[must_use]
    pub fn provider_count(&self) -> usize {
        self.states.len()
    }

    /// Number of providers currently `Healthy` or `Degraded` (i.e. usable).
    #[must_use]
    pub fn healthy_count(&self) -> usize {
        self.states
            .iter()
            .filter(|entry| entry.status.read().is_usable())
            .count()
    }

    async fn probe_all(&self) {
        for provider in self.registry.providers() {
            let id = provider.id().to_string();
            let entry = self
                .states
                .entry(id.clone())
                .or_insert_with(|| Arc::new(ProviderHealthEntry::default()))
                .clone();

            let outcome = timeout(self.config.probe_timeout, provider.health_probe()).await;
            match outcome {
                Ok(Ok(())) => self.record_success(&id, &entry),
                Ok(Err(error)) => self.record_failure(&id, &entry, &error.to_string()),
                Err(_) => self.record_failure(&id, &entry, "probe timed out"),
            }
        }
    }

    fn record_success(&self, provider_id: &str, entry: &ProviderHealthEntry) {
        entry.consecutive_failures.store(0, Ordering::SeqCst);
        let successes = entry.consecutive_successes.fetch_add(1, Ordering::SeqCst) + 1;
        if successes >= self.config.healthy_threshold {
            let mut status = entry.status.write();
            if *status != HealthStatus::Healthy {
                info!(provider = %provider_id, "provider health probe recovered");
            }
            *status = HealthStatus::Healthy;
        }
        debug!(provider = %provider_id, "health probe ok");
    }

    fn record_failure(&self, provider_id: &str, entry: &ProviderHealthEntry, reason: &str) {
        entry.consecutive_successes.store(0, Ordering::SeqCst);
        let failures = entry.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= self.config.unhealthy_threshold {
            let mut status = entry.status.write();
            if *status != HealthStatus::Unhealthy {
                warn!(provider = %provider_id, reason, "provider marked unhealthy");
            }
            *status = HealthStatus::Unhealthy;
        } else {
            let mut status = entry.status.write();
            if *status == HealthStatus::Healthy {
                *status = HealthStatus::Degraded;
            }
        }
    }
}
