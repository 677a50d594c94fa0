//! Tenant-scoped response cache.
//!
//! A single-process, in-memory store. The tenant-isolation invariant is
//! enforced structurally: every stored key is prefixed with the owning
//! tenant id, and `clear_tenant` removes exactly that prefix's entries. A
//! distributed (Redis-backed) second tier is not part of this contract —
//! see DESIGN.md for why a Redis-backed tier was dropped rather than
//! carried forward.

use gateway_core::request::{ChatMessage, MessageContent};
use gateway_core::{GatewayRequest, GatewayResponse, TenantId};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// Cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Whether caching is enabled at all.
    pub enabled: bool,
    /// Maximum number of entries before the lowest-value entries are evicted.
    pub max_entries: usize,
    /// Default time-to-live applied when a request doesn't override it.
    pub default_ttl: Duration,
    /// Whether streaming responses may be cached.
    pub cache_streaming: bool,
    /// Interval between background sweeps of expired entries.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
            default_ttl: Duration::from_secs(300),
            cache_streaming: false,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

struct Entry {
    response: GatewayResponse,
    inserted_at: Instant,
    ttl: Duration,
    hits: u64,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() >= self.ttl
    }
}

/// Cumulative cache statistics.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Current number of live entries.
    pub size: usize,
    /// Total cache hits since start or last clear.
    pub hits: u64,
    /// Total cache misses since start or last clear.
    pub misses: u64,
    /// Total entries evicted for capacity or expiry.
    pub evictions: u64,
}

impl CacheStats {
    /// Hit rate in `[0.0, 1.0]`; `0.0` when there have been no lookups.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Tenant-scoped response cache.
pub struct ResponseCache {
    config: CacheConfig,
    store: Arc<RwLock<HashMap<String, Entry>>>,
    counters: Arc<RwLock<Counters>>,
}

impl ResponseCache {
    /// Create a cache with the given configuration.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            store: Arc::new(RwLock::new(HashMap::new())),
            counters: Arc::new(RwLock::new(Counters {
                hits: 0,
                misses: 0,
                evictions: 0,
            })),
        }
    }

    /// Create a cache with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    /// Create a disabled cache (`get` always misses, `set` is a no-op).
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        })
    }

    /// Whether the cache is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Whether `request` is eligible for caching at all.
    #[must_use]
    pub fn is_cacheable(&self, request: &GatewayRequest) -> bool {
        if !self.config.enabled {
            return false;
        }
        if request.stream && !self.config.cache_streaming {
            return false;
        }
        true
    }

    /// Compute the tenant-prefixed fingerprint for a request.
    ///
    /// The tenant id is always the first path segment of the resulting key,
    /// which is the tenant-isolation invariant this component exists to
    /// enforce: `clear_tenant` and key comparisons both operate on that
    /// prefix. Field order in the originating JSON body never affects the
    /// hash, because we hash normalized in-memory values, not raw bytes.
    #[must_use]
    pub fn fingerprint(tenant: &TenantId, request: &GatewayRequest) -> String {
        let mut hasher = DefaultHasher::new();
        request.model.hash(&mut hasher);
        for message in &request.messages {
            hash_message(&mut hasher, message);
        }
        temperature_bucket(request.temperature).hash(&mut hasher);
        request.max_tokens.unwrap_or(0).hash(&mut hasher);
        top_p_bucket(request.top_p).hash(&mut hasher);
        request.stop.as_deref().unwrap_or(&[]).hash(&mut hasher);
        request.user.as_deref().unwrap_or("").hash(&mut hasher);
        format!("{}:{:016x}", tenant, hasher.finish())
    }

    /// Look up a previously cached response.
    pub async fn get(&self, tenant: &TenantId, key: &str) -> Option<GatewayResponse> {
        if !self.config.enabled {
            return None;
        }
        debug_assert!(key.starts_with(tenant.as_str()), "key must be tenant-prefixed");

        let expired = {
            let store = self.store.read().await;
            match store.get(key) {
                Some(entry) if !entry.is_expired() => false,
                Some(_) => true,
                None => {
                    self.counters.write().await.misses += 1;
                    return None;
                }
            }
        };

        if expired {
            self.store.write().await.remove(key);
            let mut counters = self.counters.write().await;
            counters.misses += 1;
            counters.evictions += 1;
            return None;
        }

        let mut store = self.store.write().await;
        if let Some(entry) = store.get_mut(key) {
            entry.hits += 1;
            self.counters.write().await.hits += 1;
            return Some(entry.response.clone());
        }
        self.counters.write().await.misses += 1;
        None
    }

    /// Store a response under `key`, owned by `tenant`, with `ttl` (or the
    /// configured default when `None`).
    pub async fn set(
        &self,
        tenant: &TenantId,
        key: String,
        response: GatewayResponse,
        ttl: Option<Duration>,
    ) {
        if !self.config.enabled {
            return;
        }
        debug_assert!(key.starts_with(tenant.as_str()), "key must be tenant-prefixed");

        let mut store = self.store.write().await;
        if store.len() >= self.config.max_entries && !store.contains_key(&key) {
            if let Some(evict_key) = store
                .iter()
                .min_by_key(|(_, e)| e.hits)
                .map(|(k, _)| k.clone())
            {
                store.remove(&evict_key);
                self.counters.write().await.evictions += 1;
            }
        }

        store.insert(
            key,
            Entry {
                response,
                inserted_at: Instant::now(),
                ttl: ttl.unwrap_or(self.config.default_ttl),
                hits: 0,
            },
        );
    }

    /// Remove a single entry.
    pub async fn delete(&self, key: &str) {
        self.store.write().await.remove(key);
    }

    /// Remove every entry owned by `tenant`.
    ///
    /// Implemented as a snapshot-then-delete: we take a read lock only long
    /// enough to collect matching keys, then remove them one at a time under
    /// the write lock, rather than holding a single write lock across the
    /// whole scan (resolves the "clear_tenant locking strategy" open
    /// question — see DESIGN.md).
    pub async fn clear_tenant(&self, tenant: &TenantId) {
        let prefix = format!("{tenant}:");
        let matching: Vec<String> = {
            let store = self.store.read().await;
            store
                .keys()
                .filter(|k| k.starts_with(&prefix))
                .cloned()
                .collect()
        };

        let mut store = self.store.write().await;
        for key in matching {
            store.remove(&key);
        }
        debug!(tenant = %tenant, "cleared tenant cache entries");
    }

    /// Remove all entries.
    pub async fn clear(&self) {
        self.store.write().await.clear();
        let mut counters = self.counters.write().await;
        *counters = Counters {
            hits: 0,
            misses: 0,
            evictions: 0,
        };
    }

    /// Current cache statistics.
    pub async fn stats(&self) -> CacheStats {
        let size = self.store.read().await.len();
        let counters = self.counters.read().await;
        CacheStats {
            size,
            hits: counters.hits,
            misses: counters.misses,
            evictions: counters.evictions,
        }
    }

    /// Remove every currently expired entry. Intended to be called
    /// periodically by a background task at `config.sweep_interval`.
    pub async fn sweep_expired(&self) {
        let expired: Vec<String> = {
            let store = self.store.read().await;
            store
                .iter()
                .filter(|(_, e)| e.is_expired())
                .map(|(k, _)| k.clone())
                .collect()
        };
        if expired.is_empty() {
            return;
        }
        let mut store = self.store.write().await;
        for key in &expired {
            store.remove(key);
        }
        self.counters.write().await.evictions += expired.len() as u64;
    }
}

fn hash_message(hasher: &mut DefaultHasher, message: &ChatMessage) {
    message.role.to_string().hash(hasher);
    match &message.content {
        MessageContent::Text(text) => text.hash(hasher),
        MessageContent::Parts(parts) => {
            for part in parts {
                format!("{part:?}").hash(hasher);
            }
        }
    }
}

/// Discretize temperature into buckets so near-identical floats still share
/// a fingerprint the way the original request intended, while avoiding
/// float-equality comparisons entirely.
fn temperature_bucket(temperature: Option<f32>) -> u32 {
    (temperature.unwrap_or(0.0) * 10.0).round() as u32
}

fn top_p_bucket(top_p: Option<f32>) -> u32 {
    (top_p.unwrap_or(1.0) * 100.0).round() as u32
}
