//! Holds the configured provider adapter instances.
//!
//! The registry itself makes no routing decisions; it is a lookup table from
//! provider id to the live `LLMProvider` trait object, consulted by the Model
//! Registry (built from each adapter's `list_models`) and by the Router when
//! dispatching a chosen provider.

use gateway_core::{GatewayError, GatewayResult, LLMProvider};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of live provider adapters, keyed by provider instance id.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LLMProvider>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider instance. Replaces any prior instance with the
    /// same id.
    pub fn register(&mut self, provider: Arc<dyn LLMProvider>) {
        self.providers.insert(provider.id().to_string(), provider);
    }

    /// Look up a provider by id.
    ///
    /// # Errors
    /// Returns `GatewayError::ProviderUnavailable` if no such provider is registered.
    pub fn get(&self, id: &str) -> GatewayResult<Arc<dyn LLMProvider>> {
        self.providers
            .get(id)
            .cloned()
            .ok_or_else(|| GatewayError::provider_unavailable(format!("unknown provider '{id}'")))
    }

    /// All registered provider ids.
    #[must_use]
    pub fn provider_ids(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    /// All registered provider instances.
    pub fn providers(&self) -> impl Iterator<Item = &Arc<dyn LLMProvider>> {
        self.providers.values()
    }

    /// Number of registered providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the registry has no providers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
