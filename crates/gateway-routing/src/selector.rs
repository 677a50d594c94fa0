//! Model registry and provider-candidate selection.
//!
//! The registry is built once at startup from the configured provider
//! catalog rather than by calling each adapter's `list_models`:
//! routing needs capability and cost metadata that the wire-level
//! `/v1/models` listing doesn't carry, so the catalog in configuration is
//! the single source of truth for both.

use gateway_config::ProviderSettings;
use gateway_core::provider::{ModelInfo, ProviderCapabilities};
use gateway_core::{GatewayError, GatewayResult};
use std::collections::HashMap;

/// One provider able to serve a given model, with the metadata needed to
/// rank and dispatch to it.
#[derive(Debug, Clone)]
pub struct ProviderCandidate {
    /// Provider instance id (matches `ProviderRegistry` keys).
    pub provider_id: String,
    /// The provider-side reference for this model (deployment name / model id).
    pub upstream_ref: String,
    /// Relative ordering among candidates; lower is tried first.
    pub priority: u32,
    /// Load-balancer weight among candidates at the same priority.
    pub weight: u32,
    /// Capability/cost metadata for this model on this provider.
    pub model_info: ModelInfo,
}

/// Parameters narrowing which candidates are eligible for a request.
#[derive(Debug, Clone, Default)]
pub struct SelectionCriteria {
    /// Requested model id.
    pub model_id: String,
    /// Caller-requested provider, tried ahead of priority ordering.
    pub preferred_provider: Option<String>,
    /// Providers to skip (already tried and failed this request).
    pub excluded_providers: Vec<String>,
    /// Capability the model must support, if the request implies one
    /// (e.g. embeddings requires `Embedding`).
    pub required_capability: Option<ProviderCapabilities>,
}

impl SelectionCriteria {
    /// Start criteria for a model id with no further restrictions.
    #[must_use]
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            preferred_provider: None,
            excluded_providers: Vec::new(),
            required_capability: None,
        }
    }

    /// Prefer a specific provider instance, tried before priority ordering.
    #[must_use]
    pub fn preferred(mut self, provider_id: impl Into<String>) -> Self {
        self.preferred_provider = Some(provider_id.into());
        self
    }

    /// Exclude a provider instance, e.g. one already attempted this request.
    #[must_use]
    pub fn exclude(mut self, provider_id: impl Into<String>) -> Self {
        self.excluded_providers.push(provider_id.into());
        self
    }

    /// Require a capability the model must support.
    #[must_use]
    pub fn require_capability(mut self, capability: ProviderCapabilities) -> Self {
        self.required_capability = Some(capability);
        self
    }
}

/// Registry of which providers serve which models, built from configuration.
pub struct ProviderSelector {
    by_model: HashMap<String, Vec<ProviderCandidate>>,
}

impl ProviderSelector {
    /// Build the registry from the configured provider catalog.
    #[must_use]
    pub fn new(providers: &[ProviderSettings]) -> Self {
        let mut by_model: HashMap<String, Vec<ProviderCandidate>> = HashMap::new();
        for provider in providers.iter().filter(|p| p.enabled) {
            for entry in &provider.models {
                by_model
                    .entry(entry.info.id.clone())
                    .or_default()
                    .push(ProviderCandidate {
                        provider_id: provider.id.clone(),
                        upstream_ref: entry.upstream_ref.clone(),
                        priority: entry.priority,
                        weight: entry.weight,
                        model_info: entry.info.clone(),
                    });
            }
        }
        for candidates in by_model.values_mut() {
            candidates.sort_by_key(|c| c.priority);
        }
        Self { by_model }
    }

    /// An empty registry, for tests and degraded startup.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            by_model: HashMap::new(),
        }
    }

    /// All distinct models known to the registry, for `/v1/models`.
    #[must_use]
    pub fn all_models(&self) -> Vec<&ModelInfo> {
        self.by_model
            .values()
            .filter_map(|candidates| candidates.first())
            .map(|c| &c.model_info)
            .collect()
    }

    /// Look up the candidates eligible to serve `criteria`, ranked by
    /// preference then priority. Excluded providers and candidates missing a
    /// required capability are dropped.
    ///
    /// # Errors
    /// Returns [`GatewayError::model_not_found`] if no provider serves the
    /// requested model at all (before exclusion filtering).
    pub fn candidates(&self, criteria: &SelectionCriteria) -> GatewayResult<Vec<ProviderCandidate>> {
        let all = self
            .by_model
            .get(&criteria.model_id)
            .ok_or_else(|| GatewayError::model_not_found(criteria.model_id.clone()))?;

        let mut eligible: Vec<ProviderCandidate> = all
            .iter()
            .filter(|c| !criteria.excluded_providers.contains(&c.provider_id))
            .filter(|c| {
                criteria
                    .required_capability
                    .map_or(true, |cap| c.model_info.capabilities.contains(&cap))
            })
            .cloned()
            .collect();

        if let Some(preferred) = &criteria.preferred_provider {
            eligible.sort_by_key(|c| (c.provider_id != *preferred, c.priority));
        }

        Ok(eligible)
    }

    /// Whether any provider serves this model at all.
    #[must_use]
    pub fn has_model(&self, model_id: &str) -> bool {
        self.by_model.contains_key(model_id)
    }
}
