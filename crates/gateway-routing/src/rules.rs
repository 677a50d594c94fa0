//! Tenant/model-scoped routing overrides.
//!
//! Rules let an operator steer traffic for a tenant or model glob toward or
//! away from a specific provider instance without touching the model
//! catalog's baseline priority — useful for temporary pinning during an
//! incident or a gradual migration to a new provider.

use regex::Regex;

/// What a matching rule does to the candidate list.
#[derive(Debug, Clone)]
pub enum RuleAction {
    /// Move this provider to the front of the candidate list.
    PreferProvider(String),
    /// Remove this provider from the candidate list entirely.
    ExcludeProvider(String),
}

/// Matches a request's tenant id and/or model id against a pattern.
#[derive(Debug, Clone)]
pub struct RuleMatcher {
    /// Regex over the tenant id. `None` matches any tenant.
    pub tenant_pattern: Option<Regex>,
    /// Regex over the requested model id. `None` matches any model.
    pub model_pattern: Option<Regex>,
}

impl RuleMatcher {
    /// Match any tenant and any model.
    #[must_use]
    pub fn any() -> Self {
        Self {
            tenant_pattern: None,
            model_pattern: None,
        }
    }

    /// Restrict to tenant ids matching `pattern`.
    ///
    /// # Errors
    /// Returns an error if `pattern` is not a valid regex.
    pub fn with_tenant(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.tenant_pattern = Some(Regex::new(pattern)?);
        Ok(self)
    }

    /// Restrict to model ids matching `pattern`.
    ///
    /// # Errors
    /// Returns an error if `pattern` is not a valid regex.
    pub fn with_model(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.model_pattern = Some(Regex::new(pattern)?);
        Ok(self)
    }

    fn matches(&self, tenant_id: &str, model_id: &str) -> bool {
        self.tenant_pattern
            .as_ref()
            .map_or(true, |re| re.is_match(tenant_id))
            && self
                .model_pattern
                .as_ref()
                .map_or(true, |re| re.is_match(model_id))
    }
}

/// One routing override: a matcher and the action to take when it matches.
#[derive(Debug, Clone)]
pub struct RoutingRule {
    /// Name, for logs and admin inspection.
    pub name: String,
    /// What this rule matches against.
    pub matcher: RuleMatcher,
    /// What happens to the candidate list when it matches.
    pub action: RuleAction,
}

impl RoutingRule {
    /// Construct a named rule.
    #[must_use]
    pub fn new(name: impl Into<String>, matcher: RuleMatcher, action: RuleAction) -> Self {
        Self {
            name: name.into(),
            matcher,
            action,
        }
    }
}

/// An ordered set of routing rules, applied in sequence to a candidate list.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<RoutingRule>,
}

impl RuleSet {
    /// An empty rule set.
    #[must_use]
    pub fn new(rules: Vec<RoutingRule>) -> Self {
        Self { rules }
    }

    /// Reorder/filter `provider_ids` (in priority order) according to every
    /// rule matching `tenant_id`/`model_id`, applied in configured order.
    #[must_use]
    pub fn apply(&self, tenant_id: &str, model_id: &str, mut provider_ids: Vec<String>) -> Vec<String> {
        for rule in &self.rules {
            if !rule.matcher.matches(tenant_id, model_id) {
                continue;
            }
            match &rule.action {
                RuleAction::ExcludeProvider(id) => provider_ids.retain(|p| p != id),
                RuleAction::PreferProvider(id) => {
                    if let Some(pos) = provider_ids.iter().position(|p| p == id) {
                        let preferred = provider_ids.remove(pos);
                        provider_ids.insert(0, preferred);
                    }
                }
            }
        }
        provider_ids
    }
}
