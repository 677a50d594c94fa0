//! Cost controller: budget admission and usage recording.
//!
//! Tracks three scopes of daily usage — global, per-tenant, per-user — each
//! reset at UTC midnight. Admission uses a reserve-then-settle pattern so that
//! concurrent `check`/`record` pairs cannot jointly overspend a limit by more
//! than one in-flight estimate.

use chrono::{Datelike, NaiveDate, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

/// Configured spend limits for one scope (global, a tenant, or a user).
/// `None` means unlimited in that scope.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BudgetLimits {
    /// Maximum USD cost admitted per UTC day.
    pub daily_limit_usd: Option<f64>,
    /// Fractions of `daily_limit_usd` (0.0-1.0) at which an alert fires, e.g. `[0.8, 0.95]`.
    #[serde(default)]
    pub alert_thresholds: Vec<f64>,
}

impl BudgetLimits {
    /// No limit configured.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// A daily USD cap with no alerting.
    #[must_use]
    pub fn daily(limit_usd: f64) -> Self {
        Self {
            daily_limit_usd: Some(limit_usd),
            alert_thresholds: Vec::new(),
        }
    }

    /// Attach alert thresholds (fractions of the daily limit).
    #[must_use]
    pub fn with_alert_thresholds(mut self, thresholds: Vec<f64>) -> Self {
        self.alert_thresholds = thresholds;
        self
    }
}

/// A UTC calendar month, used as the monthly rollover key.
type YearMonth = (i32, u32);

fn year_month(date: NaiveDate) -> YearMonth {
    (date.year(), date.month())
}

/// One accumulation window (the day counter or the month counter) for a scope.
#[derive(Debug, Default)]
struct Window<K: Copy + Eq> {
    key: Mutex<Option<K>>,
    committed_micros: AtomicU64,
    requests: AtomicU64,
    tokens: AtomicU64,
}

impl<K: Copy + Eq> Window<K> {
    fn roll_if_needed(&self, current_key: K) {
        let mut key = self.key.lock();
        if *key != Some(current_key) {
            *key = Some(current_key);
            self.committed_micros.store(0, Ordering::SeqCst);
            self.requests.store(0, Ordering::SeqCst);
            self.tokens.store(0, Ordering::SeqCst);
        }
    }

    fn committed_usd(&self) -> f64 {
        self.committed_micros.load(Ordering::SeqCst) as f64 / 1_000_000.0
    }

    fn requests(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    fn tokens(&self) -> u64 {
        self.tokens.load(Ordering::SeqCst)
    }

    /// Record a completed request against this window: one request, its
    /// token count. Cost is settled separately via `settle`.
    fn note_usage(&self, current_key: K, tokens: u64) {
        self.roll_if_needed(current_key);
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.tokens.fetch_add(tokens, Ordering::SeqCst);
    }

    fn reserve(&self, current_key: K, amount_usd: f64, limit_usd: Option<f64>) -> Result<(), f64> {
        self.roll_if_needed(current_key);
        let amount_micros = (amount_usd * 1_000_000.0).round() as u64;
        loop {
            let current = self.committed_micros.load(Ordering::SeqCst);
            if let Some(limit) = limit_usd {
                let limit_micros = (limit * 1_000_000.0).round() as u64;
                let projected = current.saturating_add(amount_micros);
                if projected > limit_micros {
                    let remaining = (limit_micros.saturating_sub(current)) as f64 / 1_000_000.0;
                    return Err(remaining.max(0.0));
                }
            }
            let new_value = current + amount_micros;
            if self
                .committed_micros
                .compare_exchange(current, new_value, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Ok(());
            }
        }
    }

    /// Replace a reservation with the actual cost (may be more or less).
    fn settle(&self, current_key: K, reserved_usd: f64, actual_usd: f64) {
        self.roll_if_needed(current_key);
        let reserved_micros = (reserved_usd * 1_000_000.0).round() as u64;
        let actual_micros = (actual_usd * 1_000_000.0).round() as u64;
        loop {
            let current = self.committed_micros.load(Ordering::SeqCst);
            let new_value = current
                .saturating_sub(reserved_micros)
                .saturating_add(actual_micros);
            if self
                .committed_micros
                .compare_exchange(current, new_value, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return;
            }
        }
    }
}

/// Requests, tokens, and cost accumulated for one model or provider within a
/// `DailyUsage`'s by-model/by-provider sub-aggregate.
#[derive(Debug, Default)]
struct BreakdownAccum {
    requests: AtomicU64,
    tokens: AtomicU64,
    cost_micros: AtomicU64,
}

impl BreakdownAccum {
    fn add(&self, tokens: u64, cost_usd: f64) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.tokens.fetch_add(tokens, Ordering::SeqCst);
        let cost_micros = (cost_usd * 1_000_000.0).round().max(0.0) as u64;
        self.cost_micros.fetch_add(cost_micros, Ordering::SeqCst);
    }

    fn snapshot(&self) -> UsageBreakdown {
        UsageBreakdown {
            requests: self.requests.load(Ordering::SeqCst),
            tokens: self.tokens.load(Ordering::SeqCst),
            cost_usd: self.cost_micros.load(Ordering::SeqCst) as f64 / 1_000_000.0,
        }
    }
}

/// Requests, tokens, and cost attributed to a single model or provider over
/// the current UTC day.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UsageBreakdown {
    /// Number of requests attributed to this model/provider today.
    pub requests: u64,
    /// Tokens attributed to this model/provider today.
    pub tokens: u64,
    /// USD cost attributed to this model/provider today.
    pub cost_usd: f64,
}

/// Usage accumulated for one scope, aggregated both per UTC day and per UTC
/// calendar month. The day window resets at UTC midnight; the month window
/// resets at the first-of-month boundary, aggregating across the days in
/// between (§4.7 "Monthly counters aggregate across days and reset at month
/// boundary"). Per-model and per-provider sub-aggregates track only the
/// current UTC day.
#[derive(Debug, Default)]
struct DailyUsage {
    day: Window<NaiveDate>,
    month: Window<YearMonth>,
    alerted_thresholds: Mutex<Vec<(NaiveDate, u32)>>,
    breakdown_date: Mutex<Option<NaiveDate>>,
    by_model: DashMap<String, BreakdownAccum>,
    by_provider: DashMap<String, BreakdownAccum>,
}

impl DailyUsage {
    fn committed_usd(&self) -> f64 {
        self.day.committed_usd()
    }

    fn committed_usd_month(&self, today: NaiveDate) -> f64 {
        self.month.roll_if_needed(year_month(today));
        self.month.committed_usd()
    }

    fn requests_today(&self) -> u64 {
        self.day.requests()
    }

    fn tokens_today(&self) -> u64 {
        self.day.tokens()
    }

    fn requests_month(&self, today: NaiveDate) -> u64 {
        self.month.roll_if_needed(year_month(today));
        self.month.requests()
    }

    fn tokens_month(&self, today: NaiveDate) -> u64 {
        self.month.roll_if_needed(year_month(today));
        self.month.tokens()
    }

    fn reserve(&self, today: NaiveDate, amount_usd: f64, limit_usd: Option<f64>) -> Result<(), f64> {
        self.day.reserve(today, amount_usd, limit_usd)?;
        // Monthly has no configured limit in this controller today; still
        // tracked so /v1/usage?period=monthly reflects committed spend.
        self.month.reserve(year_month(today), amount_usd, None).ok();
        Ok(())
    }

    /// Unwind a reservation that was never fulfilled (e.g. a sibling scope
    /// denied the request). Does not count as a completed request.
    fn settle(&self, today: NaiveDate, reserved_usd: f64, actual_usd: f64) {
        self.day.settle(today, reserved_usd, actual_usd);
        self.month.settle(year_month(today), reserved_usd, actual_usd);
        self.alerted_thresholds.lock().retain(|(d, _)| *d == today);
    }

    /// Replace a reservation with the actual cost and count the completed
    /// request against the day/month totals and the model/provider
    /// sub-aggregates.
    fn record(&self, today: NaiveDate, reserved_usd: f64, actual_usd: f64, tokens: u64, model: &str, provider: &str) {
        self.settle(today, reserved_usd, actual_usd);
        self.day.note_usage(today, tokens);
        self.month.note_usage(year_month(today), tokens);

        let mut breakdown_date = self.breakdown_date.lock();
        if *breakdown_date != Some(today) {
            *breakdown_date = Some(today);
            self.by_model.clear();
            self.by_provider.clear();
        }
        drop(breakdown_date);
        self.by_model.entry(model.to_string()).or_default().add(tokens, actual_usd);
        self.by_provider.entry(provider.to_string()).or_default().add(tokens, actual_usd);
    }

    fn model_breakdown_today(&self) -> HashMap<String, UsageBreakdown> {
        self.by_model.iter().map(|e| (e.key().clone(), e.value().snapshot())).collect()
    }

    fn provider_breakdown_today(&self) -> HashMap<String, UsageBreakdown> {
        self.by_provider.iter().map(|e| (e.key().clone(), e.value().snapshot())).collect()
    }

    /// Whether an alert for `threshold_pct` on `today` was already emitted.
    fn should_alert(&self, today: NaiveDate, threshold_pct: u32) -> bool {
        let mut seen = self.alerted_thresholds.lock();
        if seen.iter().any(|(d, t)| *d == today && *t == threshold_pct) {
            false
        } else {
            seen.push((today, threshold_pct));
            true
        }
    }
}

/// Which scope a usage check/record call applies to, for alerting context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageScope {
    /// Across all tenants.
    Global,
    /// A single tenant, across its users.
    Tenant,
    /// A single user within a tenant.
    User,
}

/// Outcome of a budget admission check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AdmissionDecision {
    /// The estimated cost was reserved; proceed.
    Allowed,
    /// The estimate would exceed a configured limit.
    Denied {
        /// The scope whose limit was hit.
        scope: UsageScope,
        /// Remaining headroom in that scope, in USD.
        remaining: f64,
    },
}

/// A completed request's usage, to be recorded after the provider responds.
#[derive(Debug, Clone)]
pub struct UsageRecord {
    /// Tenant the request was made under.
    pub tenant_id: String,
    /// User the request was made under.
    pub user_id: String,
    /// Model that served the request.
    pub model: String,
    /// Provider that served the request.
    pub provider: String,
    /// Actual USD cost, as computed by the adapter from token counts.
    pub cost_usd: f64,
    /// Total tokens (prompt + completion) the provider reported, `0` for a
    /// cache hit or a request with no billable tokens.
    pub tokens: u64,
}

/// Tracks global/tenant/user daily spend and admits requests against configured limits.
pub struct CostController {
    global: DailyUsage,
    global_limits: BudgetLimits,
    tenant_limits: DashMap<String, BudgetLimits>,
    tenant_usage: DashMap<String, DailyUsage>,
    user_usage: DashMap<String, DailyUsage>,
    default_user_limits: BudgetLimits,
}

impl CostController {
    /// Build a controller with a global limit and a default per-user limit
    /// applied to users without an explicit tenant override.
    #[must_use]
    pub fn new(global_limits: BudgetLimits, default_user_limits: BudgetLimits) -> Self {
        Self {
            global: DailyUsage::default(),
            global_limits,
            tenant_limits: DashMap::new(),
            tenant_usage: DashMap::new(),
            user_usage: DashMap::new(),
            default_user_limits,
        }
    }

    /// A controller with no limits configured anywhere.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::new(BudgetLimits::unlimited(), BudgetLimits::unlimited())
    }

    /// Configure a per-tenant daily limit, overriding the default.
    pub fn set_tenant_limits(&self, tenant_id: impl Into<String>, limits: BudgetLimits) {
        self.tenant_limits.insert(tenant_id.into(), limits);
    }

    fn tenant_limit(&self, tenant_id: &str) -> BudgetLimits {
        self.tenant_limits
            .get(tenant_id)
            .map_or(BudgetLimits::unlimited(), |l| *l)
    }

    fn user_key(tenant_id: &str, user_id: &str) -> String {
        format!("{tenant_id}:{user_id}")
    }

    /// Admit or deny a request given its estimated cost, reserving the
    /// estimate against each applicable scope on success.
    ///
    /// # Errors
    /// Does not error; denial is communicated via `AdmissionDecision::Denied`.
    pub fn check(&self, tenant_id: &str, user_id: &str, estimated_cost_usd: f64) -> AdmissionDecision {
        let today = Utc::now().date_naive();
        let tenant_limits = self.tenant_limit(tenant_id);
        let tenant_usage = self.tenant_usage.entry(tenant_id.to_string()).or_default();
        let user_key = Self::user_key(tenant_id, user_id);
        let user_usage = self.user_usage.entry(user_key).or_default();

        if self
            .global
            .reserve(today, estimated_cost_usd, self.global_limits.daily_limit_usd)
            .is_err()
        {
            let remaining = self.combined_headroom(today, tenant_limits, &tenant_usage, &user_usage);
            return AdmissionDecision::Denied {
                scope: UsageScope::Global,
                remaining,
            };
        }

        if tenant_usage
            .reserve(today, estimated_cost_usd, tenant_limits.daily_limit_usd)
            .is_err()
        {
            self.global.settle(today, estimated_cost_usd, 0.0);
            let remaining = self.combined_headroom(today, tenant_limits, &tenant_usage, &user_usage);
            return AdmissionDecision::Denied {
                scope: UsageScope::Tenant,
                remaining,
            };
        }

        if user_usage
            .reserve(today, estimated_cost_usd, self.default_user_limits.daily_limit_usd)
            .is_err()
        {
            self.global.settle(today, estimated_cost_usd, 0.0);
            tenant_usage.settle(today, estimated_cost_usd, 0.0);
            let remaining = self.combined_headroom(today, tenant_limits, &tenant_usage, &user_usage);
            return AdmissionDecision::Denied {
                scope: UsageScope::User,
                remaining,
            };
        }

        self.maybe_alert(UsageScope::Global, "global", &self.global, self.global_limits, today);
        self.maybe_alert(UsageScope::Tenant, tenant_id, &tenant_usage, tenant_limits, today);

        AdmissionDecision::Allowed
    }

    /// The smallest positive headroom across the global, tenant, and user
    /// scopes (§4.7: "`remaining` is the smallest of the three positive
    /// headrooms"), not just the headroom of whichever scope denied first.
    fn combined_headroom(
        &self,
        today: NaiveDate,
        tenant_limits: BudgetLimits,
        tenant_usage: &DailyUsage,
        user_usage: &DailyUsage,
    ) -> f64 {
        fn headroom(committed_usd: f64, limit_usd: Option<f64>) -> f64 {
            limit_usd.map_or(f64::INFINITY, |limit| (limit - committed_usd).max(0.0))
        }
        self.global.day.roll_if_needed(today);
        tenant_usage.day.roll_if_needed(today);
        user_usage.day.roll_if_needed(today);

        let global_headroom = headroom(self.global.committed_usd(), self.global_limits.daily_limit_usd);
        let tenant_headroom = headroom(tenant_usage.committed_usd(), tenant_limits.daily_limit_usd);
        let user_headroom = headroom(user_usage.committed_usd(), self.default_user_limits.daily_limit_usd);

        global_headroom.min(tenant_headroom).min(user_headroom)
    }

    fn maybe_alert(&self, scope: UsageScope, label: &str, usage: &DailyUsage, limits: BudgetLimits, today: NaiveDate) {
        let Some(limit) = limits.daily_limit_usd else { return };
        if limit <= 0.0 {
            return;
        }
        let fraction = usage.committed_usd() / limit;
        for threshold in &limits.alert_thresholds {
            if fraction >= *threshold {
                let pct = (*threshold * 100.0).round() as u32;
                if usage.should_alert(today, pct) {
                    warn!(scope = ?scope, label, threshold_pct = pct, "budget alert threshold crossed");
                }
            }
        }
    }

    /// Replace a previously-admitted estimate with the actual cost, in every
    /// scope it was reserved against.
    pub fn record(&self, estimated_cost_usd: f64, record: &UsageRecord) {
        let today = Utc::now().date_naive();
        self.global.record(
            today,
            estimated_cost_usd,
            record.cost_usd,
            record.tokens,
            &record.model,
            &record.provider,
        );

        let tenant_usage = self.tenant_usage.entry(record.tenant_id.clone()).or_default();
        tenant_usage.record(
            today,
            estimated_cost_usd,
            record.cost_usd,
            record.tokens,
            &record.model,
            &record.provider,
        );

        let user_key = Self::user_key(&record.tenant_id, &record.user_id);
        let user_usage = self.user_usage.entry(user_key).or_default();
        user_usage.record(
            today,
            estimated_cost_usd,
            record.cost_usd,
            record.tokens,
            &record.model,
            &record.provider,
        );

        info!(
            tenant_id = %record.tenant_id,
            user_id = %record.user_id,
            model = %record.model,
            provider = %record.provider,
            cost_usd = record.cost_usd,
            "usage recorded"
        );
    }

    /// Current committed spend for a tenant today, in USD.
    #[must_use]
    pub fn tenant_spend_today(&self, tenant_id: &str) -> f64 {
        self.tenant_usage.get(tenant_id).map_or(0.0, |u| u.committed_usd())
    }

    /// Current committed spend globally today, in USD.
    #[must_use]
    pub fn global_spend_today(&self) -> f64 {
        self.global.committed_usd()
    }

    /// Current committed spend for a tenant in the running UTC month.
    #[must_use]
    pub fn tenant_spend_month(&self, tenant_id: &str) -> f64 {
        let today = Utc::now().date_naive();
        self.tenant_usage
            .get(tenant_id)
            .map_or(0.0, |u| u.committed_usd_month(today))
    }

    /// Current committed spend across every tenant in the running UTC month.
    #[must_use]
    pub fn global_spend_month(&self) -> f64 {
        self.global.committed_usd_month(Utc::now().date_naive())
    }

    /// Requests recorded for a tenant today.
    #[must_use]
    pub fn tenant_requests_today(&self, tenant_id: &str) -> u64 {
        self.tenant_usage.get(tenant_id).map_or(0, |u| u.requests_today())
    }

    /// Requests recorded for a tenant in the running UTC month.
    #[must_use]
    pub fn tenant_requests_month(&self, tenant_id: &str) -> u64 {
        let today = Utc::now().date_naive();
        self.tenant_usage.get(tenant_id).map_or(0, |u| u.requests_month(today))
    }

    /// Tokens recorded for a tenant today.
    #[must_use]
    pub fn tenant_tokens_today(&self, tenant_id: &str) -> u64 {
        self.tenant_usage.get(tenant_id).map_or(0, |u| u.tokens_today())
    }

    /// Tokens recorded for a tenant in the running UTC month.
    #[must_use]
    pub fn tenant_tokens_month(&self, tenant_id: &str) -> u64 {
        let today = Utc::now().date_naive();
        self.tenant_usage.get(tenant_id).map_or(0, |u| u.tokens_month(today))
    }

    /// Per-model usage breakdown for a tenant today.
    #[must_use]
    pub fn tenant_model_breakdown_today(&self, tenant_id: &str) -> HashMap<String, UsageBreakdown> {
        self.tenant_usage
            .get(tenant_id)
            .map_or_else(HashMap::new, |u| u.model_breakdown_today())
    }

    /// Per-provider usage breakdown for a tenant today.
    #[must_use]
    pub fn tenant_provider_breakdown_today(&self, tenant_id: &str) -> HashMap<String, UsageBreakdown> {
        self.tenant_usage
            .get(tenant_id)
            .map_or_else(HashMap::new, |u| u.provider_breakdown_today())
    }

    /// Requests recorded globally today.
    #[must_use]
    pub fn global_requests_today(&self) -> u64 {
        self.global.requests_today()
    }

    /// Requests recorded globally in the running UTC month.
    #[must_use]
    pub fn global_requests_month(&self) -> u64 {
        self.global.requests_month(Utc::now().date_naive())
    }

    /// Tokens recorded globally today.
    #[must_use]
    pub fn global_tokens_today(&self) -> u64 {
        self.global.tokens_today()
    }

    /// Tokens recorded globally in the running UTC month.
    #[must_use]
    pub fn global_tokens_month(&self) -> u64 {
        self.global.tokens_month(Utc::now().date_naive())
    }

    /// Per-model usage breakdown across every tenant today.
    #[must_use]
    pub fn global_model_breakdown_today(&self) -> HashMap<String, UsageBreakdown> {
        self.global.model_breakdown_today()
    }

    /// Per-provider usage breakdown across every tenant today.
    #[must_use]
    pub fn global_provider_breakdown_today(&self) -> HashMap<String, UsageBreakdown> {
        self.global.provider_breakdown_today()
    }

    /// Record zero-cost usage for a cache hit: still counts as a completed
    /// request against every scope's daily/monthly request counters, but
    /// commits no spend.
    pub fn record_cache_hit(&self, tenant_id: &str, user_id: &str, model: &str, provider: &str) {
        self.record(
            0.0,
            &UsageRecord {
                tenant_id: tenant_id.to_string(),
                user_id: user_id.to_string(),
                model: model.to_string(),
                provider: provider.to_string(),
                cost_usd: 0.0,
                tokens: 0,
            },
        );
    }
}
