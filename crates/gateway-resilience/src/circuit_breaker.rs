//! Circuit breaker pattern implementation.
//!
//! The circuit breaker prevents cascading failures by stopping requests to a
//! failing provider and allowing it time to recover. Half-open admission is
//! strictly one-at-a-time: exactly one caller observes `check() == Ok` after
//! the reset timeout elapses, before any outcome of that probe is recorded.

use gateway_core::GatewayError;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally
    Closed = 0,
    /// Circuit is open, requests are rejected
    Open = 1,
    /// Circuit is half-open, testing if service recovered
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Closed,
            1 => Self::Open,
            2 => Self::HalfOpen,
            _ => Self::Closed,
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of failures before opening the circuit
    pub failure_threshold: u32,
    /// Number of successes required to close the circuit from half-open.
    /// The spec requires a single successful probe to close the circuit, so
    /// this defaults to 1.
    pub success_threshold: u32,
    /// Time to wait before testing the circuit (half-open)
    pub timeout: Duration,
    /// Minimum requests before the failure threshold is considered
    pub min_requests: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 1,
            timeout: Duration::from_secs(30),
            min_requests: 1,
        }
    }
}

/// Circuit breaker for a single provider
pub struct CircuitBreaker {
    /// Provider identifier
    provider_id: String,
    /// Configuration
    config: CircuitBreakerConfig,
    /// Current state (atomic for lock-free reads)
    state: AtomicU8,
    /// Failure count in current window
    failure_count: AtomicU32,
    /// Success count in half-open state
    half_open_successes: AtomicU32,
    /// Total request count in window
    request_count: AtomicU32,
    /// Timestamp when circuit opened (milliseconds since epoch)
    opened_at: AtomicU64,
    /// Whether the single half-open probe slot has been claimed
    half_open_admitted: AtomicBool,
    /// Lock serializing state transitions
    transition_lock: RwLock<()>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    #[must_use]
    pub fn new(provider_id: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            provider_id: provider_id.into(),
            config,
            state: AtomicU8::new(CircuitState::Closed as u8),
            failure_count: AtomicU32::new(0),
            half_open_successes: AtomicU32::new(0),
            request_count: AtomicU32::new(0),
            opened_at: AtomicU64::new(0),
            half_open_admitted: AtomicBool::new(false),
            transition_lock: RwLock::new(()),
        }
    }

    /// Create with default configuration
    #[must_use]
    pub fn with_defaults(provider_id: impl Into<String>) -> Self {
        Self::new(provider_id, CircuitBreakerConfig::default())
    }

    /// Get the provider ID
    #[must_use]
    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    /// Get the current state
    #[must_use]
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Check if the circuit allows the next request to proceed.
    ///
    /// # Errors
    /// Returns [`GatewayError::CircuitOpen`] if the circuit is open, or if a
    /// half-open probe slot has already been claimed by another caller.
    pub fn check(&self) -> Result<(), GatewayError> {
        match self.state() {
            CircuitState::Closed => Ok(()),
            CircuitState::HalfOpen => self.try_admit_half_open(),
            CircuitState::Open => {
                if self.should_attempt_reset() {
                    self.transition_to_half_open();
                    self.try_admit_half_open()
                } else {
                    Err(GatewayError::circuit_breaker_open(&self.provider_id))
                }
            }
        }
    }

    /// Claim the single half-open admission slot via compare-and-swap.
    fn try_admit_half_open(&self) -> Result<(), GatewayError> {
        match self
            .half_open_admitted
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(_) => Err(GatewayError::circuit_breaker_open(&self.provider_id)),
        }
    }

    /// Record a successful request
    pub fn record_success(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);

        match self.state() {
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::Relaxed);
            }
            CircuitState::HalfOpen => {
                let successes = self.half_open_successes.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(
                    provider = %self.provider_id,
                    successes = successes,
                    threshold = self.config.success_threshold,
                    "Circuit breaker half-open success"
                );

                if successes >= self.config.success_threshold {
                    self.transition_to_closed();
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed request
    pub fn record_failure(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;

        match self.state() {
            CircuitState::Closed => {
                let requests = self.request_count.load(Ordering::Relaxed);
                if requests >= self.config.min_requests && failures >= self.config.failure_threshold {
                    debug!(
                        provider = %self.provider_id,
                        failures = failures,
                        threshold = self.config.failure_threshold,
                        "Circuit breaker failure threshold reached"
                    );
                    self.transition_to_open();
                }
            }
            CircuitState::HalfOpen => {
                debug!(
                    provider = %self.provider_id,
                    "Circuit breaker half-open failure, reopening"
                );
                self.transition_to_open();
            }
            CircuitState::Open => {}
        }
    }

    /// Whether the reset timeout has elapsed since the circuit opened.
    fn should_attempt_reset(&self) -> bool {
        let opened_at = self.opened_at.load(Ordering::Acquire);
        if opened_at == 0 {
            return false;
        }

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let elapsed = now.saturating_sub(opened_at);
        elapsed >= self.config.timeout.as_millis() as u64
    }

    fn transition_to_open(&self) {
        let _guard = self.transition_lock.write();

        let prev_state = self.state.swap(CircuitState::Open as u8, Ordering::Release);

        if prev_state != CircuitState::Open as u8 {
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);
            self.opened_at.store(now, Ordering::Release);
            self.half_open_successes.store(0, Ordering::Relaxed);
            self.half_open_admitted.store(false, Ordering::Release);

            warn!(provider = %self.provider_id, "Circuit breaker opened");
        }
    }

    fn transition_to_half_open(&self) {
        let _guard = self.transition_lock.write();

        let prev_state = self
            .state
            .swap(CircuitState::HalfOpen as u8, Ordering::Release);

        if prev_state == CircuitState::Open as u8 {
            self.half_open_successes.store(0, Ordering::Relaxed);
            self.half_open_admitted.store(false, Ordering::Release);

            info!(provider = %self.provider_id, "Circuit breaker half-open, testing");
        }
    }

    fn transition_to_closed(&self) {
        let _guard = self.transition_lock.write();

        self.state
            .store(CircuitState::Closed as u8, Ordering::Release);
        self.failure_count.store(0, Ordering::Relaxed);
        self.half_open_successes.store(0, Ordering::Relaxed);
        self.request_count.store(0, Ordering::Relaxed);
        self.opened_at.store(0, Ordering::Release);
        self.half_open_admitted.store(false, Ordering::Release);

        info!(provider = %self.provider_id, "Circuit breaker closed");
    }

    /// Force the circuit back to closed, e.g. for operator intervention.
    pub fn reset(&self) {
        self.transition_to_closed();
    }

    /// Force the circuit open (for testing or manual intervention)
    pub fn force_open(&self) {
        self.transition_to_open();
    }

    /// Get current statistics
    #[must_use]
    pub fn stats(&self) -> CircuitBreakerStats {
        CircuitBreakerStats {
            state: self.state(),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            request_count: self.request_count.load(Ordering::Relaxed),
            half_open_successes: self.half_open_successes.load(Ordering::Relaxed),
        }
    }
}

/// Circuit breaker statistics
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    /// Current state
    pub state: CircuitState,
    /// Failure count
    pub failure_count: u32,
    /// Total request count
    pub request_count: u32,
    /// Success count in half-open state
    pub half_open_successes: u32,
}

impl CircuitBreakerStats {
    /// Calculate failure rate
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        if self.request_count == 0 {
            0.0
        } else {
            f64::from(self.failure_count) / f64::from(self.request_count)
        }
    }
}
