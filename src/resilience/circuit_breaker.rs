//! Per-dependency circuit breakers.
//!
//! A breaker stops calling a dependency after repeated failures and lets
//! probe calls through once the reset timeout has passed.
//! The OPEN to HALF_OPEN transition is evaluated lazily on the next call; no
//! background timer runs.
//!
//! Half-open probes are not rate limited: every call arriving while the
//! breaker is half-open is attempted.

use crate::{
    config::serde_millis,
    protocol::domain::{AgentFault, ErrorKind},
};
use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock},
    time::Duration,
};
use tracing::{debug, info, warn};

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls fail fast.
    Open,
    /// Probe calls are let through to test recovery.
    HalfOpen,
}

/// Thresholds and timeouts for one breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open a closed breaker.
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close the breaker.
    pub success_threshold: u32,
    /// Time after the last failure before a probe is allowed.
    #[serde(rename = "reset_timeout_ms", with = "serde_millis")]
    pub reset_timeout: Duration,
    /// Upper bound on a single protected call.
    #[serde(rename = "call_timeout_ms", with = "serde_millis")]
    pub call_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(60),
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// Partial breaker configuration merged over the registry defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerOverride {
    /// Overrides [`CircuitBreakerConfig::failure_threshold`].
    pub failure_threshold: Option<u32>,
    /// Overrides [`CircuitBreakerConfig::success_threshold`].
    pub success_threshold: Option<u32>,
    /// Overrides [`CircuitBreakerConfig::reset_timeout`].
    #[serde(rename = "reset_timeout_ms", with = "serde_millis::option")]
    pub reset_timeout: Option<Duration>,
    /// Overrides [`CircuitBreakerConfig::call_timeout`].
    #[serde(rename = "call_timeout_ms", with = "serde_millis::option")]
    pub call_timeout: Option<Duration>,
}

impl CircuitBreakerOverride {
    /// Returns `base` with every set field replaced.
    #[must_use]
    pub fn apply(&self, base: &CircuitBreakerConfig) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold.unwrap_or(base.failure_threshold),
            success_threshold: self.success_threshold.unwrap_or(base.success_threshold),
            reset_timeout: self.reset_timeout.unwrap_or(base.reset_timeout),
            call_timeout: self.call_timeout.unwrap_or(base.call_timeout),
        }
    }
}

/// Snapshot of a breaker's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerStats {
    /// Dependency name.
    pub name: String,
    /// Current state.
    pub state: CircuitState,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Successes since entering half-open.
    pub consecutive_successes: u32,
    /// Instant of the most recent failure.
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Calls presented to the breaker.
    pub total_requests: u64,
    /// Calls that failed or timed out.
    pub total_failures: u64,
    /// Calls that succeeded.
    pub total_successes: u64,
    /// Calls rejected while open.
    pub total_rejections: u64,
    /// Calls answered by a fallback.
    pub total_fallbacks: u64,
}

#[derive(Debug, Clone)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure_at: Option<DateTime<Utc>>,
    total_requests: u64,
    total_failures: u64,
    total_successes: u64,
    total_rejections: u64,
    total_fallbacks: u64,
}

impl BreakerState {
    const fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_failure_at: None,
            total_requests: 0,
            total_failures: 0,
            total_successes: 0,
            total_rejections: 0,
            total_fallbacks: 0,
        }
    }
}

/// Guards one downstream dependency.
///
/// # Examples
///
/// ```
/// use concierge::clock::ManualClock;
/// use concierge::protocol::domain::{AgentFault, ErrorKind};
/// use concierge::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let config = CircuitBreakerConfig { failure_threshold: 1, ..CircuitBreakerConfig::default() };
/// let breaker = CircuitBreaker::new("billing", config, Arc::new(ManualClock::default()));
///
/// let failed: Result<(), _> = breaker
///     .execute(|| async { Err(AgentFault::new(ErrorKind::ApiError, "502")) })
///     .await;
/// assert!(failed.is_err());
/// assert_eq!(breaker.state(), CircuitState::Open);
///
/// let rejected: Result<(), _> = breaker.execute(|| async { Ok(()) }).await;
/// assert_eq!(rejected.map_err(|f| f.kind()), Err(ErrorKind::CircuitOpen));
/// # }
/// ```
#[derive(Debug)]
pub struct CircuitBreaker<C: Clock> {
    name: String,
    config: CircuitBreakerConfig,
    clock: Arc<C>,
    inner: Mutex<BreakerState>,
}

impl<C: Clock> CircuitBreaker<C> {
    /// Creates a closed breaker.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig, clock: Arc<C>) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            inner: Mutex::new(BreakerState::closed()),
        }
    }

    /// Returns the dependency name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Returns the current state, applying any due OPEN to HALF_OPEN
    /// transition.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.maybe_half_open(&mut inner);
        inner.state
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> CircuitBreakerStats {
        let mut inner = self.lock();
        self.maybe_half_open(&mut inner);
        CircuitBreakerStats {
            name: self.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            last_failure_at: inner.last_failure_at,
            total_requests: inner.total_requests,
            total_failures: inner.total_failures,
            total_successes: inner.total_successes,
            total_rejections: inner.total_rejections,
            total_fallbacks: inner.total_fallbacks,
        }
    }

    /// Runs `action` unless the breaker is open.
    ///
    /// The call is bounded by the configured call timeout; exceeding it
    /// counts as a failure. Caller-correctable faults (see
    /// [`AgentFault::is_caller_correctable`]) count as successes, so a worker
    /// that keeps answering "not found" stays reachable.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::CircuitOpen`] fault without invoking `action`
    /// while the breaker is open, an [`ErrorKind::Timeout`] fault when the
    /// call timeout elapses, or the action's own fault.
    pub async fn execute<F, Fut, T>(&self, action: F) -> Result<T, AgentFault>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AgentFault>>,
    {
        self.try_acquire()?;
        let outcome = match tokio::time::timeout(self.config.call_timeout, action()).await {
            Ok(result) => result,
            Err(_) => Err(AgentFault::timeout(format!(
                "call to {} exceeded {}ms",
                self.name,
                self.config.call_timeout.as_millis()
            ))),
        };
        match &outcome {
            Ok(_) => self.record_success(),
            // The dependency answered; the caller has to correct the request.
            Err(fault) if fault.is_caller_correctable() => self.record_success(),
            Err(fault) => self.record_failure(fault),
        }
        outcome
    }

    /// Runs `action`, answering with `fallback` when the breaker rejects the
    /// call or the protected call fails.
    ///
    /// While the breaker is open the fallback runs immediately and `action`
    /// is never invoked.
    ///
    /// # Errors
    ///
    /// Returns the fallback's fault when the fallback also fails.
    pub async fn execute_with_fallback<F, Fut, G, GFut, T>(
        &self,
        action: F,
        fallback: G,
    ) -> Result<T, AgentFault>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AgentFault>>,
        G: FnOnce(AgentFault) -> GFut,
        GFut: Future<Output = Result<T, AgentFault>>,
    {
        match self.execute(action).await {
            Ok(value) => Ok(value),
            Err(fault) => {
                self.lock().total_fallbacks += 1;
                debug!(dependency = %self.name, code = fault.code(), "running breaker fallback");
                fallback(fault).await
            }
        }
    }

    /// Forces the breaker closed and clears the consecutive counters.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.consecutive_successes = 0;
        info!(dependency = %self.name, "circuit breaker reset");
    }

    fn try_acquire(&self) -> Result<(), AgentFault> {
        let mut inner = self.lock();
        self.maybe_half_open(&mut inner);
        inner.total_requests += 1;
        if inner.state == CircuitState::Open {
            inner.total_rejections += 1;
            debug!(dependency = %self.name, "circuit open; rejecting call");
            return Err(AgentFault::new(
                ErrorKind::CircuitOpen,
                format!("circuit for {} is open", self.name),
            ));
        }
        Ok(())
    }

    fn record_success(&self) {
        let mut inner = self.lock();
        inner.total_successes += 1;
        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                    info!(dependency = %self.name, "circuit breaker closed");
                }
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self, fault: &AgentFault) {
        let now = self.clock.utc();
        let mut inner = self.lock();
        inner.total_failures += 1;
        inner.last_failure_at = Some(now);
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    warn!(
                        dependency = %self.name,
                        failures = inner.consecutive_failures,
                        code = fault.code(),
                        "circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.consecutive_successes = 0;
                warn!(dependency = %self.name, code = fault.code(), "half-open probe failed; circuit re-opened");
            }
            CircuitState::Open => {}
        }
    }

    fn maybe_half_open(&self, inner: &mut BreakerState) {
        if inner.state != CircuitState::Open {
            return;
        }
        let reset_timeout = TimeDelta::from_std(self.config.reset_timeout).unwrap_or(TimeDelta::MAX);
        let due = inner
            .last_failure_at
            .is_none_or(|at| self.clock.utc().signed_duration_since(at) >= reset_timeout);
        if due {
            inner.state = CircuitState::HalfOpen;
            inner.consecutive_successes = 0;
            debug!(dependency = %self.name, "circuit breaker half-open");
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Maps dependency names to breakers, creating them on first use.
#[derive(Debug)]
pub struct CircuitBreakerRegistry<C: Clock> {
    defaults: CircuitBreakerConfig,
    overrides: HashMap<String, CircuitBreakerOverride>,
    clock: Arc<C>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker<C>>>>,
}

impl<C: Clock> CircuitBreakerRegistry<C> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(defaults: CircuitBreakerConfig, clock: Arc<C>) -> Self {
        Self {
            defaults,
            overrides: HashMap::new(),
            clock,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a per-dependency override, applied when that dependency's
    /// breaker is first created.
    #[must_use]
    pub fn with_override(
        mut self,
        dependency: impl Into<String>,
        config: CircuitBreakerOverride,
    ) -> Self {
        self.overrides.insert(dependency.into(), config);
        self
    }

    /// Returns the effective configuration for `dependency`.
    #[must_use]
    pub fn config_for(&self, dependency: &str) -> CircuitBreakerConfig {
        self.overrides
            .get(dependency)
            .map_or_else(|| self.defaults.clone(), |o| o.apply(&self.defaults))
    }

    /// Returns the breaker for `dependency`, creating it if needed.
    pub fn get(&self, dependency: &str) -> Arc<CircuitBreaker<C>> {
        if let Some(existing) = self
            .breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(dependency)
        {
            return Arc::clone(existing);
        }
        let mut breakers = self.breakers.write().unwrap_or_else(PoisonError::into_inner);
        let breaker = breakers.entry(dependency.to_owned()).or_insert_with(|| {
            Arc::new(CircuitBreaker::new(
                dependency,
                self.config_for(dependency),
                Arc::clone(&self.clock),
            ))
        });
        Arc::clone(breaker)
    }

    /// Resets the named breaker. Returns `false` when none exists.
    pub fn reset(&self, dependency: &str) -> bool {
        let breakers = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
        breakers.get(dependency).is_some_and(|breaker| {
            breaker.reset();
            true
        })
    }

    /// Returns stats for every breaker, ordered by name.
    #[must_use]
    pub fn stats(&self) -> Vec<CircuitBreakerStats> {
        let breakers = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
        let mut stats: Vec<_> = breakers.values().map(|b| b.stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }
}
