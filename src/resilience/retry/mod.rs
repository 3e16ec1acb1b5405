//! Adaptive retry with delays learned from past recoveries.
//!
//! Each failure is classified into an error type. Until an error type has
//! been seen [`RetryPolicy::min_observations`] times and has at least one
//! measured recovery, retries use standard exponential backoff. After that,
//! the base delay is the mean recovery time for that type, scaled up when
//! retries after it tend to fail.

mod pattern;
mod policy;

pub use pattern::{ErrorPattern, UNKNOWN_ERROR_TYPE, classify};
pub use policy::{RetryPolicy, RetryPolicyOverride};

use crate::protocol::domain::AgentFault;
use chrono::{DateTime, Utc};
use mockable::Clock;
use rand::Rng;
use std::{
    collections::HashMap,
    fmt,
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock},
    time::Duration,
};
use tracing::{debug, warn};

/// Predicate deciding whether a fault is worth another attempt.
pub type RetryPredicate = Arc<dyn Fn(&AgentFault) -> bool + Send + Sync>;

/// Per-call options for [`AdaptiveRetryStrategy::execute_with`].
#[derive(Clone, Default)]
pub struct RetryOptions {
    /// Replaces the default predicate, [`AgentFault::is_retryable`].
    pub should_retry: Option<RetryPredicate>,
    /// Selects a per-dependency policy override.
    pub dependency_key: Option<String>,
}

impl RetryOptions {
    /// Options selecting the override registered for `dependency`.
    #[must_use]
    pub fn for_dependency(dependency: impl Into<String>) -> Self {
        Self {
            should_retry: None,
            dependency_key: Some(dependency.into()),
        }
    }

    /// Sets a custom retry predicate.
    #[must_use]
    pub fn with_predicate(
        mut self,
        predicate: impl Fn(&AgentFault) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.should_retry = Some(Arc::new(predicate));
        self
    }
}

impl fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("should_retry", &self.should_retry.is_some())
            .field("dependency_key", &self.dependency_key)
            .finish()
    }
}

/// Retry executor that learns per error type.
///
/// Pattern bookkeeping is shared by every caller of one strategy instance
/// and is updated only once an attempt's outcome is known.
#[derive(Debug)]
pub struct AdaptiveRetryStrategy<C: Clock> {
    policy: RetryPolicy,
    overrides: RwLock<HashMap<String, RetryPolicyOverride>>,
    patterns: Mutex<HashMap<String, ErrorPattern>>,
    clock: Arc<C>,
}

impl<C: Clock> AdaptiveRetryStrategy<C> {
    /// Creates a strategy with no learned patterns.
    #[must_use]
    pub fn new(policy: RetryPolicy, clock: Arc<C>) -> Self {
        Self {
            policy,
            overrides: RwLock::new(HashMap::new()),
            patterns: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Returns the global policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Registers an override for `dependency`, replacing any previous one.
    pub fn register_override(&self, dependency: impl Into<String>, policy: RetryPolicyOverride) {
        self.overrides
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(dependency.into(), policy);
    }

    /// Returns the effective policy for an optional dependency key.
    #[must_use]
    pub fn policy_for(&self, dependency: Option<&str>) -> RetryPolicy {
        let overrides = self.overrides.read().unwrap_or_else(PoisonError::into_inner);
        dependency
            .and_then(|key| overrides.get(key))
            .map_or_else(|| self.policy.clone(), |o| o.apply(&self.policy))
    }

    /// Runs `action` with the global policy and default predicate.
    ///
    /// # Errors
    ///
    /// Returns the last fault once retries are exhausted or a fault is not
    /// retryable.
    pub async fn execute<F, Fut, T>(&self, action: F) -> Result<T, AgentFault>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AgentFault>>,
    {
        self.execute_with(action, RetryOptions::default()).await
    }

    /// Runs `action`, retrying retryable faults up to the effective
    /// `max_retries`.
    ///
    /// # Errors
    ///
    /// Returns the last fault once retries are exhausted or a fault is
    /// rejected by the predicate.
    pub async fn execute_with<F, Fut, T>(
        &self,
        mut action: F,
        options: RetryOptions,
    ) -> Result<T, AgentFault>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AgentFault>>,
    {
        let policy = self.policy_for(options.dependency_key.as_deref());
        let dependency = options.dependency_key.as_deref().unwrap_or("-");
        let mut retry: u32 = 0;
        let mut first_failure_at: Option<DateTime<Utc>> = None;
        let mut last_error_type: Option<String> = None;

        loop {
            match action().await {
                Ok(value) => {
                    if let Some(error_type) = last_error_type {
                        let started = first_failure_at.unwrap_or_else(|| self.clock.utc());
                        self.record_recovery(&error_type, started, &policy);
                    }
                    return Ok(value);
                }
                Err(fault) => {
                    let error_type = classify(&fault);
                    let now = self.clock.utc();
                    first_failure_at.get_or_insert(now);

                    let delay = self.base_delay(&error_type, retry, &policy);
                    self.record_failure(&error_type, last_error_type.as_deref(), now, &policy);

                    let allowed = options
                        .should_retry
                        .as_ref()
                        .map_or_else(|| fault.is_retryable(), |predicate| predicate(&fault));
                    if !allowed || retry >= policy.max_retries {
                        debug!(
                            dependency,
                            error_type = %error_type,
                            attempts = retry + 1,
                            "giving up"
                        );
                        return Err(fault);
                    }

                    let delay = with_jitter(delay, policy.jitter_ratio);
                    warn!(
                        dependency,
                        error_type = %error_type,
                        attempt = retry + 1,
                        max_retries = policy.max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "retrying after failure"
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                    last_error_type = Some(error_type);
                }
            }
        }
    }

    /// Returns the delay before retry `retry` (0-based) for `error_type`,
    /// before jitter.
    #[must_use]
    pub fn base_delay(&self, error_type: &str, retry: u32, policy: &RetryPolicy) -> Duration {
        let factor = 2_u32.saturating_pow(retry);
        let learned = self.lock_patterns().get(error_type).and_then(|pattern| {
            let enough = pattern.occurrence_count >= policy.min_observations
                && pattern.recovery_samples > 0;
            enough.then(|| learned_base(pattern, policy))
        });

        match learned {
            Some(base) => base.saturating_mul(factor).min(policy.max_adaptive_delay),
            None => policy
                .initial_delay
                .saturating_mul(factor)
                .min(policy.max_delay),
        }
    }

    /// Returns a snapshot of every learned pattern, ordered by error type.
    #[must_use]
    pub fn patterns(&self) -> Vec<ErrorPattern> {
        let mut patterns: Vec<_> = self.lock_patterns().values().cloned().collect();
        patterns.sort_by(|a, b| a.error_type.cmp(&b.error_type));
        patterns
    }

    /// Returns the learned pattern for one error type.
    #[must_use]
    pub fn pattern(&self, error_type: &str) -> Option<ErrorPattern> {
        self.lock_patterns().get(error_type).cloned()
    }

    /// Forgets every learned pattern.
    pub fn reset_patterns(&self) {
        self.lock_patterns().clear();
    }

    fn record_failure(
        &self,
        error_type: &str,
        previous: Option<&str>,
        now: DateTime<Utc>,
        policy: &RetryPolicy,
    ) {
        let mut patterns = self.lock_patterns();
        if let Some(previous_type) = previous {
            if let Some(pattern) = patterns.get_mut(previous_type) {
                pattern.record_retry_outcome(false, policy.success_window);
            }
        }
        patterns
            .entry(error_type.to_owned())
            .or_insert_with(|| ErrorPattern::new(error_type.to_owned(), now))
            .record_occurrence(now);
    }

    fn record_recovery(&self, error_type: &str, started: DateTime<Utc>, policy: &RetryPolicy) {
        let elapsed = self
            .clock
            .utc()
            .signed_duration_since(started)
            .to_std()
            .unwrap_or(Duration::ZERO);
        if let Some(pattern) = self.lock_patterns().get_mut(error_type) {
            pattern.record_retry_outcome(true, policy.success_window);
            pattern.record_recovery(elapsed);
        }
    }

    fn lock_patterns(&self) -> MutexGuard<'_, HashMap<String, ErrorPattern>> {
        self.patterns.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Mean recovery time scaled by the pattern's success rate: ×1.5 below
/// 0.5, and a further ×2 below the policy floor.
fn learned_base(pattern: &ErrorPattern, policy: &RetryPolicy) -> Duration {
    let mut multiplier = 1.0;
    if pattern.success_rate < 0.5 {
        multiplier = scale_factor(multiplier, 1.5);
    }
    if pattern.success_rate < policy.success_rate_floor {
        multiplier = scale_factor(multiplier, 2.0);
    }
    scale(
        pattern.average_recovery_time.min(policy.max_adaptive_delay),
        multiplier,
    )
}

#[expect(
    clippy::float_arithmetic,
    reason = "multipliers are small positive constants"
)]
fn scale_factor(current: f64, by: f64) -> f64 {
    current * by
}

#[expect(
    clippy::float_arithmetic,
    reason = "delays are scaled by bounded positive factors"
)]
fn scale(delay: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

/// Adds a uniform random jitter of `0..=ratio` of `delay`.
fn with_jitter(delay: Duration, ratio: f64) -> Duration {
    if delay.is_zero() || !ratio.is_finite() || ratio <= 0.0 {
        return delay;
    }
    let fraction = rand::thread_rng().gen_range(0.0..=ratio.min(1.0));
    delay.saturating_add(scale(delay, fraction))
}
