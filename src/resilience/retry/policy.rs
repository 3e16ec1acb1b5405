//! Retry policy and per-dependency overrides.

use crate::config::serde_millis;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Global retry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Extra attempts after the first.
    pub max_retries: u32,
    /// Base delay for standard exponential backoff.
    #[serde(rename = "initial_delay_ms", with = "serde_millis")]
    pub initial_delay: Duration,
    /// Cap for standard exponential backoff.
    #[serde(rename = "max_delay_ms", with = "serde_millis")]
    pub max_delay: Duration,
    /// Cap for learned delays.
    #[serde(rename = "max_adaptive_delay_ms", with = "serde_millis")]
    pub max_adaptive_delay: Duration,
    /// Prior occurrences of an error type needed before its learned delay
    /// is used.
    pub min_observations: u64,
    /// Success rate below which learned delays are doubled.
    pub success_rate_floor: f64,
    /// Number of retry outcomes kept for the rolling success rate.
    pub success_window: usize,
    /// Upper bound of the random jitter, as a fraction of the delay.
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(30_000),
            max_adaptive_delay: Duration::from_millis(60_000),
            min_observations: 3,
            success_rate_floor: 0.1,
            success_window: 20,
            jitter_ratio: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Returns a policy that never waits, for tests and local tooling.
    #[must_use]
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_adaptive_delay: Duration::ZERO,
            jitter_ratio: 0.0,
            ..Self::default()
        }
    }
}

/// Partial policy merged over the global [`RetryPolicy`] for one dependency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicyOverride {
    /// Overrides [`RetryPolicy::max_retries`].
    pub max_retries: Option<u32>,
    /// Overrides [`RetryPolicy::initial_delay`].
    #[serde(rename = "initial_delay_ms", with = "serde_millis::option")]
    pub initial_delay: Option<Duration>,
    /// Overrides [`RetryPolicy::max_delay`].
    #[serde(rename = "max_delay_ms", with = "serde_millis::option")]
    pub max_delay: Option<Duration>,
    /// Overrides [`RetryPolicy::max_adaptive_delay`].
    #[serde(rename = "max_adaptive_delay_ms", with = "serde_millis::option")]
    pub max_adaptive_delay: Option<Duration>,
    /// Overrides [`RetryPolicy::jitter_ratio`].
    pub jitter_ratio: Option<f64>,
}

impl RetryPolicyOverride {
    /// Returns `base` with every set field replaced.
    ///
    /// # Examples
    ///
    /// ```
    /// use concierge::resilience::retry::{RetryPolicy, RetryPolicyOverride};
    ///
    /// let merged = RetryPolicyOverride { max_retries: Some(1), ..Default::default() }
    ///     .apply(&RetryPolicy::default());
    /// assert_eq!(merged.max_retries, 1);
    /// assert_eq!(merged.initial_delay, RetryPolicy::default().initial_delay);
    /// ```
    #[must_use]
    pub fn apply(&self, base: &RetryPolicy) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(base.max_retries),
            initial_delay: self.initial_delay.unwrap_or(base.initial_delay),
            max_delay: self.max_delay.unwrap_or(base.max_delay),
            max_adaptive_delay: self.max_adaptive_delay.unwrap_or(base.max_adaptive_delay),
            jitter_ratio: self.jitter_ratio.unwrap_or(base.jitter_ratio),
            ..base.clone()
        }
    }
}
