//! Learned error patterns and failure classification.

use crate::{config::serde_millis, protocol::domain::AgentFault};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{collections::VecDeque, time::Duration};

/// Classification used when neither code nor message identifies a failure.
pub const UNKNOWN_ERROR_TYPE: &str = "UNKNOWN";

/// Derives the pattern key for a fault.
///
/// Faults with a specific code are keyed by that code. Generic internal
/// faults are classified from their message: "timeout", "network",
/// "connection" and "rate limit" map to their own keys and anything else is
/// [`UNKNOWN_ERROR_TYPE`].
///
/// # Examples
///
/// ```
/// use concierge::protocol::domain::{AgentFault, ErrorKind};
/// use concierge::resilience::retry::classify;
///
/// assert_eq!(classify(&AgentFault::timeout("slow")), "TIMEOUT");
/// assert_eq!(classify(&AgentFault::internal("Rate limit exceeded")), "RATE_LIMIT");
/// assert_eq!(classify(&AgentFault::internal("boom")), "UNKNOWN");
/// ```
#[must_use]
pub fn classify(fault: &AgentFault) -> String {
    let code = fault.code().trim();
    let generic = code.is_empty() || code == "INTERNAL_ERROR" || code == UNKNOWN_ERROR_TYPE;
    if !generic {
        return code.to_owned();
    }
    classify_message(fault.detail()).to_owned()
}

fn classify_message(message: &str) -> &'static str {
    let lower = message.to_ascii_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        "TIMEOUT"
    } else if lower.contains("rate limit") {
        "RATE_LIMIT"
    } else if lower.contains("network") {
        "NETWORK_ERROR"
    } else if lower.contains("connection") {
        "CONNECTION_ERROR"
    } else {
        UNKNOWN_ERROR_TYPE
    }
}

/// What the retry strategy has learned about one error type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPattern {
    /// The classification key.
    pub error_type: String,
    /// Failures observed with this classification.
    pub occurrence_count: u64,
    /// Mean time from first failure to eventual success.
    #[serde(rename = "average_recovery_time_ms", with = "serde_millis")]
    pub average_recovery_time: Duration,
    /// Recoveries contributing to the mean.
    pub recovery_samples: u32,
    /// Fraction of retries after this error that succeeded, over the
    /// rolling window. `1.0` until a retry outcome is known.
    pub success_rate: f64,
    /// When this error type was last observed.
    pub last_occurrence: DateTime<Utc>,
    #[serde(skip)]
    outcomes: VecDeque<bool>,
}

impl ErrorPattern {
    pub(crate) fn new(error_type: String, now: DateTime<Utc>) -> Self {
        Self {
            error_type,
            occurrence_count: 0,
            average_recovery_time: Duration::ZERO,
            recovery_samples: 0,
            success_rate: 1.0,
            last_occurrence: now,
            outcomes: VecDeque::new(),
        }
    }

    pub(crate) fn record_occurrence(&mut self, now: DateTime<Utc>) {
        self.occurrence_count += 1;
        self.last_occurrence = now;
    }

    pub(crate) fn record_retry_outcome(&mut self, succeeded: bool, window: usize) {
        self.outcomes.push_back(succeeded);
        while self.outcomes.len() > window.max(1) {
            self.outcomes.pop_front();
        }
        let successes = self.outcomes.iter().filter(|ok| **ok).count();
        self.success_rate = ratio(successes, self.outcomes.len());
    }

    pub(crate) fn record_recovery(&mut self, elapsed: Duration) {
        self.recovery_samples = self.recovery_samples.saturating_add(1);
        let previous = self.recovery_samples - 1;
        let total = self
            .average_recovery_time
            .saturating_mul(previous)
            .saturating_add(elapsed);
        self.average_recovery_time = total
            .checked_div(self.recovery_samples)
            .unwrap_or(self.average_recovery_time);
    }
}

#[expect(
    clippy::float_arithmetic,
    reason = "success rate is a ratio of two small counts"
)]
fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        return 1.0;
    }
    let num = f64::from(u32::try_from(numerator).unwrap_or(u32::MAX));
    let den = f64::from(u32::try_from(denominator).unwrap_or(u32::MAX));
    num / den
}
