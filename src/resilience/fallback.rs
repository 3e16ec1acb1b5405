//! Ordered degradation chains.
//!
//! The executor never retries. Wrap an individual action in
//! [`AdaptiveRetryStrategy`](super::retry::AdaptiveRetryStrategy) when a
//! strategy should be retried.

use crate::protocol::domain::AgentFault;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::{fmt, future::Future};
use tracing::{debug, warn};

/// Tag naming a degradation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Answer from previously cached data.
    CachedData,
    /// Ask a different worker.
    AlternativeAgent,
    /// Give a reduced but safe answer.
    DegradedMode,
    /// Hand the caller to a human.
    HumanEscalation,
    /// Stop without an answer.
    Abort,
}

impl FallbackStrategy {
    /// Returns the snake-case tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CachedData => "cached_data",
            Self::AlternativeAgent => "alternative_agent",
            Self::DegradedMode => "degraded_mode",
            Self::HumanEscalation => "human_escalation",
            Self::Abort => "abort",
        }
    }
}

impl fmt::Display for FallbackStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a reported failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackStage {
    /// The primary action.
    Primary,
    /// A fallback entry.
    Strategy(FallbackStrategy),
}

/// Future returned by a fallback action. `Ok(None)` is a miss.
pub type FallbackFuture<'a, T> = BoxFuture<'a, Result<Option<T>, AgentFault>>;

type FallbackAction<'a, T> = Box<dyn FnOnce() -> FallbackFuture<'a, T> + Send + 'a>;

/// An ordered list of fallback actions.
pub struct FallbackChain<'a, T> {
    entries: Vec<(FallbackStrategy, FallbackAction<'a, T>)>,
}

impl<'a, T> FallbackChain<'a, T> {
    /// Creates an empty chain.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends an entry.
    #[must_use]
    pub fn then<F, Fut>(mut self, strategy: FallbackStrategy, action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<Option<T>, AgentFault>> + Send + 'a,
    {
        self.entries
            .push((strategy, Box::new(move || Box::pin(action()))));
        self
    }

    /// Returns the strategies in evaluation order.
    #[must_use]
    pub fn strategies(&self) -> Vec<FallbackStrategy> {
        self.entries.iter().map(|(strategy, _)| *strategy).collect()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when the chain has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for FallbackChain<'_, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for FallbackChain<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackChain")
            .field("strategies", &self.strategies())
            .finish()
    }
}

/// Observer for failures inside [`FallbackExecutor::execute_with_fallback`].
pub type ErrorObserver<'o> = &'o (dyn Fn(&AgentFault, FallbackStage) + Send + Sync);

/// Runs a primary action, then its fallback chain in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackExecutor;

impl FallbackExecutor {
    /// Creates an executor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Runs `primary`; on failure tries each fallback strictly in order.
    ///
    /// A fallback yielding `Some` ends the chain. A failing fallback is
    /// reported to `on_error` and treated as a miss. Returns `None` when
    /// every entry misses.
    ///
    /// # Examples
    ///
    /// ```
    /// use concierge::protocol::domain::AgentFault;
    /// use concierge::resilience::fallback::{FallbackChain, FallbackExecutor, FallbackStrategy};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let chain = FallbackChain::new()
    ///     .then(FallbackStrategy::CachedData, || async { Ok(None) })
    ///     .then(FallbackStrategy::DegradedMode, || async { Ok(Some("degraded")) });
    ///
    /// let answer = FallbackExecutor::new()
    ///     .execute_with_fallback(
    ///         async { Err::<&str, _>(AgentFault::timeout("primary timed out")) },
    ///         chain,
    ///         None,
    ///     )
    ///     .await;
    /// assert_eq!(answer, Some("degraded"));
    /// # }
    /// ```
    pub async fn execute_with_fallback<T, P>(
        &self,
        primary: P,
        chain: FallbackChain<'_, T>,
        on_error: Option<ErrorObserver<'_>>,
    ) -> Option<T>
    where
        P: Future<Output = Result<T, AgentFault>>,
    {
        let primary_fault = match primary.await {
            Ok(value) => return Some(value),
            Err(fault) => fault,
        };
        debug!(code = primary_fault.code(), "primary action failed; entering fallback chain");
        if let Some(observer) = on_error {
            observer(&primary_fault, FallbackStage::Primary);
        }

        for (strategy, action) in chain.entries {
            match action().await {
                Ok(Some(value)) => {
                    warn!(strategy = %strategy, "answered by fallback");
                    return Some(value);
                }
                Ok(None) => debug!(strategy = %strategy, "fallback missed"),
                Err(fault) => {
                    warn!(strategy = %strategy, code = fault.code(), "fallback failed");
                    if let Some(observer) = on_error {
                        observer(&fault, FallbackStage::Strategy(strategy));
                    }
                }
            }
        }
        None
    }
}
