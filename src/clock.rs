//! Advanceable clock for deterministic tests and simulations.
//!
//! Every domain timestamp in the crate is read from a [`mockable::Clock`].
//! Production code uses [`mockable::DefaultClock`]; tests drive breaker
//! reset windows and session expiry with [`ManualClock`].

use chrono::{DateTime, Local, Utc};
use mockable::Clock;
use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

/// A clock that only moves when told to.
///
/// Clones share the same instant, so a clone handed to a service can be
/// advanced from the test body.
///
/// # Examples
///
/// ```
/// use concierge::clock::ManualClock;
/// use mockable::Clock;
/// use std::time::Duration;
///
/// let clock = ManualClock::default();
/// let start = clock.utc();
/// clock.advance(Duration::from_secs(61));
/// assert_eq!((clock.utc() - start).num_seconds(), 61);
/// ```
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let delta = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC);
    }

    /// Sets the clock to an absolute instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = instant;
    }
}

impl Default for ManualClock {
    /// Starts at the wall-clock time of construction.
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
