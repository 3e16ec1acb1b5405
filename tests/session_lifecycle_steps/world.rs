//! Shared world state for session lifecycle BDD scenarios.

use std::{sync::Arc, time::Duration};

use concierge::{
    clock::ManualClock,
    protocol::domain::SessionId,
    session::{
        adapters::EphemeralSessionStore,
        services::{SessionConfig, SessionStateManager},
    },
};
use rstest::fixture;

/// Session manager type used by the BDD world.
pub type TestSessionManager = SessionStateManager<EphemeralSessionStore, ManualClock>;

/// Scenario world for session lifecycle behaviour tests.
pub struct SessionWorld {
    pub clock: ManualClock,
    pub manager: TestSessionManager,
    pub session_id: Option<SessionId>,
}

impl SessionWorld {
    /// Creates a world with default session limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    /// Creates a world whose manager applies `config`.
    #[must_use]
    pub fn with_config(config: SessionConfig) -> Self {
        let clock = ManualClock::default();
        let manager = SessionStateManager::new(
            Arc::new(EphemeralSessionStore::new()),
            Arc::new(clock.clone()),
            config,
        );
        Self {
            clock,
            manager,
            session_id: None,
        }
    }

    /// Rebuilds the manager with a different time to live.
    pub fn set_ttl(&mut self, ttl: Duration) {
        let config = SessionConfig {
            ttl,
            ..SessionConfig::default()
        };
        *self = Self::with_config(config);
    }

    /// Returns the session under test.
    pub fn session_id(&self) -> Result<&SessionId, eyre::Report> {
        self.session_id
            .as_ref()
            .ok_or_else(|| eyre::eyre!("no session in scenario world"))
    }
}

impl Default for SessionWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> SessionWorld {
    SessionWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
