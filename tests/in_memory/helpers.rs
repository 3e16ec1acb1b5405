//! Shared helpers for end-to-end orchestrator tests.

use concierge::{
    clock::ManualClock,
    communication::adapters::handler_fn,
    config::ConciergeConfig,
    orchestrator::services::Orchestrator,
    protocol::domain::{AgentFault, ErrorKind, Message, SessionId, WorkerResult},
    resilience::retry::RetryPolicy,
    session::{adapters::EphemeralSessionStore, ports::SessionStore},
};
use rstest::fixture;
use serde_json::json;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

/// Orchestrator over the process-local session tier.
pub type MemoryOrchestrator = Orchestrator<EphemeralSessionStore, ManualClock>;

/// Provides a clock the test advances by hand.
#[fixture]
pub fn clock() -> ManualClock {
    ManualClock::default()
}

/// Provides configuration whose retries never sleep.
#[fixture]
pub fn config() -> ConciergeConfig {
    let mut config = ConciergeConfig::default();
    config.retry.defaults = RetryPolicy::immediate(0);
    config
}

/// Provides the session used by single-caller tests.
#[fixture]
pub fn session() -> SessionId {
    SessionId::new("caller-session")
}

/// Builds an orchestrator over `store`.
pub fn orchestrator_over<S: SessionStore>(
    config: &ConciergeConfig,
    store: S,
    clock: &ManualClock,
) -> Orchestrator<S, ManualClock> {
    Orchestrator::from_config(config, Arc::new(store), Arc::new(clock.clone()))
}

/// Builds an orchestrator over a fresh in-memory store.
pub fn memory_orchestrator(config: &ConciergeConfig, clock: &ManualClock) -> MemoryOrchestrator {
    orchestrator_over(config, EphemeralSessionStore::new(), clock)
}

/// Registers a worker that always answers `reply`.
pub fn answering<S: SessionStore>(
    orchestrator: &Orchestrator<S, ManualClock>,
    agent: &str,
    reply: &'static str,
) {
    orchestrator.communication().register(
        agent,
        handler_fn(move |_message: Message| async move { Ok(WorkerResult::success(json!(reply))) }),
    );
}

/// Registers a worker that fails while `healthy` is `false` and counts its
/// invocations.
pub fn flaky<S: SessionStore>(
    orchestrator: &Orchestrator<S, ManualClock>,
    agent: &str,
    reply: &'static str,
    healthy: Arc<AtomicBool>,
) -> Arc<AtomicUsize> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    orchestrator.communication().register(
        agent,
        handler_fn(move |_message: Message| {
            counter.fetch_add(1, Ordering::SeqCst);
            let outcome = if healthy.load(Ordering::SeqCst) {
                Ok(WorkerResult::success(json!(reply)))
            } else {
                Err(AgentFault::new(ErrorKind::ApiError, "upstream down"))
            };
            std::future::ready(outcome)
        }),
    );
    calls
}
