//! Degradation tests combining breakers, retries and fallback strategies.

use crate::in_memory::helpers::{answering, clock, config, flaky, memory_orchestrator, session};
use concierge::{
    clock::ManualClock,
    communication::adapters::handler_fn,
    config::ConciergeConfig,
    protocol::domain::{AgentFault, AgentId, Message, SessionId, WorkerResult},
    resilience::{
        circuit_breaker::CircuitState, fallback::FallbackStrategy, retry::RetryPolicy,
    },
};
use rstest::rstest;
use serde_json::json;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

/// Tests that an open breaker stops calls reaching the worker until the
/// reset window passes, while callers still get a degraded reply.
#[rstest]
#[tokio::test]
async fn breaker_shields_a_failing_worker_then_recovers(
    clock: ManualClock,
    mut config: ConciergeConfig,
    session: SessionId,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    config.circuit_breaker.defaults.failure_threshold = 2;
    config.circuit_breaker.defaults.success_threshold = 1;
    config.circuit_breaker.defaults.reset_timeout = Duration::from_secs(30);
    let orchestrator = memory_orchestrator(&config, &clock);
    let healthy = Arc::new(AtomicBool::new(false));
    let calls = flaky(&orchestrator, "support", "Back online.", Arc::clone(&healthy));
    let degraded = config.orchestrator.fallback.degraded_text.clone();

    for _ in 0..3 {
        let reply = orchestrator.process_input("status?", &session, None).await?;
        assert_eq!(reply, degraded);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let breaker = orchestrator.communication().breakers().get("support").stats();
    assert_eq!(breaker.state, CircuitState::Open);
    assert_eq!(breaker.total_rejections, 1);

    healthy.store(true, Ordering::SeqCst);
    clock.advance(Duration::from_secs(31));
    let reply = orchestrator.process_input("status?", &session, None).await?;

    assert_eq!(reply, "Back online.");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        orchestrator.communication().breakers().get("support").state(),
        CircuitState::Closed
    );
    Ok(())
}

/// Tests that strategies run in configured order, so a failing alternate
/// falls through to the cached answer.
#[rstest]
#[tokio::test]
async fn failing_alternate_falls_through_to_cache(
    clock: ManualClock,
    mut config: ConciergeConfig,
    session: SessionId,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    config.orchestrator.fallback.order = vec![
        FallbackStrategy::AlternativeAgent,
        FallbackStrategy::CachedData,
        FallbackStrategy::DegradedMode,
    ];
    config
        .orchestrator
        .fallback
        .alternates
        .insert(AgentId::new("support"), AgentId::new("backup"));
    let orchestrator = memory_orchestrator(&config, &clock);
    let healthy = Arc::new(AtomicBool::new(true));
    flaky(&orchestrator, "support", "Opening hours are 9 to 5.", Arc::clone(&healthy));
    let backup_calls = flaky(
        &orchestrator,
        "backup",
        "unused",
        Arc::new(AtomicBool::new(false)),
    );

    let first = orchestrator.process_input("hours?", &session, None).await?;
    healthy.store(false, Ordering::SeqCst);
    let second = orchestrator.process_input("hours?", &session, None).await?;

    assert_eq!(first, "Opening hours are 9 to 5.");
    assert_eq!(second, first);
    assert_eq!(backup_calls.load(Ordering::SeqCst), 1);
    let stats = orchestrator.statistics().await?;
    assert_eq!((stats.logs.info, stats.logs.warn), (1, 1));
    Ok(())
}

/// Tests that transient faults are retried behind the breaker and leave a
/// learned pattern behind.
#[rstest]
#[tokio::test]
async fn transient_faults_are_retried_and_learned(
    clock: ManualClock,
    mut config: ConciergeConfig,
    session: SessionId,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    config.retry.defaults = RetryPolicy::immediate(2);
    let orchestrator = memory_orchestrator(&config, &clock);
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    orchestrator.communication().register(
        "support",
        handler_fn(move |_message: Message| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            let outcome = if attempt < 2 {
                Err(AgentFault::timeout("upstream timed out"))
            } else {
                Ok(WorkerResult::success(json!("Third time lucky.")))
            };
            std::future::ready(outcome)
        }),
    );

    let reply = orchestrator.process_input("try again", &session, None).await?;

    assert_eq!(reply, "Third time lucky.");
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    let stats = orchestrator.statistics().await?;
    let timeout = stats
        .retry_patterns
        .iter()
        .find(|pattern| pattern.error_type == "TIMEOUT")
        .ok_or("no TIMEOUT pattern learned")?;
    assert_eq!(timeout.occurrence_count, 2);
    let support = stats
        .agents
        .iter()
        .find(|agent| agent.agent == "support")
        .and_then(|agent| agent.breaker.as_ref())
        .ok_or("no breaker stats for support")?;
    assert_eq!((support.total_successes, support.total_failures), (1, 0));
    Ok(())
}

/// Tests that a worker that was never registered is covered by the chain.
#[rstest]
#[tokio::test]
async fn unregistered_worker_degrades(
    clock: ManualClock,
    config: ConciergeConfig,
    session: SessionId,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let orchestrator = memory_orchestrator(&config, &clock);
    answering(&orchestrator, "billing", "not the routed worker");

    let reply = orchestrator.process_input("anyone?", &session, None).await?;

    assert_eq!(reply, config.orchestrator.fallback.degraded_text);
    Ok(())
}
