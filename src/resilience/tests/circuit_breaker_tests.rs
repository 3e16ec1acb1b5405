//! Tests for breaker state transitions, rejection and call timeouts.

use crate::{
    clock::ManualClock,
    protocol::domain::{AgentFault, ErrorKind},
    resilience::circuit_breaker::{
        CircuitBreaker, CircuitBreakerConfig, CircuitBreakerOverride, CircuitBreakerRegistry,
        CircuitState,
    },
};
use rstest::{fixture, rstest};
use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

const RESET: Duration = Duration::from_secs(60);

#[fixture]
fn clock() -> ManualClock {
    ManualClock::default()
}

fn config() -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold: 3,
        success_threshold: 2,
        reset_timeout: RESET,
        call_timeout: Duration::from_secs(5),
    }
}

fn breaker(clock: &ManualClock) -> CircuitBreaker<ManualClock> {
    CircuitBreaker::new("billing", config(), Arc::new(clock.clone()))
}

async fn fail(breaker: &CircuitBreaker<ManualClock>, calls: &AtomicUsize) {
    let result: Result<(), _> = breaker
        .execute(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AgentFault::new(ErrorKind::ApiError, "upstream 503")) }
        })
        .await;
    assert!(result.is_err());
}

async fn succeed(breaker: &CircuitBreaker<ManualClock>, calls: &AtomicUsize) {
    let result = breaker
        .execute(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .await;
    assert!(result.is_ok());
}

#[rstest]
#[tokio::test]
async fn opens_after_threshold_and_stops_invoking_the_action(clock: ManualClock) {
    let breaker = breaker(&clock);
    let calls = AtomicUsize::new(0);

    for _ in 0..3 {
        fail(&breaker, &calls).await;
    }
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let rejected = breaker
        .execute(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .await;

    assert_eq!(rejected.map_err(|f| f.kind()), Err(ErrorKind::CircuitOpen));
    assert_eq!(calls.load(Ordering::SeqCst), 3, "action must not run while open");

    let stats = breaker.stats();
    assert_eq!(stats.total_requests, 4);
    assert_eq!(stats.total_failures, 3);
    assert_eq!(stats.total_rejections, 1);
}

#[rstest]
#[tokio::test]
async fn success_resets_consecutive_failures(clock: ManualClock) {
    let breaker = breaker(&clock);
    let calls = AtomicUsize::new(0);

    fail(&breaker, &calls).await;
    fail(&breaker, &calls).await;
    succeed(&breaker, &calls).await;
    fail(&breaker, &calls).await;

    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.stats().consecutive_failures, 1);
}

#[rstest]
#[tokio::test]
async fn half_open_probe_failure_reopens(clock: ManualClock) {
    let breaker = breaker(&clock);
    let calls = AtomicUsize::new(0);
    for _ in 0..3 {
        fail(&breaker, &calls).await;
    }

    clock.advance(RESET);
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    fail(&breaker, &calls).await;
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(calls.load(Ordering::SeqCst), 4, "the probe itself was attempted");
}

#[rstest]
#[tokio::test]
async fn half_open_closes_after_success_threshold(clock: ManualClock) {
    let breaker = breaker(&clock);
    let calls = AtomicUsize::new(0);
    for _ in 0..3 {
        fail(&breaker, &calls).await;
    }

    clock.advance(RESET - Duration::from_secs(1));
    assert_eq!(breaker.state(), CircuitState::Open, "reset timeout not yet elapsed");

    clock.advance(Duration::from_secs(1));
    succeed(&breaker, &calls).await;
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    succeed(&breaker, &calls).await;
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn call_timeout_counts_as_failure(clock: ManualClock) {
    let breaker = CircuitBreaker::new(
        "slow",
        CircuitBreakerConfig {
            failure_threshold: 1,
            call_timeout: Duration::from_millis(100),
            ..config()
        },
        Arc::new(clock),
    );

    let result = breaker
        .execute(|| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;

    assert_eq!(result.map_err(|f| f.kind()), Err(ErrorKind::Timeout));
    assert_eq!(breaker.state(), CircuitState::Open);
}

#[rstest]
#[tokio::test]
async fn fallback_runs_instead_of_the_action_while_open(clock: ManualClock) {
    let breaker = breaker(&clock);
    let calls = AtomicUsize::new(0);
    for _ in 0..3 {
        fail(&breaker, &calls).await;
    }

    let answer = breaker
        .execute_with_fallback(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok("live") }
            },
            |fault| async move {
                assert_eq!(fault.kind(), ErrorKind::CircuitOpen);
                Ok("cached")
            },
        )
        .await;

    assert_eq!(answer, Ok("cached"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(breaker.stats().total_fallbacks, 1);
}

#[rstest]
#[tokio::test]
async fn registry_isolates_dependencies_and_applies_overrides(clock: ManualClock) {
    let registry = CircuitBreakerRegistry::new(config(), Arc::new(clock)).with_override(
        "fragile",
        CircuitBreakerOverride {
            failure_threshold: Some(1),
            ..CircuitBreakerOverride::default()
        },
    );
    let calls = AtomicUsize::new(0);

    fail(&registry.get("fragile"), &calls).await;
    fail(&registry.get("sturdy"), &calls).await;

    assert_eq!(registry.get("fragile").state(), CircuitState::Open);
    assert_eq!(registry.get("sturdy").state(), CircuitState::Closed);
    assert_eq!(registry.config_for("sturdy").failure_threshold, 3);

    assert!(registry.reset("fragile"));
    assert!(!registry.reset("unknown"));
    assert_eq!(registry.get("fragile").state(), CircuitState::Closed);

    let names: Vec<_> = registry.stats().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["fragile".to_owned(), "sturdy".to_owned()]);
}

#[rstest]
#[tokio::test]
async fn caller_correctable_faults_do_not_trip_the_breaker(clock: ManualClock) {
    let breaker = breaker(&clock);
    let calls = AtomicUsize::new(0);
    fail(&breaker, &calls).await;
    fail(&breaker, &calls).await;

    for _ in 0..5 {
        let result: Result<(), _> = breaker
            .execute(|| async { Err(AgentFault::new(ErrorKind::NotFound, "reservation R999")) })
            .await;
        assert_eq!(result.map_err(|f| f.kind()), Err(ErrorKind::NotFound));
    }

    let stats = breaker.stats();
    assert_eq!(stats.state, CircuitState::Closed);
    assert_eq!(stats.consecutive_failures, 0);
    assert_eq!((stats.total_failures, stats.total_successes), (2, 5));
}
