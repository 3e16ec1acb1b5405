//! Service tests for `process_input`, degradation and lifecycle.

use super::fixtures::{
    TestOrchestrator, clock, config, orchestrator_with, register_answer, register_failure,
};
use crate::{
    clock::ManualClock,
    communication::adapters::handler_fn,
    config::ConciergeConfig,
    orchestrator::{
        adapters::{StaticDirectory, TemplateFormatter},
        domain::{ActivityLevel, RouteRule},
        error::OrchestratorError,
        ports::{MockCallerDirectory, MockIntentRouter},
        services::cache_key,
    },
    protocol::domain::{AgentFault, AgentId, ErrorKind, Message, Payload, SessionId, WorkerResult},
    resilience::fallback::FallbackStrategy,
    session::domain::HistoryRole,
};
use rstest::rstest;
use serde_json::json;
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

fn s1() -> SessionId {
    SessionId::new("s1")
}

fn with_order(mut config: ConciergeConfig, order: Vec<FallbackStrategy>) -> ConciergeConfig {
    config.orchestrator.fallback.order = order;
    config
}

#[rstest]
#[tokio::test]
async fn answers_and_records_both_turns(clock: ManualClock, config: ConciergeConfig) {
    let orchestrator = orchestrator_with(&clock, &config);
    register_answer(&orchestrator, "support", "Your order ships Monday.");

    let reply = orchestrator
        .process_input("  where is my order?  ", &s1(), Some("caller-1"))
        .await
        .expect("reply");

    assert_eq!(reply, "Your order ships Monday.");
    let history = orchestrator
        .sessions()
        .get_recent_history(&s1(), 10)
        .await
        .expect("history");
    let turns: Vec<_> = history.iter().map(|e| (e.role(), e.content())).collect();
    assert_eq!(
        turns,
        vec![
            (HistoryRole::Caller, "where is my order?"),
            (HistoryRole::Agent, "Your order ships Monday."),
        ]
    );
    assert!(history.first().and_then(|e| e.message_id()).is_some());

    let session = orchestrator
        .sessions()
        .get_session(&s1())
        .await
        .expect("lookup")
        .expect("live");
    assert_eq!(session.caller_id(), Some("caller-1"));
    assert!(session.pending_requests().is_empty());
    assert_eq!(
        session.memory_value(&cache_key("general")),
        Some(&json!("Your order ships Monday."))
    );
}

#[rstest]
#[tokio::test]
async fn requests_carry_history_and_preferences(clock: ManualClock, config: ConciergeConfig) {
    let seen = Arc::new(Mutex::new(Vec::<Message>::new()));
    let orchestrator = orchestrator_with(&clock, &config).with_directory(
        StaticDirectory::new().with_preference("caller-1", "language", json!("fr")),
    );
    let sink = Arc::clone(&seen);
    orchestrator.communication().register(
        "support",
        handler_fn(move |message: Message| {
            sink.lock().expect("capture lock").push(message);
            std::future::ready(Ok(WorkerResult::success(json!("noted"))))
        }),
    );

    for text in ["first question", "second question"] {
        orchestrator
            .process_input(text, &s1(), Some("caller-1"))
            .await
            .expect("reply");
    }

    let requests = seen.lock().expect("capture lock").clone();
    let last = requests.last().expect("two requests");
    assert_eq!(last.context().metadata().get("language"), Some(&json!("fr")));
    assert_eq!(last.context().session_id(), &s1());
    assert_eq!(
        last.context().recent_history().iter().collect::<Vec<_>>(),
        vec!["caller: first question", "agent: noted"]
    );
    assert!(matches!(
        last.content(),
        Payload::Query { intent, text, .. } if intent == "general" && text == "second question"
    ));
}

#[rstest]
#[tokio::test]
async fn keyword_routes_pick_the_worker_and_template(clock: ManualClock, mut config: ConciergeConfig) {
    config
        .orchestrator
        .routes
        .push(RouteRule::new("balance", "billing.balance", "billing"));
    let orchestrator = orchestrator_with(&clock, &config).with_formatter(
        TemplateFormatter::new().with_template("billing.balance", "Your balance is {{ data.balance }}."),
    );
    orchestrator.communication().register(
        "billing",
        handler_fn(|_message: Message| async { Ok(WorkerResult::success(json!({ "balance": 42 }))) }),
    );
    register_failure(&orchestrator, "support");

    let reply = orchestrator
        .process_input("What is my BALANCE?", &s1(), None)
        .await
        .expect("reply");

    assert_eq!(reply, "Your balance is 42.");
}

#[rstest]
#[tokio::test]
async fn cached_answer_covers_a_failing_worker(clock: ManualClock, config: ConciergeConfig) {
    let orchestrator = orchestrator_with(&clock, &config);
    let healthy = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&healthy);
    orchestrator.communication().register(
        "support",
        handler_fn(move |_message: Message| {
            let outcome = if flag.load(Ordering::SeqCst) {
                Ok(WorkerResult::success(json!("Store hours are 9 to 5.")))
            } else {
                Err(AgentFault::new(ErrorKind::ApiError, "upstream returned 502 for token abc123"))
            };
            std::future::ready(outcome)
        }),
    );

    let first = orchestrator
        .process_input("opening hours?", &s1(), None)
        .await
        .expect("first");
    healthy.store(false, Ordering::SeqCst);
    let second = orchestrator
        .process_input("opening hours?", &s1(), None)
        .await
        .expect("second");

    assert_eq!(first, second);
    let stats = orchestrator.statistics().await.expect("statistics");
    assert_eq!(stats.logs.warn, 1);
    assert!(
        stats
            .logs
            .recent
            .iter()
            .any(|r| r.level == ActivityLevel::Warn && r.message.contains("cached_data"))
    );
}

#[rstest]
#[tokio::test]
async fn alternate_worker_answers_when_the_primary_fails(clock: ManualClock, mut config: ConciergeConfig) {
    config
        .orchestrator
        .fallback
        .alternates
        .insert(AgentId::new("support"), AgentId::new("support-backup"));
    let orchestrator = orchestrator_with(&clock, &config);
    register_failure(&orchestrator, "support");
    register_answer(&orchestrator, "support-backup", "Backup desk here.");

    let reply = orchestrator
        .process_input("help", &s1(), None)
        .await
        .expect("reply");

    assert_eq!(reply, "Backup desk here.");
}

#[rstest]
#[tokio::test]
async fn degraded_mode_gives_the_configured_text(clock: ManualClock, config: ConciergeConfig) {
    let degraded = with_order(config, vec![FallbackStrategy::DegradedMode]);
    let orchestrator = orchestrator_with(&clock, &degraded);
    register_failure(&orchestrator, "support");

    let reply = orchestrator
        .process_input("help", &s1(), None)
        .await
        .expect("reply");

    assert_eq!(reply, degraded.orchestrator.fallback.degraded_text);
}

#[rstest]
#[tokio::test]
async fn escalation_marks_the_session(clock: ManualClock, config: ConciergeConfig) {
    let escalating = with_order(
        config,
        vec![FallbackStrategy::CachedData, FallbackStrategy::HumanEscalation],
    );
    let orchestrator = orchestrator_with(&clock, &escalating);
    register_failure(&orchestrator, "support");

    let reply = orchestrator
        .process_input("help", &s1(), None)
        .await
        .expect("reply");

    assert_eq!(reply, escalating.orchestrator.fallback.escalation_text);
    let session = orchestrator
        .sessions()
        .get_session(&s1())
        .await
        .expect("lookup")
        .expect("live");
    assert_eq!(session.metadata().get("escalated"), Some(&json!(true)));
}

#[rstest]
#[tokio::test]
async fn exhausted_chain_returns_the_apology(clock: ManualClock, config: ConciergeConfig) {
    let aborting = with_order(
        config,
        vec![FallbackStrategy::CachedData, FallbackStrategy::Abort],
    );
    let orchestrator = orchestrator_with(&clock, &aborting);
    register_failure(&orchestrator, "support");

    let reply = orchestrator
        .process_input("help", &s1(), None)
        .await
        .expect("degraded reply, not an error");

    assert_eq!(reply, aborting.orchestrator.fallback.apology_text);
    assert!(!reply.contains("abc123"));
    let stats = orchestrator.statistics().await.expect("statistics");
    assert_eq!(stats.logs.error, 1);
    let history = orchestrator
        .sessions()
        .get_recent_history(&s1(), 5)
        .await
        .expect("history");
    assert_eq!(history.len(), 2);
}

#[rstest]
#[case::blank_session("hello", "   ")]
#[case::empty_text("  ", "s1")]
#[tokio::test]
async fn caller_input_errors_surface(
    clock: ManualClock,
    config: ConciergeConfig,
    #[case] text: &str,
    #[case] session: &str,
) {
    let orchestrator = orchestrator_with(&clock, &config);
    let result = orchestrator
        .process_input(text, &SessionId::new(session), None)
        .await;

    assert!(matches!(
        result,
        Err(OrchestratorError::BlankSession | OrchestratorError::EmptyInput)
    ));
}

#[rstest]
#[tokio::test]
async fn router_and_directory_failures_do_not_block_answers(clock: ManualClock, config: ConciergeConfig) {
    let mut router = MockIntentRouter::new();
    router
        .expect_route()
        .times(1)
        .returning(|_, _| Err(AgentFault::internal("nlu unavailable")));
    let mut directory = MockCallerDirectory::new();
    directory
        .expect_preferences()
        .times(1)
        .returning(|_| Err(AgentFault::new(ErrorKind::NetworkError, "directory down")));
    let orchestrator = orchestrator_with(&clock, &config)
        .with_router(router)
        .with_directory(directory);
    register_answer(&orchestrator, "support", "Default desk.");

    let reply = orchestrator
        .process_input("help", &s1(), Some("caller-1"))
        .await
        .expect("reply");

    assert_eq!(reply, "Default desk.");
}

#[rstest]
#[tokio::test]
async fn initialize_requires_the_default_worker(clock: ManualClock, config: ConciergeConfig) {
    let orchestrator = orchestrator_with(&clock, &config);

    let missing = orchestrator.initialize();
    assert!(matches!(
        missing,
        Err(OrchestratorError::DefaultAgentMissing(ref agent)) if agent.as_str() == "support"
    ));
    assert!(!orchestrator.is_initialized());

    register_answer(&orchestrator, "support", "hi");
    orchestrator.initialize().expect("initialize");
    assert!(orchestrator.is_initialized());
    assert!(orchestrator.communication().is_running());
}

#[rstest]
#[tokio::test]
async fn shutdown_is_safe_before_initialize_and_flushes_expired_sessions(
    clock: ManualClock,
    config: ConciergeConfig,
) {
    let orchestrator: TestOrchestrator = orchestrator_with(&clock, &config);
    let untouched = orchestrator.shutdown().await.expect("shutdown");
    assert_eq!(untouched.settled_requests, 0);
    assert_eq!(untouched.expired_sessions, 0);

    orchestrator
        .sessions()
        .get_or_create_session(&s1())
        .await
        .expect("create");
    clock.advance(Duration::from_secs(7_200));
    let report = orchestrator.shutdown().await.expect("shutdown");
    assert_eq!(report.expired_sessions, 1);
}

#[rstest]
#[tokio::test]
async fn statistics_export_agents_sessions_and_logs(clock: ManualClock, config: ConciergeConfig) {
    let orchestrator = orchestrator_with(&clock, &config);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    orchestrator.communication().register(
        "support",
        handler_fn(move |_message: Message| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(WorkerResult::success(json!("ok"))))
        }),
    );
    register_answer(&orchestrator, "billing", "unused");

    orchestrator
        .process_input("hello", &s1(), None)
        .await
        .expect("reply");
    let stats = orchestrator.statistics().await.expect("statistics");

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(stats.sessions.active, 1);
    assert_eq!(stats.logs.info, 1);
    let names: Vec<_> = stats.agents.iter().map(|a| a.agent.as_str()).collect();
    assert_eq!(names, vec!["billing", "support"]);
    let support = stats.agents.iter().find(|a| a.agent == "support").expect("support");
    assert_eq!(support.breaker.as_ref().map(|b| b.total_requests), Some(1));
    assert!(stats.agents.iter().any(|a| a.agent == "billing" && a.breaker.is_none()));

    let exported = serde_json::to_value(&stats).expect("serializes");
    for key in ["agents", "sessions", "logs", "retry_patterns"] {
        assert!(exported.get(key).is_some(), "missing {key}");
    }
}

#[rstest]
#[tokio::test]
async fn caller_correctable_faults_skip_the_cached_answer(clock: ManualClock, config: ConciergeConfig) {
    let orchestrator = orchestrator_with(&clock, &config);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    orchestrator.communication().register(
        "support",
        handler_fn(move |_message: Message| {
            let outcome = if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                WorkerResult::success(json!("Reservation R1 is confirmed for Friday."))
            } else {
                WorkerResult::error("NOT_FOUND", "reservation R999 does not exist", false)
            };
            std::future::ready(Ok(outcome))
        }),
    );

    let first = orchestrator
        .process_input("status of R1?", &s1(), None)
        .await
        .expect("first");
    let second = orchestrator
        .process_input("status of R999?", &s1(), None)
        .await
        .expect("second");

    assert_eq!(first, "Reservation R1 is confirmed for Friday.");
    assert_eq!(
        second,
        AgentFault::new(ErrorKind::NotFound, "unused").caller_reply()
    );
    assert!(!second.contains("R1") && !second.contains("R999"));
    assert_eq!(calls.load(Ordering::SeqCst), 2, "not found is not retried");

    let stats = orchestrator.statistics().await.expect("statistics");
    assert!(
        stats
            .logs
            .recent
            .iter()
            .any(|r| r.level == ActivityLevel::Warn && r.message.contains("NOT_FOUND"))
    );
    let support = stats
        .agents
        .iter()
        .find(|a| a.agent == "support")
        .and_then(|a| a.breaker.as_ref())
        .expect("support breaker");
    assert_eq!(support.total_failures, 0);
}

#[rstest]
#[tokio::test]
async fn escalation_is_not_used_for_business_rule_refusals(clock: ManualClock, config: ConciergeConfig) {
    let escalating = with_order(config, vec![FallbackStrategy::HumanEscalation]);
    let orchestrator = orchestrator_with(&clock, &escalating);
    orchestrator.communication().register(
        "support",
        handler_fn(|_message: Message| async {
            Err(AgentFault::new(ErrorKind::BusinessRule, "cancellation window closed"))
        }),
    );

    let reply = orchestrator
        .process_input("cancel my booking", &s1(), None)
        .await
        .expect("reply");

    assert_eq!(reply, ErrorKind::BusinessRule.user_message());
    let session = orchestrator
        .sessions()
        .get_session(&s1())
        .await
        .expect("lookup")
        .expect("live");
    assert!(session.metadata().get("escalated").is_none());
}
