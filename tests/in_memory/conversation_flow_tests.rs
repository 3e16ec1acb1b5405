//! Conversation flow tests across routing, dispatch and session history.

use crate::in_memory::helpers::{answering, clock, config, memory_orchestrator, session};
use concierge::{
    clock::ManualClock,
    communication::adapters::handler_fn,
    config::ConciergeConfig,
    protocol::domain::{Message, SessionId, WorkerResult},
    session::domain::HistoryRole,
};
use futures::future::join_all;
use rstest::rstest;
use serde_json::json;
use std::sync::{Arc, Mutex, PoisonError};

/// Tests that routing rules and templates loaded from TOML drive replies.
#[rstest]
#[tokio::test]
async fn toml_routes_and_templates_shape_replies(
    clock: ManualClock,
    session: SessionId,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = ConciergeConfig::from_toml_str(
        r#"
        [retry]
        max_retries = 0

        [orchestrator]
        default_agent = "support"

        [[orchestrator.routes]]
        keyword = "refund"
        intent = "billing"
        agent = "billing"

        [orchestrator.templates]
        billing = "Billing desk: {{ message }}"
        "#,
    )?;
    let orchestrator = memory_orchestrator(&config, &clock);
    answering(&orchestrator, "support", "How can I help?");
    answering(&orchestrator, "billing", "Your refund is on its way.");
    orchestrator.initialize()?;

    let routed = orchestrator
        .process_input("I want a REFUND please", &session, None)
        .await?;
    let general = orchestrator.process_input("hello", &session, None).await?;

    assert_eq!(routed, "Billing desk: Your refund is on its way.");
    assert_eq!(general, "How can I help?");
    orchestrator.shutdown().await?;
    Ok(())
}

/// Tests that each request carries the turns recorded before it.
#[rstest]
#[tokio::test]
async fn requests_carry_growing_history(
    clock: ManualClock,
    config: ConciergeConfig,
    session: SessionId,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let orchestrator = memory_orchestrator(&config, &clock);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);
    orchestrator.communication().register(
        "support",
        handler_fn(move |message: Message| {
            recorder
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(message.context().recent_history().len());
            std::future::ready(Ok(WorkerResult::success(json!("noted"))))
        }),
    );

    for text in ["one", "two", "three"] {
        orchestrator.process_input(text, &session, None).await?;
    }

    let lengths = seen.lock().unwrap_or_else(PoisonError::into_inner).clone();
    assert_eq!(lengths, vec![0, 2, 4]);

    let history = orchestrator
        .sessions()
        .get_recent_history(&session, 10)
        .await?;
    let roles: Vec<_> = history.iter().map(|entry| entry.role()).collect();
    assert_eq!(
        roles,
        vec![
            HistoryRole::Caller,
            HistoryRole::Agent,
            HistoryRole::Caller,
            HistoryRole::Agent,
            HistoryRole::Caller,
            HistoryRole::Agent,
        ]
    );
    Ok(())
}

/// Tests that concurrent callers each get their own session.
#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_stay_isolated(
    clock: ManualClock,
    config: ConciergeConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let orchestrator = memory_orchestrator(&config, &clock);
    orchestrator.communication().register(
        "support",
        handler_fn(|message: Message| async move {
            let session = message.context().session_id().to_string();
            Ok(WorkerResult::success(json!(format!("hello {session}"))))
        }),
    );
    let ids: Vec<SessionId> = (0..8).map(|n| SessionId::new(format!("caller-{n}"))).collect();

    let replies = join_all(
        ids.iter()
            .map(|id| orchestrator.process_input("hi", id, Some(id.as_str()))),
    )
    .await;

    for (id, reply) in ids.iter().zip(replies) {
        assert_eq!(reply?, format!("hello {id}"));
        let history = orchestrator.sessions().get_recent_history(id, 10).await?;
        assert_eq!(history.len(), 2);
    }
    let stats = orchestrator.statistics().await?;
    assert_eq!(stats.sessions.active, ids.len());
    assert_eq!(stats.logs.info, ids.len() as u64);
    Ok(())
}
