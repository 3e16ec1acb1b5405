//! Persistence tests for sessions backed by the file tier.

use crate::in_memory::helpers::{answering, clock, config, orchestrator_over, session};
use camino::Utf8Path;
use concierge::{
    clock::ManualClock,
    config::ConciergeConfig,
    orchestrator::services::cache_key,
    protocol::domain::SessionId,
    session::adapters::FileSessionStore,
};
use rstest::rstest;
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;

/// Tests that history and cached answers outlive the orchestrator that
/// recorded them.
#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn sessions_survive_a_restart(
    clock: ManualClock,
    config: ConciergeConfig,
    session: SessionId,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let temp = TempDir::new()?;
    let root = Utf8Path::from_path(temp.path()).ok_or("temp dir is not UTF-8")?;

    let first = orchestrator_over(&config, FileSessionStore::open(root)?, &clock);
    answering(&first, "support", "Your parcel arrives Tuesday.");
    first
        .process_input("where is my parcel?", &session, Some("caller-7"))
        .await?;
    first.shutdown().await?;
    drop(first);

    let second = orchestrator_over(&config, FileSessionStore::open(root)?, &clock);
    let restored = second
        .sessions()
        .get_session(&session)
        .await?
        .ok_or("session lost across restart")?;

    assert_eq!(restored.caller_id(), Some("caller-7"));
    let turns: Vec<_> = restored.history().iter().map(|e| e.content()).collect();
    assert_eq!(turns, vec!["where is my parcel?", "Your parcel arrives Tuesday."]);
    assert_eq!(
        restored.memory_value(&cache_key("general")),
        Some(&json!("Your parcel arrives Tuesday."))
    );
    Ok(())
}

/// Tests that a restarted orchestrator flushes sessions that lapsed while
/// it was down.
#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn shutdown_flushes_sessions_that_lapsed_offline(
    clock: ManualClock,
    config: ConciergeConfig,
    session: SessionId,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let temp = TempDir::new()?;
    let root = Utf8Path::from_path(temp.path()).ok_or("temp dir is not UTF-8")?;

    let first = orchestrator_over(&config, FileSessionStore::open(root)?, &clock);
    answering(&first, "support", "Noted.");
    first.process_input("remember me", &session, None).await?;
    first.shutdown().await?;
    drop(first);

    clock.advance(config.session.ttl.saturating_add(Duration::from_secs(1)));
    let second = orchestrator_over(&config, FileSessionStore::open(root)?, &clock);
    let report = second.shutdown().await?;

    assert_eq!(report.expired_sessions, 1);
    assert!(second.sessions().get_session(&session).await?.is_none());
    Ok(())
}
