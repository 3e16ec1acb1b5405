//! Tests for session history bounds, expiry and mutators.

use super::fixtures::{clock, entry, session};
use crate::{
    clock::ManualClock,
    protocol::domain::{MessageId, RECENT_HISTORY_LIMIT, SessionId},
    session::domain::{HistoryRole, Session, SessionLimits},
};
use mockable::Clock;
use rstest::rstest;
use serde_json::json;
use std::time::Duration;

#[rstest]
fn history_keeps_only_the_most_recent_entries_in_order(clock: ManualClock) {
    let mut session = Session::new(
        SessionId::new("s1"),
        SessionLimits {
            max_history: 50,
            ..SessionLimits::default()
        },
        &clock,
    );

    for turn in 0..1_000 {
        session.push_history(entry(HistoryRole::Caller, &format!("turn {turn}"), &clock), &clock);
    }

    assert_eq!(session.history().len(), 50);
    let contents: Vec<_> = session.history().iter().map(|e| e.content().to_owned()).collect();
    let expected: Vec<_> = (950..1_000).map(|turn| format!("turn {turn}")).collect();
    assert_eq!(contents, expected);
    assert_eq!(session.context().recent_history().len(), RECENT_HISTORY_LIMIT);
    assert_eq!(
        session.context().recent_history().back().map(String::as_str),
        Some("caller: turn 999")
    );
}

#[rstest]
fn recent_history_returns_the_tail_in_insertion_order(clock: ManualClock) {
    let mut session = Session::new(SessionId::new("s1"), SessionLimits::default(), &clock);
    for (role, text) in [
        (HistoryRole::Caller, "hi"),
        (HistoryRole::Agent, "hello"),
        (HistoryRole::Caller, "balance?"),
    ] {
        session.push_history(entry(role, text, &clock), &clock);
    }

    let all: Vec<_> = session
        .recent_history(5)
        .iter()
        .map(|e| (e.role(), e.content().to_owned()))
        .collect();
    assert_eq!(
        all,
        vec![
            (HistoryRole::Caller, "hi".to_owned()),
            (HistoryRole::Agent, "hello".to_owned()),
            (HistoryRole::Caller, "balance?".to_owned()),
        ]
    );
    assert_eq!(session.recent_history(1).len(), 1);
    assert!(session.recent_history(0).is_empty());
}

#[rstest]
fn expiry_is_a_pure_function_of_now(clock: ManualClock) {
    let session = Session::new(SessionId::new("s1"), SessionLimits::default(), &clock);
    let expires_at = session.expires_at();

    assert!(!session.is_expired(clock.utc()));
    assert!(!session.is_expired(expires_at), "expiry is strictly after");

    clock.advance(Duration::from_secs(3_601));
    assert!(session.is_expired(clock.utc()));
    assert_eq!(session.expires_at(), expires_at, "checking never mutates");
}

#[rstest]
fn every_mutation_slides_the_expiry(clock: ManualClock) {
    let mut session = Session::new(SessionId::new("s1"), SessionLimits::default(), &clock);
    let first_expiry = session.expires_at();

    clock.advance(Duration::from_secs(600));
    session.store_memory("reservation", json!("R-42"), &clock);
    let second_expiry = session.expires_at();
    assert!(second_expiry > first_expiry);
    assert_eq!(session.updated_at(), clock.utc());

    clock.advance(Duration::from_secs(600));
    session.attach_caller("caller-9", &clock);
    assert!(session.expires_at() > second_expiry);
    assert_eq!(session.created_at(), first_expiry - chrono::TimeDelta::hours(1));
}

#[rstest]
fn memory_metadata_and_preferences_are_scoped_to_their_maps(clock: ManualClock) {
    let mut session = Session::new(SessionId::new("s1"), SessionLimits::default(), &clock);

    session.store_memory("reservation", json!("R-42"), &clock);
    session.set_metadata("channel", json!("voice"), &clock);
    session.apply_preferences([("language".to_owned(), json!("fr"))], &clock);

    assert_eq!(session.memory_value("reservation"), Some(&json!("R-42")));
    assert_eq!(session.metadata().get("channel"), Some(&json!("voice")));
    assert_eq!(session.context().metadata().get("language"), Some(&json!("fr")));

    session.clear_memory(&clock);
    assert!(session.memory().is_empty());
    assert_eq!(session.metadata().len(), 1);
}

#[rstest]
fn pending_requests_are_tracked_once(clock: ManualClock) {
    let mut session = Session::new(SessionId::new("s1"), SessionLimits::default(), &clock);
    let request = MessageId::new();

    assert!(session.track_pending(request, &clock));
    assert!(!session.track_pending(request, &clock));
    assert!(session.release_pending(request, &clock));
    assert!(!session.release_pending(request, &clock));
    assert!(session.pending_requests().is_empty());
}

#[rstest]
fn sessions_round_trip_through_json(session: Session) {
    let json = serde_json::to_string(&session).expect("serialize session");
    let restored: Session = serde_json::from_str(&json).expect("deserialize session");
    assert_eq!(restored, session);
}
