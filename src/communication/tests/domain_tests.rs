//! Tests for pending-request settlement and queue ordering.

use super::fixtures::{clock, request, text_of, to};
use crate::{
    clock::ManualClock,
    communication::domain::{DispatchQueue, PendingRegistry},
    protocol::domain::{AgentFault, AgentId, MessageId, MessageType, Priority},
};
use mockable::Clock;
use rstest::rstest;
use std::time::Duration;

#[rstest]
#[tokio::test]
async fn settling_twice_keeps_the_first_outcome(clock: ManualClock) {
    let registry = PendingRegistry::new();
    let message = request("billing", "balance?", &clock);
    let receiver = registry
        .register(message.id(), AgentId::new("billing"), clock.utc())
        .expect("first registration");

    assert!(registry.settle(message.id(), Err(AgentFault::timeout("deadline passed"))));
    assert!(!registry.settle(message.id(), Ok(message.clone())));

    let outcome = receiver.await.expect("outcome delivered");
    assert!(matches!(outcome, Err(fault) if fault.code() == "TIMEOUT"));
    assert!(registry.is_empty());
}

#[rstest]
fn duplicate_registration_is_refused(clock: ManualClock) {
    let registry = PendingRegistry::new();
    let id = MessageId::new();

    assert!(registry.register(id, AgentId::new("billing"), clock.utc()).is_some());
    assert!(registry.register(id, AgentId::new("billing"), clock.utc()).is_none());
    assert_eq!(registry.len(), 1);
}

#[rstest]
fn unknown_ids_are_ignored() {
    let registry = PendingRegistry::new();
    assert!(!registry.settle(MessageId::new(), Err(AgentFault::internal("stray"))));
}

#[rstest]
#[tokio::test]
async fn settle_all_resolves_every_waiter(clock: ManualClock) {
    let registry = PendingRegistry::new();
    let first = registry
        .register(MessageId::new(), AgentId::new("billing"), clock.utc())
        .expect("first");
    clock.advance(Duration::from_secs(1));
    let second = registry
        .register(MessageId::new(), AgentId::new("support"), clock.utc())
        .expect("second");

    let snapshot = registry.snapshot();
    assert_eq!(
        snapshot.iter().map(|s| s.to.as_str()).collect::<Vec<_>>(),
        vec!["billing", "support"]
    );

    assert_eq!(registry.settle_all(&AgentFault::internal("stopping")), 2);
    assert!(first.await.expect("first outcome").is_err());
    assert!(second.await.expect("second outcome").is_err());
}

#[rstest]
fn queue_orders_by_priority_then_arrival(clock: ManualClock) {
    let queue = DispatchQueue::new();
    for (label, priority) in [
        ("low", Priority::Low),
        ("normal-1", Priority::Normal),
        ("high", Priority::High),
        ("normal-2", Priority::Normal),
    ] {
        let message = to("billing", MessageType::Inform, label)
            .with_priority(priority)
            .build(&clock)
            .expect("message");
        queue.push(message, false);
    }

    let mut order = Vec::new();
    while let Some(job) = queue.pop() {
        order.push(text_of(&job.message));
    }
    assert_eq!(order, vec!["high", "normal-1", "normal-2", "low"]);
    assert!(queue.is_empty());
}
