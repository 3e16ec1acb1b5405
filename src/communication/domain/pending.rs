//! Outstanding request/response correlation.

use crate::protocol::domain::{AgentFault, AgentId, Message, MessageId};
use chrono::{DateTime, Utc};
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};
use tokio::sync::oneshot;
use tracing::debug;

/// What a pending request resolves to.
pub type PendingOutcome = Result<Message, AgentFault>;

#[derive(Debug)]
struct PendingEntry {
    to: AgentId,
    registered_at: DateTime<Utc>,
    sender: oneshot::Sender<PendingOutcome>,
}

/// A snapshot of one outstanding request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSummary {
    /// Request id.
    pub id: MessageId,
    /// Addressed worker.
    pub to: AgentId,
    /// When the request was registered.
    pub registered_at: DateTime<Utc>,
}

/// Requests awaiting a response, keyed by request id.
///
/// Each record is settled at most once: the first of a response, a timeout
/// or a propagated failure wins and every later attempt is a no-op that
/// returns `false`.
#[derive(Debug, Default)]
pub struct PendingRegistry {
    entries: Mutex<HashMap<MessageId, PendingEntry>>,
}

impl PendingRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a request and returns the receiver its outcome arrives on.
    ///
    /// Returns `None` when a request with the same id is already pending.
    pub fn register(
        &self,
        id: MessageId,
        to: AgentId,
        registered_at: DateTime<Utc>,
    ) -> Option<oneshot::Receiver<PendingOutcome>> {
        let mut entries = self.lock();
        if entries.contains_key(&id) {
            return None;
        }
        let (sender, receiver) = oneshot::channel();
        entries.insert(
            id,
            PendingEntry {
                to,
                registered_at,
                sender,
            },
        );
        Some(receiver)
    }

    /// Settles a pending request.
    ///
    /// Returns `true` when this call settled the record and `false` when it
    /// was already settled or never registered.
    pub fn settle(&self, id: MessageId, outcome: PendingOutcome) -> bool {
        let Some(entry) = self.lock().remove(&id) else {
            debug!(request = %id, "settle ignored, request not pending");
            return false;
        };
        if entry.sender.send(outcome).is_err() {
            debug!(request = %id, to = %entry.to, "waiter already gone");
        }
        true
    }

    /// Settles every pending request with `fault`. Returns how many were
    /// settled.
    pub fn settle_all(&self, fault: &AgentFault) -> usize {
        let drained: Vec<_> = self.lock().drain().collect();
        let count = drained.len();
        for (id, entry) in drained {
            if entry.sender.send(Err(fault.clone())).is_err() {
                debug!(request = %id, to = %entry.to, "waiter already gone");
            }
        }
        count
    }

    /// Returns `true` while `id` awaits settlement.
    #[must_use]
    pub fn contains(&self, id: MessageId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Returns the number of pending requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` when nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lists outstanding requests, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PendingSummary> {
        let mut summaries: Vec<_> = self
            .lock()
            .iter()
            .map(|(id, entry)| PendingSummary {
                id: *id,
                to: entry.to.clone(),
                registered_at: entry.registered_at,
            })
            .collect();
        summaries.sort_by_key(|summary| summary.registered_at);
        summaries
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<MessageId, PendingEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
