//! Priority-ordered dispatch queue.

use crate::protocol::domain::{Message, Priority};
use std::{
    cmp::Ordering,
    collections::BinaryHeap,
    sync::{Mutex, MutexGuard, PoisonError},
};

/// A message waiting for a dispatch slot.
#[derive(Debug)]
pub struct QueuedDispatch {
    /// The message to deliver.
    pub message: Message,
    /// Whether a caller is waiting on the pending registry for the outcome.
    pub awaiting_response: bool,
    sequence: u64,
}

impl QueuedDispatch {
    const fn priority(&self) -> Priority {
        self.message.priority()
    }
}

impl PartialEq for QueuedDispatch {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence
    }
}

impl Eq for QueuedDispatch {}

impl PartialOrd for QueuedDispatch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedDispatch {
    // Max-heap: higher priority first, then the earlier sequence number.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority()
            .cmp(&other.priority())
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

#[derive(Debug, Default)]
struct QueueState {
    heap: BinaryHeap<QueuedDispatch>,
    next_sequence: u64,
}

/// Dispatch queue ordered by priority, FIFO within a priority.
#[derive(Debug, Default)]
pub struct DispatchQueue {
    state: Mutex<QueueState>,
}

impl DispatchQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a message.
    pub fn push(&self, message: Message, awaiting_response: bool) {
        let mut state = self.lock();
        let sequence = state.next_sequence;
        state.next_sequence = sequence.wrapping_add(1);
        state.heap.push(QueuedDispatch {
            message,
            awaiting_response,
            sequence,
        });
    }

    /// Removes the next message to dispatch.
    pub fn pop(&self) -> Option<QueuedDispatch> {
        self.lock().heap.pop()
    }

    /// Drops every queued message and returns them.
    pub fn drain(&self) -> Vec<QueuedDispatch> {
        self.lock().heap.drain().collect()
    }

    /// Returns the number of queued messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    /// Returns `true` when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
