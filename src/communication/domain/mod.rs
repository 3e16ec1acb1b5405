//! Correlation and queuing state for the communication manager.

mod pending;
mod queue;

pub use pending::{PendingOutcome, PendingRegistry, PendingSummary};
pub use queue::{DispatchQueue, QueuedDispatch};

/// What happened to a delivered response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The response settled its pending request.
    Delivered,
    /// The response was dropped.
    Discarded(DiscardReason),
}

/// Why a response was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// The message carried no correlation id.
    Uncorrelated,
    /// No request with that id is pending: it already timed out, was
    /// answered, or never existed.
    NotPending,
}
