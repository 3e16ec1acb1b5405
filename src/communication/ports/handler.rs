//! Worker handler port.

use crate::protocol::domain::{AgentFault, Message, WorkerResult};
use async_trait::async_trait;

/// A registered worker agent.
///
/// Handlers answer with the standard [`WorkerResult`] shape. Returning
/// `Err` means the handler itself failed; returning a result with
/// `status = error` means the worker ran and reported a failure. Both are
/// treated as faults by the communication manager, but only the latter
/// carries a worker-chosen code and retry flag.
#[async_trait]
pub trait WorkerHandler: Send + Sync {
    /// Handles one inbound message.
    ///
    /// # Errors
    ///
    /// Returns an [`AgentFault`] when the worker cannot produce a result.
    async fn handle(&self, message: Message) -> Result<WorkerResult, AgentFault>;
}
