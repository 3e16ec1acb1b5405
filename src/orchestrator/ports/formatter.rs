//! Worker result to caller text.

use crate::protocol::domain::{AgentFault, WorkerResult};

/// Turns a worker result into the text returned to the caller.
#[cfg_attr(test, mockall::automock)]
pub trait ResponseFormatter: Send + Sync {
    /// Formats `result` for `intent`.
    ///
    /// # Errors
    ///
    /// Returns a fault when the result cannot be rendered.
    fn format(&self, intent: &str, result: &WorkerResult) -> Result<String, AgentFault>;
}
