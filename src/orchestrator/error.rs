//! Errors surfaced by the orchestrator.
//!
//! Dependency failures during `process_input` never appear here; they are
//! absorbed by the fallback chain and answered with safe text.

use crate::{
    communication::error::CommunicationError,
    protocol::domain::AgentId,
    session::services::SessionError,
};
use thiserror::Error;

/// Errors returned by [`Orchestrator`](super::services::Orchestrator).
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The caller supplied an empty session id.
    #[error("session id must not be blank")]
    BlankSession,

    /// The caller supplied empty text.
    #[error("input text must not be empty")]
    EmptyInput,

    /// The default route has no registered worker.
    #[error("no worker registered for default agent '{0}'")]
    DefaultAgentMissing(AgentId),

    /// The session tier failed outside request handling.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The communication layer could not start.
    #[error(transparent)]
    Communication(#[from] CommunicationError),
}

/// Result type for orchestrator operations.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
