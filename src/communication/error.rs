//! Errors raised by the communication manager.

use crate::protocol::{
    domain::{AgentFault, AgentId, ErrorKind, MessageId, MessageType},
    error::ValidationError,
};
use thiserror::Error;

/// Failures surfaced by [`CommunicationManager`](super::services::CommunicationManager).
///
/// Everything except [`Self::Fault`] is detected before any dispatch and is
/// never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommunicationError {
    /// The message failed validation.
    #[error("invalid message: {0}")]
    Invalid(#[from] ValidationError),

    /// A response-requiring message was passed to `send`.
    #[error("{0} messages require a response; use send_and_wait")]
    ResponseRequired(MessageType),

    /// A message that expects no response was passed to `send_and_wait`.
    #[error("{0} messages do not expect a response; use send")]
    NoResponseExpected(MessageType),

    /// No worker is registered under the recipient id.
    #[error("no handler registered for agent '{0}'")]
    NoHandler(AgentId),

    /// A request with the same id is already awaiting a response.
    #[error("request {0} is already pending")]
    DuplicateRequest(MessageId),

    /// No tokio runtime is available to run the dispatcher.
    #[error("no tokio runtime available for the dispatcher")]
    NoRuntime,

    /// Dispatch ran and failed, timed out or was cancelled.
    #[error(transparent)]
    Fault(#[from] AgentFault),
}

/// Result type for communication operations.
pub type CommunicationResult<T> = Result<T, CommunicationError>;

impl CommunicationError {
    /// Returns the taxonomy kind this error maps to.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Invalid(_)
            | Self::ResponseRequired(_)
            | Self::NoResponseExpected(_)
            | Self::DuplicateRequest(_) => ErrorKind::InvalidInput,
            Self::NoHandler(_) => ErrorKind::ToolNotFound,
            Self::NoRuntime => ErrorKind::Internal,
            Self::Fault(fault) => fault.kind(),
        }
    }
}

impl From<CommunicationError> for AgentFault {
    fn from(err: CommunicationError) -> Self {
        match err {
            CommunicationError::Fault(fault) => fault,
            CommunicationError::Invalid(validation) => validation.into(),
            other => Self::new(other.kind(), other.to_string()),
        }
    }
}
