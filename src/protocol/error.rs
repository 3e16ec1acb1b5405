//! Error types for message validation and wire decoding.
//!
//! Uses `thiserror` for typed variants that callers can inspect.

use super::domain::{AgentFault, ErrorKind, MessageId, MessageType};
use thiserror::Error;

/// Errors raised when a message violates a protocol rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The message id is nil.
    #[error("message ID is required")]
    MissingMessageId,

    /// The sender is empty.
    #[error("message sender is required")]
    MissingSender,

    /// The recipient is empty.
    #[error("message recipient is required")]
    MissingRecipient,

    /// The type string is not one of the known message types.
    #[error("unknown message type '{0}'")]
    UnknownMessageType(String),

    /// The timestamp is at or before the Unix epoch.
    #[error("message timestamp {0}ms must be positive")]
    InvalidTimestamp(i64),

    /// The context carries a nil thread id.
    #[error("conversation context must carry a thread ID")]
    MissingThreadId,

    /// The response flag disagrees with the message type.
    #[error("{message_type} messages must have requires_response = {expected}")]
    ResponseFlagMismatch {
        /// The message type.
        message_type: MessageType,
        /// The flag value implied by the type.
        expected: bool,
    },

    /// A response correlates to its own id.
    #[error("message {0} cannot correlate to itself")]
    SelfCorrelation(MessageId),

    /// The expiry precedes the creation timestamp.
    #[error("message expires before it was created")]
    ExpiresBeforeTimestamp,

    /// The serialised message exceeds the configured limit.
    #[error("message size {actual_bytes} exceeds limit of {limit_bytes} bytes")]
    MessageTooLarge {
        /// The actual size in bytes.
        actual_bytes: usize,
        /// The maximum allowed size.
        limit_bytes: usize,
    },

    /// A text payload exceeds the configured limit.
    #[error("text payload of {actual} characters exceeds limit of {max}")]
    TextTooLong {
        /// The maximum allowed length.
        max: usize,
        /// The actual length.
        actual: usize,
    },

    /// A text payload is empty.
    #[error("text payload cannot be empty")]
    EmptyText,

    /// The message could not be serialised for size checking.
    #[error("failed to serialise message: {0}")]
    Serialization(String),

    /// Multiple validation errors occurred.
    #[error("multiple validation errors: {}", format_errors(.0))]
    Multiple(Vec<Self>),
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    /// Combines validation errors into a single error.
    ///
    /// A single error is returned unwrapped.
    #[must_use]
    pub fn multiple(errors: Vec<Self>) -> Self {
        let mut flattened = Vec::with_capacity(errors.len());
        for error in errors {
            match error {
                Self::Multiple(inner) => flattened.extend(inner),
                other => flattened.push(other),
            }
        }
        match <[Self; 1]>::try_from(flattened) {
            Ok([only]) => only,
            Err(many) => Self::Multiple(many),
        }
    }

    /// Returns the individual errors, flattening `Multiple`.
    #[must_use]
    pub fn errors(&self) -> Vec<&Self> {
        match self {
            Self::Multiple(errors) => errors.iter().collect(),
            other => vec![other],
        }
    }

    /// Returns `true` when any contained error matches `predicate`.
    pub fn any(&self, predicate: impl Fn(&Self) -> bool) -> bool {
        self.errors().into_iter().any(predicate)
    }
}

impl From<ValidationError> for AgentFault {
    fn from(error: ValidationError) -> Self {
        Self::new(ErrorKind::InvalidInput, error.to_string())
    }
}

/// Errors raised while decoding an untrusted wire message.
#[derive(Debug, Error)]
pub enum WireMessageError {
    /// The document is not valid JSON for the wire shape.
    #[error("malformed wire message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The decoded message breaks a protocol rule.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

impl From<WireMessageError> for AgentFault {
    fn from(error: WireMessageError) -> Self {
        Self::new(ErrorKind::InvalidInput, error.to_string())
    }
}
