//! Individual validation rules.
//!
//! Each rule is a pure function checking one aspect of a message.

use crate::protocol::{
    domain::{Message, Payload},
    error::ValidationError,
    ports::validator::ValidationConfig,
};

/// Validates that the message has a non-nil id.
///
/// # Errors
///
/// Returns `ValidationError::MissingMessageId` if the id is nil.
pub fn validate_message_id(message: &Message) -> Result<(), ValidationError> {
    if message.id().as_ref().is_nil() {
        return Err(ValidationError::MissingMessageId);
    }
    Ok(())
}

/// Validates that sender and recipient are present.
///
/// # Errors
///
/// Returns `MissingSender` and/or `MissingRecipient`.
pub fn validate_addressing(message: &Message) -> Result<(), ValidationError> {
    let mut errors = Vec::new();
    if message.from().is_blank() {
        errors.push(ValidationError::MissingSender);
    }
    if message.to().is_blank() {
        errors.push(ValidationError::MissingRecipient);
    }
    finish(errors)
}

/// Validates that the timestamp lies after the Unix epoch.
///
/// # Errors
///
/// Returns `ValidationError::InvalidTimestamp` for non-positive timestamps.
pub fn validate_timestamp(message: &Message) -> Result<(), ValidationError> {
    let millis = message.timestamp().timestamp_millis();
    if millis <= 0 {
        return Err(ValidationError::InvalidTimestamp(millis));
    }
    Ok(())
}

/// Validates that the context carries a thread id.
///
/// # Errors
///
/// Returns `ValidationError::MissingThreadId` if the thread id is nil.
pub fn validate_thread_id(message: &Message) -> Result<(), ValidationError> {
    if message.context().thread_id().as_ref().is_nil() {
        return Err(ValidationError::MissingThreadId);
    }
    Ok(())
}

/// Validates that `requires_response` matches the message type.
///
/// # Errors
///
/// Returns `ValidationError::ResponseFlagMismatch` on disagreement.
///
/// # Examples
///
/// ```
/// use concierge::protocol::domain::{
///     AgentId, ConversationContext, Message, MessageType, Payload, SessionId, ThreadId,
/// };
/// use concierge::protocol::error::ValidationError;
/// use mockable::DefaultClock;
///
/// let context = ConversationContext::new(ThreadId::new(), SessionId::new("s1"));
/// let result = Message::builder(
///     AgentId::new("coordinator"),
///     AgentId::new("billing"),
///     MessageType::Inform,
///     Payload::text("fyi"),
///     context,
/// )
/// .with_requires_response(true)
/// .build(&DefaultClock);
///
/// assert!(matches!(
///     result,
///     Err(ValidationError::ResponseFlagMismatch { expected: false, .. })
/// ));
/// ```
pub fn validate_response_flag(message: &Message) -> Result<(), ValidationError> {
    let expected = message.message_type().requires_response();
    if message.requires_response() != expected {
        return Err(ValidationError::ResponseFlagMismatch {
            message_type: message.message_type(),
            expected,
        });
    }
    Ok(())
}

/// Validates that a response does not correlate to itself.
///
/// # Errors
///
/// Returns `ValidationError::SelfCorrelation`.
pub fn validate_correlation(message: &Message) -> Result<(), ValidationError> {
    if message.correlation_id() == Some(message.id()) {
        return Err(ValidationError::SelfCorrelation(message.id()));
    }
    Ok(())
}

/// Validates that the expiry does not precede the timestamp.
///
/// # Errors
///
/// Returns `ValidationError::ExpiresBeforeTimestamp`.
pub fn validate_expiry(message: &Message) -> Result<(), ValidationError> {
    match message.expires_at() {
        Some(expires_at) if expires_at < message.timestamp() => {
            Err(ValidationError::ExpiresBeforeTimestamp)
        }
        _ => Ok(()),
    }
}

/// Runs every structural rule, collecting all failures.
///
/// # Errors
///
/// Returns the combined `ValidationError` if any rule fails.
pub fn validate_structure(message: &Message) -> Result<(), ValidationError> {
    let checks = [
        validate_message_id(message),
        validate_addressing(message),
        validate_timestamp(message),
        validate_thread_id(message),
        validate_response_flag(message),
        validate_correlation(message),
        validate_expiry(message),
    ];
    finish(checks.into_iter().filter_map(Result::err).collect())
}

/// Validates the serialised size of the message.
///
/// # Errors
///
/// Returns `ValidationError::MessageTooLarge` if the limit is exceeded.
pub fn validate_message_size(
    message: &Message,
    config: &ValidationConfig,
) -> Result<(), ValidationError> {
    let serialized = serde_json::to_vec(message)
        .map_err(|e| ValidationError::Serialization(e.to_string()))?;

    if serialized.len() > config.max_message_size_bytes {
        return Err(ValidationError::MessageTooLarge {
            actual_bytes: serialized.len(),
            limit_bytes: config.max_message_size_bytes,
        });
    }
    Ok(())
}

/// Validates the text carried by text-bearing payloads.
///
/// # Errors
///
/// Returns `EmptyText` or `TextTooLong`.
pub fn validate_text_payload(
    message: &Message,
    config: &ValidationConfig,
) -> Result<(), ValidationError> {
    let text = match message.content() {
        Payload::Text { text } | Payload::Query { text, .. } => text,
        Payload::Clarification { question, .. } => question,
        Payload::Result(_) | Payload::Json { .. } => return Ok(()),
    };

    if !config.allow_empty_text && text.trim().is_empty() {
        return Err(ValidationError::EmptyText);
    }

    let length = text.chars().count();
    if length > config.max_text_length {
        return Err(ValidationError::TextTooLong {
            max: config.max_text_length,
            actual: length,
        });
    }
    Ok(())
}

fn finish(errors: Vec<ValidationError>) -> Result<(), ValidationError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::multiple(errors))
    }
}
