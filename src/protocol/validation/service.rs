//! Default implementation of the `MessageValidator` port.

use crate::protocol::{
    domain::Message,
    error::ValidationError,
    ports::validator::{MessageValidator, ValidationConfig, ValidationResult},
    validation::rules,
};

/// Applies every rule, collecting failures rather than stopping at the
/// first.
///
/// # Examples
///
/// ```
/// use concierge::protocol::domain::{
///     AgentId, ConversationContext, Message, MessageType, Payload, SessionId, ThreadId,
/// };
/// use concierge::protocol::ports::validator::MessageValidator;
/// use concierge::protocol::validation::service::DefaultMessageValidator;
/// use mockable::DefaultClock;
///
/// let message = Message::builder(
///     AgentId::new("coordinator"),
///     AgentId::new("billing"),
///     MessageType::Inform,
///     Payload::text("Hello"),
///     ConversationContext::new(ThreadId::new(), SessionId::new("s1")),
/// )
/// .build(&DefaultClock)
/// .expect("valid message");
///
/// let validator = DefaultMessageValidator::new();
/// assert!(validator.validate(&message).is_ok());
/// ```
#[derive(Debug, Clone, Default)]
pub struct DefaultMessageValidator {
    config: ValidationConfig,
}

impl DefaultMessageValidator {
    /// Creates a validator with the default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a validator with custom limits.
    #[must_use]
    pub const fn with_config(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Returns the limits in use.
    #[must_use]
    pub const fn config(&self) -> &ValidationConfig {
        &self.config
    }
}

impl MessageValidator for DefaultMessageValidator {
    fn validate(&self, message: &Message) -> ValidationResult<()> {
        let errors: Vec<ValidationError> = [
            self.validate_structure(message),
            self.validate_limits(message),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::multiple(errors))
        }
    }

    fn validate_structure(&self, message: &Message) -> ValidationResult<()> {
        rules::validate_structure(message)
    }

    fn validate_limits(&self, message: &Message) -> ValidationResult<()> {
        let errors: Vec<ValidationError> = [
            rules::validate_text_payload(message, &self.config),
            rules::validate_message_size(message, &self.config),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::multiple(errors))
        }
    }
}
