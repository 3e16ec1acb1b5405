//! The protocol message exchanged between the coordinator and workers.
//!
//! Messages are immutable once built. Construction goes through
//! [`MessageBuilder::build`] or the untrusted [`WireMessage`] conversion, and
//! both run the structural validation rules, so a `Message` value is always
//! well formed.
//!
//! [`WireMessage`]: crate::protocol::adapters::wire::WireMessage

use super::{AgentId, ConversationContext, MessageId, Payload};
use crate::protocol::{adapters::wire::WireMessage, error::ValidationError, validation::rules};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};
use thiserror::Error;

/// Performative of a message.
///
/// The type alone decides whether the sender expects a correlated reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// One-way notification.
    Inform,
    /// Request for information.
    Query,
    /// Request for an action.
    Request,
    /// One-way acknowledgement.
    Confirm,
    /// Request for missing details.
    Clarify,
}

impl MessageType {
    /// Returns `true` when messages of this type expect a correlated response.
    #[must_use]
    pub const fn requires_response(self) -> bool {
        matches!(self, Self::Query | Self::Request | Self::Clarify)
    }

    /// Returns the canonical lower-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inform => "inform",
            Self::Query => "query",
            Self::Request => "request",
            Self::Confirm => "confirm",
            Self::Clarify => "clarify",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown message type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown message type: {0}")]
pub struct ParseMessageTypeError(pub String);

impl FromStr for MessageType {
    type Err = ParseMessageTypeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inform" => Ok(Self::Inform),
            "query" => Ok(Self::Query),
            "request" => Ok(Self::Request),
            "confirm" => Ok(Self::Confirm),
            "clarify" => Ok(Self::Clarify),
            _ => Err(ParseMessageTypeError(value.to_owned())),
        }
    }
}

impl TryFrom<&str> for MessageType {
    type Error = ParseMessageTypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Dispatch priority. Higher priorities leave the dispatch queue first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Background work.
    Low,
    /// The default priority.
    #[default]
    Normal,
    /// Caller-facing work that should jump the queue.
    High,
}

/// A validated protocol message.
///
/// # Invariants
///
/// - `id` is non-nil and `from`/`to` are non-empty
/// - `requires_response == message_type.requires_response()`
/// - `timestamp` is after the Unix epoch
/// - a correlated message never correlates to itself
///
/// # Examples
///
/// ```
/// use concierge::protocol::domain::{
///     AgentId, ConversationContext, Message, MessageType, Payload, SessionId, ThreadId,
/// };
/// use mockable::DefaultClock;
///
/// let clock = DefaultClock;
/// let context = ConversationContext::new(ThreadId::new(), SessionId::new("s1"));
/// let query = Message::builder(
///     AgentId::new("coordinator"),
///     AgentId::new("billing"),
///     MessageType::Query,
///     Payload::text("what is my balance?"),
///     context,
/// )
/// .build(&clock)
/// .expect("valid message");
///
/// assert!(query.requires_response());
///
/// let reply = Message::response_to(&query, MessageType::Inform, Payload::text("£12"))
///     .build(&clock)
///     .expect("valid response");
/// assert_eq!(reply.correlation_id(), Some(query.id()));
/// assert_eq!(reply.to(), query.from());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireMessage", try_from = "WireMessage")]
pub struct Message {
    pub(crate) id: MessageId,
    pub(crate) from: AgentId,
    pub(crate) to: AgentId,
    pub(crate) message_type: MessageType,
    pub(crate) content: Payload,
    pub(crate) context: ConversationContext,
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) requires_response: bool,
    pub(crate) correlation_id: Option<MessageId>,
    pub(crate) priority: Priority,
    pub(crate) expires_at: Option<DateTime<Utc>>,
    pub(crate) timeout: Option<Duration>,
}

impl Message {
    /// Returns a builder for a new message.
    #[must_use]
    pub fn builder(
        from: AgentId,
        to: AgentId,
        message_type: MessageType,
        content: Payload,
        context: ConversationContext,
    ) -> MessageBuilder {
        MessageBuilder::new(from, to, message_type, content, context)
    }

    /// Returns a builder for a response to `original`.
    ///
    /// The response is addressed back to the original sender, correlates to
    /// the original id and inherits its context with the original as parent.
    #[must_use]
    pub fn response_to(
        original: &Self,
        message_type: MessageType,
        content: Payload,
    ) -> MessageBuilder {
        let context = original.context.clone().with_parent(original.id);
        MessageBuilder::new(
            original.to.clone(),
            original.from.clone(),
            message_type,
            content,
            context,
        )
        .with_correlation_id(original.id)
        .with_priority(original.priority)
    }

    /// Returns the message identifier.
    #[must_use]
    pub const fn id(&self) -> MessageId {
        self.id
    }

    /// Returns the sending agent.
    #[must_use]
    pub const fn from(&self) -> &AgentId {
        &self.from
    }

    /// Returns the addressed agent.
    #[must_use]
    pub const fn to(&self) -> &AgentId {
        &self.to
    }

    /// Returns the message type.
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Returns the payload.
    #[must_use]
    pub const fn content(&self) -> &Payload {
        &self.content
    }

    /// Returns the conversation context.
    #[must_use]
    pub const fn context(&self) -> &ConversationContext {
        &self.context
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns `true` when the sender expects a correlated response.
    #[must_use]
    pub const fn requires_response(&self) -> bool {
        self.requires_response
    }

    /// Returns the id of the message this one answers.
    #[must_use]
    pub const fn correlation_id(&self) -> Option<MessageId> {
        self.correlation_id
    }

    /// Returns the dispatch priority.
    #[must_use]
    pub const fn priority(&self) -> Priority {
        self.priority
    }

    /// Returns the instant after which the message must not be delivered.
    #[must_use]
    pub const fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Returns the per-message response timeout, if one was set.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Returns `true` when the message has passed its expiry at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }

    /// Consumes the message, returning its payload.
    #[must_use]
    pub fn into_content(self) -> Payload {
        self.content
    }
}

/// Builder for [`Message`].
///
/// `requires_response` defaults to the value implied by the message type.
/// Overriding it to a different value makes [`MessageBuilder::build`] fail.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    id: Option<MessageId>,
    from: AgentId,
    to: AgentId,
    message_type: MessageType,
    content: Payload,
    context: ConversationContext,
    timestamp: Option<DateTime<Utc>>,
    requires_response: Option<bool>,
    correlation_id: Option<MessageId>,
    priority: Priority,
    expires_at: Option<DateTime<Utc>>,
    timeout: Option<Duration>,
}

impl MessageBuilder {
    /// Creates a builder with the required fields.
    #[must_use]
    pub const fn new(
        from: AgentId,
        to: AgentId,
        message_type: MessageType,
        content: Payload,
        context: ConversationContext,
    ) -> Self {
        Self {
            id: None,
            from,
            to,
            message_type,
            content,
            context,
            timestamp: None,
            requires_response: None,
            correlation_id: None,
            priority: Priority::Normal,
            expires_at: None,
            timeout: None,
        }
    }

    /// Sets a specific message id.
    #[must_use]
    pub const fn with_id(mut self, id: MessageId) -> Self {
        self.id = Some(id);
        self
    }

    /// Overrides the clock-derived timestamp.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Overrides the response flag implied by the message type.
    #[must_use]
    pub const fn with_requires_response(mut self, requires_response: bool) -> Self {
        self.requires_response = Some(requires_response);
        self
    }

    /// Marks the message as a response to `id`.
    #[must_use]
    pub const fn with_correlation_id(mut self, id: MessageId) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// Sets the dispatch priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets an absolute expiry.
    #[must_use]
    pub const fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Sets the response timeout used by `send_and_wait`.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds and validates the message.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when any structural rule fails. All
    /// failures are collected and combined with [`ValidationError::multiple`].
    pub fn build(self, clock: &impl Clock) -> Result<Message, ValidationError> {
        let message = Message {
            id: self.id.unwrap_or_default(),
            from: self.from,
            to: self.to,
            message_type: self.message_type,
            content: self.content,
            context: self.context,
            timestamp: self.timestamp.unwrap_or_else(|| clock.utc()),
            requires_response: self
                .requires_response
                .unwrap_or_else(|| self.message_type.requires_response()),
            correlation_id: self.correlation_id,
            priority: self.priority,
            expires_at: self.expires_at,
            timeout: self.timeout,
        };
        rules::validate_structure(&message)?;
        Ok(message)
    }
}
