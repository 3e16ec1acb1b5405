//! JSON wire representation of protocol messages.
//!
//! The wire shape uses plain strings and epoch milliseconds so it can be
//! produced by any client. Converting back into a [`Message`] re-runs the
//! structural rules; unknown message types are rejected.

use crate::protocol::{
    domain::{
        AgentId, ConversationContext, Message, MessageId, MessageType, Payload, Priority,
    },
    error::{ValidationError, WireMessageError},
    validation::rules,
};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Untrusted, serialisable form of a [`Message`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    /// Message id.
    pub id: Uuid,
    /// Sending agent.
    pub from: String,
    /// Addressed agent.
    pub to: String,
    /// Message type name.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Payload.
    pub content: Payload,
    /// Conversation context.
    pub context: ConversationContext,
    /// Creation time in epoch milliseconds.
    pub timestamp: i64,
    /// Whether a correlated reply is expected.
    pub requires_response: bool,
    /// Id of the message being answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    /// Dispatch priority.
    #[serde(default)]
    pub priority: Priority,
    /// Expiry in epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    /// Response timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl WireMessage {
    /// Decodes and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`WireMessageError::Malformed`] for JSON that does not match
    /// the wire shape and [`WireMessageError::Invalid`] for messages that
    /// break a protocol rule.
    pub fn decode(json: &str) -> Result<Message, WireMessageError> {
        let wire: Self = serde_json::from_str(json)?;
        Ok(Message::try_from(wire)?)
    }

    /// Encodes a message as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`WireMessageError::Malformed`] if serialisation fails.
    pub fn encode(message: &Message) -> Result<String, WireMessageError> {
        Ok(serde_json::to_string(&Self::from(message.clone()))?)
    }
}

impl From<Message> for WireMessage {
    fn from(message: Message) -> Self {
        Self {
            id: message.id.into_inner(),
            from: message.from.as_str().to_owned(),
            to: message.to.as_str().to_owned(),
            message_type: message.message_type.as_str().to_owned(),
            content: message.content,
            context: message.context,
            timestamp: message.timestamp.timestamp_millis(),
            requires_response: message.requires_response,
            correlation_id: message.correlation_id.map(MessageId::into_inner),
            priority: message.priority,
            expires_at: message.expires_at.map(|at| at.timestamp_millis()),
            timeout_ms: message
                .timeout
                .map(|timeout| u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)),
        }
    }
}

impl TryFrom<WireMessage> for Message {
    type Error = ValidationError;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        let message_type: MessageType = wire
            .message_type
            .parse()
            .map_err(|_| ValidationError::UnknownMessageType(wire.message_type.clone()))?;
        let timestamp = DateTime::from_timestamp_millis(wire.timestamp)
            .ok_or(ValidationError::InvalidTimestamp(wire.timestamp))?;
        let expires_at = match wire.expires_at {
            Some(millis) => Some(
                DateTime::from_timestamp_millis(millis)
                    .ok_or(ValidationError::ExpiresBeforeTimestamp)?,
            ),
            None => None,
        };

        let message = Self {
            id: MessageId::from_uuid(wire.id),
            from: AgentId::new(wire.from),
            to: AgentId::new(wire.to),
            message_type,
            content: wire.content,
            context: wire.context,
            timestamp,
            requires_response: wire.requires_response,
            correlation_id: wire.correlation_id.map(MessageId::from_uuid),
            priority: wire.priority,
            expires_at,
            timeout: wire.timeout_ms.map(Duration::from_millis),
        };
        rules::validate_structure(&message)?;
        Ok(message)
    }
}
