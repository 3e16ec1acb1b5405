//! Message protocol for coordinator/worker communication.
//!
//! # Architecture
//!
//! - **Domain**: [`domain::Message`], [`domain::Payload`], the
//!   [`domain::ErrorKind`] taxonomy and identifiers
//! - **Ports**: [`ports::validator::MessageValidator`]
//! - **Adapters**: [`adapters::wire::WireMessage`] for untrusted JSON input
//! - **Validation**: pure rules plus the default validator service
//!
//! # Example
//!
//! ```
//! use concierge::protocol::adapters::wire::WireMessage;
//! use concierge::protocol::domain::{
//!     AgentId, ConversationContext, Message, MessageType, Payload, SessionId, ThreadId,
//! };
//! use mockable::DefaultClock;
//!
//! let message = Message::builder(
//!     AgentId::new("coordinator"),
//!     AgentId::new("orders"),
//!     MessageType::Request,
//!     Payload::query("order_status", "where is order 42?"),
//!     ConversationContext::new(ThreadId::new(), SessionId::new("call-1")),
//! )
//! .build(&DefaultClock)
//! .expect("valid message");
//!
//! let json = WireMessage::encode(&message).expect("encodes");
//! let decoded = WireMessage::decode(&json).expect("decodes");
//! assert_eq!(decoded.id(), message.id());
//! ```

pub mod adapters;
pub mod domain;
pub mod error;
pub mod ports;
pub mod validation;

#[cfg(test)]
mod tests;
