//! Message dispatch between the coordinator and worker agents.
//!
//! Workers register a [`WorkerHandler`](ports::WorkerHandler) under their
//! agent id. The [`CommunicationManager`](services::CommunicationManager)
//! validates outbound messages, orders them by priority, runs each handler
//! behind that worker's circuit breaker and retry policy, and correlates
//! responses back to waiting callers by request id.
//!
//! # Examples
//!
//! ```
//! use concierge::clock::ManualClock;
//! use concierge::communication::{adapters::handler_fn, services::CommunicationManager};
//! use concierge::config::ConciergeConfig;
//! use concierge::protocol::domain::{
//!     AgentId, ConversationContext, Message, MessageType, Payload, SessionId, ThreadId,
//!     WorkerResult,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let clock = Arc::new(ManualClock::default());
//! let manager = CommunicationManager::from_config(&ConciergeConfig::default(), Arc::clone(&clock));
//! manager.register("billing", handler_fn(|_message| async {
//!     Ok(WorkerResult::success(json!({ "balance": 42 })))
//! }));
//!
//! let context = ConversationContext::new(ThreadId::new(), SessionId::new("s1"));
//! let request = Message::builder(
//!     AgentId::new("coordinator"),
//!     AgentId::new("billing"),
//!     MessageType::Request,
//!     Payload::text("balance?"),
//!     context,
//! )
//! .build(&*clock)?;
//! let response = manager.send_and_wait(request, None).await?;
//! assert!(response.content().as_result().is_some());
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod domain;
pub mod error;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
