//! Composition root for caller conversations.
//!
//! The [`Orchestrator`](services::Orchestrator) owns one
//! [`CommunicationManager`](crate::communication::services::CommunicationManager)
//! and one [`SessionStateManager`](crate::session::services::SessionStateManager)
//! and answers caller text through them. Routing, caller preferences and
//! response formatting sit behind ports so the natural-language layer can
//! be swapped without touching dispatch or degradation.
//!
//! # Examples
//!
//! ```
//! use concierge::clock::ManualClock;
//! use concierge::communication::adapters::handler_fn;
//! use concierge::config::ConciergeConfig;
//! use concierge::orchestrator::services::Orchestrator;
//! use concierge::protocol::domain::{SessionId, WorkerResult};
//! use concierge::session::adapters::EphemeralSessionStore;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = Orchestrator::from_config(
//!     &ConciergeConfig::default(),
//!     Arc::new(EphemeralSessionStore::new()),
//!     Arc::new(ManualClock::default()),
//! );
//! orchestrator.communication().register(
//!     "support",
//!     handler_fn(|_message| async { Ok(WorkerResult::success(json!("Happy to help."))) }),
//! );
//! orchestrator.initialize()?;
//!
//! let reply = orchestrator
//!     .process_input("hello", &SessionId::new("s1"), None)
//!     .await?;
//! assert_eq!(reply, "Happy to help.");
//! orchestrator.shutdown().await?;
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
