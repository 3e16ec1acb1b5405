//! Session and conversation state lifecycle.
//!
//! A [`Session`](domain::Session) holds one caller's conversation context,
//! bounded history and scratch-pad memory. The
//! [`SessionStateManager`](services::SessionStateManager) is the only
//! component that mutates sessions; it persists them through a
//! [`SessionStore`](ports::SessionStore) tier chosen at construction.
//!
//! # Examples
//!
//! ```
//! use concierge::clock::ManualClock;
//! use concierge::protocol::domain::SessionId;
//! use concierge::session::{
//!     adapters::EphemeralSessionStore,
//!     domain::{HistoryEntry, HistoryRole},
//!     services::{SessionConfig, SessionStateManager},
//! };
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let clock = Arc::new(ManualClock::default());
//! let manager = SessionStateManager::new(
//!     Arc::new(EphemeralSessionStore::new()),
//!     Arc::clone(&clock),
//!     SessionConfig::default(),
//! );
//! let id = SessionId::new("s1");
//! manager.get_or_create_session(&id).await?;
//! manager
//!     .add_to_history(&id, HistoryEntry::new(HistoryRole::Caller, "hi", &*clock))
//!     .await?;
//! assert_eq!(manager.get_recent_history(&id, 5).await?.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
