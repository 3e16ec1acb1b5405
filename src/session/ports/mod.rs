//! Ports for session persistence.

pub mod store;

#[cfg(test)]
pub use store::MockSessionStore;
pub use store::{SessionStore, SessionStoreError, SessionStoreResult};
