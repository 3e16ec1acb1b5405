//! Storage port shared by every session tier.

use crate::{protocol::domain::SessionId, session::domain::Session};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for session store operations.
pub type SessionStoreResult<T> = Result<T, SessionStoreError>;

/// Session persistence contract.
///
/// Ephemeral, session-scoped and long-term tiers implement the same
/// operations so the manager never depends on which one is active. A store
/// must round-trip a [`Session`] losslessly.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts or replaces a session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionStoreError::Persistence`] when the tier cannot write.
    async fn save(&self, session: &Session) -> SessionStoreResult<()>;

    /// Loads a session by id.
    ///
    /// Returns `None` when no record exists. Expiry is left to the caller.
    async fn load(&self, id: &SessionId) -> SessionStoreResult<Option<Session>>;

    /// Replaces an existing session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionStoreError::NotFound`] when no record exists.
    async fn update(&self, session: &Session) -> SessionStoreResult<()>;

    /// Removes a session. Returns `true` when a record was removed.
    async fn delete(&self, id: &SessionId) -> SessionStoreResult<bool>;

    /// Lists every stored session id.
    async fn list(&self) -> SessionStoreResult<Vec<SessionId>>;
}

/// Errors returned by session store implementations.
#[derive(Debug, Clone, Error)]
pub enum SessionStoreError {
    /// The session was not found.
    #[error("session not found: {0}")]
    NotFound(SessionId),

    /// A stored record could not be decoded.
    #[error("corrupt session record {id}: {message}")]
    Corrupt {
        /// The affected session.
        id: SessionId,
        /// Decoder message.
        message: String,
    },

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl SessionStoreError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }

    /// Builds a persistence error from a lock or join failure message.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::persistence(std::io::Error::other(message.into()))
    }
}
