//! Session lifecycle service.

use mockable::Clock;
use serde::Deserialize;
use serde_json::Value;
use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Mutex, PoisonError, RwLock},
    time::Duration,
};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::{
    config::serde_secs,
    protocol::domain::{AgentFault, ErrorKind, MessageId, SessionId},
    session::{
        domain::{DEFAULT_MAX_HISTORY, DEFAULT_TTL, HistoryEntry, Session, SessionLimits},
        ports::{SessionStore, SessionStoreError},
    },
};

/// Session lifetime and storage bounds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Time a session lives after its last mutation.
    #[serde(rename = "ttl_secs", with = "serde_secs")]
    pub ttl: Duration,
    /// Maximum history entries retained per session.
    pub max_history: usize,
    /// Serializes operations on the same session id.
    ///
    /// With this disabled two concurrent first lookups of one id may each
    /// create a session, and the later save wins.
    pub serialize_access: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            max_history: DEFAULT_MAX_HISTORY,
            serialize_access: true,
        }
    }
}

impl SessionConfig {
    /// Returns the limits applied to new sessions.
    #[must_use]
    pub const fn limits(&self) -> SessionLimits {
        SessionLimits {
            ttl: self.ttl,
            max_history: self.max_history,
        }
    }
}

/// Service-level errors for session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session id was empty or whitespace.
    #[error("session id must not be blank")]
    BlankId,
    /// No live session exists for the id.
    #[error("session not found: {0}")]
    NotFound(SessionId),
    /// The backing tier failed.
    #[error(transparent)]
    Store(#[from] SessionStoreError),
}

/// Result type for session service operations.
pub type SessionResult<T> = Result<T, SessionError>;

impl From<SessionError> for AgentFault {
    fn from(err: SessionError) -> Self {
        let kind = match &err {
            SessionError::BlankId => ErrorKind::InvalidInput,
            SessionError::NotFound(_) => ErrorKind::NotFound,
            SessionError::Store(_) => ErrorKind::DatabaseError,
        };
        Self::new(kind, err.to_string())
    }
}

/// Owns every session and mediates all reads and mutations.
///
/// Lookups consult the in-process cache, then the backing tier, and only
/// then create. Expired sessions are treated as absent and purged when met.
/// Mutators require a live session; reads of an absent session return an
/// empty answer.
pub struct SessionStateManager<S, C>
where
    S: SessionStore,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    clock: Arc<C>,
    config: SessionConfig,
    cache: RwLock<HashMap<SessionId, Session>>,
    locks: Mutex<HashMap<SessionId, Arc<AsyncMutex<()>>>>,
}

impl<S, C> SessionStateManager<S, C>
where
    S: SessionStore,
    C: Clock + Send + Sync,
{
    /// Creates a manager over `store`.
    #[must_use]
    pub fn new(store: Arc<S>, clock: Arc<C>, config: SessionConfig) -> Self {
        Self {
            store,
            clock,
            config,
            cache: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns a live session, creating one when none exists or the stored
    /// one has expired.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::BlankId`] for an empty id and
    /// [`SessionError::Store`] when the backing tier fails.
    pub async fn get_or_create_session(&self, id: &SessionId) -> SessionResult<Session> {
        ensure_id(id)?;
        let _guard = self.lock(id).await;
        if let Some(session) = self.find_live(id).await? {
            return Ok(session);
        }

        let session = Session::new(id.clone(), self.config.limits(), &*self.clock);
        self.store.save(&session).await?;
        self.cache_put(&session)?;
        info!(session = %id, thread = %session.context().thread_id(), "session created");
        Ok(session)
    }

    /// Returns a live session without creating one.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] when the backing tier fails.
    pub async fn get_session(&self, id: &SessionId) -> SessionResult<Option<Session>> {
        ensure_id(id)?;
        let found = {
            let _guard = self.lock(id).await;
            self.find_live(id).await
        };
        if !matches!(found, Ok(Some(_))) {
            self.forget_lock(id);
        }
        found
    }

    /// Appends a history entry, evicting the oldest beyond the cap.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] when no live session exists.
    pub async fn add_to_history(&self, id: &SessionId, entry: HistoryEntry) -> SessionResult<()> {
        self.mutate(id, |session, clock| session.push_history(entry, clock))
            .await
    }

    /// Returns up to `count` most recent entries, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] when the backing tier fails.
    pub async fn get_recent_history(
        &self,
        id: &SessionId,
        count: usize,
    ) -> SessionResult<Vec<HistoryEntry>> {
        Ok(self
            .get_session(id)
            .await?
            .map(|session| session.recent_history(count))
            .unwrap_or_default())
    }

    /// Stores a scratch-pad value for later turns.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] when no live session exists.
    pub async fn store_in_memory(
        &self,
        id: &SessionId,
        key: impl Into<String> + Send,
        value: Value,
    ) -> SessionResult<()> {
        let memory_key = key.into();
        self.mutate(id, |session, clock| {
            session.store_memory(memory_key, value, clock);
        })
        .await
    }

    /// Reads a scratch-pad value.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] when the backing tier fails.
    pub async fn get_from_memory(&self, id: &SessionId, key: &str) -> SessionResult<Option<Value>> {
        Ok(self
            .get_session(id)
            .await?
            .and_then(|session| session.memory_value(key).cloned()))
    }

    /// Empties the scratch pad.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] when no live session exists.
    pub async fn clear_memory(&self, id: &SessionId) -> SessionResult<()> {
        self.mutate(id, |session, clock| session.clear_memory(clock))
            .await
    }

    /// Sets a session metadata value.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] when no live session exists.
    pub async fn update_metadata(
        &self,
        id: &SessionId,
        key: impl Into<String> + Send,
        value: Value,
    ) -> SessionResult<()> {
        let metadata_key = key.into();
        self.mutate(id, |session, clock| {
            session.set_metadata(metadata_key, value, clock);
        })
        .await
    }

    /// Merges caller preferences into the session's conversation context.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] when no live session exists.
    pub async fn apply_preferences(
        &self,
        id: &SessionId,
        preferences: impl IntoIterator<Item = (String, Value)> + Send,
    ) -> SessionResult<()> {
        self.mutate(id, |session, clock| {
            session.apply_preferences(preferences, clock);
        })
        .await
    }

    /// Records the caller a session belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] when no live session exists.
    pub async fn attach_caller(
        &self,
        id: &SessionId,
        caller_id: impl Into<String> + Send,
    ) -> SessionResult<()> {
        let caller = caller_id.into();
        self.mutate(id, |session, clock| session.attach_caller(caller, clock))
            .await
    }

    /// Records an outstanding request against the session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] when no live session exists.
    pub async fn track_pending(&self, id: &SessionId, request: MessageId) -> SessionResult<bool> {
        self.mutate(id, |session, clock| session.track_pending(request, clock))
            .await
    }

    /// Forgets an outstanding request.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] when no live session exists.
    pub async fn release_pending(&self, id: &SessionId, request: MessageId) -> SessionResult<bool> {
        self.mutate(id, |session, clock| session.release_pending(request, clock))
            .await
    }

    /// Pushes the session's expiry one time-to-live into the future.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] when no live session exists.
    pub async fn extend_session(&self, id: &SessionId) -> SessionResult<Session> {
        self.mutate(id, |session, clock| {
            session.extend(clock);
            session.clone()
        })
        .await
    }

    /// Removes a session from the cache and the backing tier.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] when the backing tier fails.
    pub async fn delete_session(&self, id: &SessionId) -> SessionResult<bool> {
        ensure_id(id)?;
        let removed = {
            let _guard = self.lock(id).await;
            let cached = self.cache_remove(id)?;
            let stored = self.store.delete(id).await?;
            cached || stored
        };
        self.forget_lock(id);
        Ok(removed)
    }

    /// Deletes every expired session. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] when the backing tier fails.
    pub async fn cleanup_expired(&self) -> SessionResult<usize> {
        let mut removed = 0_usize;
        for id in self.known_ids().await? {
            let expired = {
                let _guard = self.lock(&id).await;
                let expired = self.load_any(&id).await?.is_some_and(|session| {
                    session.is_expired(self.clock.utc())
                });
                if expired {
                    self.cache_remove(&id)?;
                    self.store.delete(&id).await?;
                }
                expired
            };
            if expired {
                self.forget_lock(&id);
                removed = removed.saturating_add(1);
            }
        }
        if removed > 0 {
            debug!(removed, "expired sessions cleaned up");
        }
        Ok(removed)
    }

    /// Counts live sessions across the cache and the backing tier.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] when the backing tier fails.
    pub async fn active_count(&self) -> SessionResult<usize> {
        Ok(self.list_sessions().await?.len())
    }

    /// Lists live session ids in sorted order.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] when the backing tier fails.
    pub async fn list_sessions(&self) -> SessionResult<Vec<SessionId>> {
        let now = self.clock.utc();
        let mut live = Vec::new();
        for id in self.known_ids().await? {
            if self
                .load_any(&id)
                .await?
                .is_some_and(|session| !session.is_expired(now))
            {
                live.push(id);
            }
        }
        Ok(live)
    }

    async fn mutate<R: Send>(
        &self,
        id: &SessionId,
        apply: impl FnOnce(&mut Session, &C) -> R + Send,
    ) -> SessionResult<R> {
        ensure_id(id)?;
        let outcome = {
            let _guard = self.lock(id).await;
            self.apply_live(id, apply).await
        };
        if matches!(outcome, Err(SessionError::NotFound(_))) {
            self.forget_lock(id);
        }
        outcome
    }

    /// Caller holds the session lock.
    async fn apply_live<R: Send>(
        &self,
        id: &SessionId,
        apply: impl FnOnce(&mut Session, &C) -> R + Send,
    ) -> SessionResult<R> {
        let mut session = self
            .find_live(id)
            .await?
            .ok_or_else(|| SessionError::NotFound(id.clone()))?;
        let outcome = apply(&mut session, self.clock.as_ref());
        match self.store.update(&session).await {
            Err(SessionStoreError::NotFound(_)) => self.store.save(&session).await?,
            other => other?,
        }
        self.cache_put(&session)?;
        Ok(outcome)
    }

    /// Cache, then backing tier. Expired records are purged and reported as
    /// absent.
    async fn find_live(&self, id: &SessionId) -> SessionResult<Option<Session>> {
        let Some(session) = self.load_any(id).await? else {
            return Ok(None);
        };
        if session.is_expired(self.clock.utc()) {
            debug!(session = %id, "discarding expired session");
            self.cache_remove(id)?;
            self.store.delete(id).await?;
            return Ok(None);
        }
        self.cache_put(&session)?;
        Ok(Some(session))
    }

    async fn load_any(&self, id: &SessionId) -> SessionResult<Option<Session>> {
        if let Some(cached) = self.cache_get(id)? {
            return Ok(Some(cached));
        }
        Ok(self.store.load(id).await?)
    }

    async fn known_ids(&self) -> SessionResult<BTreeSet<SessionId>> {
        let mut ids: BTreeSet<SessionId> = self.store.list().await?.into_iter().collect();
        ids.extend(self.cache_ids()?);
        Ok(ids)
    }

    async fn lock(&self, id: &SessionId) -> Option<OwnedMutexGuard<()>> {
        if !self.config.serialize_access {
            return None;
        }
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(id.clone()).or_default())
        };
        Some(lock.lock_owned().await)
    }

    /// Number of per-session locks currently tracked.
    #[cfg(test)]
    pub(crate) fn tracked_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn forget_lock(&self, id: &SessionId) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(id);
        }
    }

    fn cache_get(&self, id: &SessionId) -> SessionResult<Option<Session>> {
        let cache = self.cache.read().map_err(poisoned)?;
        Ok(cache.get(id).cloned())
    }

    fn cache_put(&self, session: &Session) -> SessionResult<()> {
        let mut cache = self.cache.write().map_err(poisoned)?;
        cache.insert(session.id().clone(), session.clone());
        Ok(())
    }

    fn cache_remove(&self, id: &SessionId) -> SessionResult<bool> {
        let mut cache = self.cache.write().map_err(poisoned)?;
        Ok(cache.remove(id).is_some())
    }

    fn cache_ids(&self) -> SessionResult<Vec<SessionId>> {
        let cache = self.cache.read().map_err(poisoned)?;
        Ok(cache.keys().cloned().collect())
    }
}

fn ensure_id(id: &SessionId) -> SessionResult<()> {
    if id.is_blank() {
        return Err(SessionError::BlankId);
    }
    Ok(())
}

fn poisoned<E: std::fmt::Display>(err: E) -> SessionError {
    SessionError::Store(SessionStoreError::backend(format!(
        "session cache lock poisoned: {err}"
    )))
}
