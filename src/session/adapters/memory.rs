//! In-process session tiers.
//!
//! [`EphemeralSessionStore`] lives and dies with its owner.
//! [`ScopedSessionStore`] is a cloneable handle: a manager rebuilt on the
//! same handle sees every session that has not yet expired.

use async_trait::async_trait;
use mockable::Clock;
use std::{
    collections::HashMap,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::{
    protocol::domain::SessionId,
    session::{
        domain::Session,
        ports::{SessionStore, SessionStoreError, SessionStoreResult},
    },
};

type SessionMap = HashMap<SessionId, Session>;

fn read(map: &RwLock<SessionMap>) -> SessionStoreResult<RwLockReadGuard<'_, SessionMap>> {
    map.read()
        .map_err(|err| SessionStoreError::backend(err.to_string()))
}

fn write(map: &RwLock<SessionMap>) -> SessionStoreResult<RwLockWriteGuard<'_, SessionMap>> {
    map.write()
        .map_err(|err| SessionStoreError::backend(err.to_string()))
}

fn replace_existing(map: &RwLock<SessionMap>, session: &Session) -> SessionStoreResult<()> {
    let mut guard = write(map)?;
    match guard.get_mut(session.id()) {
        Some(stored) => {
            *stored = session.clone();
            Ok(())
        }
        None => Err(SessionStoreError::NotFound(session.id().clone())),
    }
}

/// Process-memory tier. Sessions are lost when the store is dropped.
#[derive(Debug, Default)]
pub struct EphemeralSessionStore {
    sessions: RwLock<SessionMap>,
}

impl EphemeralSessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().map(|guard| guard.len()).unwrap_or(0)
    }

    /// Returns `true` if no sessions are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for EphemeralSessionStore {
    async fn save(&self, session: &Session) -> SessionStoreResult<()> {
        write(&self.sessions)?.insert(session.id().clone(), session.clone());
        Ok(())
    }

    async fn load(&self, id: &SessionId) -> SessionStoreResult<Option<Session>> {
        Ok(read(&self.sessions)?.get(id).cloned())
    }

    async fn update(&self, session: &Session) -> SessionStoreResult<()> {
        replace_existing(&self.sessions, session)
    }

    async fn delete(&self, id: &SessionId) -> SessionStoreResult<bool> {
        Ok(write(&self.sessions)?.remove(id).is_some())
    }

    async fn list(&self) -> SessionStoreResult<Vec<SessionId>> {
        let mut ids: Vec<_> = read(&self.sessions)?.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// Session-lifetime tier.
///
/// Clones share storage. Records whose session has expired are dropped the
/// next time they are loaded or listed.
#[derive(Debug)]
pub struct ScopedSessionStore<C: Clock> {
    sessions: Arc<RwLock<SessionMap>>,
    clock: Arc<C>,
}

impl<C: Clock> Clone for ScopedSessionStore<C> {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<C: Clock> ScopedSessionStore<C> {
    /// Creates an empty store that judges expiry with `clock`.
    #[must_use]
    pub fn new(clock: Arc<C>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    fn purge_expired(&self) -> SessionStoreResult<()> {
        let now = self.clock.utc();
        write(&self.sessions)?.retain(|_, session| !session.is_expired(now));
        Ok(())
    }
}

#[async_trait]
impl<C: Clock + Send + Sync> SessionStore for ScopedSessionStore<C> {
    async fn save(&self, session: &Session) -> SessionStoreResult<()> {
        write(&self.sessions)?.insert(session.id().clone(), session.clone());
        Ok(())
    }

    async fn load(&self, id: &SessionId) -> SessionStoreResult<Option<Session>> {
        let now = self.clock.utc();
        let mut guard = write(&self.sessions)?;
        if guard.get(id).is_some_and(|session| session.is_expired(now)) {
            guard.remove(id);
        }
        Ok(guard.get(id).cloned())
    }

    async fn update(&self, session: &Session) -> SessionStoreResult<()> {
        replace_existing(&self.sessions, session)
    }

    async fn delete(&self, id: &SessionId) -> SessionStoreResult<bool> {
        Ok(write(&self.sessions)?.remove(id).is_some())
    }

    async fn list(&self) -> SessionStoreResult<Vec<SessionId>> {
        self.purge_expired()?;
        let mut ids: Vec<_> = read(&self.sessions)?.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
