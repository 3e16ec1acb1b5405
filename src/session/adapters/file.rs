//! Long-term tier: one JSON document per session in a capability-scoped
//! directory.
//!
//! File names are the lowercase hex encoding of the session id, so any
//! caller-supplied id maps to a safe, reversible name. Writes go to a
//! temporary file first and are renamed into place.

use async_trait::async_trait;
use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use std::{io, sync::Arc};

use crate::{
    protocol::domain::SessionId,
    session::{
        domain::Session,
        ports::{SessionStore, SessionStoreError, SessionStoreResult},
    },
};

const EXTENSION: &str = ".json";
const TEMP_SUFFIX: &str = ".tmp";

/// Session store backed by a directory of JSON files.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: Arc<Dir>,
}

impl FileSessionStore {
    /// Opens (creating if needed) the directory at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionStoreError::Persistence`] when the directory cannot
    /// be created or opened.
    pub fn open(path: impl AsRef<Utf8Path>) -> SessionStoreResult<Self> {
        let root = path.as_ref();
        Dir::create_ambient_dir_all(root, ambient_authority())
            .map_err(SessionStoreError::persistence)?;
        let dir =
            Dir::open_ambient_dir(root, ambient_authority()).map_err(SessionStoreError::persistence)?;
        Ok(Self::from_dir(dir))
    }

    /// Wraps an already opened directory capability.
    #[must_use]
    pub fn from_dir(dir: Dir) -> Self {
        Self { dir: Arc::new(dir) }
    }

    async fn run_blocking<F, T>(&self, f: F) -> SessionStoreResult<T>
    where
        F: FnOnce(&Dir) -> SessionStoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let dir = Arc::clone(&self.dir);
        tokio::task::spawn_blocking(move || f(&dir))
            .await
            .map_err(SessionStoreError::persistence)?
    }
}

fn file_name(id: &SessionId) -> String {
    let mut name: String = id
        .as_str()
        .bytes()
        .flat_map(|byte| [byte >> 4, byte & 0x0f])
        .filter_map(|nibble| char::from_digit(u32::from(nibble), 16))
        .collect();
    name.push_str(EXTENSION);
    name
}

fn session_id_from_file_name(name: &str) -> Option<SessionId> {
    let stem = name.strip_suffix(EXTENSION)?;
    if stem.len() % 2 != 0 {
        return None;
    }
    let bytes = stem
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|digits| u8::from_str_radix(digits, 16).ok())
        })
        .collect::<Option<Vec<u8>>>()?;
    String::from_utf8(bytes).ok().map(SessionId::new)
}

fn read_session(dir: &Dir, id: &SessionId) -> SessionStoreResult<Option<Session>> {
    let contents = match dir.read_to_string(file_name(id)) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(SessionStoreError::persistence(err)),
    };
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|err| SessionStoreError::Corrupt {
            id: id.clone(),
            message: err.to_string(),
        })
}

fn write_session(dir: &Dir, session: &Session) -> SessionStoreResult<()> {
    let target = file_name(session.id());
    let temp = format!("{target}{TEMP_SUFFIX}");
    let json = serde_json::to_vec_pretty(session).map_err(SessionStoreError::persistence)?;
    dir.write(&temp, json).map_err(SessionStoreError::persistence)?;
    dir.rename(&temp, dir, &target)
        .map_err(SessionStoreError::persistence)
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, session: &Session) -> SessionStoreResult<()> {
        let record = session.clone();
        self.run_blocking(move |dir| write_session(dir, &record))
            .await
    }

    async fn load(&self, id: &SessionId) -> SessionStoreResult<Option<Session>> {
        let key = id.clone();
        self.run_blocking(move |dir| read_session(dir, &key)).await
    }

    async fn update(&self, session: &Session) -> SessionStoreResult<()> {
        let record = session.clone();
        self.run_blocking(move |dir| {
            if !dir.exists(file_name(record.id())) {
                return Err(SessionStoreError::NotFound(record.id().clone()));
            }
            write_session(dir, &record)
        })
        .await
    }

    async fn delete(&self, id: &SessionId) -> SessionStoreResult<bool> {
        let key = id.clone();
        self.run_blocking(move |dir| match dir.remove_file(file_name(&key)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(SessionStoreError::persistence(err)),
        })
        .await
    }

    async fn list(&self) -> SessionStoreResult<Vec<SessionId>> {
        self.run_blocking(|dir| {
            let mut ids = Vec::new();
            for entry in dir.entries().map_err(SessionStoreError::persistence)? {
                let name = entry
                    .and_then(|e| e.file_name())
                    .map_err(SessionStoreError::persistence)?;
                if let Some(id) = session_id_from_file_name(&name) {
                    ids.push(id);
                }
            }
            ids.sort();
            Ok(ids)
        })
        .await
    }
}
