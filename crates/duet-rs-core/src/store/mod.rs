//! Session persistence over a single keyed blob.
//!
//! The whole session collection lives in one JSON array. Every mutation is a
//! read-modify-write of that array, serialized inside the process. Mutations
//! fail on unreadable state rather than overwrite it.

mod blob;

pub use blob::{BlobStore, FileBlobStore, MemoryBlobStore};

use crate::types::{ChatSession, SessionId, now_millis, sort_by_recency};
use directories::BaseDirs;
use duet_rs_config::SessionsConfig;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by session persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Durable session collection.
pub struct SessionStore {
    blobs: Arc<dyn BlobStore>,
    key: String,
    /// Serialize read-modify-write cycles on the collection.
    write_lock: Mutex<()>,
}

impl SessionStore {
    /// Create a store over an explicit blob backend.
    pub fn new(blobs: Arc<dyn BlobStore>, key: impl Into<String>) -> Self {
        Self {
            blobs,
            key: key.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Open the file-backed store described by config.
    pub fn open(config: &SessionsConfig) -> Result<Self, StoreError> {
        let root = resolve_storage_root(config.path.as_deref())?;
        let blobs = FileBlobStore::new(&root)?;
        info!(
            "opened session store (root={}, key={})",
            root.display(),
            config.key
        );
        Ok(Self::new(Arc::new(blobs), config.key.clone()))
    }

    /// All sessions, most recently updated first.
    ///
    /// Never fails: missing or unreadable state is reported as an empty list.
    pub fn list_sessions(&self) -> Vec<ChatSession> {
        match self.load() {
            Ok(mut sessions) => {
                sort_by_recency(&mut sessions);
                sessions
            }
            Err(err) => {
                warn!(
                    "failed to load sessions; treating store as empty (key={}, error={})",
                    self.key, err
                );
                Vec::new()
            }
        }
    }

    /// Look up one session by id.
    pub fn get_session(&self, session_id: SessionId) -> Option<ChatSession> {
        self.list_sessions()
            .into_iter()
            .find(|session| session.id == session_id)
    }

    /// Create, persist and return an empty session.
    pub fn create_session(&self) -> Result<ChatSession, StoreError> {
        let session = ChatSession::new(now_millis());
        self.save_session(&session)?;
        info!("created session (session_id={})", session.id);
        Ok(session)
    }

    /// Insert or replace a session by id and rewrite the collection.
    pub fn save_session(&self, session: &ChatSession) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let mut sessions = self.load()?;
        match sessions.iter_mut().find(|existing| existing.id == session.id) {
            Some(existing) => *existing = session.clone(),
            None => sessions.push(session.clone()),
        }
        debug!(
            "saving session (session_id={}, messages={})",
            session.id,
            session.messages.len()
        );
        self.persist(&sessions)
    }

    /// Remove a session; unknown ids are ignored.
    pub fn delete_session(&self, session_id: SessionId) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let mut sessions = self.load()?;
        let before = sessions.len();
        sessions.retain(|session| session.id != session_id);
        info!(
            "deleting session (session_id={}, found={})",
            session_id,
            sessions.len() != before
        );
        self.persist(&sessions)
    }

    /// Change a session title; unknown ids are ignored.
    pub fn rename_session(&self, session_id: SessionId, title: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let mut sessions = self.load()?;
        let Some(session) = sessions.iter_mut().find(|session| session.id == session_id) else {
            debug!("rename ignored for unknown session (session_id={session_id})");
            return Ok(());
        };
        session.title = title.to_string();
        self.persist(&sessions)
    }

    fn load(&self) -> Result<Vec<ChatSession>, StoreError> {
        match self.blobs.read(&self.key)? {
            Some(contents) if !contents.trim().is_empty() => Ok(serde_json::from_str(&contents)?),
            _ => Ok(Vec::new()),
        }
    }

    fn persist(&self, sessions: &[ChatSession]) -> Result<(), StoreError> {
        let contents = serde_json::to_string(sessions)?;
        self.blobs.write(&self.key, &contents)
    }
}

/// Resolve an absolute storage root for a config-specified path.
fn resolve_storage_root(path: Option<&str>) -> Result<PathBuf, StoreError> {
    let cwd = std::env::current_dir()?;
    if let Some(path) = path {
        let path = PathBuf::from(path);
        if path.is_absolute() {
            return Ok(path);
        }
        debug!(
            "resolving storage root relative to cwd: {}",
            cwd.join(&path).display()
        );
        return Ok(cwd.join(path));
    }

    if let Some(home) = BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf()) {
        return Ok(home.join(".duet"));
    }

    Ok(cwd.join(".duet"))
}
