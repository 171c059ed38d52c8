//! Local persistence for the most recent paired session.
//!
//! Only one session is remembered at a time; loading compares the app name
//! to decide whether the stored session belongs to the caller.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::protocol::Network;

/// The persisted `{sessionId, appName, network}` triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub session_id: String,
    pub app_name: String,
    pub network: Network,
}

/// Abstraction over where the session record lives (file on disk for CLI
/// hosts, browser storage for web hosts, memory for tests).
pub trait SessionStore: Send + Sync {
    /// Load the most recent stored session, if any. A missing or unreadable
    /// record is `None`, never an error.
    fn load(&self) -> Option<StoredSession>;

    /// Persist `session` as the most recent session, replacing any previous.
    fn save(&self, session: &StoredSession) -> Result<()>;
}

/// File-backed store writing a single JSON document.
pub struct FileSessionStore {
    path: PathBuf,
}

/// Default store file name, in the working directory.
pub const DEFAULT_STORE_FILE: &str = "pocket-signer-store.json";

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for FileSessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_FILE)
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Option<StoredSession> {
        let data = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&data) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring corrupt session store");
                None
            }
        }
    }

    fn save(&self, session: &StoredSession) -> Result<()> {
        let data = serde_json::to_string(session)
            .map_err(|e| Error::Store(format!("serialize session: {e}")))?;
        std::fs::write(&self.path, data).map_err(|e| {
            Error::Store(format!("write {}: {e}", self.path.display()))
        })
    }
}

/// In-memory store, for tests and hosts with their own persistence.
#[derive(Default)]
pub struct MemorySessionStore {
    inner: std::sync::Mutex<Option<StoredSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the store, e.g. to exercise session resumption.
    pub fn with_session(session: StoredSession) -> Self {
        Self {
            inner: std::sync::Mutex::new(Some(session)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Option<StoredSession> {
        self.inner.lock().expect("store lock poisoned").clone()
    }

    fn save(&self, session: &StoredSession) -> Result<()> {
        *self.inner.lock().expect("store lock poisoned") = Some(session.clone());
        Ok(())
    }
}
