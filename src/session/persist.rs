//! Persisted session record.
//!
//! The record is a single JSON document under a fixed storage name:
//!
//! ```text
//! { "state": { "user": {...}, "token": "...", "isAuthenticated": true }, "version": 0 }
//! ```
//!
//! Storage is string-shaped and readers re-parse on every read, so
//! the request hook always sees the most recently written token.

use super::model::{SessionSnapshot, User};
use crate::error::{ClientError, Result};
use crate::transport::CredentialSource;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Schema version written into every record.
pub const STORAGE_VERSION: u32 = 0;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(rename = "isAuthenticated", default)]
    pub is_authenticated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub state: PersistedState,
    #[serde(default)]
    pub version: u32,
}

impl PersistedSession {
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Self {
        Self {
            state: PersistedState {
                user: snapshot.user.clone(),
                token: snapshot.token.clone(),
                is_authenticated: snapshot.is_authenticated,
            },
            version: STORAGE_VERSION,
        }
    }

    /// The user/token pair, only when both are present.
    pub fn credentials(&self) -> Option<(User, String)> {
        match (&self.state.user, &self.state.token) {
            (Some(user), Some(token)) if !token.is_empty() => Some((user.clone(), token.clone())),
            _ => None,
        }
    }
}

/// Backing store for the persisted record.
pub trait SessionStorage: Send + Sync {
    fn load_raw(&self) -> Result<Option<String>>;

    fn save_raw(&self, raw: &str) -> Result<()>;

    /// Delete the record. Deleting a missing record is not an error.
    fn remove(&self) -> Result<()>;

    fn load(&self) -> Result<Option<PersistedSession>> {
        match self.load_raw()? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| ClientError::Storage(format!("corrupt session record: {e}"))),
            None => Ok(None),
        }
    }

    fn save(&self, session: &PersistedSession) -> Result<()> {
        let raw = serde_json::to_string(session)
            .map_err(|e| ClientError::Storage(format!("encode session record: {e}")))?;
        self.save_raw(&raw)
    }
}

// ── File storage ─────────────────────────────────────────────────

/// `<dir>/<name>.json` on disk.
#[derive(Debug, Clone)]
pub struct FileSessionStorage {
    path: PathBuf,
}

impl FileSessionStorage {
    pub fn new(dir: &Path, storage_name: &str) -> Self {
        Self {
            path: dir.join(format!("{storage_name}.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, op: &str, e: std::io::Error) -> ClientError {
        ClientError::Storage(format!("{op} {}: {e}", self.path.display()))
    }
}

impl SessionStorage for FileSessionStorage {
    fn load_raw(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(None),
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error("read", e)),
        }
    }

    fn save_raw(&self, raw: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error("create dir for", e))?;
        }
        // Write-then-rename so a concurrent reader never sees half a record.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, raw).map_err(|e| self.io_error("write", e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error("replace", e))
    }

    fn remove(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error("remove", e)),
        }
    }
}

// ── In-memory storage ────────────────────────────────────────────

/// Process-local storage, for tests and ephemeral clients.
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    raw: Mutex<Option<String>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with a raw record, as if left behind by a previous run.
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: Mutex::new(Some(raw.into())),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.raw.lock().is_none()
    }
}

impl SessionStorage for MemorySessionStorage {
    fn load_raw(&self) -> Result<Option<String>> {
        Ok(self.raw.lock().clone())
    }

    fn save_raw(&self, raw: &str) -> Result<()> {
        *self.raw.lock() = Some(raw.to_string());
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        *self.raw.lock() = None;
        Ok(())
    }
}

// ── Credential source ────────────────────────────────────────────

/// Reads the token straight out of storage on every request, never from
/// in-memory state.
pub struct StoredCredentials {
    storage: Arc<dyn SessionStorage>,
}

impl StoredCredentials {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self { storage }
    }
}

impl CredentialSource for StoredCredentials {
    fn bearer_token(&self) -> Option<String> {
        match self.storage.load() {
            Ok(record) => record.and_then(|r| r.state.token).filter(|t| !t.is_empty()),
            Err(e) => {
                tracing::debug!("Ignoring unreadable session record: {e}");
                None
            }
        }
    }
}
