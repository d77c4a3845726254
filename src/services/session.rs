//! Session Resumption: persists the active job handle so a restarted
//! client can reattach to a running generation instead of paying for a
//! duplicate one.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::job::JobId;

/// The value persisted across restarts: which job was in flight, and when
/// it was recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumableSession {
    pub job_id: JobId,
    pub saved_at: DateTime<Utc>,
}

impl ResumableSession {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            saved_at: Utc::now(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("session payload was not valid JSON: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Durable storage for the one in-flight session.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Option<ResumableSession>, SessionError>;
    fn save(&self, session: &ResumableSession) -> Result<(), SessionError>;
    fn clear(&self) -> Result<(), SessionError>;
}

/// JSON-file-backed store.
///
/// `load` discards entries older than `max_age`: a job recorded before the
/// poll timeout elapsed cannot still be usefully running upstream.
pub struct FileSessionStore {
    path: PathBuf,
    max_age: Duration,
}

impl FileSessionStore {
    pub fn new(path: &Path, max_age: Duration) -> Self {
        Self {
            path: path.to_path_buf(),
            max_age,
        }
    }

    fn is_expired(&self, session: &ResumableSession) -> bool {
        let age = Utc::now().signed_duration_since(session.saved_at);
        age.to_std().map(|age| age > self.max_age).unwrap_or(true)
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<ResumableSession>, SessionError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let session: ResumableSession = match serde_json::from_str(&raw) {
            Ok(session) => session,
            Err(e) => {
                // An unreadable file is a stale artifact, not a hard error.
                tracing::warn!(path = %self.path.display(), error = %e, "Discarding corrupt session file");
                self.clear()?;
                return Ok(None);
            }
        };

        if self.is_expired(&session) {
            tracing::debug!(job_id = %session.job_id, "Discarding expired session");
            self.clear()?;
            return Ok(None);
        }

        Ok(Some(session))
    }

    fn save(&self, session: &ResumableSession) -> Result<(), SessionError> {
        let payload = serde_json::to_string(session)?;
        std::fs::write(&self.path, payload)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store for tests and callers that opt out of persistence.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    inner: Mutex<Option<ResumableSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<ResumableSession>, SessionError> {
        Ok(self.inner.lock().unwrap().clone())
    }

    fn save(&self, session: &ResumableSession) -> Result<(), SessionError> {
        *self.inner.lock().unwrap() = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        *self.inner.lock().unwrap() = None;
        Ok(())
    }
}
