use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config;
use crate::errors::{AppError, AppResult};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub user_id: i64,
    #[serde(default)]
    pub roles: Vec<String>,
    pub seller_id: Option<i64>,
    pub saved_at: DateTime<Utc>,
}

impl Session {
    pub fn new(token: String, user_id: i64, roles: Vec<String>, seller_id: Option<i64>) -> Self {
        Self {
            token,
            user_id,
            roles,
            seller_id,
            saved_at: Utc::now(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }
}

/// Persistence for the logged-in session. The HTTP client only needs the
/// token; the rest is kept for callers that build listing bodies.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> AppResult<Option<Session>>;
    fn save(&self, session: &Session) -> AppResult<()>;
    fn clear(&self) -> AppResult<()>;

    fn token(&self) -> AppResult<Option<String>> {
        Ok(self.load()?.map(|s| s.token).filter(|t| !t.is_empty()))
    }
}

/// Session kept as a JSON file next to the application data.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_data_directory() -> AppResult<Self> {
        Ok(Self::new(config::get_data_directory()?.join("session.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> AppResult<Option<Session>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        match serde_json::from_str(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                log::warn!(
                    "Ignoring unreadable session file {}: {}",
                    self.path.display(),
                    e
                );
                Ok(None)
            }
        }
    }

    fn save(&self, session: &Session) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(session)?)?;
        log::debug!("Session for user {} saved", session.user_id);
        Ok(())
    }

    fn clear(&self) -> AppResult<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    inner: Mutex<Option<Session>>,
}

impl MemorySessionStore {
    pub fn with_session(session: Session) -> Self {
        Self {
            inner: Mutex::new(Some(session)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> AppResult<Option<Session>> {
        self.inner
            .lock()
            .map(|s| s.clone())
            .map_err(|e| AppError::Session(format!("session lock poisoned: {}", e)))
    }

    fn save(&self, session: &Session) -> AppResult<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|e| AppError::Session(format!("session lock poisoned: {}", e)))?;
        *guard = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> AppResult<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|e| AppError::Session(format!("session lock poisoned: {}", e)))?;
        *guard = None;
        Ok(())
    }
}
