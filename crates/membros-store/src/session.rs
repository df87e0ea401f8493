//! The authenticated-user slot, optionally persisted to disk so a restart
//! resumes the session without a fresh login round-trip.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use membros_shared::constants::SESSION_FILE;
use membros_shared::models::User;

use crate::error::{Result, StoreError};

/// Holds the current user, if any.
///
/// The slot is authoritative for "who is logged in right now"; the cache
/// scopes its per-user fetches by it.  Persistence is best-effort at open
/// time: an unreadable or corrupt session file degrades to logged-out.
pub struct SessionHolder {
    path: Option<PathBuf>,
    current: RwLock<Option<User>>,
}

impl SessionHolder {
    /// A session slot with no persistence.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            current: RwLock::new(None),
        }
    }

    /// A session slot persisted under `dir`, restoring any session saved
    /// there by a previous run.
    pub fn open_at(dir: &Path) -> Self {
        let path = dir.join(SESSION_FILE);
        let current = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<User>(&raw) {
                Ok(user) => Some(user),
                Err(err) => {
                    tracing::warn!(%err, path = %path.display(), "ignoring corrupt session file");
                    None
                }
            },
            Err(_) => None,
        };

        Self {
            path: Some(path),
            current: RwLock::new(current),
        }
    }

    pub fn current_user(&self) -> Option<User> {
        self.current
            .read()
            .expect("session lock poisoned")
            .clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.current
            .read()
            .expect("session lock poisoned")
            .is_some()
    }

    /// Replace the session, persisting the change when the slot is backed
    /// by a file.  `None` logs out and removes the file.
    pub fn set_current_user(&self, user: Option<User>) -> Result<()> {
        if let Some(path) = &self.path {
            match &user {
                Some(user) => {
                    let raw = serde_json::to_string_pretty(user)
                        .map_err(|err| StoreError::Session(err.to_string()))?;
                    fs::write(path, raw).map_err(|err| StoreError::Session(err.to_string()))?;
                }
                None => {
                    if path.exists() {
                        fs::remove_file(path)
                            .map_err(|err| StoreError::Session(err.to_string()))?;
                    }
                }
            }
        }

        *self.current.write().expect("session lock poisoned") = user;
        Ok(())
    }
}
