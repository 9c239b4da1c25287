use anyhow::{Context, Result};
use plaza_types::User;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::storage::StorageAdapter;

/// Largest session file we are willing to parse
const MAX_SESSION_FILE_BYTES: u64 = 64 * 1024;

/// Bearer tokens shorter or longer than this are treated as corrupted
const TOKEN_LEN_RANGE: std::ops::RangeInclusive<usize> = 8..=4096;

/// What a logged-in session consists of: the bearer token and the user it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub token: String,
    pub user: User,
}

impl SessionData {
    fn looks_valid(&self) -> bool {
        let token = self.token.trim();
        TOKEN_LEN_RANGE.contains(&token.len()) && !token.chars().any(|c| c.is_control())
    }
}

/// Manages session storage in the user's home directory.
///
/// The session is stored as JSON in `~/.plaza/session` with 0600 permissions
/// to ensure only the owner can read/write the file.
#[derive(Debug, Clone)]
pub struct SessionStore {
    file_path: PathBuf,
}

impl SessionStore {
    /// Creates a new SessionStore with the default path `~/.plaza/session`.
    ///
    /// # Returns
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self> {
        Ok(Self::at(crate::config::config_dir()?.join("session")))
    }

    /// Creates a SessionStore backed by an explicit file.
    pub fn at(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
        }
    }

    /// Loads the session from the file.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(session))` if the file exists and contains a valid session
    /// - `Ok(None)` if the file doesn't exist, is empty or is corrupted
    /// - `Err(_)` if the file cannot be read
    pub fn load(&self) -> Result<Option<SessionData>> {
        if !self.file_path.exists() {
            return Ok(None);
        }

        let size = fs::metadata(&self.file_path)
            .context("Failed to stat session file")?
            .len();
        if size > MAX_SESSION_FILE_BYTES {
            log::warn!("Session file is {} bytes, treating as corrupted", size);
            return Ok(None);
        }

        let content =
            fs::read_to_string(&self.file_path).context("Failed to read session file")?;

        if content.trim().is_empty() {
            log::warn!("Session file is empty, treating as no session");
            return Ok(None);
        }

        let session: SessionData = match serde_json::from_str(&content) {
            Ok(session) => session,
            Err(e) => {
                log::warn!("Session file could not be parsed ({}), treating as corrupted", e);
                return Ok(None);
            }
        };

        if !session.looks_valid() {
            log::warn!(
                "Session token has invalid shape (length {}), treating as corrupted",
                session.token.len()
            );
            return Ok(None);
        }

        log::debug!("Loaded session from {}", self.file_path.display());
        Ok(Some(session))
    }

    /// Saves the session to the file with 0600 permissions.
    ///
    /// This method:
    /// - Creates the parent directory if it doesn't exist
    /// - Removes any old/stale session files
    /// - Uses atomic writes to prevent partial writes
    /// - Sets file permissions to 0600 (owner read/write only)
    pub fn save(&self, session: &SessionData) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent).context("Failed to create session directory")?;
        }

        self.cleanup_old_files()?;

        let json = serde_json::to_vec_pretty(session).context("Failed to serialize session")?;

        let temp_path = self.file_path.with_extension("tmp");
        let mut file =
            fs::File::create(&temp_path).context("Failed to create temporary session file")?;
        file.write_all(&json)
            .context("Failed to write session data")?;
        file.sync_all()
            .context("Failed to sync session file to disk")?;
        drop(file);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&temp_path, permissions)
                .context("Failed to set session file permissions")?;
        }

        fs::rename(&temp_path, &self.file_path)
            .context("Failed to rename temporary session file")?;

        log::info!("Saved session to {}", self.file_path.display());
        Ok(())
    }

    /// Deletes the session file. Succeeds even if the file doesn't exist.
    pub fn delete(&self) -> Result<()> {
        if self.file_path.exists() {
            fs::remove_file(&self.file_path).context("Failed to delete session file")?;
            log::info!("Deleted session file at {}", self.file_path.display());
        } else {
            log::debug!("Session file does not exist, nothing to delete");
        }
        Ok(())
    }

    /// Removes `session*` leftovers (temp files, backups) next to the session file.
    fn cleanup_old_files(&self) -> Result<()> {
        let Some(parent) = self.file_path.parent() else {
            return Ok(());
        };
        if !parent.exists() {
            return Ok(());
        }

        for entry in fs::read_dir(parent).context("Failed to read session directory")? {
            let path = entry.context("Failed to read directory entry")?.path();
            if path == self.file_path {
                continue;
            }
            let stale = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("session"))
                .unwrap_or(false);
            if stale {
                log::debug!("Removing stale session file: {}", path.display());
                if let Err(e) = fs::remove_file(&path) {
                    log::warn!("Failed to remove stale session file {}: {}", path.display(), e);
                }
            }
        }

        Ok(())
    }

    /// Returns the path to the session file.
    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

/// The session every request runs under.
///
/// Created once at start-up with [`SessionContext::restore`], handed to the
/// API client explicitly, filled in on login and emptied on logout or when
/// the server rejects the token. Clones share the same state.
#[derive(Clone)]
pub struct SessionContext {
    current: Arc<RwLock<Option<SessionData>>>,
    storage: Arc<dyn StorageAdapter>,
}

impl SessionContext {
    /// Empty context backed by the given storage; nothing is loaded.
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self {
            current: Arc::new(RwLock::new(None)),
            storage,
        }
    }

    /// Context pre-populated from whatever the storage holds.
    ///
    /// A storage read failure is logged and treated as "logged out".
    pub fn restore(storage: Arc<dyn StorageAdapter>) -> Self {
        let context = Self::new(storage);
        match context.storage.load() {
            Ok(Some(session)) => {
                crate::log_session!("Restored session for user {}", session.user.id);
                *context.write() = Some(session);
            }
            Ok(None) => crate::log_session!("No stored session"),
            Err(e) => log::warn!("Failed to load stored session: {:#}", e),
        }
        context
    }

    /// Start a session after a successful login or registration.
    pub fn establish(&self, token: String, user: User) -> Result<()> {
        let session = SessionData { token, user };
        self.storage
            .store(&session)
            .context("Failed to persist session")?;
        crate::log_session!("Session established for user {}", session.user.id);
        *self.write() = Some(session);
        Ok(())
    }

    /// Forget the session in memory and in storage.
    ///
    /// The in-memory state is always cleared, even if storage fails.
    pub fn clear(&self) -> Result<()> {
        let previous = self.write().take();
        if let Some(session) = previous {
            crate::log_session!("Session cleared for user {}", session.user.id);
        }
        self.storage
            .clear()
            .context("Failed to clear stored session")
    }

    pub fn token(&self) -> Option<String> {
        self.read().as_ref().map(|s| s.token.clone())
    }

    pub fn current_user(&self) -> Option<User> {
        self.read().as_ref().map(|s| s.user.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().is_some()
    }

    // A poisoned lock only means another thread panicked mid-update of a
    // plain Option; the value itself is still usable.
    fn read(&self) -> RwLockReadGuard<'_, Option<SessionData>> {
        self.current.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<SessionData>> {
        self.current.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

#[cfg(test)]
pub(crate) fn test_user(id: u64) -> User {
    use chrono::TimeZone;

    User {
        id: plaza_types::UserId(id),
        first_name: "Test".to_string(),
        last_name: format!("User{}", id),
        email: format!("user{}@example.com", id),
        created_at: chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    }
}
