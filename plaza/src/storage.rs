use anyhow::Result;
use std::sync::Mutex;

use crate::session::{SessionData, SessionStore};

/// Trait for storage adapters that persist the session between runs
pub trait StorageAdapter: Send + Sync {
    /// Store the session
    fn store(&self, session: &SessionData) -> Result<()>;

    /// Load the stored session, if any
    fn load(&self) -> Result<Option<SessionData>>;

    /// Clear the stored session
    fn clear(&self) -> Result<()>;
}

/// File-based storage adapter, the default for the command-line client
#[derive(Debug, Clone)]
pub struct FileStorageAdapter {
    session_store: SessionStore,
}

impl FileStorageAdapter {
    /// Adapter over `~/.plaza/session`
    pub fn new() -> Result<Self> {
        Ok(Self {
            session_store: SessionStore::new()?,
        })
    }

    pub fn with_store(session_store: SessionStore) -> Self {
        Self { session_store }
    }
}

impl StorageAdapter for FileStorageAdapter {
    fn store(&self, session: &SessionData) -> Result<()> {
        self.session_store.save(session)
    }

    fn load(&self) -> Result<Option<SessionData>> {
        self.session_store.load()
    }

    fn clear(&self) -> Result<()> {
        self.session_store.delete()
    }
}

/// Process-local storage; nothing survives a restart
#[derive(Debug, Default)]
pub struct MemoryStorageAdapter {
    slot: Mutex<Option<SessionData>>,
}

impl MemoryStorageAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageAdapter for MemoryStorageAdapter {
    fn store(&self, session: &SessionData) -> Result<()> {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(session.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<SessionData>> {
        Ok(self.slot.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn clear(&self) -> Result<()> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_user;
    use tempfile::TempDir;

    fn session(token: &str) -> SessionData {
        SessionData {
            token: token.to_string(),
            user: test_user(3),
        }
    }

    #[test]
    fn test_file_storage_adapter() {
        let temp_dir = TempDir::new().unwrap();
        let adapter =
            FileStorageAdapter::with_store(SessionStore::at(temp_dir.path().join("session")));

        adapter.store(&session("test-session-token")).unwrap();
        assert_eq!(adapter.load().unwrap(), Some(session("test-session-token")));

        adapter.clear().unwrap();
        assert_eq!(adapter.load().unwrap(), None);
    }

    #[test]
    fn test_memory_storage_adapter() {
        let adapter = MemoryStorageAdapter::new();
        assert_eq!(adapter.load().unwrap(), None);

        adapter.store(&session("first-token")).unwrap();
        adapter.store(&session("second-token")).unwrap();
        assert_eq!(adapter.load().unwrap(), Some(session("second-token")));

        adapter.clear().unwrap();
        assert_eq!(adapter.load().unwrap(), None);
    }

    use proptest::prelude::*;

    proptest! {
        // Whatever token was stored last is what comes back, for both adapters
        #[test]
        fn prop_last_store_wins(tokens in prop::collection::vec("[a-zA-Z0-9_.-]{8,64}", 1..5)) {
            let temp_dir = TempDir::new().unwrap();
            let file = FileStorageAdapter::with_store(SessionStore::at(temp_dir.path().join("session")));
            let memory = MemoryStorageAdapter::new();

            for token in &tokens {
                file.store(&session(token)).unwrap();
                memory.store(&session(token)).unwrap();
            }

            let last = tokens.last().cloned();
            prop_assert_eq!(file.load().unwrap().map(|s| s.token), last.clone());
            prop_assert_eq!(memory.load().unwrap().map(|s| s.token), last);
        }
    }
}
