use crate::error::FeedClientError;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// The two named slots kept in durable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenSlot {
    Access,
    Refresh,
}

impl TokenSlot {
    pub fn name(&self) -> &'static str {
        match self {
            TokenSlot::Access => "access_token",
            TokenSlot::Refresh => "refresh_token",
        }
    }
}

/// Durable string storage for credentials, surviving process restarts.
pub trait CredentialStore: Send + Sync {
    fn load(&self, slot: TokenSlot) -> Result<Option<String>, FeedClientError>;
    fn save(&self, slot: TokenSlot, value: &str) -> Result<(), FeedClientError>;
    fn clear(&self, slot: TokenSlot) -> Result<(), FeedClientError>;

    fn clear_all(&self) -> Result<(), FeedClientError> {
        self.clear(TokenSlot::Access)?;
        self.clear(TokenSlot::Refresh)
    }
}

/// One file per slot inside a directory, readable only by the owner.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `~/.feed_client`, or `None` when no home directory is known.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".feed_client"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, slot: TokenSlot) -> PathBuf {
        self.dir.join(slot.name())
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self, slot: TokenSlot) -> Result<Option<String>, FeedClientError> {
        let path = self.path(slot);
        match fs::read_to_string(&path) {
            Ok(token) => {
                let token = token.trim().to_string();
                if token.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(token))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FeedClientError::Storage(format!(
                "Failed to read {:?}: {}",
                path, e
            ))),
        }
    }

    fn save(&self, slot: TokenSlot, value: &str) -> Result<(), FeedClientError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(slot);
        fs::write(&path, value)
            .map_err(|e| FeedClientError::Storage(format!("Failed to save {:?}: {}", path, e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&path)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&path, perms)?;
        }

        Ok(())
    }

    fn clear(&self, slot: TokenSlot) -> Result<(), FeedClientError> {
        let path = self.path(slot);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FeedClientError::Storage(format!(
                "Failed to remove {:?}: {}",
                path, e
            ))),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    slots: Mutex<HashMap<TokenSlot, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(access: &str, refresh: &str) -> Self {
        let store = Self::default();
        if let Ok(mut slots) = store.slots.lock() {
            slots.insert(TokenSlot::Access, access.to_string());
            slots.insert(TokenSlot::Refresh, refresh.to_string());
        }
        store
    }

    fn slots(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<TokenSlot, String>>, FeedClientError> {
        self.slots
            .lock()
            .map_err(|_| FeedClientError::Storage("credential store poisoned".into()))
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self, slot: TokenSlot) -> Result<Option<String>, FeedClientError> {
        Ok(self.slots()?.get(&slot).cloned())
    }

    fn save(&self, slot: TokenSlot, value: &str) -> Result<(), FeedClientError> {
        self.slots()?.insert(slot, value.to_string());
        Ok(())
    }

    fn clear(&self, slot: TokenSlot) -> Result<(), FeedClientError> {
        self.slots()?.remove(&slot);
        Ok(())
    }
}
