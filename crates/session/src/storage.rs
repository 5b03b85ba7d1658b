//! Durable token storage.
//!
//! Only the access/refresh token pair is ever persisted. Roles and
//! permissions are re-fetched on every start.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Storage key of the access token.
pub const ACCESS_TOKEN_KEY: &str = "learnhub.access_token";
/// Storage key of the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "learnhub.refresh_token";

/// Access/refresh token pair. Both are opaque to the client.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl core::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("token storage io error: {0}")]
    Io(String),

    #[error("token storage is corrupt: {0}")]
    Corrupt(String),

    #[error("token storage lock poisoned")]
    Poisoned,
}

/// Persisted-token storage abstraction.
///
/// Implementations must write the pair atomically: a reader never observes
/// one new token next to one old token.
pub trait TokenStorage: Send + Sync {
    fn load(&self) -> Result<Option<TokenPair>, StorageError>;

    fn save(&self, tokens: &TokenPair) -> Result<(), StorageError>;

    fn clear(&self) -> Result<(), StorageError>;
}

/// In-memory storage for tests/ephemeral clients.
#[derive(Debug, Default)]
pub struct InMemoryTokenStorage {
    tokens: RwLock<Option<TokenPair>>,
}

impl InMemoryTokenStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(tokens: TokenPair) -> Self {
        Self {
            tokens: RwLock::new(Some(tokens)),
        }
    }
}

impl TokenStorage for InMemoryTokenStorage {
    fn load(&self) -> Result<Option<TokenPair>, StorageError> {
        let tokens = self.tokens.read().map_err(|_| StorageError::Poisoned)?;
        Ok(tokens.clone())
    }

    fn save(&self, tokens: &TokenPair) -> Result<(), StorageError> {
        let mut slot = self.tokens.write().map_err(|_| StorageError::Poisoned)?;
        *slot = Some(tokens.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        let mut slot = self.tokens.write().map_err(|_| StorageError::Poisoned)?;
        *slot = None;
        Ok(())
    }
}

/// JSON file storage keyed by [`ACCESS_TOKEN_KEY`] / [`REFRESH_TOKEN_KEY`].
///
/// Writes go to a sibling temp file that is renamed into place, so a crash
/// mid-write leaves the previous pair intact.
#[derive(Debug, Clone)]
pub struct FileTokenStorage {
    path: PathBuf,
}

impl FileTokenStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "tokens".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl TokenStorage for FileTokenStorage {
    fn load(&self) -> Result<Option<TokenPair>, StorageError> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Io(e.to_string())),
        };

        let mut doc: BTreeMap<String, String> =
            serde_json::from_slice(&raw).map_err(|e| StorageError::Corrupt(e.to_string()))?;

        match (doc.remove(ACCESS_TOKEN_KEY), doc.remove(REFRESH_TOKEN_KEY)) {
            (Some(access), Some(refresh)) => Ok(Some(TokenPair::new(access, refresh))),
            (None, None) => Ok(None),
            _ => Err(StorageError::Corrupt("token pair is incomplete".to_string())),
        }
    }

    fn save(&self, tokens: &TokenPair) -> Result<(), StorageError> {
        let doc = BTreeMap::from([
            (ACCESS_TOKEN_KEY, tokens.access_token.as_str()),
            (REFRESH_TOKEN_KEY, tokens.refresh_token.as_str()),
        ]);
        let raw = serde_json::to_vec(&doc).map_err(|e| StorageError::Corrupt(e.to_string()))?;

        let temp = self.temp_path();
        std::fs::write(&temp, raw).map_err(|e| StorageError::Io(e.to_string()))?;
        std::fs::rename(&temp, &self.path).map_err(|e| StorageError::Io(e.to_string()))
    }

    fn clear(&self) -> Result<(), StorageError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("learnhub-storage-{}-{name}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("tokens.json")
    }

    #[test]
    fn in_memory_save_load_clear() {
        let storage = InMemoryTokenStorage::new();
        assert_eq!(storage.load().unwrap(), None);

        storage.save(&TokenPair::new("a", "r")).unwrap();
        assert_eq!(storage.load().unwrap(), Some(TokenPair::new("a", "r")));

        storage.clear().unwrap();
        assert_eq!(storage.load().unwrap(), None);
    }

    #[test]
    fn file_storage_uses_fixed_keys() {
        let path = scratch_path("keys");
        let storage = FileTokenStorage::new(&path);
        storage.save(&TokenPair::new("access-1", "refresh-1")).unwrap();

        let doc: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(doc[ACCESS_TOKEN_KEY], "access-1");
        assert_eq!(doc[REFRESH_TOKEN_KEY], "refresh-1");
        assert!(!storage.temp_path().exists());

        assert_eq!(storage.load().unwrap(), Some(TokenPair::new("access-1", "refresh-1")));
        storage.clear().unwrap();
        assert_eq!(storage.load().unwrap(), None);
        storage.clear().unwrap();
    }

    #[test]
    fn half_written_pair_is_corrupt() {
        let path = scratch_path("half");
        std::fs::write(&path, format!(r#"{{"{ACCESS_TOKEN_KEY}": "only-access"}}"#)).unwrap();

        let storage = FileTokenStorage::new(&path);
        assert!(matches!(storage.load(), Err(StorageError::Corrupt(_))));
    }

    #[test]
    fn debug_output_redacts_tokens() {
        let rendered = format!("{:?}", TokenPair::new("secret-access", "secret-refresh"));
        assert!(!rendered.contains("secret"));
    }
}
