//! Local durable cache for ledger snapshots
//!
//! The cache is the offline source of truth: every mutation writes the
//! serialized collections here synchronously, and the service reloads them
//! at startup before any remote state arrives.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use common::error::{Error, Result};
use dashmap::DashMap;
use directories::ProjectDirs;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

/// String-keyed synchronous cache contract
pub trait LocalCache: Send + Sync {
    fn save(&self, key: &str, value: &str) -> Result<()>;
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn clear(&self, key: &str) -> Result<()>;
}

/// Serialize `value` and save it under `key`
pub fn save_json<T: Serialize>(cache: &dyn LocalCache, key: &str, value: &T) -> Result<()> {
    let encoded = serde_json::to_string(value)?;
    cache.save(key, &encoded)
}

/// Load and deserialize the value under `key`, falling back to `default`
/// when the entry is missing or unreadable
pub fn load_json<T: DeserializeOwned>(cache: &dyn LocalCache, key: &str, default: T) -> T {
    match cache.load(key) {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!("Discarding unreadable cache entry {}: {}", key, e);
                default
            }
        },
        Ok(None) => default,
        Err(e) => {
            warn!("Failed to read cache entry {}: {}", key, e);
            default
        }
    }
}

/// Non-durable cache for tests and headless execution contexts
pub struct MemoryCache {
    entries: DashMap<String, String>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalCache for MemoryCache {
    fn save(&self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|entry| entry.clone()))
    }

    fn clear(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Durable cache holding one JSON file per key
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Cache rooted at an explicit directory, created if missing
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            Error::CacheError(format!("failed to create cache dir {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    /// Cache rooted at the per-user data directory
    pub fn in_user_data() -> Result<Self> {
        let dirs = ProjectDirs::from("", "", "tradelog")
            .ok_or_else(|| Error::CacheError("no home directory available".to_string()))?;
        Self::new(dirs.data_dir())
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl LocalCache for FileCache {
    fn save(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        fs::write(&path, value)
            .map_err(|e| Error::CacheError(format!("failed to write {}: {}", path.display(), e)))
    }

    fn load(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::CacheError(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn clear(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::CacheError(format!(
                "failed to remove {}: {}",
                path.display(),
                e
            ))),
        }
    }
}
