//! Local key-value persistence for the report log.
//!
//! Values are opaque byte blobs addressed by a string key:
//! - [`FileKeyValueStore`] keeps one file per key in a directory
//! - [`MemoryKeyValueStore`] keeps everything in memory (tests, demos)

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur while reading or writing the key-value store
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO operation failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Key contains characters that cannot be mapped to storage
    #[error("invalid key: {0:?}")]
    InvalidKey(String),

    /// Backend refused the write
    #[error("write rejected: {0}")]
    Rejected(String),

    /// Blocking write task panicked or was cancelled
    #[error("write interrupted: {0}")]
    Interrupted(String),
}

/// Trait for key-value persistence
///
/// Implementations block the calling thread; async callers run writes on
/// the blocking pool.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, `None` when absent
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Replace the value stored under `key`
    ///
    /// Must be durable when it returns `Ok`.
    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;
}

/// Directory-backed store, one file per key.
///
/// Writes go to a temp file in the same directory and are renamed over the
/// target, so a crash mid-write leaves the previous value intact.
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    root: PathBuf,
}

impl FileKeyValueStore {
    /// Open (or lazily create) a store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the value files
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
            && !key.starts_with('.');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => {
                debug!(path = %path.display(), bytes = bytes.len(), "Read value");
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Value does not exist");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.root)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        tmp.write_all(value)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;

        info!(path = %path.display(), bytes = value.len(), "Persisted value");
        Ok(())
    }
}

/// In-memory store for testing
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueStore {
    values: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryKeyValueStore {
    /// Seed a value directly, bypassing any owner of the key
    pub fn insert_raw(&self, key: &str, value: impl Into<Vec<u8>>) {
        self.values.lock().insert(key.to_string(), value.into());
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.values.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }
}
