//! Persistence of the in-progress batch
//!
//! Backends only store strings; [`StateSlot`] does the JSON round trip and
//! treats anything it cannot read back as an absent value.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::errors::StorageError;
use crate::types::BatchState;

pub const DEFAULT_FILE_PREFIX: &str = "BATCH_BALANCE_";

/// A string key-value store. Every call may suspend.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`; `None` stores an explicit null.
    async fn set(&self, key: &str, value: Option<String>) -> Result<(), StorageError>;
}

/// In-process backend
#[derive(Default)]
pub struct MemoryBackend {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a raw value, e.g. to simulate what an earlier session left behind.
    pub async fn insert_raw(&self, key: impl Into<String>, raw: impl Into<String>) {
        self.values.lock().await.insert(key.into(), raw.into());
    }

    pub async fn raw(&self, key: &str) -> Option<String> {
        self.values.lock().await.get(key).cloned()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Option<String>) -> Result<(), StorageError> {
        self.values
            .lock()
            .await
            .insert(key.to_string(), value.unwrap_or_else(|| "null".to_string()));
        Ok(())
    }
}

/// One JSON file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
    prefix: String,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            prefix: DEFAULT_FILE_PREFIX.to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}{}.json", self.prefix, key))
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    async fn set(&self, key: &str, value: Option<String>) -> Result<(), StorageError> {
        let io_err = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };
        tokio::fs::create_dir_all(&self.dir).await.map_err(io_err)?;
        let path = self.path_for(key);
        // Readers only ever see a complete file
        let tmp = path.with_extension("json.tmp");
        let body = value.unwrap_or_else(|| "null".to_string());
        tokio::fs::write(&tmp, body).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &path).await.map_err(io_err)?;
        debug!(path = %path.display(), "Wrote storage file");
        Ok(())
    }
}

/// The single named slot holding the in-progress batch
#[derive(Clone)]
pub struct StateSlot {
    backend: Arc<dyn StorageBackend>,
    key: String,
}

impl StateSlot {
    pub fn new(backend: Arc<dyn StorageBackend>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the saved batch. Unreadable or inconsistent values count as absent.
    pub async fn load(&self) -> Result<Option<BatchState>, StorageError> {
        let Some(raw) = self.backend.get(&self.key).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<Option<BatchState>>(&raw) {
            Ok(Some(state)) if !state.is_consistent() => {
                warn!(
                    key = %self.key,
                    cursor = state.cursor(),
                    entries = state.len(),
                    "Saved batch has a cursor past its end; ignoring it"
                );
                Ok(None)
            }
            Ok(state) => Ok(state),
            Err(e) => {
                let head: String = raw.chars().take(200).collect();
                warn!(key = %self.key, error = %e, raw = %head, "Saved batch is unreadable; ignoring it");
                Ok(None)
            }
        }
    }

    pub async fn save(&self, state: &BatchState) -> Result<(), StorageError> {
        let raw = serde_json::to_string(state)?;
        self.backend.set(&self.key, Some(raw)).await
    }

    pub async fn clear(&self) -> Result<(), StorageError> {
        self.backend.set(&self.key, None).await
    }
}
