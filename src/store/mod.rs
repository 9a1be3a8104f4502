//! Opaque key-value blob persistence.
//!
//! Both in-memory stores (fingerprints and subscriptions) serialize to a
//! single JSON blob each. A backend only has to load and atomically replace
//! a blob by key.

pub mod file;
pub mod memory;
pub mod sqlite;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::config::StorageBackend;

pub use file::FileBlobStore;
pub use memory::MemoryBlobStore;
pub use sqlite::SqliteBlobStore;

pub type SharedBlobStore = Arc<dyn BlobStore + Send + Sync>;

pub trait BlobStore {
    /// Read a blob. `Ok(None)` means it has never been written.
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replace a blob. Readers observe either the old or the new value.
    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Human-readable location, for log lines.
    fn location(&self) -> String;
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("blob '{0}' does not exist (run `timetable-notifier init` first)")]
    Missing(String),

    #[error("blob '{key}' is corrupt: {source}")]
    Corrupt {
        key: String,
        source: serde_json::Error,
    },

    #[error("failed to serialize blob '{key}': {source}")]
    Serialize {
        key: String,
        source: serde_json::Error,
    },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] rusqlite_migration::Error),

    #[error("storage lock poisoned")]
    Poisoned,
}

/// Load and decode a blob that must exist.
pub fn load_json<T, B>(blobs: &B, key: &str) -> Result<T, StorageError>
where
    T: DeserializeOwned,
    B: BlobStore + ?Sized,
{
    load_json_opt(blobs, key)?.ok_or_else(|| StorageError::Missing(key.to_string()))
}

/// Load and decode a blob, allowing it to be absent.
pub fn load_json_opt<T, B>(blobs: &B, key: &str) -> Result<Option<T>, StorageError>
where
    T: DeserializeOwned,
    B: BlobStore + ?Sized,
{
    match blobs.load(key)? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StorageError::Corrupt {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

pub fn save_json<T, B>(blobs: &B, key: &str, value: &T) -> Result<(), StorageError>
where
    T: Serialize,
    B: BlobStore + ?Sized,
{
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| StorageError::Serialize {
        key: key.to_string(),
        source,
    })?;
    blobs.save(key, &bytes)
}

/// Open a backend at `path` (a directory for `file`, a database file for `sqlite`).
pub fn open(backend: StorageBackend, path: &Path) -> Result<SharedBlobStore, StorageError> {
    let store: SharedBlobStore = match backend {
        StorageBackend::File => Arc::new(FileBlobStore::new(path)),
        StorageBackend::Sqlite => Arc::new(SqliteBlobStore::new(path)?),
    };
    tracing::info!(location = %store.location(), "opened blob store");
    Ok(store)
}
