//! Last-known content fingerprint per topic.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::store::{self, SharedBlobStore, StorageError};

pub const BLOB_KEY: &str = "fingerprints";

/// SHA-256 of the normalized content, lowercase hex.
pub fn compute(normalized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

pub struct FingerprintStore {
    hashes: RwLock<BTreeMap<String, String>>,
    dirty: AtomicBool,
    blobs: SharedBlobStore,
}

impl FingerprintStore {
    /// Load persisted fingerprints. A missing or corrupt blob is an error.
    pub fn load(blobs: SharedBlobStore) -> Result<Self, StorageError> {
        let hashes: BTreeMap<String, String> = store::load_json(&*blobs, BLOB_KEY)?;
        tracing::info!(topics = hashes.len(), "loaded fingerprints");
        Ok(Self::with_hashes(blobs, hashes))
    }

    pub fn with_hashes(blobs: SharedBlobStore, hashes: BTreeMap<String, String>) -> Self {
        Self {
            hashes: RwLock::new(hashes),
            dirty: AtomicBool::new(false),
            blobs,
        }
    }

    pub async fn get(&self, topic: &str) -> Option<String> {
        self.hashes.read().await.get(topic).cloned()
    }

    /// Store `hash` for `topic`, returning whether it differs from the
    /// previous value. A topic with no previous value counts as changed.
    pub async fn compare_and_update(&self, topic: &str, hash: &str) -> bool {
        let mut hashes = self.hashes.write().await;
        let previous = hashes.insert(topic.to_string(), hash.to_string());
        self.dirty.store(true, Ordering::SeqCst);
        previous.as_deref() != Some(hash)
    }

    pub async fn topics(&self) -> Vec<String> {
        self.hashes.read().await.keys().cloned().collect()
    }

    pub async fn snapshot(&self) -> BTreeMap<String, String> {
        self.hashes.read().await.clone()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Persist the whole mapping if anything changed since the last flush.
    ///
    /// Returns `Ok(false)` when there was nothing to write. On failure the
    /// store stays dirty so the next flush retries.
    pub async fn flush(&self) -> Result<bool, StorageError> {
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(false);
        }

        let snapshot = self.snapshot().await;
        match store::save_json(&*self.blobs, BLOB_KEY, &snapshot) {
            Ok(()) => {
                tracing::debug!(topics = snapshot.len(), "flushed fingerprints");
                Ok(true)
            }
            Err(e) => {
                self.dirty.store(true, Ordering::SeqCst);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::normalizer::Normalizer;
    use crate::store::{BlobStore, MemoryBlobStore};

    struct BrokenBlobStore;

    impl BlobStore for BrokenBlobStore {
        fn load(&self, _key: &str) -> Result<Option<Vec<u8>>, StorageError> {
            Ok(Some(b"{}".to_vec()))
        }

        fn save(&self, key: &str, _bytes: &[u8]) -> Result<(), StorageError> {
            Err(StorageError::Io {
                path: key.into(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            })
        }

        fn location(&self) -> String {
            "broken".into()
        }
    }

    fn page(body: &str) -> String {
        format!(r#"<body class="docs-gm">{}<script></script>"#, body)
    }

    #[test]
    fn test_compute_is_stable_hex() {
        let a = compute("<td>Matematika</td>");
        let b = compute("<td>Matematika</td>");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, compute("<td>Hrvatski</td>"));
    }

    #[test]
    fn test_volatile_attributes_do_not_change_fingerprint() {
        let normalizer = Normalizer::new();
        let a = normalizer
            .normalize(&page(r#"<a href="/x?session=1" id="r1">3A</a>"#))
            .unwrap();
        let b = normalizer
            .normalize(&page(r#"<a href="/x?session=2" id="r9">3A</a>"#))
            .unwrap();
        assert_eq!(compute(&a), compute(&b));
    }

    #[test]
    fn test_content_change_changes_fingerprint() {
        let normalizer = Normalizer::new();
        let a = normalizer.normalize(&page("<td>Mon: Math</td>")).unwrap();
        let b = normalizer.normalize(&page("<td>Mon: Physics</td>")).unwrap();
        assert_ne!(compute(&a), compute(&b));
    }

    #[tokio::test]
    async fn test_compare_and_update() {
        let store = FingerprintStore::with_hashes(Arc::new(MemoryBlobStore::new()), BTreeMap::new());

        assert!(store.compare_and_update("3A", "h1").await);
        assert!(!store.compare_and_update("3A", "h1").await);
        assert!(store.compare_and_update("3A", "h2").await);
        assert_eq!(store.get("3A").await.as_deref(), Some("h2"));
    }

    #[tokio::test]
    async fn test_same_hash_as_stored_is_unchanged() {
        let mut initial = BTreeMap::new();
        initial.insert("3A".to_string(), "abc123".to_string());
        let store = FingerprintStore::with_hashes(Arc::new(MemoryBlobStore::new()), initial);

        assert!(!store.compare_and_update("3A", "abc123").await);
        assert!(!store.compare_and_update("3A", "abc123").await);
    }

    #[tokio::test]
    async fn test_flush_and_reload() {
        let blobs: SharedBlobStore = Arc::new(MemoryBlobStore::new());
        let store = FingerprintStore::with_hashes(blobs.clone(), BTreeMap::new());
        store.compare_and_update("1B", "f00d").await;

        assert!(store.flush().await.unwrap());
        assert!(!store.flush().await.unwrap(), "clean store skips the write");

        let reloaded = FingerprintStore::load(blobs).unwrap();
        assert_eq!(reloaded.get("1B").await.as_deref(), Some("f00d"));
    }

    #[test]
    fn test_load_missing_blob_fails() {
        let result = FingerprintStore::load(Arc::new(MemoryBlobStore::new()));
        assert!(matches!(result, Err(StorageError::Missing(_))));
    }

    #[test]
    fn test_load_corrupt_blob_fails() {
        let blobs = MemoryBlobStore::new().with_blob(BLOB_KEY, b"[\"not a map\"]");
        let result = FingerprintStore::load(Arc::new(blobs));
        assert!(matches!(result, Err(StorageError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_state_dirty() {
        let store = FingerprintStore::load(Arc::new(BrokenBlobStore)).unwrap();
        store.compare_and_update("3A", "abc").await;

        assert!(store.flush().await.is_err());
        assert!(store.is_dirty());
        assert_eq!(store.get("3A").await.as_deref(), Some("abc"));
    }
}
