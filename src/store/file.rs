use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::store::{BlobStore, StorageError};

/// One `<key>.json` file per blob in a directory.
///
/// Saves go to `<key>.json.tmp` first and are renamed over the target, so a
/// crash mid-write leaves the previous file intact.
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn io_error(path: &Path, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl BlobStore for FileBlobStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_error(&path, e)),
        }
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).map_err(|e| Self::io_error(&self.dir, e))?;

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");

        let mut file = fs::File::create(&tmp).map_err(|e| Self::io_error(&tmp, e))?;
        file.write_all(bytes).map_err(|e| Self::io_error(&tmp, e))?;
        file.sync_all().map_err(|e| Self::io_error(&tmp, e))?;
        drop(file);

        fs::rename(&tmp, &path).map_err(|e| Self::io_error(&path, e))?;
        Ok(())
    }

    fn location(&self) -> String {
        self.dir.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::new(dir.path());
        assert!(store.load("fingerprints").unwrap().is_none());
    }

    #[test]
    fn test_save_replaces_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::new(dir.path().join("nested"));

        store.save("subscriptions", b"{\"3A\":[]}").unwrap();
        store.save("subscriptions", b"{\"3B\":[]}").unwrap();

        let loaded = store.load("subscriptions").unwrap().unwrap();
        assert_eq!(loaded, b"{\"3B\":[]}");
        assert!(!store.path_for("subscriptions").with_extension("json.tmp").exists());
    }

    #[test]
    fn test_keys_map_to_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::new(dir.path());

        store.save("fingerprints", b"{}").unwrap();
        store.save("subscriptions", b"[]").unwrap();

        assert!(dir.path().join("fingerprints.json").is_file());
        assert!(dir.path().join("subscriptions.json").is_file());
    }
}
