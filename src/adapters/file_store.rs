//! File-backed key-value store.
//!
//! Each key lives in its own `<key>.json` file inside one directory. Writes
//! go to a temporary sibling that is synced and then renamed over the
//! target, so a crash mid-write leaves the previous value intact.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::traits::{KeyValueStore, StorageError};

/// Directory-backed [`KeyValueStore`].
///
/// # Example
///
/// ```ignore
/// use nutrilink::adapters::FileStore;
///
/// let store = FileStore::new(config.resolved_storage_dir()?);
/// store.save("nutrilink.offline.pending", "[]").await?;
/// ```
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `key`.
    ///
    /// Keys may only contain ASCII letters, digits, `.`, `_` and `-`, and
    /// must not start with a dot.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

fn io_error(key: &str, source: std::io::Error) -> StorageError {
    StorageError::Io {
        key: key.to_string(),
        source,
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(key, e)),
        }
    }

    async fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(key, e))?;

        let tmp = path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp)
            .await
            .map_err(|e| io_error(key, e))?;
        file.write_all(value.as_bytes())
            .await
            .map_err(|e| io_error(key, e))?;
        file.sync_all().await.map_err(|e| io_error(key, e))?;
        drop(file);

        fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error(key, e))?;
        debug!("Saved {} bytes to {}", value.len(), path.display());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(key, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_missing_key() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path());
        assert_eq!(store.load("absent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_creates_directory_and_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path().join("nested").join("store"));

        store.save("queue", "[1]").await.unwrap();
        store.save("queue", "[1,2]").await.unwrap();

        assert_eq!(store.load("queue").await.unwrap().as_deref(), Some("[1,2]"));
        assert!(!store.dir().join("queue.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path());

        store.save("k", "v").await.unwrap();
        store.remove("k").await.unwrap();
        store.remove("k").await.unwrap();
        assert_eq!(store.load("k").await.unwrap(), None);
    }

    #[test]
    fn test_rejects_unsafe_keys() {
        let store = FileStore::new("/tmp/unused");
        for key in ["", "../etc/passwd", ".hidden", "a/b", "a b"] {
            assert!(
                matches!(store.path_for(key), Err(StorageError::InvalidKey(_))),
                "{key:?} should be rejected"
            );
        }
        assert!(store.path_for("nutrilink.offline.pending").is_ok());
    }
}
