//! In-memory key-value store for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::traits::{KeyValueStore, StorageError};

/// Key-value store kept in memory.
///
/// Clones share the same entries, so a test can "restart" a component by
/// loading it again from a clone of the store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
    save_should_fail: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw value under `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Seed a raw value, bypassing failure injection.
    pub fn insert(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }

    /// Configure whether save should fail.
    pub fn set_save_should_fail(&self, should_fail: bool) {
        self.save_should_fail.store(should_fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.get(key))
    }

    async fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.save_should_fail.load(Ordering::SeqCst) {
            return Err(StorageError::Io {
                key: key.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "Mock save failure"),
            });
        }
        self.insert(key, value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clones_share_entries() {
        let store = InMemoryStore::new();
        let clone = store.clone();

        store.save("k", "v").await.unwrap();
        assert_eq!(clone.load("k").await.unwrap().as_deref(), Some("v"));

        clone.remove("k").await.unwrap();
        assert_eq!(store.get("k"), None);
    }

    #[tokio::test]
    async fn test_save_failure_injection() {
        let store = InMemoryStore::new();
        store.set_save_should_fail(true);
        assert!(store.save("k", "v").await.is_err());
        assert_eq!(store.get("k"), None);
    }
}
