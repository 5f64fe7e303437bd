//! Key-value storage trait abstraction.
//!
//! Provides the durable storage seam used by the offline action queue and
//! the session adapter, enabling dependency injection and in-memory stores
//! in tests.

use async_trait::async_trait;
use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying I/O failed
    #[error("Storage I/O error for '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// A stored value could not be encoded or decoded
    #[error("Storage serialization error for '{key}': {message}")]
    Serialization { key: String, message: String },

    /// The key is not usable by this store
    #[error("Invalid storage key '{0}'")]
    InvalidKey(String),
}

/// Trait for durable string key-value storage.
///
/// Values are opaque strings (JSON documents in practice). A successful
/// `save` must be durable before it returns, so callers can treat it as a
/// write-ahead step.
///
/// # Example
///
/// ```ignore
/// use nutrilink::traits::KeyValueStore;
///
/// async fn bump<S: KeyValueStore>(store: &S) -> Result<(), StorageError> {
///     let current = store.load("counter").await?.unwrap_or_else(|| "0".into());
///     let next = current.parse::<u64>().unwrap_or(0) + 1;
///     store.save("counter", &next.to_string()).await
/// }
/// ```
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Load the value stored under `key`.
    ///
    /// # Returns
    /// - `Ok(Some(value))` if the key exists
    /// - `Ok(None)` if nothing is stored
    /// - `Err(error)` if reading failed
    async fn load(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Durably store `value` under `key`, replacing any previous value.
    async fn save(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Io {
            key: "queue".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "Storage I/O error for 'queue': denied");

        let err = StorageError::Serialization {
            key: "queue".to_string(),
            message: "eof".to_string(),
        };
        assert_eq!(err.to_string(), "Storage serialization error for 'queue': eof");

        assert_eq!(
            StorageError::InvalidKey("../x".to_string()).to_string(),
            "Invalid storage key '../x'"
        );
    }

    #[test]
    fn test_storage_error_source() {
        use std::error::Error;
        let err = StorageError::Io {
            key: "k".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "inner"),
        };
        assert!(err.source().is_some());
    }
}
