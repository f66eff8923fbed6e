mod local;

pub use local::LocalStore;

use async_trait::async_trait;
use bytes::Bytes;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncRead;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Invalid object key: {0}")]
    InvalidKey(String),
}

pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

/// Abstraction over the content directory that backs artifact records.
/// Keys are flat, opaque names (see [`validate_key`]).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `data` under `key`, replacing any previous content. Readers never
    /// observe a partially written object.
    async fn put(&self, key: &str, data: Bytes) -> Result<(), ObjectStoreError>;
    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError>;
    /// Open the object for streaming.
    async fn reader(&self, key: &str) -> Result<ObjectReader, ObjectStoreError>;
    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError>;
    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError>;
    /// Move an object to a new key, replacing whatever the destination held.
    async fn rename(&self, from: &str, to: &str) -> Result<(), ObjectStoreError>;
    /// All committed keys (staging leftovers excluded).
    async fn list(&self) -> Result<Vec<String>, ObjectStoreError>;
    /// Remove leftovers of interrupted writes. Returns how many were removed.
    async fn clear_staging(&self) -> Result<u64, ObjectStoreError>;
}

/// Reject keys that could escape the content directory or collide with
/// internal entries.
pub fn validate_key(key: &str) -> Result<(), ObjectStoreError> {
    let invalid = key.is_empty()
        || key.starts_with('.')
        || key.contains("..")
        || key.contains('/')
        || key.contains('\\')
        || key.contains('\0');

    if invalid {
        return Err(ObjectStoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}
