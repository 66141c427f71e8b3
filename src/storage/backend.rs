use async_trait::async_trait;
use bytes::Bytes;

use crate::prelude::*;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
  #[error("Object not found: {0}")]
  NotFound(String),

  #[error("Invalid key: {0}")]
  InvalidKey(String),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobInfo {
  pub key: String,
  pub size: u64,
  pub modified: DateTime,
}

/// Key-addressed byte storage.
///
/// Keys are `/`-separated relative paths. Implementations must reject keys
/// that could escape their root.
#[async_trait]
pub trait Backend: Send + Sync {
  async fn get(&self, key: &str) -> StorageResult<Bytes>;

  /// Writes `data` under `key`. Writing an existing key is allowed.
  async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

  async fn exists(&self, key: &str) -> StorageResult<bool>;

  /// Deleting a missing key is not an error.
  async fn delete(&self, key: &str) -> StorageResult<()>;

  async fn list(&self) -> StorageResult<Vec<BlobInfo>>;
}

pub(super) fn check_key(key: &str) -> StorageResult<()> {
  let valid = !key.is_empty()
    && !key.starts_with('/')
    && key
      .split('/')
      .all(|part| !part.is_empty() && part != "." && part != "..")
    && !key.contains('\\');

  if valid { Ok(()) } else { Err(StorageError::InvalidKey(key.to_string())) }
}
