use async_trait::async_trait;
use bytes::Bytes;

use super::backend::{Backend, BlobInfo, StorageError, StorageResult, check_key};
use crate::prelude::*;

/// In-process backend, contents are lost on restart.
#[derive(Default)]
pub struct MemoryStorage {
  blobs: DashMap<String, (Bytes, DateTime)>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl Backend for MemoryStorage {
  async fn get(&self, key: &str) -> StorageResult<Bytes> {
    check_key(key)?;
    self
      .blobs
      .get(key)
      .map(|blob| blob.0.clone())
      .ok_or_else(|| StorageError::NotFound(key.to_string()))
  }

  async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
    check_key(key)?;
    self.blobs.insert(key.to_string(), (data, Utc::now().naive_utc()));
    Ok(())
  }

  async fn exists(&self, key: &str) -> StorageResult<bool> {
    check_key(key)?;
    Ok(self.blobs.contains_key(key))
  }

  async fn delete(&self, key: &str) -> StorageResult<()> {
    check_key(key)?;
    self.blobs.remove(key);
    Ok(())
  }

  async fn list(&self) -> StorageResult<Vec<BlobInfo>> {
    let mut blobs: Vec<_> = self
      .blobs
      .iter()
      .map(|entry| BlobInfo {
        key: entry.key().clone(),
        size: entry.value().0.len() as u64,
        modified: entry.value().1,
      })
      .collect();
    blobs.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(blobs)
  }
}
