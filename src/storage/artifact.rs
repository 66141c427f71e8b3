use bytes::Bytes;

use super::{Backend, StorageError, StorageResult};
use crate::prelude::*;

/// Content-addressed artifact storage.
///
/// Artifacts live at `{project}/{channel}/{checksum}` with both names
/// lower-cased. Blobs written before names were normalized kept the original
/// casing, so reads fall back to that layout.
#[derive(Clone)]
pub struct ArtifactStore {
  backend: Arc<dyn Backend>,
}

impl ArtifactStore {
  pub fn new(backend: Arc<dyn Backend>) -> Self {
    Self { backend }
  }

  pub fn backend(&self) -> &Arc<dyn Backend> {
    &self.backend
  }

  pub fn key(project: &str, channel: &str, checksum: &str) -> String {
    format!(
      "{}/{}/{}",
      project.to_lowercase(),
      channel.to_lowercase(),
      checksum
    )
  }

  pub fn legacy_key(project: &str, channel: &str, checksum: &str) -> String {
    format!("{project}/{channel}/{checksum}")
  }

  /// Stores an artifact. The key is derived from the content hash, so an
  /// existing blob at the key holds the same bytes. It is written again
  /// anyway: the write marks the blob as fresh for the janitor.
  pub async fn put(
    &self,
    project: &str,
    channel: &str,
    checksum: &str,
    data: Bytes,
  ) -> StorageResult<()> {
    let key = Self::key(project, channel, checksum);

    debug!("Storing artifact {key} ({} bytes)", data.len());
    self.backend.put(&key, data).await
  }

  pub async fn get(
    &self,
    project: &str,
    channel: &str,
    checksum: &str,
  ) -> StorageResult<Bytes> {
    let key = Self::key(project, channel, checksum);

    match self.backend.get(&key).await {
      Err(StorageError::NotFound(_)) => {
        let legacy = Self::legacy_key(project, channel, checksum);
        if legacy == key {
          return Err(StorageError::NotFound(key));
        }

        debug!("Artifact {key} missing, trying legacy path {legacy}");
        self.backend.get(&legacy).await
      }
      result => result,
    }
  }
}
