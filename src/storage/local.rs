use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{fs, io::AsyncWriteExt};

use super::backend::{Backend, BlobInfo, StorageError, StorageResult, check_key};
use crate::prelude::*;

/// Filesystem backend, a key maps to `{root}/{key}`.
pub struct LocalStorage {
  root: PathBuf,
}

impl LocalStorage {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  fn path(&self, key: &str) -> StorageResult<PathBuf> {
    check_key(key)?;
    Ok(self.root.join(key))
  }

  fn not_found(key: &str, err: std::io::Error) -> StorageError {
    if err.kind() == std::io::ErrorKind::NotFound {
      StorageError::NotFound(key.to_string())
    } else {
      StorageError::Io(err)
    }
  }

  async fn walk(&self, dir: &Path, out: &mut Vec<BlobInfo>) -> StorageResult<()> {
    let mut stack = vec![dir.to_path_buf()];

    while let Some(dir) = stack.pop() {
      let mut entries = match fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
        Err(err) => return Err(err.into()),
      };

      while let Some(entry) = entries.next_entry().await? {
        let meta = entry.metadata().await?;
        let path = entry.path();

        if meta.is_dir() {
          stack.push(path);
          continue;
        }

        // leftovers of interrupted writes
        if path.extension().is_some_and(|ext| ext == "tmp") {
          continue;
        }

        let Ok(relative) = path.strip_prefix(&self.root) else { continue };
        let key = relative
          .components()
          .map(|c| c.as_os_str().to_string_lossy())
          .collect::<Vec<_>>()
          .join("/");
        let modified = meta
          .modified()
          .map(chrono::DateTime::<Utc>::from)
          .map(|t| t.naive_utc())
          .unwrap_or_else(|_| Utc::now().naive_utc());

        out.push(BlobInfo { key, size: meta.len(), modified });
      }
    }

    Ok(())
  }
}

#[async_trait]
impl Backend for LocalStorage {
  async fn get(&self, key: &str) -> StorageResult<Bytes> {
    let path = self.path(key)?;
    let data = fs::read(&path).await.map_err(|e| Self::not_found(key, e))?;
    Ok(Bytes::from(data))
  }

  async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
    let path = self.path(key)?;
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).await?;
    }

    // write aside then rename, readers never see a partial blob
    let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4()));
    let mut file = fs::File::create(&tmp).await?;
    file.write_all(&data).await?;
    file.sync_all().await?;
    drop(file);

    if let Err(err) = fs::rename(&tmp, &path).await {
      let _ = fs::remove_file(&tmp).await;
      return Err(err.into());
    }
    Ok(())
  }

  async fn exists(&self, key: &str) -> StorageResult<bool> {
    let path = self.path(key)?;
    Ok(fs::try_exists(&path).await?)
  }

  async fn delete(&self, key: &str) -> StorageResult<()> {
    let path = self.path(key)?;
    match fs::remove_file(&path).await {
      Ok(()) => Ok(()),
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(err) => Err(err.into()),
    }
  }

  async fn list(&self) -> StorageResult<Vec<BlobInfo>> {
    let mut blobs = Vec::new();
    self.walk(&self.root, &mut blobs).await?;
    blobs.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(blobs)
  }
}
