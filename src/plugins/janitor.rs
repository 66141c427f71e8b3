//! Removes artifacts no build points at.
//!
//! A failed or abandoned upload may leave its blob behind: the blob is
//! written before the build row and the row can still be rolled back.

use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use chrono::TimeDelta;

use crate::{prelude::*, state::AppState, storage::ArtifactStore, sv};

pub struct Plugin;

#[async_trait]
impl super::Plugin for Plugin {
  fn name(&self) -> &'static str {
    "janitor"
  }

  async fn start(&self, app: Arc<AppState>) -> anyhow::Result<()> {
    let period = app.config.janitor_interval.max(Duration::from_secs(60));
    let mut interval = time::interval(period);
    // the first tick fires immediately, leave startup alone
    interval.tick().await;

    loop {
      interval.tick().await;

      match sweep(&app.db, &app.store, app.config.janitor_grace).await {
        Ok(0) => debug!("Janitor: nothing to remove"),
        Ok(removed) => info!("Janitor: removed {removed} orphaned artifacts"),
        Err(err) => error!("Janitor sweep failed: {err}"),
      }
    }
  }
}

/// Deletes blobs older than `grace` whose content hash no build references.
/// Returns the number of blobs removed.
pub async fn sweep(
  db: &DatabaseConnection,
  store: &ArtifactStore,
  grace: Duration,
) -> Result<usize> {
  let referenced = sv::Build::new(db).checksums().await?;
  let blobs = store.backend().list().await?;

  let grace = TimeDelta::from_std(grace).unwrap_or(TimeDelta::MAX);
  let now = Utc::now().naive_utc();

  let mut removed = 0;
  for blob in blobs {
    if now - blob.modified < grace || is_referenced(&referenced, &blob.key) {
      continue;
    }

    debug!("Janitor: removing {}", blob.key);
    store.backend().delete(&blob.key).await?;
    removed += 1;
  }

  Ok(removed)
}

/// Keys end in the content hash, whichever layout they were written with.
fn is_referenced(referenced: &HashSet<String>, key: &str) -> bool {
  key.rsplit('/').next().is_some_and(|hash| referenced.contains(hash))
}

#[cfg(test)]
mod tests {
  use bytes::Bytes;

  use super::*;
  use crate::{archive::tests::plugin_jar, checksum, sv::testing::Fixture};

  #[tokio::test]
  async fn test_sweep_removes_orphans_only() {
    let fx = Fixture::new().await;
    let published = fx
      .upload()
      .run(&fx.owner, fx.request(plugin_jar("1.0")))
      .await
      .unwrap();

    let orphan = checksum::digest(b"orphan");
    fx.store
      .put("demo", "dev", &orphan, Bytes::from_static(b"orphan"))
      .await
      .unwrap();
    // legacy layout, still referenced
    fx.store
      .backend()
      .put(&format!("Demo/Dev/{}", published.checksum), Bytes::new())
      .await
      .unwrap();

    // everything is younger than the grace period
    let removed =
      sweep(&fx.db, &fx.store, Duration::from_secs(3600)).await.unwrap();
    assert_eq!(removed, 0);

    let removed = sweep(&fx.db, &fx.store, Duration::ZERO).await.unwrap();
    assert_eq!(removed, 1);

    let keys: Vec<_> = fx
      .store
      .backend()
      .list()
      .await
      .unwrap()
      .into_iter()
      .map(|blob| blob.key)
      .collect();
    assert_eq!(keys.len(), 2);
    assert!(keys.iter().all(|key| key.ends_with(&published.checksum)));
  }

  #[tokio::test]
  async fn test_rewritten_blob_is_fresh_again() {
    let fx = Fixture::new().await;
    let hash = checksum::digest(b"retried");
    let grace = Duration::from_millis(200);

    // left behind by a failed upload
    fx.store
      .put("demo", "dev", &hash, Bytes::from_static(b"retried"))
      .await
      .unwrap();
    time::sleep(grace * 2).await;

    // a retry produces the same bytes before its row commits
    fx.store
      .put("demo", "dev", &hash, Bytes::from_static(b"retried"))
      .await
      .unwrap();

    assert_eq!(sweep(&fx.db, &fx.store, grace).await.unwrap(), 0);
    assert!(fx.store.get("demo", "dev", &hash).await.is_ok());
  }

  #[test]
  fn test_is_referenced() {
    let referenced = HashSet::from(["abc".to_string()]);
    assert!(is_referenced(&referenced, "demo/dev/abc"));
    assert!(is_referenced(&referenced, "Demo/Dev/abc"));
    assert!(!is_referenced(&referenced, "demo/dev/abd"));
  }
}
