use bytes::Bytes;
use serde::Deserialize;

use crate::{
  archive, checksum,
  entity::{build, project, release_channel, user},
  notify::{self, Notifier},
  prelude::*,
  state::Config,
  storage::ArtifactStore,
  sv::{
    self, is_lock_contention,
    build::{BuildResponse, NewBuild},
  },
};

pub const JAR_CONTENT_TYPE: &str = "application/java-archive";

/// The `metadata` part of an upload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadMetadata {
  pub checksum: String,
  #[serde(default)]
  pub supported_versions: Option<String>,
  #[serde(default)]
  pub dependencies: Option<Vec<String>>,
  #[serde(default)]
  pub release_notes: Option<String>,
  #[serde(default)]
  pub commit_hash: Option<String>,
}

impl UploadMetadata {
  pub fn new(checksum: impl Into<String>) -> Self {
    Self { checksum: checksum.into(), ..Default::default() }
  }

  pub fn parse(raw: &str) -> Result<Self> {
    let mut metadata: Self = json::from_str(raw)
      .map_err(|err| Error::InvalidMetadata(err.to_string()))?;

    metadata.checksum = metadata.checksum.trim().to_ascii_lowercase();
    if !checksum::is_digest(&metadata.checksum) {
      return Err(Error::InvalidMetadata(
        "checksum must be 64 hex characters".into(),
      ));
    }

    metadata.commit_hash = metadata
      .commit_hash
      .map(|hash| hash.trim().to_string())
      .filter(|hash| !hash.is_empty());

    Ok(metadata)
  }
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
  pub project: String,
  pub channel: String,
  pub file_name: String,
  pub metadata: UploadMetadata,
  pub bytes: Bytes,
}

#[derive(Debug)]
enum Stage<'a> {
  ValidatingInput,
  VerifyingChecksum,
  AllocatingBuildNumber { attempt: u32 },
  RewritingArchive { build_id: i32 },
  PersistingArtifact { checksum: &'a str },
  PersistingRecord { build_id: i32 },
  Done { build_id: i32 },
  Failed { reason: String },
}

struct Target {
  project: project::Model,
  channel: release_channel::Model,
}

impl Target {
  fn label(&self) -> String {
    format!("{}/{}", self.project.name, self.channel.name)
  }
}

/// Accepts a jar for a release channel: verifies it, assigns the next build
/// number, stamps the number into the plugin descriptor and publishes it.
pub struct Upload<'a> {
  db: &'a DatabaseConnection,
  store: &'a ArtifactStore,
  notifier: &'a Arc<dyn Notifier>,
  config: &'a Config,
}

impl<'a> Upload<'a> {
  pub fn new(
    db: &'a DatabaseConnection,
    store: &'a ArtifactStore,
    notifier: &'a Arc<dyn Notifier>,
    config: &'a Config,
  ) -> Self {
    Self { db, store, notifier, config }
  }

  pub async fn run(
    &self,
    caller: &user::Model,
    req: UploadRequest,
  ) -> Result<BuildResponse> {
    let label = format!("{}/{}", req.project, req.channel);
    match self.publish(caller, req).await {
      Ok(response) => Ok(response),
      Err(err) => {
        trace(&label, Stage::Failed { reason: err.to_string() });
        Err(err)
      }
    }
  }

  async fn publish(
    &self,
    caller: &user::Model,
    req: UploadRequest,
  ) -> Result<BuildResponse> {
    trace(&format!("{}/{}", req.project, req.channel), Stage::ValidatingInput);

    if !req.file_name.to_ascii_lowercase().ends_with(".jar") {
      return Err(Error::InvalidFileType);
    }

    let project =
      sv::Project::new(self.db).owned_by(&req.project, caller.id).await?;
    let channel =
      sv::Channel::new(self.db).by_name(project.id, &req.channel).await?;
    let target = Target { project, channel };
    let label = target.label();

    trace(&label, Stage::VerifyingChecksum);
    if !checksum::verify(&req.bytes, &req.metadata.checksum) {
      return Err(Error::ChecksumMismatch {
        expected: req.metadata.checksum.clone(),
        actual: checksum::digest(&req.bytes),
      });
    }

    let new = NewBuild {
      project_id: target.project.id,
      release_channel_id: target.channel.id,
      supported_versions: req
        .metadata
        .supported_versions
        .clone()
        .unwrap_or_else(|| target.channel.supported_versions.clone()),
      dependencies: req
        .metadata
        .dependencies
        .clone()
        .unwrap_or_else(|| target.channel.dependencies.0.clone()),
      release_notes: req.metadata.release_notes.clone().unwrap_or_default(),
      commit_hash: req.metadata.commit_hash.clone(),
    };

    let attempts = self.config.allocation_attempts.max(1);
    for attempt in 1..=attempts {
      trace(&label, Stage::AllocatingBuildNumber { attempt });

      let txn = self.db.begin().await?;
      let build = match self.attempt(&txn, &target, &new, &req.bytes).await {
        Ok(build) => build,
        Err(Error::BuildConflict) => {
          txn.rollback().await?;
          warn!("Build number race on {label}, attempt {attempt}/{attempts}");
          continue;
        }
        Err(err) => {
          txn.rollback().await?;
          return Err(err);
        }
      };

      match txn.commit().await {
        Ok(()) => {}
        Err(err) if is_lock_contention(&err) => {
          warn!("Commit contention on {label}, attempt {attempt}/{attempts}");
          continue;
        }
        Err(err) => return Err(err.into()),
      }

      trace(&label, Stage::Done { build_id: build.build_id });
      info!("Published {label} #{} ({})", build.build_id, build.checksum);

      let response = BuildResponse::new(
        &target.project,
        &target.channel,
        &build,
        &self.config.public_url,
      );
      notify::spawn(self.notifier.clone(), response.clone());
      return Ok(response);
    }

    Err(Error::Internal(format!(
      "could not allocate a build number for {label} after {attempts} attempts"
    )))
  }

  /// One allocation attempt on `txn`. The blob is stored before the row that
  /// references it is inserted.
  async fn attempt(
    &self,
    txn: &DatabaseTransaction,
    target: &Target,
    new: &NewBuild,
    bytes: &Bytes,
  ) -> Result<build::Model> {
    let label = target.label();
    let build_id = sv::Build::next_number(txn, target.channel.id).await?;

    let artifact = if target.project.stamp_version {
      trace(&label, Stage::RewritingArchive { build_id });
      let version = archive::stamp(&target.channel.name, build_id);
      let source = bytes.clone();
      let rewritten = tokio::task::spawn_blocking(move || {
        archive::rewrite_version(&source, &version)
      })
      .await
      .map_err(|err| Error::Internal(format!("rewrite task failed: {err}")))??;
      Bytes::from(rewritten)
    } else {
      bytes.clone()
    };

    let hash = checksum::digest(&artifact);
    trace(&label, Stage::PersistingArtifact { checksum: &hash });
    self
      .store
      .put(&target.project.name, &target.channel.name, &hash, artifact)
      .await?;

    trace(&label, Stage::PersistingRecord { build_id });
    sv::Build::insert(txn, build_id, &hash, new).await
  }
}

fn trace(label: &str, stage: Stage<'_>) {
  debug!("Upload {label}: {stage:?}");
}
