use std::collections::HashSet;

use sea_orm::sea_query::Expr;
use serde::{Deserialize, Serialize};

use crate::{
  checksum,
  entity::{Dependencies, build, project, release_channel},
  prelude::*,
  sv::{self, is_lock_contention, is_unique_violation, name_eq},
};

pub const MAX_PER_PAGE: u64 = 100;

/// Everything about a build except its number, which is allocated at insert.
#[derive(Debug, Clone)]
pub struct NewBuild {
  pub project_id: i32,
  pub release_channel_id: i32,
  pub supported_versions: String,
  pub dependencies: Vec<String>,
  pub release_notes: String,
  pub commit_hash: Option<String>,
}

/// A build together with the project and channel it belongs to.
#[derive(Debug, Clone)]
pub struct Resolved {
  pub project: project::Model,
  pub channel: release_channel::Model,
  pub build: build::Model,
}

impl Resolved {
  pub fn file_name(&self) -> String {
    utils::render_file_name(
      &self.channel.file_naming,
      &self.project.name,
      &self.channel.name,
      self.build.build_id,
    )
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildResponse {
  pub project_name: String,
  pub release_channel: String,
  pub build_id: i32,
  pub checksum: String,
  pub file_download_url: String,
  pub supported_versions: String,
  pub dependencies: Vec<String>,
  pub release_notes: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub commit_hash: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub commit_link: Option<String>,
}

impl BuildResponse {
  pub fn new(
    project: &project::Model,
    channel: &release_channel::Model,
    build: &build::Model,
    public_url: &str,
  ) -> Self {
    let file_download_url = format!(
      "{}/api/v1/projects/{}/releases/{}/download/{}",
      public_url.trim_end_matches('/'),
      project.name,
      channel.name,
      build.build_id
    );
    let commit_link =
      build.commit_hash.as_deref().and_then(|hash| project.commit_link(hash));

    Self {
      project_name: project.name.clone(),
      release_channel: channel.name.clone(),
      build_id: build.build_id,
      checksum: build.checksum.clone(),
      file_download_url,
      supported_versions: build.supported_versions.clone(),
      dependencies: build.dependencies.0.clone(),
      release_notes: build.release_notes.clone(),
      commit_hash: build.commit_hash.clone(),
      commit_link,
    }
  }
}

#[derive(Debug, Clone)]
pub struct ChannelBuilds {
  pub channel: release_channel::Model,
  pub builds: Vec<build::Model>,
}

/// Identifies a build for the administrative rewrite.
#[derive(Debug, Clone)]
pub struct BuildSelector {
  pub project: String,
  pub channel: String,
  pub build_id: i32,
}

#[derive(Debug, Clone, Default)]
pub struct BuildPatch {
  pub build_id: Option<i32>,
  pub checksum: Option<String>,
}

pub struct Build<'a> {
  db: &'a DatabaseConnection,
}

impl<'a> Build<'a> {
  pub fn new(db: &'a DatabaseConnection) -> Self {
    Self { db }
  }

  /// Next build number of a channel: highest issued plus one, 1 for the
  /// first build. Run it on the transaction that inserts the build, the
  /// primary key rejects a number handed out twice.
  pub async fn next_number<C: ConnectionTrait>(
    conn: &C,
    channel_id: i32,
  ) -> Result<i32> {
    let last: Option<Option<i32>> = build::Entity::find()
      .select_only()
      .column_as(Expr::col(build::Column::BuildId).max(), "last")
      .filter(build::Column::ReleaseChannelId.eq(channel_id))
      .into_tuple()
      .one(conn)
      .await?;

    last.flatten().unwrap_or(0).checked_add(1).ok_or_else(|| {
      Error::Internal(format!("channel #{channel_id} ran out of build numbers"))
    })
  }

  /// Inserts a build under `build_id`.
  ///
  /// Fails with [`Error::BuildConflict`] when the number is already taken or
  /// the database asks the writer to back off; both mean "allocate again".
  pub async fn insert<C: ConnectionTrait>(
    conn: &C,
    build_id: i32,
    checksum: &str,
    new: &NewBuild,
  ) -> Result<build::Model> {
    let build = build::ActiveModel {
      build_id: Set(build_id),
      release_channel_id: Set(new.release_channel_id),
      project_id: Set(new.project_id),
      checksum: Set(checksum.to_string()),
      supported_versions: Set(new.supported_versions.clone()),
      dependencies: Set(Dependencies(new.dependencies.clone())),
      release_notes: Set(new.release_notes.clone()),
      commit_hash: Set(new.commit_hash.clone()),
      created_at: Set(Utc::now().naive_utc()),
    };

    match build.insert(conn).await {
      Ok(build) => Ok(build),
      Err(err) if is_unique_violation(&err) || is_lock_contention(&err) => {
        debug!("Build number {build_id} rejected: {err}");
        Err(Error::BuildConflict)
      }
      Err(err) => Err(err.into()),
    }
  }

  async fn resolve_channel(
    &self,
    project: &str,
    channel: &str,
  ) -> Result<(project::Model, release_channel::Model)> {
    let project = sv::Project::new(self.db).by_name(project).await?;
    let channel = sv::Channel::new(self.db).by_name(project.id, channel).await?;
    Ok((project, channel))
  }

  /// Highest numbered build of a channel.
  pub async fn latest(&self, project: &str, channel: &str) -> Result<Resolved> {
    let (project, channel) = self.resolve_channel(project, channel).await?;

    let build = build::Entity::find()
      .filter(build::Column::ReleaseChannelId.eq(channel.id))
      .order_by_desc(build::Column::BuildId)
      .one(self.db)
      .await?
      .ok_or(Error::BuildNotFound)?;

    Ok(Resolved { project, channel, build })
  }

  /// Exact build lookup.
  ///
  /// Channel and build are resolved in one query, so an unknown channel is
  /// reported as [`Error::BuildNotFound`] rather than
  /// [`Error::ReleaseChannelNotFound`]. Clients rely on this.
  pub async fn by_number(
    &self,
    project: &str,
    channel: &str,
    build_id: i32,
  ) -> Result<Resolved> {
    let project = sv::Project::new(self.db).by_name(project).await?;

    let (build, channel) = build::Entity::find()
      .find_also_related(release_channel::Entity)
      .filter(build::Column::ProjectId.eq(project.id))
      .filter(build::Column::BuildId.eq(build_id))
      .filter(name_eq(
        (release_channel::Entity, release_channel::Column::Name),
        channel,
      ))
      .one(self.db)
      .await?
      .ok_or(Error::BuildNotFound)?;
    let channel = channel.ok_or(Error::BuildNotFound)?;

    Ok(Resolved { project, channel, build })
  }

  /// One page of a channel's builds, newest first, plus the total count.
  /// Pages start at 0.
  pub async fn list_for_channel(
    &self,
    project_id: i32,
    channel_id: i32,
    page: u64,
    per_page: u64,
  ) -> Result<(Vec<build::Model>, u64)> {
    let per_page = per_page.clamp(1, MAX_PER_PAGE);
    // the paginator multiplies page by page size unchecked
    if page.checked_mul(per_page).is_none_or(|offset| offset > i64::MAX as u64)
    {
      return Err(Error::Validation(format!("page {page} is out of range")));
    }

    let paginator = build::Entity::find()
      .filter(build::Column::ProjectId.eq(project_id))
      .filter(build::Column::ReleaseChannelId.eq(channel_id))
      .order_by_desc(build::Column::BuildId)
      .paginate(self.db, per_page);

    let total = paginator.num_items().await?;
    let builds = paginator.fetch_page(page).await?;
    Ok((builds, total))
  }

  /// Every build of a project grouped by channel, channels ordered by name
  /// and builds newest first. Channels without builds are included.
  pub async fn list_for_project(
    &self,
    project: &str,
  ) -> Result<(project::Model, Vec<ChannelBuilds>)> {
    let project = sv::Project::new(self.db).by_name(project).await?;
    let channels = sv::Project::new(self.db).channels(project.id).await?;

    let mut builds: HashMap<i32, Vec<build::Model>> = HashMap::new();
    for build in build::Entity::find()
      .filter(build::Column::ProjectId.eq(project.id))
      .order_by_desc(build::Column::BuildId)
      .all(self.db)
      .await?
    {
      builds.entry(build.release_channel_id).or_default().push(build);
    }

    let mut grouped: Vec<_> = channels
      .into_iter()
      .map(|channel| ChannelBuilds {
        builds: builds.remove(&channel.id).unwrap_or_default(),
        channel,
      })
      .collect();
    grouped.sort_by(|a, b| a.channel.name.cmp(&b.channel.name));

    Ok((project, grouped))
  }

  /// Content hashes referenced by any build.
  pub async fn checksums(&self) -> Result<HashSet<String>> {
    let checksums: Vec<String> = build::Entity::find()
      .select_only()
      .column(build::Column::Checksum)
      .distinct()
      .into_tuple()
      .all(self.db)
      .await?;
    Ok(checksums.into_iter().collect())
  }

  /// Overwrites the number and/or content hash of an existing build.
  ///
  /// Migration tooling only. It bypasses allocation entirely and must never
  /// be reachable from the upload path.
  pub async fn admin_rewrite(
    &self,
    selector: BuildSelector,
    patch: BuildPatch,
  ) -> Result<Resolved> {
    if patch.build_id.is_none() && patch.checksum.is_none() {
      return Err(Error::Validation("nothing to rewrite".into()));
    }
    if patch.build_id.is_some_and(|id| id < 1) {
      return Err(Error::Validation("build id must be positive".into()));
    }
    let hash = patch.checksum.map(|c| c.to_ascii_lowercase());
    if hash.as_deref().is_some_and(|c| !checksum::is_digest(c)) {
      return Err(Error::InvalidMetadata(
        "checksum must be 64 hex characters".into(),
      ));
    }

    let (project, channel) =
      self.resolve_channel(&selector.project, &selector.channel).await?;

    let mut update = build::Entity::update_many()
      .filter(build::Column::ReleaseChannelId.eq(channel.id))
      .filter(build::Column::BuildId.eq(selector.build_id));
    if let Some(build_id) = patch.build_id {
      update = update.col_expr(build::Column::BuildId, Expr::value(build_id));
    }
    if let Some(hash) = &hash {
      update =
        update.col_expr(build::Column::Checksum, Expr::value(hash.clone()));
    }

    let result = match update.exec(self.db).await {
      Ok(result) => result,
      Err(err) if is_unique_violation(&err) => {
        return Err(Error::BuildConflict);
      }
      Err(err) => return Err(err.into()),
    };
    if result.rows_affected == 0 {
      return Err(Error::BuildNotFound);
    }

    let build_id = patch.build_id.unwrap_or(selector.build_id);
    warn!(
      "Admin rewrite of {}/{} #{} -> #{}{}",
      project.name,
      channel.name,
      selector.build_id,
      build_id,
      hash.map(|c| format!(" ({c})")).unwrap_or_default()
    );

    let build = build::Entity::find_by_id((build_id, channel.id))
      .one(self.db)
      .await?
      .ok_or(Error::BuildNotFound)?;

    Ok(Resolved { project, channel, build })
  }
}
