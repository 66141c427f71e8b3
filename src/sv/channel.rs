use crate::{
  entity::{Dependencies, release_channel},
  prelude::*,
  sv::{self, is_unique_violation, name_eq},
};

#[derive(Debug, Clone)]
pub struct NewChannel {
  pub name: String,
  pub supported_versions: String,
  pub dependencies: Vec<String>,
  pub file_naming: Option<String>,
}

pub struct Channel<'a> {
  db: &'a DatabaseConnection,
}

impl<'a> Channel<'a> {
  pub fn new(db: &'a DatabaseConnection) -> Self {
    Self { db }
  }

  /// Creates a release channel. The first channel of a project becomes its
  /// default.
  pub async fn create(
    &self,
    project_id: i32,
    new: NewChannel,
  ) -> Result<release_channel::Model> {
    utils::validate_name(&new.name)?;

    let project = project_by_id(self.db, project_id).await?;
    if self.find(project_id, &new.name).await?.is_some() {
      return Err(Error::ReleaseChannelExists);
    }

    let file_naming = new
      .file_naming
      .filter(|naming| !naming.trim().is_empty())
      .unwrap_or_else(|| release_channel::DEFAULT_FILE_NAMING.to_string());

    let channel = release_channel::ActiveModel {
      id: sea_orm::NotSet,
      project_id: Set(project_id),
      name: Set(new.name),
      supported_versions: Set(new.supported_versions),
      dependencies: Set(Dependencies(new.dependencies)),
      file_naming: Set(file_naming),
      created_at: Set(Utc::now().naive_utc()),
    };

    let channel = match channel.insert(self.db).await {
      Ok(channel) => channel,
      Err(err) if is_unique_violation(&err) => {
        return Err(Error::ReleaseChannelExists);
      }
      Err(err) => return Err(err.into()),
    };

    if project.default_release_channel.is_none() {
      sv::Project::new(self.db).set_default_channel(project, channel.id).await?;
    }

    Ok(channel)
  }

  pub async fn find(
    &self,
    project_id: i32,
    name: &str,
  ) -> Result<Option<release_channel::Model>> {
    let channel = release_channel::Entity::find()
      .filter(release_channel::Column::ProjectId.eq(project_id))
      .filter(name_eq(
        (release_channel::Entity, release_channel::Column::Name),
        name,
      ))
      .one(self.db)
      .await?;
    Ok(channel)
  }

  pub async fn by_name(
    &self,
    project_id: i32,
    name: &str,
  ) -> Result<release_channel::Model> {
    self.find(project_id, name).await?.ok_or(Error::ReleaseChannelNotFound)
  }
}

async fn project_by_id(
  db: &DatabaseConnection,
  id: i32,
) -> Result<crate::entity::project::Model> {
  crate::entity::project::Entity::find_by_id(id)
    .one(db)
    .await?
    .ok_or(Error::ProjectNotFound)
}
