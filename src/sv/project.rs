use crate::{
  entity::{project, release_channel},
  prelude::*,
  sv::{self, is_unique_violation, name_eq},
};

#[derive(Debug, Clone)]
pub struct NewProject {
  pub owner_id: i32,
  pub name: String,
  pub description: String,
  pub repository_link: Option<String>,
  pub wiki_link: Option<String>,
  pub stamp_version: bool,
}

pub struct Project<'a> {
  db: &'a DatabaseConnection,
}

impl<'a> Project<'a> {
  pub fn new(db: &'a DatabaseConnection) -> Self {
    Self { db }
  }

  pub async fn create(&self, new: NewProject) -> Result<project::Model> {
    utils::validate_name(&new.name)?;

    sv::User::new(self.db)
      .by_id(new.owner_id)
      .await?
      .ok_or(Error::UserNotFound)?;

    if self.find(&new.name).await?.is_some() {
      return Err(Error::ProjectExists);
    }

    let project = project::ActiveModel {
      id: sea_orm::NotSet,
      owner_id: Set(new.owner_id),
      name: Set(new.name),
      description: Set(new.description),
      repository_link: Set(new.repository_link),
      wiki_link: Set(new.wiki_link),
      default_release_channel: Set(None),
      stamp_version: Set(new.stamp_version),
      created_at: Set(Utc::now().naive_utc()),
    };

    match project.insert(self.db).await {
      Ok(project) => Ok(project),
      Err(err) if is_unique_violation(&err) => Err(Error::ProjectExists),
      Err(err) => Err(err.into()),
    }
  }

  /// Case-insensitive lookup.
  pub async fn find(&self, name: &str) -> Result<Option<project::Model>> {
    let project = project::Entity::find()
      .filter(name_eq((project::Entity, project::Column::Name), name))
      .one(self.db)
      .await?;
    Ok(project)
  }

  pub async fn by_name(&self, name: &str) -> Result<project::Model> {
    self.find(name).await?.ok_or(Error::ProjectNotFound)
  }

  /// A project the caller does not own is reported as missing.
  pub async fn owned_by(
    &self,
    name: &str,
    owner_id: i32,
  ) -> Result<project::Model> {
    match self.find(name).await? {
      Some(project) if project.owner_id == owner_id => Ok(project),
      _ => Err(Error::ProjectNotFound),
    }
  }

  pub async fn channels(
    &self,
    project_id: i32,
  ) -> Result<Vec<release_channel::Model>> {
    let channels = release_channel::Entity::find()
      .filter(release_channel::Column::ProjectId.eq(project_id))
      .order_by_asc(release_channel::Column::Name)
      .all(self.db)
      .await?;
    Ok(channels)
  }

  pub async fn set_default_channel(
    &self,
    project: project::Model,
    channel_id: i32,
  ) -> Result<project::Model> {
    let project = project::ActiveModel {
      default_release_channel: Set(Some(channel_id)),
      ..project.into()
    }
    .update(self.db)
    .await?;
    Ok(project)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sv::testing::setup_test_db;

  fn new_project(owner_id: i32, name: &str) -> NewProject {
    NewProject {
      owner_id,
      name: name.into(),
      description: String::new(),
      repository_link: None,
      wiki_link: None,
      stamp_version: true,
    }
  }

  #[tokio::test]
  async fn test_create_project() {
    let db = setup_test_db().await;
    let (owner, _) = sv::User::new(&db).create("owner").await.unwrap();
    let sv = Project::new(&db);

    let project = sv.create(new_project(owner.id, "Demo")).await.unwrap();
    assert_eq!(project.name, "Demo");
    assert!(project.stamp_version);
    assert!(project.default_release_channel.is_none());

    // names are case-insensitive
    assert_eq!(sv.by_name("demo").await.unwrap().id, project.id);
    assert!(matches!(
      sv.create(new_project(owner.id, "DEMO")).await,
      Err(Error::ProjectExists)
    ));
  }

  #[tokio::test]
  async fn test_create_project_validation() {
    let db = setup_test_db().await;
    let sv = Project::new(&db);

    assert!(matches!(
      sv.create(new_project(42, "demo")).await,
      Err(Error::UserNotFound)
    ));
    assert!(matches!(
      sv.create(new_project(42, "../demo")).await,
      Err(Error::InvalidName(_))
    ));
  }

  #[tokio::test]
  async fn test_owned_by() {
    let db = setup_test_db().await;
    let (owner, _) = sv::User::new(&db).create("owner").await.unwrap();
    let (other, _) = sv::User::new(&db).create("other").await.unwrap();
    let sv = Project::new(&db);

    sv.create(new_project(owner.id, "demo")).await.unwrap();

    assert!(sv.owned_by("demo", owner.id).await.is_ok());
    assert!(matches!(
      sv.owned_by("demo", other.id).await,
      Err(Error::ProjectNotFound)
    ));
    assert!(matches!(
      sv.owned_by("missing", owner.id).await,
      Err(Error::ProjectNotFound)
    ));
  }
}
