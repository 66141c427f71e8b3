use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "projects")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub owner_id: i32,
  #[sea_orm(unique)]
  pub name: String,
  pub description: String,
  pub repository_link: Option<String>,
  pub wiki_link: Option<String>,
  pub default_release_channel: Option<i32>,
  /// Rewrite the plugin descriptor version on upload
  pub stamp_version: bool,
  pub created_at: DateTime,
}

impl Model {
  pub fn commit_link(&self, commit_hash: &str) -> Option<String> {
    self.repository_link.as_ref().map(|repo| {
      format!("{}/commit/{}", repo.trim_end_matches('/'), commit_hash)
    })
  }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "super::user::Entity",
    from = "Column::OwnerId",
    to = "super::user::Column::Id",
    on_delete = "Cascade"
  )]
  Owner,
  #[sea_orm(has_many = "super::release_channel::Entity")]
  ReleaseChannel,
  #[sea_orm(has_many = "super::build::Entity")]
  Build,
}

impl Related<super::user::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Owner.def()
  }
}

impl Related<super::release_channel::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::ReleaseChannel.def()
  }
}

impl Related<super::build::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Build.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
