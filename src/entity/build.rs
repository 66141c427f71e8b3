use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::Dependencies;

/// One uploaded artifact. `build_id` is only unique inside its channel.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "builds")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub build_id: i32,
  #[sea_orm(primary_key, auto_increment = false)]
  pub release_channel_id: i32,
  pub project_id: i32,
  /// hex sha256 of the stored archive, also its storage key
  pub checksum: String,
  pub supported_versions: String,
  pub dependencies: Dependencies,
  pub release_notes: String,
  pub commit_hash: Option<String>,
  pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "super::release_channel::Entity",
    from = "Column::ReleaseChannelId",
    to = "super::release_channel::Column::Id",
    on_delete = "Cascade"
  )]
  ReleaseChannel,
  #[sea_orm(
    belongs_to = "super::project::Entity",
    from = "Column::ProjectId",
    to = "super::project::Column::Id",
    on_delete = "Cascade"
  )]
  Project,
}

impl Related<super::release_channel::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::ReleaseChannel.def()
  }
}

impl Related<super::project::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Project.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
