use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::Dependencies;

pub const DEFAULT_FILE_NAMING: &str = "$project-$build.jar";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "release_channels")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub project_id: i32,
  pub name: String,
  /// Defaults copied into every new build of this channel
  pub supported_versions: String,
  pub dependencies: Dependencies,
  /// Download file name, see `utils::render_file_name`
  pub file_naming: String,
  pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "super::project::Entity",
    from = "Column::ProjectId",
    to = "super::project::Column::Id",
    on_delete = "Cascade"
  )]
  Project,
  #[sea_orm(has_many = "super::build::Entity")]
  Build,
}

impl Related<super::project::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Project.def()
  }
}

impl Related<super::build::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Build.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
