use sea_orm_migration::prelude::*;

use super::m20261012_000002_create_projects::Projects;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(ReleaseChannels::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(ReleaseChannels::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(ReleaseChannels::ProjectId).integer().not_null())
          .col(
            ColumnDef::new(ReleaseChannels::Name)
              .string()
              .not_null()
              .extra("COLLATE NOCASE"),
          )
          .col(
            ColumnDef::new(ReleaseChannels::SupportedVersions)
              .string()
              .not_null()
              .default(""),
          )
          .col(ColumnDef::new(ReleaseChannels::Dependencies).json().not_null())
          .col(
            ColumnDef::new(ReleaseChannels::FileNaming)
              .string()
              .not_null()
              .default("$project-$build.jar"),
          )
          .col(
            ColumnDef::new(ReleaseChannels::CreatedAt).date_time().not_null(),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_release_channels_project")
              .from(ReleaseChannels::Table, ReleaseChannels::ProjectId)
              .to(Projects::Table, Projects::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_release_channels_project_name")
          .table(ReleaseChannels::Table)
          .col(ReleaseChannels::ProjectId)
          .col(ReleaseChannels::Name)
          .unique()
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(ReleaseChannels::Table).to_owned())
      .await
  }
}

#[derive(DeriveIden)]
pub enum ReleaseChannels {
  Table,
  Id,
  ProjectId,
  Name,
  SupportedVersions,
  Dependencies,
  FileNaming,
  CreatedAt,
}
