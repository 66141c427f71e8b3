use sea_orm_migration::prelude::*;

use super::{
  m20261012_000002_create_projects::Projects,
  m20261012_000003_create_release_channels::ReleaseChannels,
};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(Builds::Table)
          .if_not_exists()
          .col(ColumnDef::new(Builds::BuildId).integer().not_null())
          .col(ColumnDef::new(Builds::ReleaseChannelId).integer().not_null())
          .col(ColumnDef::new(Builds::ProjectId).integer().not_null())
          .col(ColumnDef::new(Builds::Checksum).string().not_null())
          .col(
            ColumnDef::new(Builds::SupportedVersions)
              .string()
              .not_null()
              .default(""),
          )
          .col(ColumnDef::new(Builds::Dependencies).json().not_null())
          .col(
            ColumnDef::new(Builds::ReleaseNotes).text().not_null().default(""),
          )
          .col(ColumnDef::new(Builds::CommitHash).string().null())
          .col(ColumnDef::new(Builds::CreatedAt).date_time().not_null())
          // one build number per channel; racing uploads collide here
          .primary_key(
            Index::create().col(Builds::BuildId).col(Builds::ReleaseChannelId),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_builds_release_channel")
              .from(Builds::Table, Builds::ReleaseChannelId)
              .to(ReleaseChannels::Table, ReleaseChannels::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_builds_project")
              .from(Builds::Table, Builds::ProjectId)
              .to(Projects::Table, Projects::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_builds_checksum")
          .table(Builds::Table)
          .col(Builds::Checksum)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager.drop_table(Table::drop().table(Builds::Table).to_owned()).await
  }
}

#[derive(DeriveIden)]
pub enum Builds {
  Table,
  BuildId,
  ReleaseChannelId,
  ProjectId,
  Checksum,
  SupportedVersions,
  Dependencies,
  ReleaseNotes,
  CommitHash,
  CreatedAt,
}
