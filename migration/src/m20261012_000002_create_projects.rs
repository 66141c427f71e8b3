use sea_orm_migration::prelude::*;

use super::m20261012_000001_create_users::Users;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(Projects::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Projects::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(Projects::OwnerId).integer().not_null())
          .col(
            ColumnDef::new(Projects::Name)
              .string()
              .not_null()
              .extra("COLLATE NOCASE")
              .unique_key(),
          )
          .col(
            ColumnDef::new(Projects::Description)
              .text()
              .not_null()
              .default(""),
          )
          .col(ColumnDef::new(Projects::RepositoryLink).string().null())
          .col(ColumnDef::new(Projects::WikiLink).string().null())
          .col(ColumnDef::new(Projects::DefaultReleaseChannel).integer().null())
          .col(
            ColumnDef::new(Projects::StampVersion)
              .boolean()
              .not_null()
              .default(true),
          )
          .col(ColumnDef::new(Projects::CreatedAt).date_time().not_null())
          .foreign_key(
            ForeignKey::create()
              .name("fk_projects_owner")
              .from(Projects::Table, Projects::OwnerId)
              .to(Users::Table, Users::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager.drop_table(Table::drop().table(Projects::Table).to_owned()).await
  }
}

#[derive(DeriveIden)]
pub enum Projects {
  Table,
  Id,
  OwnerId,
  Name,
  Description,
  RepositoryLink,
  WikiLink,
  DefaultReleaseChannel,
  StampVersion,
  CreatedAt,
}
