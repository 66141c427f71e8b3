pub use sea_orm_migration::prelude::*;

mod m20261012_000001_create_users;
mod m20261012_000002_create_projects;
mod m20261012_000003_create_release_channels;
mod m20261012_000004_create_builds;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
  fn migrations() -> Vec<Box<dyn MigrationTrait>> {
    vec![
      Box::new(m20261012_000001_create_users::Migration),
      Box::new(m20261012_000002_create_projects::Migration),
      Box::new(m20261012_000003_create_release_channels::Migration),
      Box::new(m20261012_000004_create_builds::Migration),
    ]
  }
}
