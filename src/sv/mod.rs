pub mod build;
pub mod channel;
pub mod project;
pub mod upload;
pub mod user;

pub use build::Build;
pub use channel::Channel;
pub use project::Project;
pub use upload::Upload;
pub use user::User;

use sea_orm::{
  DbErr, SqlErr,
  sea_query::{Expr, Func, IntoColumnRef, SimpleExpr},
};

/// Case-insensitive equality on a name column.
pub(crate) fn name_eq<C: IntoColumnRef>(col: C, name: &str) -> SimpleExpr {
  Expr::expr(Func::lower(Expr::col(col))).eq(name.to_lowercase())
}

pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
  matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
    || err.to_string().contains("UNIQUE constraint failed")
}

/// Two sqlite writers upgrading their locks at once: one of them is told to
/// back off instead of waiting.
pub(crate) fn is_lock_contention(err: &DbErr) -> bool {
  let message = err.to_string();
  message.contains("database is locked")
    || message.contains("database table is locked")
}

#[cfg(test)]
pub(crate) mod testing {
  use bytes::Bytes;
  use migration::{Migrator, MigratorTrait};
  use sea_orm::{ConnectOptions, Database};

  use crate::{
    entity::{project, release_channel, user},
    notify::{self, Notifier},
    prelude::*,
    state::Config,
    storage::{ArtifactStore, MemoryStorage},
    sv,
  };

  pub async fn setup_test_db() -> DatabaseConnection {
    // a second connection would open a second, empty in-memory database
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).sqlx_logging(false);

    let db = Database::connect(options).await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    db
  }

  /// Sqlite file with a real pool, writers can contend for the lock.
  pub async fn setup_file_db(path: &std::path::Path) -> DatabaseConnection {
    let mut options =
      ConnectOptions::new(format!("sqlite://{}?mode=rwc", path.display()));
    options.max_connections(8).sqlx_logging(false);

    let db = Database::connect(options).await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    db
  }

  pub struct Fixture {
    pub db: DatabaseConnection,
    pub store: ArtifactStore,
    pub notifier: Arc<dyn Notifier>,
    pub config: Config,
    pub owner: user::Model,
    pub project: project::Model,
    pub channel: release_channel::Model,
  }

  impl Fixture {
    pub async fn new() -> Self {
      Self::with_db(setup_test_db().await).await
    }

    pub async fn with_db(db: DatabaseConnection) -> Self {
      let (owner, _) = sv::User::new(&db).create("owner").await.unwrap();
      let project = sv::Project::new(&db)
        .create(sv::project::NewProject {
          owner_id: owner.id,
          name: "demo".into(),
          description: "Demo plugin".into(),
          repository_link: Some("https://git.example.com/demo".into()),
          wiki_link: None,
          stamp_version: true,
        })
        .await
        .unwrap();
      let channel = sv::Channel::new(&db)
        .create(
          project.id,
          sv::channel::NewChannel {
            name: "Dev".into(),
            supported_versions: "1.20-1.21".into(),
            dependencies: vec!["Vault".into()],
            file_naming: Some("$project-$release-$build.jar".into()),
          },
        )
        .await
        .unwrap();

      Self {
        db,
        store: ArtifactStore::new(Arc::new(MemoryStorage::new())),
        notifier: Arc::new(notify::Noop),
        config: Config::default(),
        owner,
        project,
        channel,
      }
    }

    pub fn upload(&self) -> sv::Upload<'_> {
      sv::Upload::new(&self.db, &self.store, &self.notifier, &self.config)
    }

    pub fn request(&self, jar: Vec<u8>) -> sv::upload::UploadRequest {
      sv::upload::UploadRequest {
        project: self.project.name.clone(),
        channel: self.channel.name.clone(),
        file_name: "demo.jar".into(),
        metadata: sv::upload::UploadMetadata::new(crate::checksum::digest(
          &jar,
        )),
        bytes: Bytes::from(jar),
      }
    }
  }
}
