use std::{env, path::PathBuf, str::FromStr};

use migration::{Migrator, MigratorTrait};
use sea_orm::Database;

use crate::{
  notify::{self, DiscordWebhook, Notifier},
  prelude::*,
  storage::{ArtifactStore, Backend, LocalStorage, MemoryStorage},
  sv,
};

/// `STORAGE_PATH` value that keeps artifacts in memory.
pub const MEMORY_STORAGE: &str = "memory";

#[derive(Debug, Clone)]
pub struct Config {
  pub database_url: String,
  pub port: u16,
  pub storage_path: String,
  /// Base of the download links handed out in build responses.
  pub public_url: String,
  pub admin_token: String,
  pub discord_webhook: Option<String>,
  pub max_upload_bytes: usize,
  pub allocation_attempts: u32,
  pub janitor_interval: Duration,
  /// Unreferenced blobs younger than this are left alone, they may belong
  /// to an upload that has not committed yet.
  pub janitor_grace: Duration,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      database_url: String::from("sqlite:pluginhost.db?mode=rwc"),
      port: 3000,
      storage_path: String::from("./artifacts"),
      public_url: String::from("http://localhost:3000"),
      admin_token: String::new(),
      discord_webhook: None,

      max_upload_bytes: 64 * 1024 * 1024,
      allocation_attempts: 5,
      janitor_interval: Duration::from_secs(6 * 3600),
      janitor_grace: Duration::from_secs(3600),
    }
  }
}

fn var(name: &str) -> Option<String> {
  env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse<T>(name: &str) -> anyhow::Result<Option<T>>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  var(name)
    .map(|raw| {
      raw
        .parse()
        .map_err(|err| anyhow::anyhow!("Invalid {name} `{raw}`: {err}"))
    })
    .transpose()
}

fn duration(name: &str) -> anyhow::Result<Option<Duration>> {
  var(name)
    .map(|raw| {
      humantime::parse_duration(&raw)
        .with_context(|| format!("Invalid {name} `{raw}`"))
    })
    .transpose()
}

impl Config {
  pub fn from_env() -> anyhow::Result<Self> {
    let default = Self::default();

    let admin_token = var("ADMIN_TOKEN").context("ADMIN_TOKEN not set")?;
    let max_upload_mb: Option<usize> = parse("MAX_UPLOAD_MB")?;

    Ok(Self {
      database_url: var("DATABASE_URL").unwrap_or(default.database_url),
      port: parse("PORT")?.unwrap_or(default.port),
      storage_path: var("STORAGE_PATH").unwrap_or(default.storage_path),
      public_url: var("PUBLIC_URL")
        .map(|url| url.trim_end_matches('/').to_string())
        .unwrap_or(default.public_url),
      admin_token,
      discord_webhook: var("DISCORD_WEBHOOK_URL"),
      max_upload_bytes: max_upload_mb
        .map(|mb| mb * 1024 * 1024)
        .unwrap_or(default.max_upload_bytes),
      allocation_attempts: parse("ALLOCATION_ATTEMPTS")?
        .unwrap_or(default.allocation_attempts),
      janitor_interval: duration("JANITOR_INTERVAL")?
        .unwrap_or(default.janitor_interval),
      janitor_grace: duration("JANITOR_GRACE")?
        .unwrap_or(default.janitor_grace),
    })
  }

  fn backend(&self) -> Arc<dyn Backend> {
    if self.storage_path == MEMORY_STORAGE {
      warn!("Artifacts are kept in memory and lost on restart");
      Arc::new(MemoryStorage::new())
    } else {
      Arc::new(LocalStorage::new(PathBuf::from(&self.storage_path)))
    }
  }

  fn notifier(&self) -> anyhow::Result<Arc<dyn Notifier>> {
    Ok(match &self.discord_webhook {
      Some(url) => Arc::new(DiscordWebhook::new(url)?),
      None => Arc::new(notify::Noop),
    })
  }
}

pub struct Services<'a> {
  pub user: sv::User<'a>,
  pub project: sv::Project<'a>,
  pub channel: sv::Channel<'a>,
  pub build: sv::Build<'a>,
  pub upload: sv::Upload<'a>,
}

pub struct AppState {
  pub db: DatabaseConnection,
  pub store: ArtifactStore,
  pub notifier: Arc<dyn Notifier>,
  pub config: Config,
}

impl AppState {
  pub async fn new(config: Config) -> anyhow::Result<Self> {
    info!("Connecting to database...");
    let db = Database::connect(&config.database_url)
      .await
      .context("Failed to connect to database")?;

    info!("Running migrations...");
    Migrator::up(&db, None).await.context("Failed to run migrations")?;

    let store = ArtifactStore::new(config.backend());
    let notifier = config.notifier()?;

    Ok(Self::with_parts(db, store, notifier, config))
  }

  pub fn with_parts(
    db: DatabaseConnection,
    store: ArtifactStore,
    notifier: Arc<dyn Notifier>,
    config: Config,
  ) -> Self {
    Self { db, store, notifier, config }
  }

  pub fn sv(&self) -> Services<'_> {
    Services {
      user: sv::User::new(&self.db),
      project: sv::Project::new(&self.db),
      channel: sv::Channel::new(&self.db),
      build: sv::Build::new(&self.db),
      upload: sv::Upload::new(
        &self.db,
        &self.store,
        &self.notifier,
        &self.config,
      ),
    }
  }
}
