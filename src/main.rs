//! Plugin build host
//!
//! Architecture:
//! - SeaORM for build records (SQLite)
//! - Axum for the upload, download and admin API
//! - Content-addressed artifact storage on disk
//! - Tokio plugins supervised by [`plugins::App`]

extern crate serde_json as json;

mod archive;
mod checksum;
mod entity;
mod error;
mod notify;
mod plugins;
mod prelude;
mod state;
mod storage;
mod sv;
mod utils;

use tracing_subscriber::{
  EnvFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::{
  plugins::App,
  prelude::*,
  state::{AppState, Config},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  dotenvy::dotenv().ok();

  tracing_subscriber::registry()
    .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
      "pluginhost=debug,tower_http=debug,sea_orm=warn".into()
    }))
    .with(tracing_subscriber::fmt::layer())
    .init();

  let config = Config::from_env()?;
  info!("Starting plugin build host v{}", env!("CARGO_PKG_VERSION"));

  let app = Arc::new(AppState::new(config).await?);

  let plugins = App::new()
    .register(plugins::server::Plugin)
    .register(plugins::janitor::Plugin)
    .run(app);

  tokio::signal::ctrl_c().await.context("Failed to listen for shutdown")?;
  info!("Shutting down");
  drop(plugins);
  Ok(())
}
