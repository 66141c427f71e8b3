pub mod janitor;
pub mod server;

use std::{sync::Arc, time::Duration};

use tokio::{task::JoinSet, time::sleep};
use tracing::{error, info, warn};

use crate::state::AppState;

const RESTART_DELAY: Duration = Duration::from_secs(5);
const MAX_RESTART_DELAY: Duration = Duration::from_secs(300);

/// A long running part of the host, restarted by [`App`] when it stops.
#[async_trait::async_trait]
pub trait Plugin: Send + Sync {
  fn name(&self) -> &'static str;

  async fn start(&self, app: Arc<AppState>) -> anyhow::Result<()>;
}

pub struct App {
  plugins: Vec<Arc<dyn Plugin>>,
}

impl App {
  pub fn new() -> Self {
    Self { plugins: Vec::new() }
  }

  pub fn register<P: Plugin + 'static>(mut self, plugin: P) -> Self {
    self.plugins.push(Arc::new(plugin));
    self
  }

  /// Starts every plugin under supervision. Dropping the returned set
  /// aborts them.
  pub fn run(self, app: Arc<AppState>) -> JoinSet<()> {
    let mut set = JoinSet::new();

    for plugin in self.plugins {
      set.spawn(supervise(plugin, app.clone()));
    }

    set
  }
}

async fn supervise(plugin: Arc<dyn Plugin>, app: Arc<AppState>) {
  let name = plugin.name();
  info!("Plugin `{name}` initialized");

  let mut delay = RESTART_DELAY;
  loop {
    let handle = tokio::spawn({
      let (plugin, app) = (plugin.clone(), app.clone());
      async move { plugin.start(app).await }
    });

    match handle.await {
      Ok(Ok(())) => {
        warn!("Plugin `{name}` stopped unexpectedly");
      }
      Ok(Err(err)) => {
        error!("Plugin `{name}` crashed: {err:#}");
      }
      Err(err) if err.is_cancelled() => {
        info!("Plugin `{name}` shut down");
        break;
      }
      Err(_) => {
        error!("Plugin `{name}` panicked");
      }
    }

    sleep(delay).await;
    delay = (delay * 2).min(MAX_RESTART_DELAY);
    info!("Restarting plugin `{name}`...");
  }
}
