//! New build announcements.
//!
//! Notifications are fire-and-forget: [`spawn`] detaches the delivery so an
//! unreachable webhook never slows down or fails an upload.

use async_trait::async_trait;
use reqwest::Client;

use crate::{prelude::*, sv::build::BuildResponse};

#[async_trait]
pub trait Notifier: Send + Sync {
  async fn build_published(&self, build: &BuildResponse) -> anyhow::Result<()>;
}

pub struct Noop;

#[async_trait]
impl Notifier for Noop {
  async fn build_published(&self, _: &BuildResponse) -> anyhow::Result<()> {
    Ok(())
  }
}

/// Posts an embed to a Discord webhook.
pub struct DiscordWebhook {
  client: Client,
  url: String,
}

impl DiscordWebhook {
  pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(10))
      .build()
      .context("Failed to build webhook client")?;
    Ok(Self { client, url: url.into() })
  }

  fn payload(build: &BuildResponse) -> json::Value {
    let mut description = format!(
      "**{} #{}** is available.\n[Download]({})",
      build.release_channel, build.build_id, build.file_download_url
    );
    if !build.release_notes.is_empty() {
      description.push_str("\n\n");
      description.push_str(&build.release_notes);
    }
    if let (Some(hash), Some(link)) = (&build.commit_hash, &build.commit_link) {
      description.push_str(&format!("\n\nCommit: [`{hash:.7}`]({link})"));
    }

    json::json!({
      "embeds": [{
        "title": format!("New build of {}", build.project_name),
        "description": description,
        "fields": [
          { "name": "Supported versions", "value": or_dash(&build.supported_versions), "inline": true },
          { "name": "Dependencies", "value": or_dash(&build.dependencies.join(", ")), "inline": true },
        ],
      }]
    })
  }
}

fn or_dash(value: &str) -> &str {
  if value.is_empty() { "-" } else { value }
}

#[async_trait]
impl Notifier for DiscordWebhook {
  async fn build_published(&self, build: &BuildResponse) -> anyhow::Result<()> {
    self
      .client
      .post(&self.url)
      .json(&Self::payload(build))
      .send()
      .await?
      .error_for_status()?;
    Ok(())
  }
}

/// Delivers in the background, failures are only logged.
pub fn spawn(notifier: Arc<dyn Notifier>, build: BuildResponse) {
  tokio::spawn(async move {
    if let Err(err) = notifier.build_published(&build).await {
      warn!(
        "Failed to announce {}/{} #{}: {err:#}",
        build.project_name, build.release_channel, build.build_id
      );
    }
  });
}
