//! Provisioning endpoints, guarded by the admin token.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
};
use serde::{Deserialize, Serialize};

use super::{
  auth::Admin,
  handlers::{Payload, Reply, reply},
};
use crate::{
  entity::{project, release_channel, user},
  prelude::*,
  state::AppState,
  sv::{
    build::{BuildPatch, BuildResponse, BuildSelector},
    channel::NewChannel,
    project::NewProject,
  },
};

type Created<T> = (StatusCode, Json<Reply<T>>);

#[derive(Debug, Deserialize)]
pub struct CreateUser {
  pub name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
  pub id: i32,
  pub name: String,
  pub created_at: DateTime,
}

impl From<user::Model> for UserView {
  fn from(user: user::Model) -> Self {
    Self { id: user.id, name: user.name, created_at: user.created_at }
  }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedUser {
  pub user: UserView,
  /// Shown once, only its hash is kept.
  pub api_key: String,
}

pub async fn create_user(
  _: Admin,
  State(app): State<Arc<AppState>>,
  Payload(req): Payload<CreateUser>,
) -> Result<Created<CreatedUser>> {
  let (user, api_key) = app.sv().user.create(&req.name).await?;
  info!("Created user `{}`", user.name);

  let data = CreatedUser { user: user.into(), api_key };
  Ok((StatusCode::CREATED, reply("User created", data)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProject {
  pub owner_id: i32,
  pub name: String,
  #[serde(default)]
  pub description: String,
  pub repository_link: Option<String>,
  pub wiki_link: Option<String>,
  pub stamp_version: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectView {
  pub id: i32,
  pub owner_id: i32,
  pub name: String,
  pub description: String,
  pub repository_link: Option<String>,
  pub wiki_link: Option<String>,
  pub default_release_channel: Option<i32>,
  pub stamp_version: bool,
  pub created_at: DateTime,
}

impl From<project::Model> for ProjectView {
  fn from(project: project::Model) -> Self {
    Self {
      id: project.id,
      owner_id: project.owner_id,
      name: project.name,
      description: project.description,
      repository_link: project.repository_link,
      wiki_link: project.wiki_link,
      default_release_channel: project.default_release_channel,
      stamp_version: project.stamp_version,
      created_at: project.created_at,
    }
  }
}

pub async fn create_project(
  _: Admin,
  State(app): State<Arc<AppState>>,
  Payload(req): Payload<CreateProject>,
) -> Result<Created<ProjectView>> {
  let project = app
    .sv()
    .project
    .create(NewProject {
      owner_id: req.owner_id,
      name: req.name,
      description: req.description,
      repository_link: req.repository_link.filter(|link| !link.is_empty()),
      wiki_link: req.wiki_link.filter(|link| !link.is_empty()),
      stamp_version: req.stamp_version.unwrap_or(true),
    })
    .await?;
  info!("Created project `{}` for user #{}", project.name, project.owner_id);

  Ok((StatusCode::CREATED, reply("Project created", project.into())))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChannel {
  pub name: String,
  #[serde(default)]
  pub supported_versions: String,
  #[serde(default)]
  pub dependencies: Vec<String>,
  pub file_naming: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelView {
  pub id: i32,
  pub project_id: i32,
  pub name: String,
  pub supported_versions: String,
  pub dependencies: Vec<String>,
  pub file_naming: String,
  pub created_at: DateTime,
}

impl From<release_channel::Model> for ChannelView {
  fn from(channel: release_channel::Model) -> Self {
    Self {
      id: channel.id,
      project_id: channel.project_id,
      name: channel.name,
      supported_versions: channel.supported_versions,
      dependencies: channel.dependencies.0,
      file_naming: channel.file_naming,
      created_at: channel.created_at,
    }
  }
}

pub async fn create_channel(
  _: Admin,
  State(app): State<Arc<AppState>>,
  Path(project): Path<String>,
  Payload(req): Payload<CreateChannel>,
) -> Result<Created<ChannelView>> {
  let project = app.sv().project.by_name(&project).await?;
  let channel = app
    .sv()
    .channel
    .create(project.id, NewChannel {
      name: req.name,
      supported_versions: req.supported_versions,
      dependencies: req.dependencies,
      file_naming: req.file_naming,
    })
    .await?;
  info!("Created release channel `{}/{}`", project.name, channel.name);

  Ok((StatusCode::CREATED, reply("Release channel created", channel.into())))
}

/// Rewrites a build's number and/or content hash in place. Used when
/// importing history from another host; uploads never come through here.
pub async fn rewrite_build(
  _: Admin,
  State(app): State<Arc<AppState>>,
  Path((project, channel, number)): Path<(String, String, i32)>,
  Payload(patch): Payload<RewritePatch>,
) -> Result<Json<Reply<BuildResponse>>> {
  let selector = BuildSelector { project, channel, build_id: number };
  let patch = BuildPatch { build_id: patch.build_id, checksum: patch.checksum };

  let resolved = app.sv().build.admin_rewrite(selector, patch).await?;
  let response = BuildResponse::new(
    &resolved.project,
    &resolved.channel,
    &resolved.build,
    &app.config.public_url,
  );

  Ok(reply("Build rewritten", response))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewritePatch {
  pub build_id: Option<i32>,
  pub checksum: Option<String>,
}
