use std::{io::Cursor, str::FromStr, sync::Arc};

use axum::{
  Json,
  body::Body,
  extract::{FromRequest, Multipart, Path, Query, Request, State},
  http::header,
  response::IntoResponse,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio_util::io::ReaderStream;

use super::auth::Caller;
use crate::{
  prelude::*,
  state::AppState,
  sv::{
    build::{BuildResponse, MAX_PER_PAGE, Resolved},
    upload::{JAR_CONTENT_TYPE, UploadMetadata, UploadRequest},
  },
};

const DEFAULT_PER_PAGE: u64 = 20;

#[derive(Debug, Serialize)]
pub struct Reply<T> {
  pub success: bool,
  pub message: String,
  pub data: T,
}

pub fn reply<T>(message: impl Into<String>, data: T) -> Json<Reply<T>> {
  Json(Reply { success: true, message: message.into(), data })
}

/// `Json` that reports malformed bodies with the api's error shape.
pub struct Payload<T>(pub T);

impl<T, S> FromRequest<S> for Payload<T>
where
  T: DeserializeOwned,
  S: Send + Sync,
{
  type Rejection = Error;

  async fn from_request(req: Request, state: &S) -> Result<Self> {
    let Json(value) = Json::<T>::from_request(req, state)
      .await
      .map_err(|err| Error::Validation(err.body_text()))?;
    Ok(Self(value))
  }
}

/// `latest` or a build number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
  Latest,
  Number(i32),
}

impl FromStr for Version {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    if s.eq_ignore_ascii_case("latest") {
      return Ok(Version::Latest);
    }
    match s.parse() {
      Ok(n) if n > 0 => Ok(Version::Number(n)),
      _ => Err(Error::Validation(format!(
        "`{s}` is not a build number, expected `latest` or a positive integer"
      ))),
    }
  }
}

async fn resolve(
  app: &AppState,
  project: &str,
  channel: &str,
  version: &str,
) -> Result<Resolved> {
  match version.parse()? {
    Version::Latest => app.sv().build.latest(project, channel).await,
    Version::Number(n) => app.sv().build.by_number(project, channel, n).await,
  }
}

fn response(app: &AppState, resolved: &Resolved) -> BuildResponse {
  BuildResponse::new(
    &resolved.project,
    &resolved.channel,
    &resolved.build,
    &app.config.public_url,
  )
}

pub async fn health() -> &'static str {
  "OK"
}

pub async fn upload(
  State(app): State<Arc<AppState>>,
  Caller(caller): Caller,
  Path((project, channel)): Path<(String, String)>,
  mut multipart: Multipart,
) -> Result<Json<Reply<BuildResponse>>> {
  let mut file: Option<(String, Bytes)> = None;
  let mut metadata: Option<String> = None;

  while let Some(field) = multipart
    .next_field()
    .await
    .map_err(|err| Error::Validation(err.body_text()))?
  {
    let name = field.name().map(str::to_string);
    match name.as_deref() {
      Some("file") => {
        let name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
          .bytes()
          .await
          .map_err(|err| Error::Validation(err.body_text()))?;
        file = Some((name, bytes));
      }
      Some("metadata") => {
        let text = field
          .text()
          .await
          .map_err(|err| Error::InvalidMetadata(err.body_text()))?;
        metadata = Some(text);
      }
      other => debug!("Ignoring multipart field {other:?}"),
    }
  }

  let (file_name, bytes) =
    file.ok_or_else(|| Error::Validation("missing `file` field".into()))?;
  let metadata = metadata
    .ok_or_else(|| Error::InvalidMetadata("missing `metadata` field".into()))?;

  let req = UploadRequest {
    project,
    channel,
    file_name,
    metadata: UploadMetadata::parse(&metadata)?,
    bytes,
  };
  let build = app.sv().upload.run(&caller, req).await?;

  Ok(reply(format!("Published build #{}", build.build_id), build))
}

pub async fn download(
  State(app): State<Arc<AppState>>,
  Path((project, channel, version)): Path<(String, String, String)>,
) -> Result<impl IntoResponse> {
  let resolved = resolve(&app, &project, &channel, &version).await?;

  let bytes = app
    .store
    .get(
      &resolved.project.name,
      &resolved.channel.name,
      &resolved.build.checksum,
    )
    .await?;

  let headers = [
    (header::CONTENT_TYPE, JAR_CONTENT_TYPE.to_string()),
    (
      header::CONTENT_DISPOSITION,
      format!("attachment; filename=\"{}\"", resolved.file_name()),
    ),
    (header::CONTENT_LENGTH, bytes.len().to_string()),
  ];
  let build_id = [("x-build-id", resolved.build.build_id.to_string())];

  let body = Body::from_stream(ReaderStream::new(Cursor::new(bytes)));
  Ok((headers, build_id, body))
}

pub async fn build(
  State(app): State<Arc<AppState>>,
  Path((project, channel, version)): Path<(String, String, String)>,
) -> Result<Json<Reply<BuildResponse>>> {
  let resolved = resolve(&app, &project, &channel, &version).await?;
  Ok(reply("Build found", response(&app, &resolved)))
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
  /// 1-based.
  pub page: Option<u64>,
  pub per_page: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildPage {
  pub builds: Vec<BuildResponse>,
  pub page: u64,
  pub per_page: u64,
  pub total: u64,
}

pub async fn channel_builds(
  State(app): State<Arc<AppState>>,
  Path((project, channel)): Path<(String, String)>,
  Query(query): Query<PageQuery>,
) -> Result<Json<Reply<BuildPage>>> {
  let page = query.page.unwrap_or(1).max(1);
  let per_page =
    query.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);

  let project = app.sv().project.by_name(&project).await?;
  let channel = app.sv().channel.by_name(project.id, &channel).await?;
  let (builds, total) = app
    .sv()
    .build
    .list_for_channel(project.id, channel.id, page - 1, per_page)
    .await?;

  let builds = builds
    .iter()
    .map(|build| {
      BuildResponse::new(&project, &channel, build, &app.config.public_url)
    })
    .collect();

  Ok(reply("Builds", BuildPage { builds, page, per_page, total }))
}

pub async fn project_builds(
  State(app): State<Arc<AppState>>,
  Path(project): Path<String>,
) -> Result<Json<Reply<json::Map<String, json::Value>>>> {
  let (project, grouped) = app.sv().build.list_for_project(&project).await?;

  let mut data = json::Map::new();
  for group in grouped {
    let builds: Vec<_> = group
      .builds
      .iter()
      .map(|build| {
        BuildResponse::new(
          &project,
          &group.channel,
          build,
          &app.config.public_url,
        )
      })
      .collect();
    let builds = json::to_value(builds)
      .map_err(|err| Error::Internal(format!("failed to encode builds: {err}")))?;
    data.insert(group.channel.name, builds);
  }

  Ok(reply("Builds by release channel", data))
}
