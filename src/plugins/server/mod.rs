mod admin;
mod auth;
mod handlers;

use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use axum::{
  Router,
  extract::DefaultBodyLimit,
  routing::{get, post},
};
use tower::ServiceBuilder;
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::{
  cors::{Any, CorsLayer},
  trace::TraceLayer,
};

use crate::{prelude::*, state::AppState};

pub struct Plugin;

#[async_trait]
impl super::Plugin for Plugin {
  fn name(&self) -> &'static str {
    "server"
  }

  async fn start(&self, app: Arc<AppState>) -> anyhow::Result<()> {
    let governor_conf = Arc::new(
      GovernorConfigBuilder::default()
        .per_second(2)
        .burst_size(100)
        .finish()
        .context("Failed to build rate limiter config")?,
    );

    let limiter = governor_conf.limiter().clone();

    let addr = SocketAddr::from(([0, 0, 0, 0], app.config.port));
    let router = router(app)
      .layer(GovernorLayer::new(governor_conf))
      .into_make_service_with_connect_info::<SocketAddr>();

    let listener = tokio::net::TcpListener::bind(addr)
      .await
      .with_context(|| format!("Failed to bind {addr}"))?;
    info!("HTTP Server listening on {addr}");

    let limiter = async {
      loop {
        time::sleep(Duration::from_secs(60)).await;
        limiter.retain_recent();
      }
    };

    let server = async {
      axum::serve(listener, router).await.context("Axum server error")
    };

    tokio::select! {
      result = server => {
        match &result {
          Ok(_) => info!("Server stopped gracefully"),
          Err(err) => error!("Server stopped with error: {err}"),
        }
        result
      }
      _ = limiter => {
        error!("Rate limiter cleaner stopped unexpectedly!");
        Ok(())
      }
    }
  }
}

/// The api without rate limiting, which needs the peer address.
pub fn router(app: Arc<AppState>) -> Router {
  let releases = "/projects/{project}/releases/{channel}";

  let api = Router::new()
    .route("/health", get(handlers::health))
    .route(&format!("{releases}/upload"), post(handlers::upload))
    .route(&format!("{releases}/download/{{version}}"), get(handlers::download))
    .route(&format!("{releases}/builds"), get(handlers::channel_builds))
    .route(&format!("{releases}/builds/{{version}}"), get(handlers::build))
    .route("/projects/{project}/builds", get(handlers::project_builds))
    .route("/admin/users", post(admin::create_user))
    .route("/admin/projects", post(admin::create_project))
    .route("/admin/projects/{project}/releases", post(admin::create_channel))
    .route(
      &format!("/admin{releases}/builds/{{number}}/rewrite"),
      post(admin::rewrite_build),
    );

  Router::new()
    .nest("/api/v1", api)
    .layer(
      ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(
          CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
        )
        .layer(DefaultBodyLimit::max(app.config.max_upload_bytes)),
    )
    .with_state(app)
}

#[cfg(test)]
mod tests {
  use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
  };
  use tower::ServiceExt;

  use super::*;
  use crate::{
    archive::tests::plugin_jar,
    checksum, notify,
    state::Config,
    storage::{ArtifactStore, MemoryStorage},
    sv::testing::setup_test_db,
  };

  const ADMIN: &str = "Bearer admin-secret";
  const BOUNDARY: &str = "pluginhost-test-boundary";

  async fn app() -> Router {
    let config = Config {
      admin_token: "admin-secret".into(),
      public_url: "https://builds.example.com".into(),
      ..Default::default()
    };
    let state = AppState::with_parts(
      setup_test_db().await,
      ArtifactStore::new(Arc::new(MemoryStorage::new())),
      Arc::new(notify::Noop),
      config,
    );
    router(Arc::new(state))
  }

  async fn send(
    router: &Router,
    req: Request<Body>,
  ) -> (StatusCode, json::Value) {
    let res = router.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    (status, json::from_slice(&body).unwrap_or(json::Value::Null))
  }

  fn post_json(uri: &str, auth: &str, body: json::Value) -> Request<Body> {
    Request::post(uri)
      .header(header::AUTHORIZATION, auth)
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(body.to_string()))
      .unwrap()
  }

  fn multipart(file_name: &str, jar: &[u8], metadata: &str) -> Body {
    let mut body = Vec::new();
    body.extend_from_slice(
      format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"metadata\"\
         \r\n\r\n{metadata}\r\n--{BOUNDARY}\r\nContent-Disposition: \
         form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: \
         application/java-archive\r\n\r\n"
      )
      .as_bytes(),
    );
    body.extend_from_slice(jar);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    Body::from(body)
  }

  fn upload(
    key: &str,
    file_name: &str,
    jar: &[u8],
    metadata: &str,
  ) -> Request<Body> {
    Request::post("/api/v1/projects/demo/releases/Dev/upload")
      .header(header::AUTHORIZATION, format!("Bearer {key}"))
      .header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={BOUNDARY}"),
      )
      .body(multipart(file_name, jar, metadata))
      .unwrap()
  }

  /// Creates user `owner`, project `demo` and channel `Dev`, returns the
  /// owner's api key.
  async fn seed(router: &Router) -> String {
    let (status, body) = send(
      router,
      post_json("/api/v1/admin/users", ADMIN, json::json!({ "name": "owner" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let key = body["data"]["apiKey"].as_str().unwrap().to_string();
    let owner_id = body["data"]["user"]["id"].clone();

    let (status, _) = send(
      router,
      post_json(
        "/api/v1/admin/projects",
        ADMIN,
        json::json!({ "ownerId": owner_id, "name": "demo" }),
      ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
      router,
      post_json(
        "/api/v1/admin/projects/demo/releases",
        ADMIN,
        json::json!({
          "name": "Dev",
          "supportedVersions": "1.21",
          "fileNaming": "$project-$release-$build.jar",
        }),
      ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["fileNaming"], "$project-$release-$build.jar");

    key
  }

  fn metadata(jar: &[u8]) -> String {
    json::json!({ "checksum": checksum::digest(jar), "release_notes": "Fixes" })
      .to_string()
  }

  #[tokio::test]
  async fn test_health() {
    let router = app().await;
    let res = router
      .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
  }

  #[tokio::test]
  async fn test_upload_and_download() {
    let router = app().await;
    let key = seed(&router).await;

    let jar = plugin_jar("1.0");
    let (status, body) =
      send(&router, upload(&key, "demo.jar", &jar, &metadata(&jar))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["buildId"], 1);
    assert_eq!(body["data"]["releaseNotes"], "Fixes");
    assert_eq!(
      body["data"]["fileDownloadUrl"],
      "https://builds.example.com/api/v1/projects/demo/releases/Dev/download/1"
    );
    let stored_hash = body["data"]["checksum"].as_str().unwrap().to_string();

    let (_, body) =
      send(&router, upload(&key, "demo.jar", &jar, &metadata(&jar))).await;
    assert_eq!(body["data"]["buildId"], 2);

    let res = router
      .clone()
      .oneshot(
        Request::get("/api/v1/projects/demo/releases/dev/download/1")
          .body(Body::empty())
          .unwrap(),
      )
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::CONTENT_TYPE], "application/java-archive");
    assert_eq!(
      res.headers()[header::CONTENT_DISPOSITION],
      "attachment; filename=\"demo-Dev-1.jar\""
    );
    assert_eq!(res.headers()["x-build-id"], "1");
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert_eq!(checksum::digest(&bytes), stored_hash);

    let res = router
      .clone()
      .oneshot(
        Request::get("/api/v1/projects/demo/releases/Dev/download/latest")
          .body(Body::empty())
          .unwrap(),
      )
      .await
      .unwrap();
    assert_eq!(res.headers()["x-build-id"], "2");
  }

  #[tokio::test]
  async fn test_upload_errors() {
    let router = app().await;
    let key = seed(&router).await;
    let jar = plugin_jar("1.0");

    let (status, body) =
      send(&router, upload("nope", "demo.jar", &jar, &metadata(&jar))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 2000);

    let (status, body) =
      send(&router, upload(&key, "demo.zip", &jar, &metadata(&jar))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 1001);

    let (_, body) =
      send(&router, upload(&key, "demo.jar", &jar, "{\"checksum\":1}")).await;
    assert_eq!(body["code"], 1002);

    let wrong = metadata(b"other bytes");
    let (status, body) =
      send(&router, upload(&key, "demo.jar", &jar, &wrong)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 1003);
    assert_eq!(body["success"], false);
  }

  #[tokio::test]
  async fn test_lookup_errors() {
    let router = app().await;
    seed(&router).await;

    let get = |uri: &str| Request::get(uri).body(Body::empty()).unwrap();

    let (status, body) =
      send(&router, get("/api/v1/projects/demo/releases/Dev/builds/99")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 6000);

    // unknown channel: latest says so, a number lookup does not
    let (_, body) =
      send(&router, get("/api/v1/projects/demo/releases/Nope/builds/latest"))
        .await;
    assert_eq!(body["code"], 5000);
    let (_, body) =
      send(&router, get("/api/v1/projects/demo/releases/Nope/builds/1")).await;
    assert_eq!(body["code"], 6000);

    let (_, body) =
      send(&router, get("/api/v1/projects/nope/releases/Dev/builds/1")).await;
    assert_eq!(body["code"], 4000);

    let (status, body) =
      send(&router, get("/api/v1/projects/demo/releases/Dev/builds/first"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 1000);
  }

  #[tokio::test]
  async fn test_listings() {
    let router = app().await;
    let key = seed(&router).await;
    for version in ["1", "2", "3"] {
      let jar = plugin_jar(version);
      send(&router, upload(&key, "demo.jar", &jar, &metadata(&jar))).await;
    }

    let (status, body) = send(
      &router,
      Request::get("/api/v1/projects/demo/releases/Dev/builds?page=1&per_page=2")
        .body(Body::empty())
        .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 3);
    let ids: Vec<_> = body["data"]["builds"]
      .as_array()
      .unwrap()
      .iter()
      .map(|b| b["buildId"].as_i64().unwrap())
      .collect();
    assert_eq!(ids, [3, 2]);

    let (status, body) = send(
      &router,
      Request::get(format!(
        "/api/v1/projects/demo/releases/Dev/builds?page={}",
        u64::MAX
      ))
      .body(Body::empty())
      .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 1000);

    let (_, body) = send(
      &router,
      Request::get("/api/v1/projects/demo/builds").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(body["data"]["Dev"].as_array().unwrap().len(), 3);
  }

  #[tokio::test]
  async fn test_admin_requires_token() {
    let router = app().await;

    let (status, body) = send(
      &router,
      post_json("/api/v1/admin/users", "Bearer wrong", json::json!({
        "name": "someone"
      })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], 2001);

    let near_misses =
      ["Bearer admin-secre", "Bearer admin-secret2", "Bearer ADMIN-SECRET"];
    for near in near_misses {
      let (status, _) = send(
        &router,
        post_json("/api/v1/admin/users", near, json::json!({ "name": "x" })),
      )
      .await;
      assert_eq!(status, StatusCode::FORBIDDEN, "{near}");
    }

    let req = Request::post("/api/v1/admin/users")
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from("{\"name\":\"someone\"}"))
      .unwrap();
    let (status, _) = send(&router, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn test_admin_rewrite() {
    let router = app().await;
    let key = seed(&router).await;
    let jar = plugin_jar("1");
    send(&router, upload(&key, "demo.jar", &jar, &metadata(&jar))).await;

    let (status, body) = send(
      &router,
      post_json(
        "/api/v1/admin/projects/demo/releases/Dev/builds/1/rewrite",
        ADMIN,
        json::json!({ "buildId": 7 }),
      ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["buildId"], 7);

    let (status, body) = send(
      &router,
      Request::get("/api/v1/projects/demo/releases/Dev/builds/latest")
        .body(Body::empty())
        .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["buildId"], 7);
  }
}
