use std::sync::Arc;

use axum::{
  extract::FromRequestParts,
  http::{header, request::Parts},
};

use crate::{checksum, entity::user, prelude::*, state::AppState};

fn bearer(parts: &Parts) -> Option<&str> {
  parts
    .headers
    .get(header::AUTHORIZATION)?
    .to_str()
    .ok()?
    .strip_prefix("Bearer ")
    .map(str::trim)
    .filter(|token| !token.is_empty())
}

/// The user behind the request's api key.
pub struct Caller(pub user::Model);

impl FromRequestParts<Arc<AppState>> for Caller {
  type Rejection = Error;

  async fn from_request_parts(
    parts: &mut Parts,
    app: &Arc<AppState>,
  ) -> Result<Self> {
    let key = bearer(parts).ok_or(Error::Unauthorized)?;
    let user =
      app.sv().user.by_api_key(key).await?.ok_or(Error::Unauthorized)?;
    Ok(Self(user))
  }
}

/// Holder of the configured admin token.
pub struct Admin;

impl FromRequestParts<Arc<AppState>> for Admin {
  type Rejection = Error;

  async fn from_request_parts(
    parts: &mut Parts,
    app: &Arc<AppState>,
  ) -> Result<Self> {
    let token = bearer(parts).ok_or(Error::Unauthorized)?;
    let expected = &app.config.admin_token;

    // digests are compared so the timing says nothing about the token
    let matches = checksum::digest(token.as_bytes())
      == checksum::digest(expected.as_bytes());
    if expected.is_empty() || !matches {
      warn!("Rejected admin request to {}", parts.uri.path());
      return Err(Error::Forbidden);
    }
    Ok(Self)
  }
}
