//! Error types for the build host
//!
//! Every variant maps to a stable numeric code. The thousands digit is the
//! category clients branch on: 0 internal, 1xxx input validation, 2xxx auth,
//! 4xxx project, 5xxx release channel, 6xxx build.

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
};
use tracing::error;

use crate::{archive::ArchiveError, storage::StorageError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("Database error: {0}")]
  Database(#[from] sea_orm::DbErr),

  #[error("Storage error: {0}")]
  Storage(#[from] StorageError),

  #[error("Internal error: {0}")]
  Internal(String),

  #[error("{0}")]
  Validation(String),

  #[error("Invalid file type, expected a .jar archive")]
  InvalidFileType,

  #[error("Invalid metadata: {0}")]
  InvalidMetadata(String),

  #[error("Checksum mismatch: expected {expected}, got {actual}")]
  ChecksumMismatch { expected: String, actual: String },

  #[error("Invalid upload: {0}")]
  InvalidUpload(ArchiveError),

  #[error("Invalid name: {0}")]
  InvalidName(String),

  #[error("Authentication required")]
  Unauthorized,

  #[error("Permission denied")]
  Forbidden,

  #[error("User not found")]
  UserNotFound,

  #[error("User already exists")]
  UserExists,

  #[error("Project not found")]
  ProjectNotFound,

  #[error("Project already exists")]
  ProjectExists,

  #[error("Release channel not found")]
  ReleaseChannelNotFound,

  #[error("Release channel already exists")]
  ReleaseChannelExists,

  #[error("Build not found")]
  BuildNotFound,

  #[error("Build number already taken")]
  BuildConflict,
}

impl From<ArchiveError> for Error {
  fn from(err: ArchiveError) -> Self {
    match err {
      // writing into an in-memory buffer should never fail
      ArchiveError::Io(err) => {
        Error::Internal(format!("archive rewrite failed: {err}"))
      }
      err => Error::InvalidUpload(err),
    }
  }
}

impl Error {
  pub fn code(&self) -> u32 {
    match self {
      Error::Database(_) | Error::Storage(_) | Error::Internal(_) => 0,
      Error::Validation(_) => 1000,
      Error::InvalidFileType => 1001,
      Error::InvalidMetadata(_) => 1002,
      Error::ChecksumMismatch { .. } => 1003,
      Error::InvalidUpload(_) => 1004,
      Error::InvalidName(_) => 1005,
      Error::Unauthorized => 2000,
      Error::Forbidden => 2001,
      Error::UserNotFound => 2002,
      Error::UserExists => 2003,
      Error::ProjectNotFound => 4000,
      Error::ProjectExists => 4001,
      Error::ReleaseChannelNotFound => 5000,
      Error::ReleaseChannelExists => 5001,
      Error::BuildNotFound => 6000,
      Error::BuildConflict => 6001,
    }
  }

  pub fn status(&self) -> StatusCode {
    match self {
      Error::Database(_) | Error::Storage(_) | Error::Internal(_) => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
      Error::Validation(_)
      | Error::InvalidFileType
      | Error::InvalidMetadata(_)
      | Error::ChecksumMismatch { .. }
      | Error::InvalidUpload(_)
      | Error::InvalidName(_) => StatusCode::BAD_REQUEST,
      Error::Unauthorized => StatusCode::UNAUTHORIZED,
      Error::Forbidden => StatusCode::FORBIDDEN,
      Error::UserNotFound
      | Error::ProjectNotFound
      | Error::ReleaseChannelNotFound
      | Error::BuildNotFound => StatusCode::NOT_FOUND,
      Error::UserExists
      | Error::ProjectExists
      | Error::ReleaseChannelExists
      | Error::BuildConflict => StatusCode::CONFLICT,
    }
  }

  fn is_internal(&self) -> bool {
    self.code() == 0
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let message = if self.is_internal() {
      error!("Request failed: {self}");
      "Internal error".to_string()
    } else {
      self.to_string()
    };

    let body = json::json!({
      "success": false,
      "code": self.code(),
      "error": message,
    });

    (self.status(), axum::Json(body)).into_response()
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
