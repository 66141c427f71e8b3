pub mod build;
pub mod project;
pub mod release_channel;
pub mod user;

use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};

/// Ordered dependency names, stored as a json array.
#[derive(
  Clone,
  Debug,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  FromJsonQueryResult,
)]
pub struct Dependencies(pub Vec<String>);

impl From<Vec<String>> for Dependencies {
  fn from(names: Vec<String>) -> Self {
    Self(names)
  }
}
