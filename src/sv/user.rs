use uuid::Uuid;

use crate::{checksum, entity::user, prelude::*, sv::is_unique_violation};

pub struct User<'a> {
  db: &'a DatabaseConnection,
}

impl<'a> User<'a> {
  pub fn new(db: &'a DatabaseConnection) -> Self {
    Self { db }
  }

  /// Creates a user and returns it with its api key. Only the key's hash is
  /// stored, so this is the one chance to hand the key out.
  pub async fn create(&self, name: &str) -> Result<(user::Model, String)> {
    utils::validate_name(name)?;

    let key = format!("ph_{}", Uuid::new_v4().simple());
    let user = user::ActiveModel {
      id: sea_orm::NotSet,
      name: Set(name.to_string()),
      api_key_hash: Set(checksum::digest(key.as_bytes())),
      created_at: Set(Utc::now().naive_utc()),
    };

    match user.insert(self.db).await {
      Ok(user) => Ok((user, key)),
      Err(err) if is_unique_violation(&err) => Err(Error::UserExists),
      Err(err) => Err(err.into()),
    }
  }

  pub async fn by_id(&self, id: i32) -> Result<Option<user::Model>> {
    Ok(user::Entity::find_by_id(id).one(self.db).await?)
  }

  pub async fn by_api_key(&self, key: &str) -> Result<Option<user::Model>> {
    let user = user::Entity::find()
      .filter(user::Column::ApiKeyHash.eq(checksum::digest(key.as_bytes())))
      .one(self.db)
      .await?;
    Ok(user)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sv::testing::setup_test_db;

  #[tokio::test]
  async fn test_create_user() {
    let db = setup_test_db().await;
    let sv = User::new(&db);

    let (user, key) = sv.create("alice").await.unwrap();
    assert_eq!(user.name, "alice");
    assert_ne!(user.api_key_hash, key);

    let found = sv.by_api_key(&key).await.unwrap().unwrap();
    assert_eq!(found.id, user.id);
    assert!(sv.by_api_key("ph_wrong").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn test_duplicate_user() {
    let db = setup_test_db().await;
    let sv = User::new(&db);

    sv.create("alice").await.unwrap();
    assert!(matches!(sv.create("alice").await, Err(Error::UserExists)));
  }
}
