use crate::db::{Database, DbError};
use crate::models::user::User;
use bincode::{Decode, Encode};
use std::str;
use tracing::info;

const USERS_TREE: &str = "users";
const USERNAME_INDEX_TREE: &str = "username_index";

#[derive(Debug, Encode, Decode)]
pub struct StoredUser {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub created_at: i64, // Store as timestamp
}

impl From<&User> for StoredUser {
    fn from(user: &User) -> Self {
        StoredUser {
            id: user.id.clone(),
            username: user.username.clone(),
            password_hash: user.password_hash.clone(),
            created_at: user.created_at.timestamp(),
        }
    }
}

impl From<StoredUser> for User {
    fn from(stored: StoredUser) -> Self {
        User {
            id: stored.id,
            username: stored.username,
            password_hash: stored.password_hash,
            created_at: chrono::DateTime::from_timestamp(stored.created_at, 0)
                .unwrap_or_else(chrono::Utc::now),
        }
    }
}

pub struct UserRepository {
    db: Database,
}

impl UserRepository {
    pub fn new(db: Database) -> Self {
        UserRepository { db }
    }

    /// Inserts a user, failing with `UsernameTaken` if the name is already claimed.
    pub async fn create(&self, user: User) -> Result<User, DbError> {
        let users_tree = self.db.tree(USERS_TREE)?;
        let username_index = self.db.tree(USERNAME_INDEX_TREE)?;

        // Claim the username atomically; a concurrent registration loses here
        let claimed = username_index.compare_and_swap(
            user.username.as_bytes(),
            None::<&[u8]>,
            Some(user.id.as_bytes()),
        )?;
        if claimed.is_err() {
            return Err(DbError::UsernameTaken);
        }

        let encoded = bincode::encode_to_vec(StoredUser::from(&user), bincode::config::standard())?;

        if let Err(e) = users_tree.insert(user.id.as_bytes(), encoded) {
            username_index.remove(user.username.as_bytes())?;
            return Err(e.into());
        }

        info!(user_id = %user.id, username = %user.username, "User created in database");

        Ok(user)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<User>, DbError> {
        let users_tree = self.db.tree(USERS_TREE)?;

        match users_tree.get(id.as_bytes())? {
            Some(data) => {
                let (stored_user, _): (StoredUser, usize) =
                    bincode::decode_from_slice(&data, bincode::config::standard())?;
                Ok(Some(User::from(stored_user)))
            }
            None => Ok(None),
        }
    }

    /// Looks up a user including the password hash, for credential checks.
    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, DbError> {
        let username_index = self.db.tree(USERNAME_INDEX_TREE)?;

        match username_index.get(username.as_bytes())? {
            Some(user_id) => {
                let id = str::from_utf8(&user_id)
                    .map_err(|e| DbError::CorruptIndex(e.to_string()))?;
                self.get_by_id(id).await
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn create_test_user(username: &str) -> User {
        User {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
            password_hash: "hashed_password".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let db = Database::in_memory().unwrap();
        let repo = UserRepository::new(db);
        let user = create_test_user("testuser");

        let created = repo.create(user.clone()).await.unwrap();
        assert_eq!(created.id, user.id);

        let retrieved = repo.get_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(retrieved.username, user.username);
        assert_eq!(retrieved.password_hash, "hashed_password");
        assert_eq!(retrieved.created_at.timestamp(), user.created_at.timestamp());
    }

    #[tokio::test]
    async fn test_get_by_username() {
        let db = Database::in_memory().unwrap();
        let repo = UserRepository::new(db);
        let user = create_test_user("lookup");

        repo.create(user.clone()).await.unwrap();

        let retrieved = repo.get_by_username("lookup").await.unwrap().unwrap();
        assert_eq!(retrieved.id, user.id);
        assert!(repo.get_by_username("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username() {
        let db = Database::in_memory().unwrap();
        let repo = UserRepository::new(db);
        let user1 = create_test_user("taken");

        repo.create(user1.clone()).await.unwrap();

        let user2 = create_test_user("taken");
        let result = repo.create(user2.clone()).await;
        assert!(matches!(result, Err(DbError::UsernameTaken)));

        // the loser's record was never written
        assert!(repo.get_by_id(&user2.id).await.unwrap().is_none());
        let owner = repo.get_by_username("taken").await.unwrap().unwrap();
        assert_eq!(owner.id, user1.id);
    }

    #[tokio::test]
    async fn test_missing_id_is_none() {
        let db = Database::in_memory().unwrap();
        let repo = UserRepository::new(db);
        assert!(repo.get_by_id("missing").await.unwrap().is_none());
    }
}
