pub mod post_repository;
pub mod user_repository;

use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("failed to encode record: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("failed to decode record: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    #[error("corrupt index entry: {0}")]
    CorruptIndex(String),
    #[error("username already exists")]
    UsernameTaken,
}

#[derive(Clone)]
pub struct Database {
    pub db: Arc<sled::Db>,
}

impl Database {
    pub fn new(path: &str) -> Result<Self, DbError> {
        let db = sled::open(path)?;
        Ok(Database { db: Arc::new(db) })
    }

    /// Throwaway store removed when the last handle drops.
    #[allow(dead_code)]
    pub fn in_memory() -> Result<Self, DbError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Database { db: Arc::new(db) })
    }

    pub fn tree(&self, name: &str) -> Result<sled::Tree, DbError> {
        Ok(self.db.open_tree(name)?)
    }

    /// Liveness check for the health endpoint.
    pub fn ping(&self) -> bool {
        self.db.open_tree("__health").is_ok()
    }
}
