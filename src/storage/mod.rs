//! Content store backends for package records and owner keys

use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod redb;

pub use memory::MemoryStore;
pub use redb::RedbStore;

/// Errors raised by content store backends
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] ::redb::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid public key {path}: {reason}")]
    InvalidKey { path: String, reason: String },

    #[error("Storage task failed: {0}")]
    Task(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

/// Byte-oriented key/value persistence for package records
///
/// `save_all` and `remove_all` apply their keys in the given order while
/// holding the store's write lock, so a concurrent `keys` scan never sees a
/// partially applied batch.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store `data` under `key`, replacing any previous value
    async fn save(&self, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Load the value stored under `key`
    async fn load(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Remove `key`; removing an absent key succeeds
    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Snapshot of every record key
    async fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Armored public key material registered for `owner` and `email`
    async fn public_key(&self, owner: &str, email: &str) -> Result<String, StorageError>;

    /// Store several records as one serialized write
    async fn save_all(&self, records: &[(&str, &[u8])]) -> Result<(), StorageError>;

    /// Remove several records as one serialized write
    async fn remove_all(&self, keys: &[&str]) -> Result<(), StorageError>;
}

/// Key under which an owner's public key is registered
pub(crate) fn public_key_id(owner: &str, email: &str) -> String {
    format!("{owner}/{email}")
}
