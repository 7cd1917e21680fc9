//! In-memory content store used by tests and throwaway registries

use super::{public_key_id, ContentStore, StorageError};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// Content store holding every record in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<String, Vec<u8>>>,
    public_keys: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register armored key material for `owner` and `email`
    pub fn with_public_key(mut self, owner: &str, email: &str, armored: &str) -> Self {
        self.public_keys
            .insert(public_key_id(owner, email), armored.to_string());
        self
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn save(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.records
            .write()
            .await
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.records
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.records.write().await.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.records.read().await.keys().cloned().collect())
    }

    async fn public_key(&self, owner: &str, email: &str) -> Result<String, StorageError> {
        let id = public_key_id(owner, email);
        self.public_keys
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound(id))
    }

    async fn save_all(&self, records: &[(&str, &[u8])]) -> Result<(), StorageError> {
        let mut guard = self.records.write().await;
        for (key, data) in records {
            guard.insert(key.to_string(), data.to_vec());
        }
        Ok(())
    }

    async fn remove_all(&self, keys: &[&str]) -> Result<(), StorageError> {
        let mut guard = self.records.write().await;
        for key in keys {
            guard.remove(*key);
        }
        Ok(())
    }
}
