use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::storage::{validate_store_name, CacheStorage, StorageError};
use crate::http::{RequestKey, Response};

type Store = HashMap<RequestKey, Response>;

/// In-process cache stores. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    stores: RwLock<HashMap<String, Store>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in a store, `None` if the store does not exist.
    pub async fn len(&self, store: &str) -> Option<usize> {
        self.stores.read().await.get(store).map(|s| s.len())
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut names: Vec<String> = self.stores.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn has(&self, store: &str) -> Result<bool, StorageError> {
        Ok(self.stores.read().await.contains_key(store))
    }

    async fn delete(&self, store: &str) -> Result<bool, StorageError> {
        Ok(self.stores.write().await.remove(store).is_some())
    }

    async fn get(&self, store: &str, key: &RequestKey) -> Result<Option<Response>, StorageError> {
        Ok(self
            .stores
            .read()
            .await
            .get(store)
            .and_then(|s| s.get(key))
            .cloned())
    }

    async fn put(&self, store: &str, key: RequestKey, response: Response) -> Result<(), StorageError> {
        validate_store_name(store)?;
        self.stores
            .write()
            .await
            .entry(store.to_string())
            .or_default()
            .insert(key, response);
        Ok(())
    }
}
