use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::storage::{validate_store_name, CacheStorage, StorageError};
use crate::http::{RequestKey, Response};

/// Extension of store documents inside the cache directory.
const STORE_EXTENSION: &str = "json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedEntry {
    pub request: RequestKey,
    pub response: Response,
    /// Informational only; entries never expire individually.
    pub cached_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    entries: Vec<CachedEntry>,
}

/// Cache stores persisted as `<cache_dir>/<store>.json`.
///
/// Writes are serialized through a single lock so read-modify-write cycles
/// never interleave; concurrent puts to the same key resolve last-write-wins.
pub struct DiskStorage {
    cache_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl DiskStorage {
    pub fn new(cache_dir: PathBuf) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Self {
            cache_dir,
            write_lock: Mutex::new(()),
        })
    }

    fn store_path(&self, store: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.{}", store, STORE_EXTENSION))
    }

    async fn load(&self, store: &str) -> Result<Option<StoreDocument>, StorageError> {
        let path = self.store_path(store);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let document = serde_json::from_str(&contents).map_err(|source| StorageError::Corrupt {
            store: store.to_string(),
            source,
        })?;
        Ok(Some(document))
    }

    async fn save(&self, store: &str, document: &StoreDocument) -> Result<(), StorageError> {
        let contents = serde_json::to_string_pretty(document)?;
        // Write then rename so a crash never leaves a half-written store behind.
        let tmp = self.cache_dir.join(format!(".{}.tmp", store));
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, self.store_path(store)).await?;
        Ok(())
    }

    /// All entries of a store with their write timestamps.
    pub async fn entries(&self, store: &str) -> Result<Vec<CachedEntry>, StorageError> {
        validate_store_name(store)?;
        Ok(self.load(store).await?.map(|d| d.entries).unwrap_or_default())
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.cache_dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(STORE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_store_name(stem).is_ok() {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn has(&self, store: &str) -> Result<bool, StorageError> {
        if validate_store_name(store).is_err() {
            return Ok(false);
        }
        Ok(tokio::fs::try_exists(self.store_path(store)).await?)
    }

    async fn delete(&self, store: &str) -> Result<bool, StorageError> {
        validate_store_name(store)?;
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(self.store_path(store)).await {
            Ok(()) => {
                debug!(store = store, "Deleted cache store");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, store: &str, key: &RequestKey) -> Result<Option<Response>, StorageError> {
        validate_store_name(store)?;
        let Some(document) = self.load(store).await? else {
            return Ok(None);
        };
        Ok(document
            .entries
            .into_iter()
            .find(|e| &e.request == key)
            .map(|e| e.response))
    }

    async fn put(&self, store: &str, key: RequestKey, response: Response) -> Result<(), StorageError> {
        validate_store_name(store)?;
        let _guard = self.write_lock.lock().await;

        let document = self.load(store).await?.unwrap_or_default();
        let mut entries: BTreeMap<RequestKey, CachedEntry> = document
            .entries
            .into_iter()
            .map(|e| (e.request.clone(), e))
            .collect();
        entries.insert(
            key.clone(),
            CachedEntry {
                request: key,
                response,
                cached_at: Utc::now(),
            },
        );

        let document = StoreDocument {
            entries: entries.into_values().collect(),
        };
        self.save(store, &document).await
    }
}

// ============================================================================
// Tests
// ============================================================================
