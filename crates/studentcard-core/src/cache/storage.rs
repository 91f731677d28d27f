use async_trait::async_trait;
use thiserror::Error;

use crate::http::{RequestKey, Response};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid cache store name: {0}")]
    InvalidName(String),

    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt cache store {store}: {source}")]
    Corrupt {
        store: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize cache store: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The platform's persistent cache primitive.
///
/// Implementations must tolerate concurrent independent calls; two writes to
/// the same key race and the last one wins.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Names of every store that currently exists.
    async fn keys(&self) -> Result<Vec<String>, StorageError>;

    async fn has(&self, store: &str) -> Result<bool, StorageError>;

    /// Delete a whole store. Returns whether it existed.
    async fn delete(&self, store: &str) -> Result<bool, StorageError>;

    async fn get(&self, store: &str, key: &RequestKey) -> Result<Option<Response>, StorageError>;

    /// Insert or overwrite an entry, creating the store if needed.
    async fn put(&self, store: &str, key: RequestKey, response: Response) -> Result<(), StorageError>;
}

/// Store names end up as file stems, so keep them to a portable alphabet.
pub(crate) fn validate_store_name(name: &str) -> Result<(), StorageError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidName(name.to_string()))
    }
}
