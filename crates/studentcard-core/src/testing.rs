//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Url;

use crate::cache::{CacheStorage, MemoryStorage, StorageError};
use crate::http::{Request, RequestKey, Response};
use crate::network::{FetchError, Network};

pub const ORIGIN: &str = "https://cards.example";

pub fn get(path: &str) -> Request {
    Request::get(Url::parse(&format!("{}{}", ORIGIN, path)).unwrap())
}

/// A network that answers by URL path and can be switched off.
/// Unknown paths answer 404.
pub struct FakeNetwork {
    online: AtomicBool,
    routes: Mutex<HashMap<String, Response>>,
    calls: Mutex<Vec<String>>,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
            routes: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn serve(&self, path: &str, response: Response) {
        self.routes.lock().unwrap().insert(path.to_string(), response);
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|p| *p == path).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let path = request.url.path().to_string();
        self.calls.lock().unwrap().push(path.clone());

        if !self.online.load(Ordering::SeqCst) {
            return Err(FetchError::Offline("network disconnected".to_string()));
        }

        let routes = self.routes.lock().unwrap();
        Ok(routes
            .get(&path)
            .cloned()
            .unwrap_or_else(|| Response::new(404, "not found")))
    }
}

/// In-memory storage whose writes fail for one URL path.
pub struct FailingWrites {
    inner: MemoryStorage,
    path: String,
}

impl FailingWrites {
    pub fn new(path: &str) -> Self {
        Self {
            inner: MemoryStorage::new(),
            path: path.to_string(),
        }
    }
}

#[async_trait]
impl CacheStorage for FailingWrites {
    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.inner.keys().await
    }

    async fn has(&self, store: &str) -> Result<bool, StorageError> {
        self.inner.has(store).await
    }

    async fn delete(&self, store: &str) -> Result<bool, StorageError> {
        self.inner.delete(store).await
    }

    async fn get(&self, store: &str, key: &RequestKey) -> Result<Option<Response>, StorageError> {
        self.inner.get(store, key).await
    }

    async fn put(&self, store: &str, key: RequestKey, response: Response) -> Result<(), StorageError> {
        let path = Url::parse(&key.url).map(|u| u.path().to_string()).unwrap_or_default();
        if path == self.path {
            return Err(StorageError::Io(std::io::Error::other("disk full")));
        }
        self.inner.put(store, key, response).await
    }
}
