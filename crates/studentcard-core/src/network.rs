//! Access to the origin server.
//!
//! The controller only needs one operation from the network: turn a request
//! into a response or fail. Any HTTP status counts as a response; only
//! transport failures are errors.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use thiserror::Error;
use tracing::debug;

use crate::http::{Request, Response};

/// HTTP request timeout in seconds.
/// A hung request falls back to the cache after this long.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Network unavailable: {0}")]
    Offline(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout(e.to_string())
        } else if e.is_connect() {
            FetchError::Offline(e.to_string())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

/// Network access over `reqwest`.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpNetwork {
    client: Client,
}

impl HttpNetwork {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let mut headers = header::HeaderMap::new();
        for (name, value) in &request.headers {
            let name = header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| FetchError::Transport(e.to_string()))?;
            let value = header::HeaderValue::from_str(value)
                .map_err(|e| FetchError::Transport(e.to_string()))?;
            headers.append(name, value);
        }

        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(headers)
            .send()
            .await?;

        let status = response.status().as_u16();
        let response_headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response.bytes().await?.to_vec();

        debug!(url = %request.url, status = status, bytes = body.len(), "Network response");

        Ok(Response {
            status,
            headers: response_headers,
            body,
        })
    }
}
