//! Plain HTTP value types exchanged between the page, the cache controller,
//! the cache stores and the network.
//!
//! These are owned values rather than live `reqwest` handles so a response can
//! be cloned into a store and returned to the caller at the same time.

use reqwest::{Method, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Message returned to the page when card data is neither reachable nor cached.
pub const OFFLINE_MESSAGE: &str =
    "You are offline and no cached copy of this card is available.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Only GET requests are read-only and eligible for interception.
    pub fn is_read_only(&self) -> bool {
        self.method == Method::GET
    }

    pub fn key(&self) -> RequestKey {
        RequestKey {
            method: self.method.as_str().to_string(),
            url: self.url.as_str().to_string(),
        }
    }
}

/// Identity of a cached request. Headers are deliberately not part of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(with = "body_base64")]
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// The 503 answer for card data that is neither reachable nor cached.
    pub fn offline() -> Self {
        let body = serde_json::json!({
            "error": "Offline",
            "message": OFFLINE_MESSAGE,
        });
        Self::new(503, body.to_string()).with_header("Content-Type", "application/json")
    }

    /// An empty 503, used where degrading silently is preferred over an error body.
    pub fn unavailable() -> Self {
        Self::new(503, Vec::new())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json_body<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Bodies are arbitrary bytes (icons, HTML, JSON), kept as base64 in JSON stores.
mod body_base64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_request_key_ignores_headers() {
        let plain = Request::get(url("https://cards.example/api/v1/cards/students/1/secure-card"));
        let mut authed = plain.clone();
        authed
            .headers
            .push(("Authorization".to_string(), "Bearer abc".to_string()));
        assert_eq!(plain.key(), authed.key());
        assert_eq!(plain.key().method, "GET");
    }

    #[test]
    fn test_only_get_is_read_only() {
        assert!(Request::get(url("https://cards.example/")).is_read_only());
        assert!(!Request::new(Method::POST, url("https://cards.example/")).is_read_only());
        assert!(!Request::new(Method::HEAD, url("https://cards.example/")).is_read_only());
    }

    #[test]
    fn test_offline_response_shape() {
        let response = Response::offline();
        assert_eq!(response.status, 503);
        assert_eq!(response.header("content-type"), Some("application/json"));
        let body: serde_json::Value = response.json_body().unwrap();
        assert_eq!(body["error"], "Offline");
        assert!(!body["message"].as_str().unwrap().is_empty());
    }

    #[test]
    fn test_is_success() {
        assert!(Response::new(200, "ok").is_success());
        assert!(Response::new(204, "").is_success());
        assert!(!Response::new(404, "").is_success());
        assert!(!Response::new(503, "").is_success());
    }

    #[test]
    fn test_binary_body_survives_json_storage() {
        let icon = Response::new(200, vec![0x89, b'P', b'N', b'G', 0x00, 0xff])
            .with_header("Content-Type", "image/png");
        let json = serde_json::to_string(&icon).unwrap();
        assert!(json.contains("\"body\":\""));
        let back: Response = serde_json::from_str(&json).unwrap();
        assert_eq!(back, icon);
    }
}
