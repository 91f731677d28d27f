//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! where the card viewer and backend live, which controller version is
//! deployed, and the last used login.
//!
//! Configuration is stored at `~/.config/studentcard/config.json`.
//! `STUDENTCARD_ORIGIN` and `STUDENTCARD_API_BASE` override the stored hosts.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::api::{endpoint_url, STUDENT_CARDS_PATH};
use crate::controller::ControllerConfig;
use crate::network::DEFAULT_FETCH_TIMEOUT_SECS;

/// Application name used for config/cache directory paths and store names
pub const APP_NAME: &str = "studentcard";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Subdirectory of the cache directory holding the cache stores
const STORES_DIR: &str = "stores";

pub const ORIGIN_ENV: &str = "STUDENTCARD_ORIGIN";
pub const API_BASE_ENV: &str = "STUDENTCARD_API_BASE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host serving the card pages, manifests and static assets.
    pub origin: String,
    /// Host of the REST backend.
    pub api_base: String,
    /// Controller version tag; bump to invalidate every cached store.
    pub version: String,
    /// Overrides the default precache list when set.
    pub static_assets: Option<Vec<String>>,
    pub fetch_timeout_secs: u64,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let controller = ControllerConfig::default();
        Self {
            origin: controller.origin,
            api_base: "http://localhost:8000".to_string(),
            version: controller.version,
            static_assets: None,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            last_email: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply environment overrides; empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(origin) = non_empty(ORIGIN_ENV) {
            self.origin = origin;
        }
        if let Some(api_base) = non_empty(API_BASE_ENV) {
            self.api_base = api_base;
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Directory of the cache stores. Kept apart from the session file, since
    /// activation deletes every store it does not recognize.
    pub fn stores_dir(&self) -> Result<PathBuf> {
        Ok(self.cache_dir()?.join(STORES_DIR))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn controller_config(&self) -> ControllerConfig {
        let defaults = ControllerConfig::default();
        ControllerConfig {
            app_name: APP_NAME.to_string(),
            version: self.version.clone(),
            origin: self.origin.clone(),
            static_assets: self
                .static_assets
                .clone()
                .unwrap_or_else(|| defaults.static_assets.clone()),
            api_card_prefix: self
                .card_data_prefix()
                .unwrap_or_else(|| defaults.api_card_prefix.clone()),
            ..defaults
        }
    }

    /// Path under which card data is served, including any path prefix of
    /// `api_base`.
    fn card_data_prefix(&self) -> Option<String> {
        let url = Url::parse(&endpoint_url(&self.api_base, STUDENT_CARDS_PATH)).ok()?;
        Some(url.path().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"version":"5"}"#).unwrap();
        assert_eq!(config.version, "5");
        assert_eq!(config.fetch_timeout_secs, DEFAULT_FETCH_TIMEOUT_SECS);
        assert_eq!(config.origin, Config::default().origin);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(|key| match key {
            ORIGIN_ENV => Some("https://cards.example".to_string()),
            API_BASE_ENV => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config.origin, "https://cards.example");
        assert_eq!(config.api_base, Config::default().api_base);
    }

    #[test]
    fn test_controller_config() {
        let config = Config {
            version: "7".to_string(),
            origin: "https://cards.example".to_string(),
            static_assets: Some(vec!["/".to_string()]),
            ..Config::default()
        };
        let controller = config.controller_config();
        assert_eq!(controller.app_name, APP_NAME);
        assert_eq!(controller.version, "7");
        assert_eq!(controller.origin, "https://cards.example");
        assert_eq!(controller.static_assets, vec!["/"]);
        assert_eq!(controller.api_card_prefix, "/api/v1/cards/students/");

        let defaults = Config::default().controller_config();
        assert_eq!(defaults.static_assets, ControllerConfig::default().static_assets);
    }

    #[test]
    fn test_card_data_prefix_follows_api_base_path() {
        let config = Config {
            api_base: "https://school.example/backend/".to_string(),
            ..Config::default()
        };
        assert_eq!(
            config.controller_config().api_card_prefix,
            "/backend/api/v1/cards/students/"
        );

        let unparseable = Config {
            api_base: "not a url".to_string(),
            ..Config::default()
        };
        assert_eq!(
            unparseable.controller_config().api_card_prefix,
            ControllerConfig::default().api_card_prefix
        );
    }
}
