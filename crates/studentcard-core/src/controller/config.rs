use serde::{Deserialize, Serialize};

/// Deployment-specific settings of one cache controller.
///
/// `version` must change whenever the controller's behaviour or asset list
/// changes, so the stores of the previous deployment are recognized as stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub app_name: String,
    pub version: String,
    /// Base URL the precached asset paths are resolved against.
    pub origin: String,
    /// Written to the `static` store during install; all must succeed.
    pub static_assets: Vec<String>,
    pub api_card_prefix: String,
    pub manifest_name: String,
    pub card_prefix: String,
    /// Card id the page produces before its route parameter resolves.
    pub invalid_card_id: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            app_name: "studentcard".to_string(),
            version: "2".to_string(),
            origin: "http://localhost:3000".to_string(),
            static_assets: vec![
                "/".to_string(),
                "/Logo-esi.png".to_string(),
                "/icons/icon-192x192.png".to_string(),
                "/icons/icon-512x512.png".to_string(),
                "/manifest.json".to_string(),
            ],
            api_card_prefix: "/api/v1/cards/students/".to_string(),
            manifest_name: "manifest.json".to_string(),
            card_prefix: "/card/".to_string(),
            invalid_card_id: "undefined".to_string(),
        }
    }
}
