//! The card viewer page: loads one student's card and manifest through the
//! registration, so both keep working without a connection.

use std::sync::Arc;

use reqwest::Url;
use thiserror::Error;
use tracing::{debug, warn};

use crate::api::{endpoint_url, STUDENT_CARDS_PATH};
use crate::http::{Request, Response};
use crate::models::{OfflineNotice, SecureCard, WebManifest};
use crate::network::FetchError;
use crate::registration::Registration;

#[derive(Error, Debug)]
pub enum ViewerError {
    #[error("Invalid matricule: {0:?}")]
    InvalidMatricule(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Unexpected card response ({status}): {reason}")]
    InvalidResponse { status: u16, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CardView {
    Card(SecureCard),
    /// Offline and nothing cached for this card.
    Offline(OfflineNotice),
    /// The backend answered with an error status (unknown matricule, ...).
    Unavailable { status: u16, detail: String },
}

pub struct CardViewer {
    registration: Arc<Registration>,
    /// Host of the card pages and manifests.
    origin: Url,
    /// Base URL of the REST backend, possibly with a path prefix.
    api_base: String,
    /// Id the router produces before the route parameter is known.
    invalid_id: String,
}

impl CardViewer {
    pub fn new(
        registration: Arc<Registration>,
        origin: &str,
        api_base: &str,
        invalid_id: &str,
    ) -> Result<Self, ViewerError> {
        let parse = |s: &str| Url::parse(s).map_err(|e| ViewerError::InvalidUrl(format!("{}: {}", s, e)));
        Ok(Self {
            registration,
            origin: parse(origin)?,
            api_base: parse(api_base)?.as_str().to_string(),
            invalid_id: invalid_id.to_string(),
        })
    }

    fn check_matricule(&self, matricule: &str) -> Result<(), ViewerError> {
        let valid = !matricule.is_empty()
            && matricule != self.invalid_id
            && matricule.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(())
        } else {
            Err(ViewerError::InvalidMatricule(matricule.to_string()))
        }
    }

    /// Path of the manifest the page links for this card.
    pub fn manifest_href(matricule: &str) -> String {
        format!("/card/{}/manifest.json", matricule)
    }

    pub fn card_api_url(&self, matricule: &str) -> Result<Url, ViewerError> {
        self.check_matricule(matricule)?;
        let path = format!("{}{}/secure-card", STUDENT_CARDS_PATH, matricule);
        let url = endpoint_url(&self.api_base, &path);
        Url::parse(&url).map_err(|e| ViewerError::InvalidUrl(format!("{}: {}", url, e)))
    }

    pub async fn load_card(&self, matricule: &str) -> Result<CardView, ViewerError> {
        let request = Request::get(self.card_api_url(matricule)?);
        let response = self.registration.fetch(&request).await?;
        debug!(matricule = matricule, status = response.status, "Card response");
        Self::interpret_card(response)
    }

    fn interpret_card(response: Response) -> Result<CardView, ViewerError> {
        let invalid = |status: u16, e: serde_json::Error| ViewerError::InvalidResponse {
            status,
            reason: e.to_string(),
        };

        if response.is_success() {
            let card = response
                .json_body::<SecureCard>()
                .map_err(|e| invalid(response.status, e))?;
            return Ok(CardView::Card(card));
        }

        if response.status == 503 {
            if let Ok(notice) = response.json_body::<OfflineNotice>() {
                return Ok(CardView::Offline(notice));
            }
        }

        let detail = response
            .json_body::<serde_json::Value>()
            .ok()
            .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(String::from))
            .unwrap_or_else(|| format!("Card not found ({})", response.status));
        Ok(CardView::Unavailable {
            status: response.status,
            detail,
        })
    }

    /// The card's manifest, or `None` when it can't be obtained. A missing
    /// manifest never prevents the card from displaying.
    pub async fn load_manifest(&self, matricule: &str) -> Option<WebManifest> {
        self.check_matricule(matricule).ok()?;
        let url = self.origin.join(&Self::manifest_href(matricule)).ok()?;

        let response = match self.registration.fetch(&Request::get(url)).await {
            Ok(response) => response,
            Err(e) => {
                warn!(matricule = matricule, error = %e, "Manifest fetch failed");
                return None;
            }
        };
        if !response.is_success() {
            debug!(matricule = matricule, status = response.status, "No manifest available");
            return None;
        }
        response.json_body().ok()
    }
}

// ============================================================================
// Tests
// ============================================================================
