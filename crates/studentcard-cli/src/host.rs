//! Keeps the cache controller alive across runs.
//!
//! A browser keeps its active controller between page loads; here the active
//! version is remembered in `controller.json` and restored without another
//! install. A new version in the config installs and, since a terminal run
//! holds no other clients, activates immediately.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use studentcard_core::cache::{CacheStorage, DiskStorage};
use studentcard_core::config::Config;
use studentcard_core::controller::{CacheController, ControllerState};
use studentcard_core::network::{HttpNetwork, Network};
use studentcard_core::registration::{RegisterOutcome, Registration};
use studentcard_core::CardViewer;

const CONTROLLER_FILE: &str = "controller.json";

#[derive(Debug, Serialize, Deserialize)]
struct ActiveController {
    version: String,
    activated_at: DateTime<Utc>,
}

pub struct Host {
    pub config: Config,
    pub storage: Arc<DiskStorage>,
    pub registration: Arc<Registration>,
    network: Arc<dyn Network>,
    state_path: PathBuf,
}

impl Host {
    pub fn open(config: Config) -> Result<Self> {
        let cache_dir = config.cache_dir()?;
        let storage = Arc::new(
            DiskStorage::new(config.stores_dir()?).context("Failed to open cache stores")?,
        );
        let network: Arc<dyn Network> = Arc::new(
            HttpNetwork::new(config.fetch_timeout()).context("Failed to build HTTP client")?,
        );
        let registration = Arc::new(Registration::new(network.clone()));

        Ok(Self {
            config,
            storage,
            registration,
            network,
            state_path: cache_dir.join(CONTROLLER_FILE),
        })
    }

    fn controller_for(&self, version: &str) -> Result<CacheController> {
        let mut config = self.config.controller_config();
        config.version = version.to_string();
        let storage: Arc<dyn CacheStorage> = self.storage.clone();
        CacheController::new(config, self.network.clone(), storage)
            .context("Invalid controller configuration")
    }

    fn load_active(&self) -> Option<ActiveController> {
        let contents = std::fs::read_to_string(&self.state_path).ok()?;
        serde_json::from_str(&contents).ok()
    }

    fn save_active(&self, version: &str) -> Result<()> {
        let record = ActiveController {
            version: version.to_string(),
            activated_at: Utc::now(),
        };
        if let Some(parent) = self.state_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.state_path, serde_json::to_string_pretty(&record)?)?;
        Ok(())
    }

    /// Bring up the controller for this run.
    ///
    /// Restores the remembered version, then installs the configured one if
    /// it differs. A failed install (typically offline) is not fatal: the
    /// previous version, if any, stays in control and the install is retried
    /// next run.
    pub async fn start(&self) -> Result<()> {
        let wanted = self.config.version.as_str();
        if let Some(active) = self.load_active() {
            self.registration
                .restore(self.controller_for(&active.version)?)
                .await?;
            info!(version = %active.version, since = %active.activated_at, "Restored active controller");
            if active.version == wanted {
                return Ok(());
            }
            info!(from = %active.version, to = wanted, "Controller version changed");
        }

        match self.install().await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Controller install failed, keeping the current controller");
                Ok(())
            }
        }
    }

    /// Install the configured version and make it active.
    pub async fn install(&self) -> Result<RegisterOutcome> {
        let outcome = self
            .registration
            .register(self.controller_for(&self.config.version)?)
            .await?;
        if let RegisterOutcome::Activated { .. } = outcome {
            self.save_active(&self.config.version)?;
        }
        Ok(outcome)
    }

    pub async fn controller_state(&self) -> Option<ControllerState> {
        self.registration.active().await.map(|c| c.state())
    }

    pub fn viewer(&self) -> Result<CardViewer> {
        let controller = self.config.controller_config();
        CardViewer::new(
            self.registration.clone(),
            &self.config.origin,
            &self.config.api_base,
            &controller.invalid_card_id,
        )
        .context("Invalid viewer configuration")
    }
}
