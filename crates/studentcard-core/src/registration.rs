//! The page-side registration of cache controllers.
//!
//! A registration holds at most one active and one waiting controller. A new
//! version installs next to the active one and only takes over when nothing
//! is attached to the old one, or when the page posts `SKIP_WAITING` (after
//! the user accepted the update prompt).

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::controller::{CacheController, ControlMessage, ControllerError, MessageOutcome};
use crate::http::{Request, Response};
use crate::network::{FetchError, Network};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The new controller is now in control.
    Activated { evicted: Vec<String> },
    /// Installed; waiting for clients to detach or for `SKIP_WAITING`.
    Waiting,
}

#[derive(Default)]
struct Slots {
    active: Option<Arc<CacheController>>,
    waiting: Option<Arc<CacheController>>,
    clients: usize,
}

pub struct Registration {
    network: Arc<dyn Network>,
    slots: Mutex<Slots>,
}

impl Registration {
    pub fn new(network: Arc<dyn Network>) -> Self {
        Self {
            network,
            slots: Mutex::new(Slots::default()),
        }
    }

    /// Install a controller and activate it if nothing holds the current one.
    ///
    /// An install failure leaves the registration untouched; registering a
    /// fresh controller later retries.
    pub async fn register(
        &self,
        controller: CacheController,
    ) -> Result<RegisterOutcome, ControllerError> {
        let controller = Arc::new(controller);
        controller.install().await?;

        let mut slots = self.slots.lock().await;
        if slots.active.is_none() || slots.clients == 0 {
            let evicted = controller.activate().await?;
            if let Some(previous) = slots.waiting.take() {
                previous.supersede();
            }
            if let Some(previous) = slots.active.replace(controller.clone()) {
                previous.supersede();
            }
            info!(version = %controller.version(), "Controller activated");
            return Ok(RegisterOutcome::Activated { evicted });
        }

        if let Some(previous) = slots.waiting.replace(controller.clone()) {
            previous.supersede();
        }
        info!(
            version = %controller.version(),
            clients = slots.clients,
            "Update installed, waiting to activate"
        );
        Ok(RegisterOutcome::Waiting)
    }

    /// Reinstate a controller that was already active in an earlier process.
    pub async fn restore(&self, controller: CacheController) -> Result<(), ControllerError> {
        controller.resume()?;
        let controller = Arc::new(controller);
        let mut slots = self.slots.lock().await;
        if let Some(previous) = slots.active.replace(controller) {
            previous.supersede();
        }
        Ok(())
    }

    /// A page attached to the registration.
    pub async fn claim_client(&self) {
        self.slots.lock().await.clients += 1;
    }

    /// A page went away.
    pub async fn release_client(&self) {
        let mut slots = self.slots.lock().await;
        slots.clients = slots.clients.saturating_sub(1);
    }

    pub async fn clients(&self) -> usize {
        self.slots.lock().await.clients
    }

    pub async fn active(&self) -> Option<Arc<CacheController>> {
        self.slots.lock().await.active.clone()
    }

    /// Version of an installed update waiting for activation, if any.
    pub async fn update_waiting(&self) -> Option<String> {
        self.slots
            .lock()
            .await
            .waiting
            .as_ref()
            .map(|c| c.version().to_string())
    }

    /// Deliver a control message.
    ///
    /// `SKIP_WAITING` goes to the waiting controller and promotes it;
    /// `CLEAR_CACHE` goes to whichever controller is in control.
    pub async fn post_message(
        &self,
        message: ControlMessage,
    ) -> Result<MessageOutcome, ControllerError> {
        let mut slots = self.slots.lock().await;
        match message {
            ControlMessage::SkipWaiting => {
                let Some(waiting) = slots.waiting.take() else {
                    debug!("Skip-waiting with no update installed");
                    return Ok(MessageOutcome::Ignored);
                };
                let outcome = match waiting.handle_message(message).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        slots.waiting = Some(waiting);
                        return Err(e);
                    }
                };
                if let Some(previous) = slots.active.replace(waiting) {
                    previous.supersede();
                }
                Ok(outcome)
            }
            ControlMessage::ClearCache => {
                let target = slots.active.clone().or_else(|| slots.waiting.clone());
                drop(slots);
                match target {
                    Some(controller) => controller.handle_message(message).await,
                    None => Ok(MessageOutcome::Ignored),
                }
            }
        }
    }

    /// Deliver a raw JSON message as posted by a page. Unknown messages are ignored.
    pub async fn post_raw(&self, raw: &str) -> Result<MessageOutcome, ControllerError> {
        match ControlMessage::parse(raw) {
            Ok(message) => self.post_message(message).await,
            Err(e) => {
                debug!(error = %e, "Ignoring unrecognized control message");
                Ok(MessageOutcome::Ignored)
            }
        }
    }

    /// Issue a request the way a controlled page does: through the active
    /// controller, or straight to the network when it does not intercept.
    pub async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let active = self.slots.lock().await.active.clone();
        if let Some(controller) = active {
            if let Some(response) = controller.handle_fetch(request).await?.into_response() {
                return Ok(response);
            }
        }
        self.network.fetch(request).await
    }
}

// ============================================================================
// Tests
// ============================================================================
