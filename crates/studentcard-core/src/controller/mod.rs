//! The offline cache controller.
//!
//! One controller instance corresponds to one deployed version. It goes
//! through `Installing -> Installed -> Activating -> Active` and becomes
//! `Redundant` when a newer version takes over or its install fails.
//!
//! While active it answers every intercepted GET according to the route
//! table in [`crate::routes`], and handles the `SKIP_WAITING` and
//! `CLEAR_CACHE` control messages.

mod config;
mod error;
mod message;

pub use config::ControllerConfig;
pub use error::ControllerError;
pub use message::{ControlMessage, MessageOutcome};

use std::sync::Arc;

use futures::future;
use reqwest::Url;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::{CacheNames, CacheStorage};
use crate::http::{Request, RequestKey, Response};
use crate::network::{FetchError, Network};
use crate::routes::{CacheWhen, OnMiss, Policy, Route, RouteTable, StoreKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControllerState {
    Installing,
    /// Installed and waiting to activate.
    Installed,
    /// Evicting stale stores; fetches pass through until this completes.
    Activating,
    Active,
    /// Superseded by a newer version, or discarded after a failed install.
    Redundant,
}

impl ControllerState {
    pub fn can_intercept_fetch(&self) -> bool {
        matches!(self, ControllerState::Active)
    }
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ControllerState::Installing => "installing",
            ControllerState::Installed => "installed",
            ControllerState::Activating => "activating",
            ControllerState::Active => "active",
            ControllerState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// Where an intercepted response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Served {
    Network,
    Cache,
    /// Built locally because neither the network nor the cache could answer.
    Synthesized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Not intercepted; the caller should go to the network itself.
    PassThrough,
    Respond(Response, Served),
}

impl FetchOutcome {
    pub fn into_response(self) -> Option<Response> {
        match self {
            FetchOutcome::PassThrough => None,
            FetchOutcome::Respond(response, _) => Some(response),
        }
    }
}

pub struct CacheController {
    config: ControllerConfig,
    origin: Url,
    names: CacheNames,
    routes: RouteTable,
    network: Arc<dyn Network>,
    storage: Arc<dyn CacheStorage>,
    state: watch::Sender<ControllerState>,
}

impl CacheController {
    pub fn new(
        config: ControllerConfig,
        network: Arc<dyn Network>,
        storage: Arc<dyn CacheStorage>,
    ) -> Result<Self, ControllerError> {
        let origin = Url::parse(&config.origin)
            .map_err(|e| ControllerError::InvalidOrigin(config.origin.clone(), e.to_string()))?;
        let names = CacheNames::new(&config.app_name, &config.version);
        let routes = RouteTable::from_config(&config);
        let (state, _) = watch::channel(ControllerState::Installing);

        Ok(Self {
            config,
            origin,
            names,
            routes,
            network,
            storage,
            state,
        })
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn state(&self) -> ControllerState {
        *self.state.borrow()
    }

    /// Observe state changes, e.g. to prompt the user once an update is installed.
    pub fn subscribe(&self) -> watch::Receiver<ControllerState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: ControllerState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            info!(version = %self.config.version, from = %previous, to = %next, "Controller state change");
        }
    }

    fn expect_state(&self, expected: ControllerState) -> Result<(), ControllerError> {
        let actual = self.state();
        if actual == expected {
            Ok(())
        } else {
            Err(ControllerError::InvalidState { expected, actual })
        }
    }

    fn store_name(&self, kind: StoreKind) -> &str {
        match kind {
            StoreKind::Static => &self.names.static_store,
            StoreKind::Api => &self.names.api_store,
        }
    }

    // ===== Lifecycle =====

    /// Precache every configured asset into the `static` store.
    ///
    /// All assets are fetched before anything is written, so a failed attempt
    /// leaves no partial store behind. Failure makes this instance redundant;
    /// a fresh instance retries on the next load.
    pub async fn install(&self) -> Result<(), ControllerError> {
        self.expect_state(ControllerState::Installing)?;
        info!(
            version = %self.config.version,
            assets = self.config.static_assets.len(),
            "Installing cache controller"
        );

        let fetches = self
            .config
            .static_assets
            .iter()
            .map(|asset| self.fetch_asset(asset));

        let fetched = match future::try_join_all(fetches).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(error = %e, "Install failed");
                self.set_state(ControllerState::Redundant);
                return Err(e);
            }
        };

        let store = &self.names.static_store;
        // An unreadable store counts as existing, so nothing is discarded on a guess.
        let existed = self.storage.has(store).await.unwrap_or(true);
        for (key, response) in fetched {
            if let Err(e) = self.storage.put(store, key, response).await {
                warn!(error = %e, "Install failed while writing the static store");
                if !existed {
                    self.discard_partial_store(store).await;
                }
                self.set_state(ControllerState::Redundant);
                return Err(e.into());
            }
        }

        self.set_state(ControllerState::Installed);
        Ok(())
    }

    async fn discard_partial_store(&self, store: &str) {
        match self.storage.delete(store).await {
            Ok(_) => debug!(store = store, "Discarded partially written store"),
            Err(e) => warn!(store = store, error = %e, "Failed to discard partial store"),
        }
    }

    async fn fetch_asset(&self, asset: &str) -> Result<(RequestKey, Response), ControllerError> {
        let install_error = |reason: String| ControllerError::Install {
            asset: asset.to_string(),
            reason,
        };

        let url = self.origin.join(asset).map_err(|e| install_error(e.to_string()))?;
        let request = Request::get(url);
        let response = self
            .network
            .fetch(&request)
            .await
            .map_err(|e| install_error(e.to_string()))?;

        if !response.is_success() {
            return Err(install_error(format!("status {}", response.status)));
        }

        debug!(asset = asset, "Precached asset");
        Ok((request.key(), response))
    }

    /// Delete every store that does not belong to this version, then start
    /// intercepting. Eviction completes before the state becomes `Active`.
    ///
    /// Returns the names of the evicted stores.
    pub async fn activate(&self) -> Result<Vec<String>, ControllerError> {
        self.expect_state(ControllerState::Installed)?;
        self.set_state(ControllerState::Activating);

        match self.evict_stale().await {
            Ok(evicted) => {
                self.set_state(ControllerState::Active);
                Ok(evicted)
            }
            Err(e) => {
                warn!(error = %e, "Eviction failed, activation postponed");
                self.set_state(ControllerState::Installed);
                Err(e)
            }
        }
    }

    async fn evict_stale(&self) -> Result<Vec<String>, ControllerError> {
        let stale: Vec<String> = self
            .storage
            .keys()
            .await?
            .into_iter()
            .filter(|name| !self.names.is_current(name))
            .collect();

        let deletions = stale.iter().map(|name| async move {
            info!(store = %name, "Deleting stale cache store");
            self.storage.delete(name).await
        });
        for result in future::join_all(deletions).await {
            result?;
        }

        Ok(stale)
    }

    /// Take control again for a version that installed and activated in an
    /// earlier process. Nothing is fetched or evicted.
    pub fn resume(&self) -> Result<(), ControllerError> {
        self.expect_state(ControllerState::Installing)?;
        self.set_state(ControllerState::Active);
        Ok(())
    }

    /// Stop handling events. A newer version has taken over.
    pub fn supersede(&self) {
        self.set_state(ControllerState::Redundant);
    }

    // ===== Fetch interception =====

    /// Answer an intercepted request.
    ///
    /// Only the cache-first branch can return `Err`, when the asset is neither
    /// cached nor reachable. Every other branch always produces a response.
    pub async fn handle_fetch(&self, request: &Request) -> Result<FetchOutcome, FetchError> {
        if !self.state().can_intercept_fetch() || !request.is_read_only() {
            return Ok(FetchOutcome::PassThrough);
        }

        let route = self.routes.classify(&request.url);
        debug!(url = %request.url, route = %route, "Intercepted fetch");

        match route.policy() {
            Policy::NetworkFirst {
                store,
                cache_when,
                on_miss,
            } => Ok(self.network_first(request, route, store, cache_when, on_miss).await),
            Policy::CacheFirst => self.cache_first(request).await,
        }
    }

    async fn network_first(
        &self,
        request: &Request,
        route: Route,
        store: StoreKind,
        cache_when: CacheWhen,
        on_miss: OnMiss,
    ) -> FetchOutcome {
        let store = self.store_name(store);
        let key = request.key();

        let error = match self.network.fetch(request).await {
            Ok(response) => {
                let keep = match cache_when {
                    CacheWhen::AnyResponse => true,
                    CacheWhen::Success => response.is_success(),
                };
                if keep {
                    self.write(store, key, response.clone()).await;
                }
                return FetchOutcome::Respond(response, Served::Network);
            }
            Err(e) => e,
        };

        if let Some(cached) = self.lookup(store, &key).await {
            info!(url = %request.url, route = %route, error = %error, "Offline, serving cached copy");
            return FetchOutcome::Respond(cached, Served::Cache);
        }

        warn!(url = %request.url, route = %route, error = %error, "Offline and nothing cached");
        let response = match on_miss {
            OnMiss::OfflineError => Response::offline(),
            OnMiss::Degrade => Response::unavailable(),
        };
        FetchOutcome::Respond(response, Served::Synthesized)
    }

    async fn cache_first(&self, request: &Request) -> Result<FetchOutcome, FetchError> {
        let store = &self.names.static_store;
        let key = request.key();

        if let Some(cached) = self.lookup(store, &key).await {
            return Ok(FetchOutcome::Respond(cached, Served::Cache));
        }

        let response = self.network.fetch(request).await?;
        if response.is_success() {
            self.write(store, key, response.clone()).await;
        }
        Ok(FetchOutcome::Respond(response, Served::Network))
    }

    /// A failing store reads as a miss.
    async fn lookup(&self, store: &str, key: &RequestKey) -> Option<Response> {
        match self.storage.get(store, key).await {
            Ok(found) => found,
            Err(e) => {
                warn!(store = store, key = %key, error = %e, "Cache read failed");
                None
            }
        }
    }

    /// A failing write never affects the response already obtained.
    async fn write(&self, store: &str, key: RequestKey, response: Response) {
        if let Err(e) = self.storage.put(store, key, response).await {
            warn!(store = store, error = %e, "Cache write failed");
        }
    }

    // ===== Control messages =====

    pub async fn handle_message(
        &self,
        message: ControlMessage,
    ) -> Result<MessageOutcome, ControllerError> {
        match message {
            ControlMessage::SkipWaiting => {
                if self.state() != ControllerState::Installed {
                    debug!(state = %self.state(), "Skip-waiting ignored");
                    return Ok(MessageOutcome::Ignored);
                }
                let evicted = self.activate().await?;
                Ok(MessageOutcome::Activated { evicted })
            }
            ControlMessage::ClearCache => {
                let stores = self.clear_all().await?;
                Ok(MessageOutcome::Cleared { stores })
            }
        }
    }

    async fn clear_all(&self) -> Result<Vec<String>, ControllerError> {
        let stores = self.storage.keys().await?;
        let deletions = stores.iter().map(|name| self.storage.delete(name));
        for result in future::join_all(deletions).await {
            result?;
        }
        info!(count = stores.len(), "Cleared all cache stores");
        Ok(stores)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStorage;
    use crate::testing::{get, FailingWrites, FakeNetwork};

    const CARD_API: &str = "/api/v1/cards/students/63888/secure-card";

    fn config(version: &str) -> ControllerConfig {
        ControllerConfig {
            version: version.to_string(),
            origin: "https://cards.example".to_string(),
            static_assets: vec!["/".to_string(), "/Logo-esi.png".to_string()],
            ..ControllerConfig::default()
        }
    }

    fn online_network() -> Arc<FakeNetwork> {
        let network = FakeNetwork::new();
        network.serve("/", Response::new(200, "<html>home</html>"));
        network.serve("/Logo-esi.png", Response::new(200, vec![1, 2, 3]));
        Arc::new(network)
    }

    async fn active_controller(
        version: &str,
        network: Arc<FakeNetwork>,
        storage: Arc<MemoryStorage>,
    ) -> CacheController {
        let controller = CacheController::new(config(version), network, storage).unwrap();
        controller.install().await.unwrap();
        controller.activate().await.unwrap();
        controller
    }

    fn respond(outcome: FetchOutcome) -> (Response, Served) {
        match outcome {
            FetchOutcome::Respond(response, served) => (response, served),
            FetchOutcome::PassThrough => panic!("expected a response, got pass-through"),
        }
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_install_precaches_assets() {
        let network = online_network();
        let storage = Arc::new(MemoryStorage::new());
        let controller = CacheController::new(config("2"), network, storage.clone()).unwrap();

        assert_eq!(controller.state(), ControllerState::Installing);
        controller.install().await.unwrap();

        assert_eq!(controller.state(), ControllerState::Installed);
        assert_eq!(storage.len("studentcard-static-v2").await, Some(2));
    }

    #[tokio::test]
    async fn test_install_failure_is_atomic_and_redundant() {
        let network = FakeNetwork::new();
        network.serve("/", Response::new(200, "home"));
        network.serve("/Logo-esi.png", Response::new(404, "missing"));
        let storage = Arc::new(MemoryStorage::new());
        let controller =
            CacheController::new(config("2"), Arc::new(network), storage.clone()).unwrap();

        let err = controller.install().await.unwrap_err();
        assert!(matches!(err, ControllerError::Install { ref asset, .. } if asset == "/Logo-esi.png"));
        assert_eq!(controller.state(), ControllerState::Redundant);
        assert!(storage.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_install_write_failure_leaves_no_store() {
        let storage = Arc::new(FailingWrites::new("/Logo-esi.png"));
        let controller =
            CacheController::new(config("2"), online_network(), storage.clone()).unwrap();

        assert!(matches!(
            controller.install().await,
            Err(ControllerError::Storage(_))
        ));
        assert_eq!(controller.state(), ControllerState::Redundant);
        assert!(storage.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_install_write_failure_keeps_existing_store() {
        let storage = Arc::new(FailingWrites::new("/Logo-esi.png"));
        let earlier = get("/");
        storage
            .put("studentcard-static-v2", earlier.key(), Response::new(200, "old home"))
            .await
            .unwrap();
        let controller =
            CacheController::new(config("2"), online_network(), storage.clone()).unwrap();

        assert!(controller.install().await.is_err());
        assert_eq!(storage.keys().await.unwrap(), vec!["studentcard-static-v2"]);
    }

    #[tokio::test]
    async fn test_install_fails_offline() {
        let network = online_network();
        network.set_online(false);
        let controller =
            CacheController::new(config("2"), network, Arc::new(MemoryStorage::new())).unwrap();
        assert!(controller.install().await.is_err());
        assert_eq!(controller.state(), ControllerState::Redundant);
    }

    #[tokio::test]
    async fn test_activate_requires_installed() {
        let controller =
            CacheController::new(config("2"), online_network(), Arc::new(MemoryStorage::new()))
                .unwrap();
        let err = controller.activate().await.unwrap_err();
        assert!(matches!(
            err,
            ControllerError::InvalidState {
                expected: ControllerState::Installed,
                actual: ControllerState::Installing
            }
        ));
    }

    #[tokio::test]
    async fn test_activation_evicts_previous_version() {
        let network = online_network();
        network.serve("/app.js", Response::new(200, "v1 bundle"));
        let storage = Arc::new(MemoryStorage::new());

        let v1 = active_controller("1", network.clone(), storage.clone()).await;
        respond(v1.handle_fetch(&get("/app.js")).await.unwrap());
        assert_eq!(network.calls_to("/app.js"), 1);
        storage
            .put("unrelated-cache", get("/x").key(), Response::new(200, ""))
            .await
            .unwrap();

        let v2 = CacheController::new(config("2"), network.clone(), storage.clone()).unwrap();
        v2.install().await.unwrap();
        let mut evicted = v2.activate().await.unwrap();
        evicted.sort();
        v1.supersede();

        assert_eq!(evicted, vec!["studentcard-static-v1", "unrelated-cache"]);
        assert_eq!(
            storage.keys().await.unwrap(),
            vec!["studentcard-static-v2".to_string()]
        );

        // Cached under v1 only, so v2 goes back to the network.
        let (_, served) = respond(v2.handle_fetch(&get("/app.js")).await.unwrap());
        assert_eq!(served, Served::Network);
        assert_eq!(network.calls_to("/app.js"), 2);
        assert_eq!(v1.state(), ControllerState::Redundant);
    }

    #[tokio::test]
    async fn test_resume_serves_existing_stores_without_install() {
        let network = online_network();
        let storage = Arc::new(MemoryStorage::new());
        storage
            .put("studentcard-static-v2", get("/").key(), Response::new(200, "kept"))
            .await
            .unwrap();

        let controller = CacheController::new(config("2"), network.clone(), storage).unwrap();
        controller.resume().unwrap();
        assert_eq!(controller.state(), ControllerState::Active);
        assert_eq!(network.total_calls(), 0);

        let (home, served) = respond(controller.handle_fetch(&get("/")).await.unwrap());
        assert_eq!(served, Served::Cache);
        assert_eq!(home.text(), "kept");
        assert!(controller.resume().is_err());
    }

    #[tokio::test]
    async fn test_not_active_passes_through() {
        let controller =
            CacheController::new(config("2"), online_network(), Arc::new(MemoryStorage::new()))
                .unwrap();
        controller.install().await.unwrap();
        assert_eq!(
            controller.handle_fetch(&get("/")).await.unwrap(),
            FetchOutcome::PassThrough
        );
    }

    #[tokio::test]
    async fn test_state_changes_are_observable() {
        let controller =
            CacheController::new(config("2"), online_network(), Arc::new(MemoryStorage::new()))
                .unwrap();
        let mut states = controller.subscribe();
        controller.install().await.unwrap();
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), ControllerState::Installed);
    }

    // -------------------------------------------------------------------------
    // API card data (network-first)
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_api_online_returns_and_stores_network_response() {
        let network = online_network();
        let card = Response::new(200, r#"{"student":{"matricule":"63888"}}"#);
        network.serve(CARD_API, card.clone());
        let storage = Arc::new(MemoryStorage::new());
        let controller = active_controller("2", network, storage.clone()).await;

        let request = get(CARD_API);
        let (response, served) = respond(controller.handle_fetch(&request).await.unwrap());

        assert_eq!(response, card);
        assert_eq!(served, Served::Network);
        let stored = storage.get("studentcard-api-v2", &request.key()).await.unwrap();
        assert_eq!(stored, Some(response));
    }

    #[tokio::test]
    async fn test_api_error_statuses_are_stored_too() {
        let network = online_network();
        network.serve(CARD_API, Response::new(404, r#"{"detail":"Not found"}"#));
        let storage = Arc::new(MemoryStorage::new());
        let controller = active_controller("2", network, storage.clone()).await;

        controller.handle_fetch(&get(CARD_API)).await.unwrap();
        let stored = storage.get("studentcard-api-v2", &get(CARD_API).key()).await.unwrap();
        assert_eq!(stored.map(|r| r.status), Some(404));
    }

    #[tokio::test]
    async fn test_api_offline_serves_prior_entry_verbatim() {
        let network = online_network();
        let storage = Arc::new(MemoryStorage::new());
        let controller = active_controller("2", network.clone(), storage.clone()).await;
        let old = Response::new(200, r#"{"message":"cached long ago"}"#)
            .with_header("Content-Type", "application/json");
        storage
            .put("studentcard-api-v2", get(CARD_API).key(), old.clone())
            .await
            .unwrap();

        network.set_online(false);
        let (response, served) = respond(controller.handle_fetch(&get(CARD_API)).await.unwrap());
        assert_eq!(response, old);
        assert_eq!(served, Served::Cache);
    }

    #[tokio::test]
    async fn test_api_offline_without_entry_synthesizes_503() {
        let network = online_network();
        let controller = active_controller("2", network.clone(), Arc::new(MemoryStorage::new())).await;

        network.set_online(false);
        let (response, served) = respond(controller.handle_fetch(&get(CARD_API)).await.unwrap());
        assert_eq!(served, Served::Synthesized);
        assert_eq!(response.status, 503);
        let body: serde_json::Value = response.json_body().unwrap();
        assert_eq!(body["error"], "Offline");
    }

    #[tokio::test]
    async fn test_api_fallback_ignores_static_store() {
        let network = online_network();
        let storage = Arc::new(MemoryStorage::new());
        let controller = active_controller("2", network.clone(), storage.clone()).await;
        storage
            .put("studentcard-static-v2", get(CARD_API).key(), Response::new(200, "wrong store"))
            .await
            .unwrap();

        network.set_online(false);
        let (response, _) = respond(controller.handle_fetch(&get(CARD_API)).await.unwrap());
        assert_eq!(response.status, 503);
    }

    #[tokio::test]
    async fn test_non_get_passes_through() {
        let network = online_network();
        let controller = active_controller("2", network.clone(), Arc::new(MemoryStorage::new())).await;
        let before = network.total_calls();

        let post = Request::new(reqwest::Method::POST, get(CARD_API).url);
        assert_eq!(
            controller.handle_fetch(&post).await.unwrap(),
            FetchOutcome::PassThrough
        );
        assert_eq!(network.total_calls(), before);
    }

    // -------------------------------------------------------------------------
    // Manifest and card page
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_manifest_is_always_refreshed() {
        let network = online_network();
        let controller = active_controller("2", network.clone(), Arc::new(MemoryStorage::new())).await;
        let path = "/card/63888/manifest.json";

        network.serve(path, Response::new(200, r#"{"name":"Card v1"}"#));
        let (first, _) = respond(controller.handle_fetch(&get(path)).await.unwrap());
        network.serve(path, Response::new(200, r#"{"name":"Card v2"}"#));
        let (second, served) = respond(controller.handle_fetch(&get(path)).await.unwrap());

        assert_eq!(first.text(), r#"{"name":"Card v1"}"#);
        assert_eq!(second.text(), r#"{"name":"Card v2"}"#);
        assert_eq!(served, Served::Network);
        assert_eq!(network.calls_to(path), 2);
    }

    #[tokio::test]
    async fn test_manifest_offline_falls_back_then_degrades_silently() {
        let network = online_network();
        let controller = active_controller("2", network.clone(), Arc::new(MemoryStorage::new())).await;
        let path = "/card/63888/manifest.json";
        network.serve(path, Response::new(200, r#"{"name":"Card"}"#));
        respond(controller.handle_fetch(&get(path)).await.unwrap());

        network.set_online(false);
        let (cached, served) = respond(controller.handle_fetch(&get(path)).await.unwrap());
        assert_eq!(served, Served::Cache);
        assert_eq!(cached.text(), r#"{"name":"Card"}"#);

        let (missing, served) =
            respond(controller.handle_fetch(&get("/card/1/manifest.json")).await.unwrap());
        assert_eq!(served, Served::Synthesized);
        assert_eq!(missing.status, 503);
        assert!(missing.body.is_empty());
    }

    #[tokio::test]
    async fn test_card_page_only_caches_success() {
        let network = online_network();
        let storage = Arc::new(MemoryStorage::new());
        let controller = active_controller("2", network.clone(), storage.clone()).await;

        network.serve("/card/63888", Response::new(200, "<html>card</html>"));
        network.serve("/card/99999", Response::new(500, "<html>oops</html>"));
        respond(controller.handle_fetch(&get("/card/63888")).await.unwrap());
        let (error_page, _) = respond(controller.handle_fetch(&get("/card/99999")).await.unwrap());
        assert_eq!(error_page.status, 500);

        let store = "studentcard-static-v2";
        assert!(storage.get(store, &get("/card/63888").key()).await.unwrap().is_some());
        assert!(storage.get(store, &get("/card/99999").key()).await.unwrap().is_none());

        network.set_online(false);
        let (page, served) = respond(controller.handle_fetch(&get("/card/63888")).await.unwrap());
        assert_eq!(served, Served::Cache);
        assert_eq!(page.text(), "<html>card</html>");
        let (missing, _) = respond(controller.handle_fetch(&get("/card/99999")).await.unwrap());
        assert_eq!(missing.status, 503);
    }

    // -------------------------------------------------------------------------
    // Static assets (cache-first)
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_static_second_request_skips_network() {
        let network = online_network();
        network.serve("/_next/static/app.js", Response::new(200, "bundle"));
        let controller = active_controller("2", network.clone(), Arc::new(MemoryStorage::new())).await;

        let (first, served_first) =
            respond(controller.handle_fetch(&get("/_next/static/app.js")).await.unwrap());
        let (second, served_second) =
            respond(controller.handle_fetch(&get("/_next/static/app.js")).await.unwrap());

        assert_eq!(network.calls_to("/_next/static/app.js"), 1);
        assert_eq!(served_first, Served::Network);
        assert_eq!(served_second, Served::Cache);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_precached_asset_served_offline() {
        let network = online_network();
        let controller = active_controller("2", network.clone(), Arc::new(MemoryStorage::new())).await;
        let installs = network.calls_to("/Logo-esi.png");

        network.set_online(false);
        let (logo, served) = respond(controller.handle_fetch(&get("/Logo-esi.png")).await.unwrap());
        assert_eq!(served, Served::Cache);
        assert_eq!(logo.body, vec![1, 2, 3]);
        assert_eq!(network.calls_to("/Logo-esi.png"), installs);
    }

    #[tokio::test]
    async fn test_static_error_status_not_cached() {
        let network = online_network();
        let controller = active_controller("2", network.clone(), Arc::new(MemoryStorage::new())).await;

        let (first, _) = respond(controller.handle_fetch(&get("/missing.png")).await.unwrap());
        assert_eq!(first.status, 404);
        controller.handle_fetch(&get("/missing.png")).await.unwrap();
        assert_eq!(network.calls_to("/missing.png"), 2);
    }

    #[tokio::test]
    async fn test_static_offline_miss_propagates_error() {
        let network = online_network();
        let controller = active_controller("2", network.clone(), Arc::new(MemoryStorage::new())).await;

        network.set_online(false);
        let err = controller.handle_fetch(&get("/never-seen.css")).await.unwrap_err();
        assert!(matches!(err, FetchError::Offline(_)));
    }

    // -------------------------------------------------------------------------
    // Control messages
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_skip_waiting_activates_installed_controller() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .put("studentcard-api-v1", get(CARD_API).key(), Response::new(200, "{}"))
            .await
            .unwrap();
        let controller = CacheController::new(config("2"), online_network(), storage).unwrap();
        controller.install().await.unwrap();

        let outcome = controller.handle_message(ControlMessage::SkipWaiting).await.unwrap();
        assert_eq!(
            outcome,
            MessageOutcome::Activated {
                evicted: vec!["studentcard-api-v1".to_string()]
            }
        );
        assert_eq!(controller.state(), ControllerState::Active);

        // A second skip-waiting has nothing left to do.
        let again = controller.handle_message(ControlMessage::SkipWaiting).await.unwrap();
        assert_eq!(again, MessageOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_clear_cache_is_idempotent() {
        let storage = Arc::new(MemoryStorage::new());
        let controller = active_controller("2", online_network(), storage.clone()).await;
        storage
            .put("studentcard-api-v7", get(CARD_API).key(), Response::new(200, "{}"))
            .await
            .unwrap();

        let first = controller.handle_message(ControlMessage::ClearCache).await.unwrap();
        assert_eq!(
            first,
            MessageOutcome::Cleared {
                stores: vec![
                    "studentcard-api-v7".to_string(),
                    "studentcard-static-v2".to_string()
                ]
            }
        );
        assert!(storage.keys().await.unwrap().is_empty());

        let second = controller.handle_message(ControlMessage::ClearCache).await.unwrap();
        assert_eq!(second, MessageOutcome::Cleared { stores: vec![] });
    }

    // -------------------------------------------------------------------------
    // End to end
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_card_survives_disconnect_until_cleared() {
        let network = online_network();
        let body = r#"{"student":{"matricule":"63888"},"signature":"abc"}"#;
        network.serve(CARD_API, Response::new(200, body));
        let storage = Arc::new(MemoryStorage::new());
        let controller = active_controller("2", network.clone(), storage.clone()).await;

        let (online, _) = respond(controller.handle_fetch(&get(CARD_API)).await.unwrap());
        assert_eq!(online.text(), body);

        network.set_online(false);
        let (offline, served) = respond(controller.handle_fetch(&get(CARD_API)).await.unwrap());
        assert_eq!(served, Served::Cache);
        assert_eq!(offline.text(), body);

        controller.handle_message(ControlMessage::ClearCache).await.unwrap();
        let (cleared, _) = respond(controller.handle_fetch(&get(CARD_API)).await.unwrap());
        assert_eq!(cleared.status, 503);
        let json: serde_json::Value = cleared.json_body().unwrap();
        assert_eq!(json["error"], "Offline");
        assert!(!json["message"].as_str().unwrap().is_empty());
    }
}
