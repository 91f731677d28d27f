//! Request classification.
//!
//! Every intercepted URL is matched against an ordered rule table; the first
//! matching rule decides the route, and the route decides the caching policy.
//! Patterns can overlap (a card's manifest lives under the card route), so the
//! order of `RouteTable::rules` is the precedence:
//!
//! 1. API card data      - network-first, `api` store, 503 JSON on miss
//! 2. Dynamic manifest   - network-first, always refreshed, silent on miss
//! 3. Card page          - network-first, success-only writes
//! 4. Precached asset    - cache-first
//! 5. Everything else    - cache-first

use reqwest::Url;

use crate::controller::ControllerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    ApiCardData,
    DynamicManifest,
    CardPage,
    /// One of the assets written during install.
    PrecachedAsset,
    Static,
}

/// Which of the two versioned stores a route reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Static,
    Api,
}

/// Which network responses are written back to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheWhen {
    /// Any response the network produced, whatever its status.
    AnyResponse,
    /// 2xx responses only, so error pages never shadow good copies.
    Success,
}

/// What a network-first route returns when the network fails and the cache
/// has nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnMiss {
    /// 503 with a JSON `{error, message}` body.
    OfflineError,
    /// Empty 503; the page treats the resource as optional.
    Degrade,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    NetworkFirst {
        store: StoreKind,
        cache_when: CacheWhen,
        on_miss: OnMiss,
    },
    /// Serve from the `static` store; on a miss fetch and keep 2xx responses.
    /// A network failure with no stored copy propagates to the caller.
    CacheFirst,
}

impl Route {
    pub fn policy(self) -> Policy {
        match self {
            Route::ApiCardData => Policy::NetworkFirst {
                store: StoreKind::Api,
                cache_when: CacheWhen::AnyResponse,
                on_miss: OnMiss::OfflineError,
            },
            Route::DynamicManifest => Policy::NetworkFirst {
                store: StoreKind::Static,
                cache_when: CacheWhen::AnyResponse,
                on_miss: OnMiss::Degrade,
            },
            Route::CardPage => Policy::NetworkFirst {
                store: StoreKind::Static,
                cache_when: CacheWhen::Success,
                on_miss: OnMiss::Degrade,
            },
            Route::PrecachedAsset | Route::Static => Policy::CacheFirst,
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Route::ApiCardData => "api-card-data",
            Route::DynamicManifest => "dynamic-manifest",
            Route::CardPage => "card-page",
            Route::PrecachedAsset => "precached-asset",
            Route::Static => "static",
        };
        f.pad(name)
    }
}

/// A URL path predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    PathPrefix(String),
    /// Last path segment equals the given resource name.
    LastSegment(String),
    /// `{prefix}{id}` with exactly one non-empty id segment that is neither
    /// the manifest resource nor the placeholder id.
    CardPage {
        prefix: String,
        manifest_name: String,
        invalid_id: String,
    },
    PathIn(Vec<String>),
    Any,
}

impl Matcher {
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Matcher::PathPrefix(prefix) => path.starts_with(prefix.as_str()),
            Matcher::LastSegment(name) => path.rsplit('/').next() == Some(name.as_str()),
            Matcher::CardPage {
                prefix,
                manifest_name,
                invalid_id,
            } => {
                let Some(rest) = path.strip_prefix(prefix.as_str()) else {
                    return false;
                };
                let id = rest.strip_suffix('/').unwrap_or(rest);
                !id.is_empty() && !id.contains('/') && id != manifest_name && id != invalid_id
            }
            Matcher::PathIn(paths) => paths.iter().any(|p| p == path),
            Matcher::Any => true,
        }
    }
}

impl std::fmt::Display for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Matcher::PathPrefix(prefix) => write!(f, "{}*", prefix),
            Matcher::LastSegment(name) => write!(f, "*/{}", name),
            Matcher::CardPage {
                prefix, invalid_id, ..
            } => write!(f, "{}{{id}} (id != {})", prefix, invalid_id),
            Matcher::PathIn(paths) => write!(f, "{}", paths.join(" ")),
            Matcher::Any => f.write_str("*"),
        }
    }
}

impl std::fmt::Display for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Policy::NetworkFirst {
                store,
                cache_when,
                on_miss,
            } => {
                let store = match store {
                    StoreKind::Static => "static",
                    StoreKind::Api => "api",
                };
                let writes = match cache_when {
                    CacheWhen::AnyResponse => "any status",
                    CacheWhen::Success => "2xx only",
                };
                let miss = match on_miss {
                    OnMiss::OfflineError => "503 json",
                    OnMiss::Degrade => "empty 503",
                };
                write!(f, "network-first [{} store, {}, miss: {}]", store, writes, miss)
            }
            Policy::CacheFirst => f.write_str("cache-first [static store, 2xx only]"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    pub matcher: Matcher,
    pub route: Route,
}

#[derive(Debug, Clone)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
}

impl RouteTable {
    pub fn from_config(config: &ControllerConfig) -> Self {
        let card_prefix = if config.card_prefix.ends_with('/') {
            config.card_prefix.clone()
        } else {
            format!("{}/", config.card_prefix)
        };

        let rules = vec![
            RouteRule {
                matcher: Matcher::PathPrefix(config.api_card_prefix.clone()),
                route: Route::ApiCardData,
            },
            RouteRule {
                matcher: Matcher::LastSegment(config.manifest_name.clone()),
                route: Route::DynamicManifest,
            },
            RouteRule {
                matcher: Matcher::CardPage {
                    prefix: card_prefix,
                    manifest_name: config.manifest_name.clone(),
                    invalid_id: config.invalid_card_id.clone(),
                },
                route: Route::CardPage,
            },
            RouteRule {
                matcher: Matcher::PathIn(config.static_assets.clone()),
                route: Route::PrecachedAsset,
            },
            RouteRule {
                matcher: Matcher::Any,
                route: Route::Static,
            },
        ];

        Self { rules }
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    pub fn classify(&self, url: &Url) -> Route {
        self.classify_path(url.path())
    }

    pub fn classify_path(&self, path: &str) -> Route {
        self.rules
            .iter()
            .find(|rule| rule.matcher.matches(path))
            .map(|rule| rule.route)
            .unwrap_or(Route::Static)
    }
}

// ============================================================================
// Tests
// ============================================================================
