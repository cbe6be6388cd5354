//! Router assembly for the tile server.
//!
//! # Route Structure
//!
//! ```text
//! /health                              - Health check
//! /layers, /layers.json                - Layer listing
//! /tiles/{layer}.json                  - TileJSON metadata
//! /tiles/{layer}/{z}/{x}/{y}.mvt|.pbf  - MVT tiles
//! /cache/stats                         - Cache counters     (optional)
//! /cache/clear                         - Purge cache        (optional)
//! /cache/layer/{layer}                 - Purge one layer    (optional)
//! ```
//!
//! All routes sit behind a server-wide timeout that answers 503 and drops
//! the handler future, which cancels any in-flight store query through the
//! request's cancellation guard.

use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::tile::TileSource;

use super::cache_admin::{
    cache_auth_middleware, cache_clear_handler, cache_clear_layer_handler, cache_stats_handler,
    CacheApiAuth,
};
use super::handlers::{
    health_handler, layers_handler, tile_handler, tilejson_handler, AppState,
};

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Clone)]
pub struct RouterConfig {
    /// Route prefix all endpoints are nested under (empty = root)
    pub base_path: String,

    /// Whether the /cache management routes are registered
    pub disable_cache_api: bool,

    /// X-API-Key protecting the /cache routes (None = public)
    pub cache_api_key: Option<String>,

    /// Server-wide handler timeout; expiry answers 503
    pub request_timeout: Duration,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl RouterConfig {
    pub fn new() -> Self {
        Self {
            base_path: String::new(),
            disable_cache_api: false,
            cache_api_key: None,
            request_timeout: Duration::from_secs(30),
            enable_tracing: true,
        }
    }

    /// Derive the router configuration from the application config.
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_path: config.server.base_path.clone(),
            disable_cache_api: config.cache.cache_disable_api,
            cache_api_key: config.cache.cache_api_key.clone(),
            request_timeout: Duration::from_secs(config.server.request_timeout),
            enable_tracing: !config.no_tracing,
        }
    }

    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    pub fn with_cache_api_key(mut self, key: Option<String>) -> Self {
        self.cache_api_key = key;
        self
    }

    pub fn with_cache_api_disabled(mut self, disabled: bool) -> Self {
        self.disable_cache_api = disabled;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Build the application router.
pub fn create_router<S: TileSource>(state: AppState<S>, config: RouterConfig) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_handler::<S>))
        .route("/layers", get(layers_handler::<S>))
        .route("/layers.json", get(layers_handler::<S>))
        .route("/tiles/{layer}", get(tilejson_handler::<S>))
        .route("/tiles/{layer}/{z}/{x}/{filename}", get(tile_handler::<S>))
        .with_state(state.clone());

    if config.disable_cache_api {
        info!("Cache management endpoints disabled");
    } else {
        info!("Cache management endpoints enabled");
        let auth = CacheApiAuth {
            api_key: config.cache_api_key.clone(),
        };
        let admin = Router::new()
            .route("/cache/stats", get(cache_stats_handler::<S>))
            .route("/cache/clear", delete(cache_clear_handler::<S>))
            .route(
                "/cache/layer/{layer}",
                delete(cache_clear_layer_handler::<S>),
            )
            .layer(middleware::from_fn_with_state(auth, cache_auth_middleware))
            .with_state(state);
        router = router.merge(admin);
    }

    let router = router.layer(middleware::from_fn_with_state(
        config.request_timeout,
        timeout_middleware,
    ));

    let router = if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    };

    if config.base_path.is_empty() {
        router
    } else {
        info!("Using base path: {}", config.base_path);
        Router::new().nest(&config.base_path, router)
    }
}

/// Abort handlers that outlive the server-wide deadline.
///
/// Dropping the handler future cancels its request-scoped work; the
/// detached cache fill is spawned separately and survives.
pub async fn timeout_middleware(
    State(timeout): State<Duration>,
    request: Request,
    next: Next,
) -> Response {
    match tokio::time::timeout(timeout, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            warn!("Request timed out after {:?}", timeout);
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}
