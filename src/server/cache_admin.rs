//! Cache management endpoints and their API-key gate.
//!
//! The routes are registered only when the cache API is enabled:
//!
//! - `GET /cache/stats` - counters snapshot
//! - `DELETE /cache/clear` - purge everything
//! - `DELETE /cache/layer/{layer}` - purge one layer's tiles
//!
//! When an API key is configured, requests must carry it in `X-API-Key`;
//! with no key configured the endpoints are public.

use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{debug, warn};

use crate::tile::TileSource;

use super::handlers::{json_error, AppState};

const HEADER_API_KEY: &str = "X-API-Key";

/// API-key configuration for the cache endpoints.
#[derive(Clone)]
pub struct CacheApiAuth {
    pub api_key: Option<String>,
}

/// Validate the API key for cache endpoints.
pub async fn cache_auth_middleware(
    State(auth): State<CacheApiAuth>,
    request: Request,
    next: Next,
) -> Response {
    let Some(configured) = auth.api_key.as_deref().filter(|k| !k.is_empty()) else {
        debug!("Cache endpoint accessed without authentication (public mode)");
        return next.run(request).await;
    };

    match request
        .headers()
        .get(HEADER_API_KEY)
        .and_then(|v| v.to_str().ok())
    {
        None => {
            warn!("Cache endpoint accessed without API key");
            json_error(
                StatusCode::UNAUTHORIZED,
                "API key required. Provide X-API-Key header.",
            )
        }
        Some(provided) if provided != configured => {
            warn!("Cache endpoint accessed with invalid API key");
            json_error(StatusCode::FORBIDDEN, "Invalid API key")
        }
        Some(_) => {
            debug!("Cache endpoint accessed with valid API key");
            next.run(request).await
        }
    }
}

/// Return cache statistics as JSON.
pub async fn cache_stats_handler<S: TileSource>(State(state): State<AppState<S>>) -> Response {
    if !state.cache.enabled() {
        return Json(json!({ "status": "disabled" })).into_response();
    }
    Json(state.cache.stats()).into_response()
}

/// Clear the entire tile cache and the layer metadata cache.
pub async fn cache_clear_handler<S: TileSource>(State(state): State<AppState<S>>) -> Response {
    if !state.cache.enabled() {
        return json_error(StatusCode::BAD_REQUEST, "Cache is disabled");
    }

    state.cache.clear();
    state.source.invalidate_metadata(None);

    Json(json!({
        "status": "ok",
        "message": "Cache cleared",
    }))
    .into_response()
}

/// Clear all cached tiles for one layer.
pub async fn cache_clear_layer_handler<S: TileSource>(
    State(state): State<AppState<S>>,
    Path(layer): Path<String>,
) -> Response {
    if !state.cache.enabled() {
        return json_error(StatusCode::BAD_REQUEST, "Cache is disabled");
    }

    let removed = state.cache.clear_layer(&layer);
    state.source.invalidate_metadata(Some(&layer));

    Json(json!({
        "status": "ok",
        "message": format!("Cleared {removed} tiles for layer {layer}"),
        "removed": removed,
        "layer": layer,
    }))
    .into_response()
}
