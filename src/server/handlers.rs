//! HTTP request handlers for the tile API.
//!
//! # Endpoints
//!
//! - `GET /tiles/{layer}/{z}/{x}/{y}.mvt` (also `.pbf`) - serve an MVT tile
//! - `GET /tiles/{layer}.json` - TileJSON metadata for a layer
//! - `GET /layers` - list all visible layers with bounds
//! - `GET /health` - health check
//!
//! Tile endpoints answer errors with a bare status code (the body is binary
//! MVT, an error document would be unparseable); JSON endpoints answer with
//! `{ "code", "description" }`.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::catalog::Layer;
use crate::error::{CatalogError, TileError};
use crate::tile::{TileCache, TileCoord, TileSource};

use super::tilejson::build_tilejson;

pub const CONTENT_TYPE_MVT: &str = "application/vnd.mapbox-vector-tile";

// =============================================================================
// Application State
// =============================================================================

/// Shared application state passed to all handlers.
pub struct AppState<S> {
    /// The spatial backend (catalog + engine)
    pub source: Arc<S>,

    /// Tile payload cache, shared across all requests
    pub cache: Arc<TileCache>,

    /// Browser Cache-Control max-age in seconds
    pub browser_cache_max_age: u32,

    /// Absolute URL base for TileJSON; derived from the request when None
    pub url_base: Option<String>,

    /// Route prefix the server is mounted under
    pub base_path: String,
}

impl<S: TileSource> AppState<S> {
    pub fn new(source: S, cache: TileCache) -> Self {
        Self {
            source: Arc::new(source),
            cache: Arc::new(cache),
            browser_cache_max_age: crate::config::DEFAULT_BROWSER_CACHE_MAX_AGE,
            url_base: None,
            base_path: String::new(),
        }
    }

    pub fn with_browser_cache_max_age(mut self, seconds: u32) -> Self {
        self.browser_cache_max_age = seconds;
        self
    }

    pub fn with_url_base(mut self, url_base: Option<String>) -> Self {
        self.url_base = url_base;
        self
    }

    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            cache: Arc::clone(&self.cache),
            browser_cache_max_age: self.browser_cache_max_age,
            url_base: self.url_base.clone(),
            base_path: self.base_path.clone(),
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error body for metadata endpoints.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub description: String,
}

/// Response for the `/layers` endpoint.
#[derive(Debug, Serialize)]
pub struct LayersResponse {
    pub layers: Vec<Layer>,
}

/// Response for the `/health` endpoint.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub spatial_extension: String,
    pub cache: CacheStatus,
}

/// Cache section of the health response.
#[derive(Debug, Serialize)]
pub struct CacheStatus {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<crate::tile::CacheStats>,
}

/// Build a JSON error response with a `{code, description}` body.
pub fn json_error(status: StatusCode, description: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            code: status.as_u16(),
            description: description.into(),
        }),
    )
        .into_response()
}

// =============================================================================
// Tile Path Parsing
// =============================================================================

/// Path parameters for tile requests.
///
/// Extracted from `/tiles/{layer}/{z}/{x}/{filename}` where filename is
/// `{y}.mvt` or `{y}.pbf`.
#[derive(Debug, Deserialize)]
pub struct TilePathParams {
    pub layer: String,
    pub z: String,
    pub x: String,
    pub filename: String,
}

/// Outcome of parsing one numeric path token.
///
/// Distinguishes "would not have matched a `[0-9]+` route" (404) from
/// "matched the route but is out of range" (400).
#[derive(Debug, PartialEq, Eq)]
pub enum CoordToken {
    NotNumeric,
    OutOfRange,
    Value(u32),
}

/// Parse a tile coordinate token with `[0-9]+` route semantics: anything
/// non-numeric (including negatives) is a routing miss, numeric overflow is
/// merely out of range.
pub fn parse_coord_token(token: &str) -> CoordToken {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return CoordToken::NotNumeric;
    }
    match token.parse::<u64>() {
        Ok(v) if v <= u64::from(u32::MAX) => CoordToken::Value(v as u32),
        _ => CoordToken::OutOfRange,
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Serve one MVT tile.
///
/// Consults the cache first; on a miss the layer is resolved through the
/// catalog and rendered by the engine, and the result is written back to
/// the cache from a detached task so a departing client cannot lose the
/// completed work.
///
/// # Response
///
/// - `200 OK` with MVT body, or `204 No Content` for an empty tile
/// - `400 Bad Request` for coordinates outside the tile matrix
/// - `404 Not Found` for unknown or filtered layers and malformed paths
/// - `500 Internal Server Error` for store failures
/// - `503 Service Unavailable` when cancelled or timed out
pub async fn tile_handler<S: TileSource>(
    State(state): State<AppState<S>>,
    Path(params): Path<TilePathParams>,
) -> Response {
    let Some(y_token) = params
        .filename
        .strip_suffix(".mvt")
        .or_else(|| params.filename.strip_suffix(".pbf"))
    else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let mut coords = [0u32; 3];
    for (slot, token) in coords
        .iter_mut()
        .zip([params.z.as_str(), params.x.as_str(), y_token])
    {
        match parse_coord_token(token) {
            CoordToken::NotNumeric => return StatusCode::NOT_FOUND.into_response(),
            CoordToken::OutOfRange => return StatusCode::BAD_REQUEST.into_response(),
            CoordToken::Value(v) => *slot = v,
        }
    }
    let coord = TileCoord {
        z: coords[0],
        x: coords[1],
        y: coords[2],
    };
    if !coord.is_valid() {
        return StatusCode::BAD_REQUEST.into_response();
    }

    debug!(
        "Tile request: layer={} z={} x={} y={}",
        params.layer, coord.z, coord.x, coord.y
    );

    let key = coord.cache_key(&params.layer);
    if let Some(tile) = state.cache.get(&key) {
        return tile_response(tile, "HIT", state.browser_cache_max_age);
    }

    // Dropping the guard (client disconnect, timeout) cancels the token and
    // with it the in-flight render.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let layer = match state.source.layer(&params.layer).await {
        Ok(layer) => layer,
        Err(CatalogError::LayerNotFound(_)) | Err(CatalogError::LayerFiltered(_)) => {
            debug!("Layer not found: {}", params.layer);
            return StatusCode::NOT_FOUND.into_response();
        }
        Err(e) => {
            error!("Error resolving layer {}: {}", params.layer, e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let tile = match state.source.render_tile(&layer, coord, cancel.clone()).await {
        Ok(tile) => tile,
        Err(TileError::Cancelled) => return StatusCode::SERVICE_UNAVAILABLE.into_response(),
        Err(TileError::Catalog(CatalogError::LayerNotFound(_)))
        | Err(TileError::Catalog(CatalogError::LayerFiltered(_))) => {
            return StatusCode::NOT_FOUND.into_response();
        }
        Err(e) => {
            error!("Error generating tile {}: {}", key, e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // Detached cache fill: the tile is an owned payload, and the write must
    // survive request cancellation since the work already completed.
    if state.cache.enabled() {
        let cache = Arc::clone(&state.cache);
        let payload = tile.clone();
        tokio::spawn(async move {
            cache.set(&key, &payload);
        });
    }

    tile_response(tile, "MISS", state.browser_cache_max_age)
}

/// Build a tile response with the headers every tile answer carries.
fn tile_response(data: Bytes, cache_state: &str, max_age: u32) -> Response {
    let status = if data.is_empty() {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::OK
    };

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, CONTENT_TYPE_MVT)
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(header::CACHE_CONTROL, format!("public, max-age={max_age}"))
        .header("X-Cache", cache_state)
        .body(Body::from(data))
        .unwrap()
}

/// List all visible layers with bounds.
pub async fn layers_handler<S: TileSource>(State(state): State<AppState<S>>) -> Response {
    debug!("Layers request");

    match state.source.layers().await {
        Ok(layers) => Json(LayersResponse { layers }).into_response(),
        Err(e) => {
            error!("Error retrieving layers: {}", e);
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error retrieving layers: {e}"),
            )
        }
    }
}

/// Serve TileJSON metadata for a layer.
///
/// The route captures `{layer}.json` as one segment; anything without the
/// `.json` suffix is a routing miss.
pub async fn tilejson_handler<S: TileSource>(
    State(state): State<AppState<S>>,
    Path(layer_param): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Some(name) = layer_param.strip_suffix(".json") else {
        return json_error(StatusCode::NOT_FOUND, "Not found");
    };

    debug!("TileJSON request for layer: {}", name);

    let layer = match state.source.layer(name).await {
        Ok(layer) => layer,
        Err(CatalogError::LayerNotFound(_)) | Err(CatalogError::LayerFiltered(_)) => {
            return json_error(StatusCode::NOT_FOUND, format!("Layer not found: {name}"));
        }
        Err(e) => {
            error!("Error resolving layer {}: {}", name, e);
            return json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error generating TileJSON: {e}"),
            );
        }
    };

    // Bounds are a nicety here; failures just omit them.
    let bounds = match state.source.layer_bounds(&layer).await {
        Ok(bounds) => bounds,
        Err(e) => {
            warn!("Error getting bounds for layer {}: {}", name, e);
            None
        }
    };

    let base = base_url(&state, &headers);
    Json(build_tilejson(&layer, bounds, &base)).into_response()
}

/// Health check: database, spatial extension, and cache status.
pub async fn health_handler<S: TileSource>(State(state): State<AppState<S>>) -> Response {
    debug!("Health check request");

    let store = state.source.health().await;

    let (status, code) = if !store.database_ok {
        ("error", StatusCode::SERVICE_UNAVAILABLE)
    } else if !store.spatial_ok {
        ("degraded", StatusCode::OK)
    } else {
        ("ok", StatusCode::OK)
    };

    let cache = CacheStatus {
        enabled: state.cache.enabled(),
        stats: state.cache.enabled().then(|| state.cache.stats()),
    };

    let body = HealthResponse {
        status: status.to_string(),
        database: if store.database_ok {
            "connected".to_string()
        } else {
            "disconnected".to_string()
        },
        spatial_extension: if store.spatial_ok {
            "loaded".to_string()
        } else {
            "not loaded".to_string()
        },
        cache,
    };

    (code, Json(body)).into_response()
}

/// Absolute URL base for links in TileJSON documents: the configured
/// `url_base` when set, otherwise derived from the request headers. The
/// configured base path is appended either way.
fn base_url<S>(state: &AppState<S>, headers: &HeaderMap) -> String {
    let root = match &state.url_base {
        Some(base) => base.trim_end_matches('/').to_string(),
        None => {
            let scheme = headers
                .get("x-forwarded-proto")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("http");
            let host = headers
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("localhost");
            format!("{scheme}://{host}")
        }
    };
    format!("{root}{}", state.base_path)
}
