//! HTTP server layer.
//!
//! This module exposes the tile API over axum. Handlers are generic over
//! [`crate::tile::TileSource`] so the whole surface can be exercised
//! in-process against a mock backend.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                          HTTP Layer                            │
//! │      GET /tiles/{layer}/{z}/{x}/{y}.mvt                        │
//! │                                                                │
//! │  ┌────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │  handlers  │  │ cache_admin │  │         routes          │  │
//! │  │ (requests) │  │ (X-API-Key) │  │ (router + timeout)      │  │
//! │  └────────────┘  └─────────────┘  └─────────────────────────┘  │
//! └────────────────────────────────────────────────────────────────┘
//! ```

pub mod cache_admin;
pub mod handlers;
pub mod routes;
pub mod tilejson;

pub use cache_admin::{cache_auth_middleware, CacheApiAuth};
pub use handlers::{
    health_handler, layers_handler, tile_handler, tilejson_handler, AppState, CacheStatus,
    ErrorResponse, HealthResponse, LayersResponse, TilePathParams, CONTENT_TYPE_MVT,
};
pub use routes::{create_router, RouterConfig};
pub use tilejson::{build_tilejson, TileJson, VectorLayer};
