//! MVT tile server for DuckDB spatial databases.
//!
//! This library serves Mapbox Vector Tiles from the tables of a DuckDB
//! database with the spatial extension, fronted by an in-memory LRU tile
//! cache. Clients address tiles with the XYZ Web Mercator scheme.

pub mod catalog;
pub mod config;
pub mod error;
pub mod server;
pub mod store;
pub mod tile;

// Re-export commonly used types
pub use catalog::{Extent, Layer, LayerCatalog, SourceCrs};
pub use config::Config;
pub use error::{CatalogError, StoreError, TileError};
pub use server::{create_router, AppState, RouterConfig};
pub use store::{Store, StoreHealth};
pub use tile::{DbTileSource, TileCache, TileCoord, TileEngine, TileSource};
