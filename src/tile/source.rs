//! The seam between the HTTP layer and the spatial store.
//!
//! Handlers are generic over [`TileSource`] so the router can be exercised
//! in tests without a database. [`DbTileSource`] is the production
//! implementation, composing the layer catalog and the tile engine over one
//! shared store.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::catalog::{Extent, Layer, LayerCatalog};
use crate::error::{CatalogError, TileError};
use crate::store::{Store, StoreHealth};
use crate::tile::{TileCoord, TileEngine};

/// Everything the HTTP layer needs from the spatial backend.
#[async_trait]
pub trait TileSource: Send + Sync + 'static {
    /// All visible layers, with bounds. Listing path.
    async fn layers(&self) -> Result<Vec<Layer>, CatalogError>;

    /// Resolve one layer for tile generation, without bounds. Tile path;
    /// must be cheap after the first call.
    async fn layer(&self, name: &str) -> Result<Arc<Layer>, CatalogError>;

    /// Mercator bounds for a single layer, if computable.
    async fn layer_bounds(&self, layer: &Layer) -> Result<Option<Extent>, CatalogError>;

    /// Render the MVT payload for one tile of a resolved layer.
    async fn render_tile(
        &self,
        layer: &Layer,
        coord: TileCoord,
        cancel: CancellationToken,
    ) -> Result<Bytes, TileError>;

    /// Probe the backing store.
    async fn health(&self) -> StoreHealth;

    /// Drop cached layer metadata (everything, or one layer).
    fn invalidate_metadata(&self, layer: Option<&str>);
}

/// DuckDB-backed tile source.
pub struct DbTileSource {
    catalog: LayerCatalog,
    engine: TileEngine,
    store: Store,
}

impl DbTileSource {
    pub fn new(store: Store, catalog: LayerCatalog) -> Self {
        Self {
            catalog,
            engine: TileEngine::new(store.clone()),
            store,
        }
    }
}

#[async_trait]
impl TileSource for DbTileSource {
    async fn layers(&self) -> Result<Vec<Layer>, CatalogError> {
        self.catalog.get_layers().await
    }

    async fn layer(&self, name: &str) -> Result<Arc<Layer>, CatalogError> {
        self.catalog.get_layer_by_name(name).await
    }

    async fn layer_bounds(&self, layer: &Layer) -> Result<Option<Extent>, CatalogError> {
        self.catalog.layer_bounds(layer).await
    }

    async fn render_tile(
        &self,
        layer: &Layer,
        coord: TileCoord,
        cancel: CancellationToken,
    ) -> Result<Bytes, TileError> {
        self.engine.render(layer, coord, cancel).await
    }

    async fn health(&self) -> StoreHealth {
        self.store.health().await
    }

    fn invalidate_metadata(&self, layer: Option<&str>) {
        self.catalog.invalidate(layer);
    }
}
