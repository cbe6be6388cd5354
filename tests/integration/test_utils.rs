//! Shared test fixtures: a mock tile source and router builders.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use mvt_tileserver::catalog::{Extent, Layer, SourceCrs, SRID_3857};
use mvt_tileserver::error::{CatalogError, StoreError, TileError};
use mvt_tileserver::server::{create_router, AppState, RouterConfig};
use mvt_tileserver::store::StoreHealth;
use mvt_tileserver::tile::{TileCache, TileCoord, TileSource};

/// A plausible MVT payload, comfortably above the 10-byte floor.
pub fn mvt_body() -> Bytes {
    Bytes::from_static(&[
        0x1a, 0x2c, 0x78, 0x02, 0x0a, 0x09, 0x62, 0x75, 0x69, 0x6c, 0x64, 0x69, 0x6e, 0x67, 0x73,
        0x12, 0x0b, 0x12, 0x02, 0x00, 0x00, 0x18, 0x03, 0x22, 0x03, 0x09, 0x00, 0x00,
    ])
}

/// How the mock's render step should fail, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderFailure {
    None,
    Cancelled,
    Generation,
}

/// In-memory [`TileSource`] for exercising the router without a database.
pub struct MockTileSource {
    layers: HashMap<String, Arc<Layer>>,
    tile_body: Bytes,
    empty_tiles: HashSet<(u32, u32, u32)>,
    bounds: Option<Extent>,
    healthy: bool,
    failure: RenderFailure,
    render_delay: Option<Duration>,
    render_count: Arc<AtomicUsize>,
}

impl MockTileSource {
    pub fn new() -> Self {
        Self {
            layers: HashMap::new(),
            tile_body: mvt_body(),
            empty_tiles: HashSet::new(),
            bounds: None,
            healthy: true,
            failure: RenderFailure::None,
            render_delay: None,
            render_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_layer(mut self, name: &str) -> Self {
        let layer = Layer {
            name: name.to_string(),
            table: name.to_string(),
            geometry_column: "geom".to_string(),
            geometry_type: Some("POLYGON".to_string()),
            srid: SRID_3857,
            source_crs: SourceCrs::Mercator,
            bounds: None,
            properties: vec!["id".to_string(), "name".to_string()],
            property_types: HashMap::from([
                ("id".to_string(), "INTEGER".to_string()),
                ("name".to_string(), "VARCHAR".to_string()),
            ]),
        };
        self.layers.insert(name.to_string(), Arc::new(layer));
        self
    }

    /// Mark a tile as containing no features.
    pub fn with_empty_tile(mut self, z: u32, x: u32, y: u32) -> Self {
        self.empty_tiles.insert((z, x, y));
        self
    }

    pub fn with_bounds(mut self, bounds: Extent) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn with_health(mut self, healthy: bool) -> Self {
        self.healthy = healthy;
        self
    }

    pub fn with_failure(mut self, failure: RenderFailure) -> Self {
        self.failure = failure;
        self
    }

    pub fn with_render_delay(mut self, delay: Duration) -> Self {
        self.render_delay = Some(delay);
        self
    }

    /// Handle to the render-call counter, for asserting cache bypasses.
    pub fn render_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.render_count)
    }
}

#[async_trait]
impl TileSource for MockTileSource {
    async fn layers(&self) -> Result<Vec<Layer>, CatalogError> {
        let mut layers: Vec<Layer> = self
            .layers
            .values()
            .map(|l| {
                let mut layer = (**l).clone();
                layer.bounds = self.bounds;
                layer
            })
            .collect();
        layers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(layers)
    }

    async fn layer(&self, name: &str) -> Result<Arc<Layer>, CatalogError> {
        self.layers
            .get(name)
            .cloned()
            .ok_or_else(|| CatalogError::LayerNotFound(name.to_string()))
    }

    async fn layer_bounds(&self, _layer: &Layer) -> Result<Option<Extent>, CatalogError> {
        Ok(self.bounds)
    }

    async fn render_tile(
        &self,
        _layer: &Layer,
        coord: TileCoord,
        _cancel: CancellationToken,
    ) -> Result<Bytes, TileError> {
        self.render_count.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.render_delay {
            tokio::time::sleep(delay).await;
        }

        match self.failure {
            RenderFailure::Cancelled => return Err(TileError::Cancelled),
            RenderFailure::Generation => {
                return Err(TileError::Generation(StoreError::Runtime(
                    "mock store failure".to_string(),
                )))
            }
            RenderFailure::None => {}
        }

        if self.empty_tiles.contains(&(coord.z, coord.x, coord.y)) {
            Ok(Bytes::new())
        } else {
            Ok(self.tile_body.clone())
        }
    }

    async fn health(&self) -> StoreHealth {
        StoreHealth {
            database_ok: self.healthy,
            spatial_ok: self.healthy,
        }
    }

    fn invalidate_metadata(&self, _layer: Option<&str>) {}
}

/// Router over the mock source with an enabled cache and default options.
pub fn test_router(source: MockTileSource) -> Router {
    test_router_with_config(source, RouterConfig::new().with_tracing(false))
}

/// Router over the mock source with explicit router options.
pub fn test_router_with_config(source: MockTileSource, config: RouterConfig) -> Router {
    let cache = TileCache::new(NonZeroUsize::new(256).unwrap(), 16);
    let state = AppState::new(source, cache).with_browser_cache_max_age(3600);
    create_router(state, config)
}

/// Router with the tile cache disabled.
pub fn test_router_without_cache(source: MockTileSource) -> Router {
    let state = AppState::new(source, TileCache::disabled());
    create_router(state, RouterConfig::new().with_tracing(false))
}
