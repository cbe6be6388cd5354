//! MVT tile generation against the store.
//!
//! The engine synthesizes one SQL statement per (layer, tile) pair:
//!
//! 1. A tile envelope is computed in Mercator space from the bound
//!    `(z, x, y)` via `ST_TileEnvelope`.
//! 2. Rows are filtered to geometries intersecting the envelope.
//! 3. Lon/lat geometry is transformed to Mercator with the axis order
//!    pinned (`always_xy := true`).
//! 4. Geometry is clipped to the tile with `ST_AsMVTGeom` and aggregated
//!    into a single MVT payload named after the layer.
//!
//! Identifiers (table, geometry column, properties) come from the catalog
//! and are quoted; tile coordinates are bound parameters. Property columns
//! whose declared types the MVT encoder cannot carry are cast: decimals to
//! DOUBLE, everything else unsupported to VARCHAR.

use bytes::Bytes;
use duckdb::params;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::catalog::{quote_ident, quote_literal, Layer, SourceCrs};
use crate::error::{StoreError, TileError};
use crate::store::Store;
use crate::tile::TileCoord;

/// Payloads shorter than this are degenerate MVT framings some clients
/// reject; they are normalized to an empty tile.
pub const MIN_MVT_SIZE: usize = 10;

/// Declared types cast to VARCHAR for MVT encoding.
const TEXT_CAST_TYPES: &[&str] = &[
    "DATE",
    "TIME",
    "TIMESTAMP",
    "TIMESTAMP WITH TIME ZONE",
    "TIMESTAMPTZ",
    "INTERVAL",
    "BLOB",
    "BIT",
    "UUID",
    "JSON",
    "HUGEINT",
];

/// Composite type families cast to VARCHAR, matched by prefix.
const TEXT_CAST_PREFIXES: &[&str] = &["MAP", "LIST", "ARRAY", "UNION", "STRUCT"];

/// Generates MVT payloads for resolved layers.
pub struct TileEngine {
    store: Store,
}

impl TileEngine {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Produce the MVT payload for one tile.
    ///
    /// `NULL` or short scan results come back as empty bytes (a legitimate
    /// "no features" tile). Cancellation is honored both before the query
    /// runs and while waiting on it; a cancelled render returns
    /// [`TileError::Cancelled`] without scanning rows.
    pub async fn render(
        &self,
        layer: &Layer,
        coord: TileCoord,
        cancel: CancellationToken,
    ) -> Result<Bytes, TileError> {
        let sql = build_tile_query(layer);
        debug!(
            "Generating tile for layer={} z={} x={} y={}",
            layer.name, coord.z, coord.x, coord.y
        );

        let token = cancel.clone();
        let query = self.store.run(move |conn| {
            if token.is_cancelled() {
                return Err(StoreError::Cancelled);
            }
            let data: Option<Vec<u8>> = conn
                .query_row(&sql, params![coord.z, coord.x, coord.y], |row| row.get(0))?;
            Ok(data.unwrap_or_default())
        });

        let data = tokio::select! {
            _ = cancel.cancelled() => return Err(TileError::Cancelled),
            result = query => match result {
                Ok(data) => data,
                Err(StoreError::Cancelled) => return Err(TileError::Cancelled),
                Err(e) => return Err(TileError::Generation(e)),
            },
        };

        let tile = normalize_payload(data);
        debug!("Generated tile with {} bytes", tile.len());
        Ok(tile)
    }
}

/// Collapse degenerate scan results to the canonical empty tile.
pub fn normalize_payload(data: Vec<u8>) -> Bytes {
    if data.len() < MIN_MVT_SIZE {
        Bytes::new()
    } else {
        Bytes::from(data)
    }
}

/// Synthesize the MVT statement for a layer. Tile coordinates are the three
/// bound parameters, in (z, x, y) order.
pub fn build_tile_query(layer: &Layer) -> String {
    let geom_expr = geometry_expr(layer);
    let table = quote_ident(&layer.table);
    let layer_literal = quote_literal(&layer.name);

    let mut property_columns = String::new();
    for prop in &layer.properties {
        let data_type = layer
            .property_types
            .get(prop)
            .map(String::as_str)
            .unwrap_or("");
        property_columns.push_str(&property_expr(prop, data_type));
        property_columns.push_str(", ");
    }

    format!(
        "WITH bounds AS ( \
             SELECT ST_TileEnvelope(?, ?, ?) AS envelope \
         ), \
         features AS ( \
             SELECT {property_columns}ST_AsMVTGeom( \
                 {geom_expr}, \
                 (SELECT ST_Extent(envelope) FROM bounds) \
             ) AS geom \
             FROM {table}, bounds \
             WHERE ST_Intersects({geom_expr}, bounds.envelope) \
         ) \
         SELECT ST_AsMVT(features, {layer_literal}) FROM features WHERE geom IS NOT NULL",
    )
}

/// Geometry expression for the layer, transformed to Mercator when the
/// source data is lon/lat.
fn geometry_expr(layer: &Layer) -> String {
    let geom = quote_ident(&layer.geometry_column);
    match layer.source_crs {
        SourceCrs::Mercator => geom,
        SourceCrs::LonLat => {
            format!("ST_Transform({geom}, 'EPSG:4326', 'EPSG:3857', always_xy := true)")
        }
    }
}

/// Select expression for one property column, casting types the MVT encoder
/// does not support.
fn property_expr(name: &str, data_type: &str) -> String {
    let ident = quote_ident(name);
    let upper = data_type.to_uppercase();

    if upper.starts_with("DECIMAL") || upper.starts_with("NUMERIC") {
        return format!("CAST({ident} AS DOUBLE) AS {ident}");
    }
    if TEXT_CAST_TYPES.contains(&upper.as_str())
        || TEXT_CAST_PREFIXES.iter().any(|p| upper.starts_with(p))
    {
        return format!("CAST({ident} AS VARCHAR) AS {ident}");
    }
    ident
}
