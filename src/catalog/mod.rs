//! Layer metadata catalog.
//!
//! Resolves layer names to the metadata the tile engine needs: the geometry
//! column, the inferred source CRS, and the property columns with their
//! declared types. Lookups on the tile path are memoized; the listing path
//! additionally computes bounds, which is allowed to be expensive.
//!
//! # Source CRS inference
//!
//! The store does not persist an SRID per geometry. The catalog samples one
//! centroid X coordinate per layer: an absolute value above 360 cannot be a
//! longitude, so the data is taken to be Web Mercator; otherwise it is
//! treated as lon/lat. A table mixing both inside one column is undefined
//! behavior under this scheme.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use duckdb::params;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{CatalogError, StoreError};
use crate::store::Store;

/// SRID of the tile coordinate system; all published bounds use it.
pub const SRID_3857: i32 = 3857;

/// Coordinate system of a layer's stored geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceCrs {
    /// EPSG:3857, no transform needed for tiles
    Mercator,
    /// EPSG:4326, transformed to Mercator at query time
    LonLat,
}

impl SourceCrs {
    /// Classify a sampled centroid X coordinate.
    pub fn from_sample_x(x: f64) -> Self {
        if x.abs() > 360.0 {
            SourceCrs::Mercator
        } else {
            SourceCrs::LonLat
        }
    }
}

/// A Mercator-space bounding rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Extent {
    pub minx: f64,
    pub miny: f64,
    pub maxx: f64,
    pub maxy: f64,
}

/// A tileable source table.
///
/// Layers handed out by the catalog are `Arc`-shared and immutable after
/// publication.
#[derive(Debug, Clone, Serialize)]
pub struct Layer {
    pub name: String,
    pub table: String,
    pub geometry_column: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry_type: Option<String>,
    /// SRID of published bounds, always 3857
    pub srid: i32,
    #[serde(skip)]
    pub source_crs: SourceCrs,
    /// Only populated on the listing path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Extent>,
    /// Non-geometry columns in declaration order
    pub properties: Vec<String>,
    /// Declared type per property column; drives MVT casting
    #[serde(skip)]
    pub property_types: HashMap<String, String>,
}

/// Quote a catalog-derived identifier for interpolation into SQL.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a string as a SQL literal.
pub fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Catalog of tileable layers with a memoized metadata cache.
pub struct LayerCatalog {
    store: Store,
    table_includes: HashSet<String>,
    table_excludes: HashSet<String>,
    metadata: RwLock<HashMap<String, Arc<Layer>>>,
}

/// Discovery result before the visibility check.
struct DiscoveredLayer {
    schema: String,
    layer: Layer,
}

impl LayerCatalog {
    pub fn new(store: Store) -> Self {
        info!("Layer metadata cache initialized");
        Self {
            store,
            table_includes: HashSet::new(),
            table_excludes: HashSet::new(),
            metadata: RwLock::new(HashMap::new()),
        }
    }

    /// Install the include/exclude lists. Matching is case-insensitive and
    /// exact on the whole name.
    pub fn set_include_exclude(&mut self, includes: &[String], excludes: &[String]) {
        self.table_includes = includes.iter().map(|n| n.to_lowercase()).collect();
        self.table_excludes = excludes.iter().map(|n| n.to_lowercase()).collect();
    }

    /// Whether a table passes the include/exclude policy.
    fn is_visible(&self, schema: &str, table: &str) -> bool {
        table_visible(&self.table_includes, &self.table_excludes, schema, table)
    }

    /// Drop cached metadata: everything, or one layer.
    pub fn invalidate(&self, layer: Option<&str>) {
        let mut cache = self.metadata.write();
        match layer {
            None => {
                cache.clear();
                info!("Layer metadata cache cleared (all layers)");
            }
            Some(name) => {
                cache.remove(name);
                info!("Layer metadata cache cleared for: {}", name);
            }
        }
    }

    /// Resolve a layer for tile generation, without bounds.
    ///
    /// Cheap after the first call for a given name: subsequent lookups are
    /// served from the metadata cache and do not touch the store.
    pub async fn get_layer_by_name(&self, name: &str) -> Result<Arc<Layer>, CatalogError> {
        if let Some(layer) = self.metadata.read().get(name) {
            return Ok(Arc::clone(layer));
        }

        let discovered = self
            .discover_layer(name)
            .await?
            .ok_or_else(|| CatalogError::LayerNotFound(name.to_string()))?;

        if !self.is_visible(&discovered.schema, name) {
            return Err(CatalogError::LayerFiltered(name.to_string()));
        }

        let layer = Arc::new(discovered.layer);
        let mut cache = self.metadata.write();
        let entry = cache
            .entry(name.to_string())
            .or_insert_with(|| Arc::clone(&layer));
        Ok(Arc::clone(entry))
    }

    /// List all visible layers, with bounds. Listing-path only; every call
    /// scans the geometry columns of every visible table.
    pub async fn get_layers(&self) -> Result<Vec<Layer>, CatalogError> {
        let includes = self.table_includes.clone();
        let excludes = self.table_excludes.clone();

        let layers = self
            .store
            .run(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT schema_name, table_name, column_name \
                     FROM duckdb_columns() \
                     WHERE data_type = 'GEOMETRY' \
                     ORDER BY table_name, column_index",
                )?;
                let rows: Vec<(String, String, String)> = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                    .collect::<Result<_, _>>()?;

                let mut layers = Vec::new();
                let mut seen = HashSet::new();
                for (schema, table, geom_column) in rows {
                    if !seen.insert(table.clone()) {
                        warn!(
                            "Table {} has multiple geometry columns, using first one: {}",
                            table, geom_column
                        );
                        continue;
                    }
                    if !table_visible(&includes, &excludes, &schema, &table) {
                        continue;
                    }

                    let mut layer = Layer {
                        name: table.clone(),
                        table: table.clone(),
                        geometry_column: geom_column,
                        geometry_type: None,
                        srid: SRID_3857,
                        source_crs: SourceCrs::LonLat,
                        bounds: None,
                        properties: Vec::new(),
                        property_types: HashMap::new(),
                    };
                    if let Err(e) = enrich_layer(conn, &mut layer) {
                        warn!("Error enriching layer {} metadata: {}", table, e);
                    }
                    layers.push(layer);
                }
                Ok(layers)
            })
            .await?;

        info!("Found {} layers with geometry columns", layers.len());
        Ok(layers)
    }

    /// Compute Mercator bounds for a single layer (TileJSON path).
    pub async fn layer_bounds(&self, layer: &Layer) -> Result<Option<Extent>, CatalogError> {
        let table = layer.table.clone();
        let geom_column = layer.geometry_column.clone();
        let bounds = self
            .store
            .run(move |conn| Ok(read_bounds(conn, &table, &geom_column)?.map(|(extent, _)| extent)))
            .await?;
        Ok(bounds)
    }

    /// One store round-trip discovering geometry column, source CRS, and
    /// property columns for a named table. `None` means no geometry column.
    async fn discover_layer(&self, name: &str) -> Result<Option<DiscoveredLayer>, CatalogError> {
        let table = name.to_string();
        let discovered = self
            .store
            .run(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT schema_name, column_name \
                     FROM duckdb_columns() \
                     WHERE table_name = ? AND data_type = 'GEOMETRY' \
                     ORDER BY column_index",
                )?;
                let geom_cols: Vec<(String, String)> = stmt
                    .query_map(params![table], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<_, _>>()?;

                let Some((schema, geom_column)) = geom_cols.first().cloned() else {
                    return Ok(None);
                };
                if geom_cols.len() > 1 {
                    warn!(
                        "Table {} has multiple geometry columns, using first one: {}",
                        table, geom_column
                    );
                }

                // Sample one centroid to infer the source CRS; any failure
                // defaults to lon/lat.
                let sample_sql = format!(
                    "SELECT ST_X(ST_Centroid({geom})) FROM {tbl} WHERE {geom} IS NOT NULL LIMIT 1",
                    geom = quote_ident(&geom_column),
                    tbl = quote_ident(&table),
                );
                let sample_x: Option<f64> = conn
                    .query_row(&sample_sql, [], |row| row.get::<_, Option<f64>>(0))
                    .ok()
                    .flatten();
                let source_crs = sample_x
                    .map(SourceCrs::from_sample_x)
                    .unwrap_or(SourceCrs::LonLat);
                debug!("Layer {} source CRS: {:?}", table, source_crs);

                let (properties, property_types) = read_properties(conn, &table)?;

                Ok(Some(DiscoveredLayer {
                    schema,
                    layer: Layer {
                        name: table.clone(),
                        table: table.clone(),
                        geometry_column: geom_column,
                        geometry_type: None,
                        srid: SRID_3857,
                        source_crs,
                        bounds: None,
                        properties,
                        property_types,
                    },
                }))
            })
            .await?;
        Ok(discovered)
    }
}

fn table_visible(
    includes: &HashSet<String>,
    excludes: &HashSet<String>,
    schema: &str,
    table: &str,
) -> bool {
    let schema_low = schema.to_lowercase();
    let table_low = table.to_lowercase();

    let included = includes.is_empty()
        || includes.contains(&schema_low)
        || includes.contains(&table_low);
    let excluded = excludes.contains(&schema_low) || excludes.contains(&table_low);

    included && !excluded
}

/// Read property columns and their declared types in declaration order.
fn read_properties(
    conn: &duckdb::Connection,
    table: &str,
) -> Result<(Vec<String>, HashMap<String, String>), StoreError> {
    let mut stmt = conn.prepare(
        "SELECT column_name, data_type \
         FROM duckdb_columns() \
         WHERE table_name = ? AND data_type <> 'GEOMETRY' \
         ORDER BY column_index",
    )?;
    let rows: Vec<(String, String)> = stmt
        .query_map(params![table], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<_, _>>()?;

    let mut properties = Vec::with_capacity(rows.len());
    let mut property_types = HashMap::with_capacity(rows.len());
    for (column, data_type) in rows {
        properties.push(column.clone());
        property_types.insert(column, data_type);
    }
    Ok((properties, property_types))
}

/// Compute the table envelope natively and transformed to Mercator in one
/// statement, then decide which set to publish from the native coordinate
/// range. Returns the Mercator extent and the inferred source CRS.
///
/// Axis order of the transform is pinned with `always_xy := true`; without
/// it some store versions emit lat/lon order and the published rectangle
/// comes out swapped.
fn read_bounds(
    conn: &duckdb::Connection,
    table: &str,
    geom_column: &str,
) -> Result<Option<(Extent, SourceCrs)>, StoreError> {
    let geom = quote_ident(geom_column);
    let tbl = quote_ident(table);
    let sql = format!(
        "WITH extent_calc AS ( \
             SELECT ST_Extent({geom}) AS extent FROM {tbl} WHERE {geom} IS NOT NULL \
         ) \
         SELECT \
             ST_XMin(extent), ST_YMin(extent), ST_XMax(extent), ST_YMax(extent), \
             ST_XMin(ST_Transform(extent, 'EPSG:4326', 'EPSG:3857', always_xy := true)), \
             ST_YMin(ST_Transform(extent, 'EPSG:4326', 'EPSG:3857', always_xy := true)), \
             ST_XMax(ST_Transform(extent, 'EPSG:4326', 'EPSG:3857', always_xy := true)), \
             ST_YMax(ST_Transform(extent, 'EPSG:4326', 'EPSG:3857', always_xy := true)) \
         FROM extent_calc",
    );

    type BoundsRow = (
        Option<f64>,
        Option<f64>,
        Option<f64>,
        Option<f64>,
        Option<f64>,
        Option<f64>,
        Option<f64>,
        Option<f64>,
    );
    let row: BoundsRow = conn.query_row(&sql, [], |row| {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
        ))
    })?;

    let (n_minx, n_miny, n_maxx, n_maxy, t_minx, t_miny, t_maxx, t_maxy) = row;
    let (Some(n_minx), Some(n_miny), Some(n_maxx), Some(n_maxy)) =
        (n_minx, n_miny, n_maxx, n_maxy)
    else {
        // No extent, perhaps an empty table or a view.
        return Ok(None);
    };

    let max_abs_x = n_minx.abs().max(n_maxx.abs());
    if max_abs_x > 360.0 {
        // Already Web Mercator, publish the native rectangle.
        return Ok(Some((
            Extent {
                minx: n_minx,
                miny: n_miny,
                maxx: n_maxx,
                maxy: n_maxy,
            },
            SourceCrs::Mercator,
        )));
    }

    let (Some(minx), Some(miny), Some(maxx), Some(maxy)) = (t_minx, t_miny, t_maxx, t_maxy) else {
        return Ok(None);
    };
    Ok(Some((
        Extent {
            minx,
            miny,
            maxx,
            maxy,
        },
        SourceCrs::LonLat,
    )))
}

/// Add geometry type, bounds, source CRS, and properties to a listing-path
/// layer. Failures leave the layer with whatever was gathered so far.
fn enrich_layer(conn: &duckdb::Connection, layer: &mut Layer) -> Result<(), StoreError> {
    let sample_sql = format!(
        "SELECT ST_GeometryType({geom}) FROM {tbl} WHERE {geom} IS NOT NULL LIMIT 1",
        geom = quote_ident(&layer.geometry_column),
        tbl = quote_ident(&layer.table),
    );
    layer.geometry_type = conn
        .query_row(&sample_sql, [], |row| row.get::<_, Option<String>>(0))
        .ok()
        .flatten();

    if let Some((extent, source_crs)) = read_bounds(conn, &layer.table, &layer.geometry_column)? {
        layer.bounds = Some(extent);
        layer.source_crs = source_crs;
    }

    let (properties, property_types) = read_properties(conn, &layer.table)?;
    layer.properties = properties;
    layer.property_types = property_types;
    Ok(())
}
