//! TileJSON 3.0.0 documents for layers.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::catalog::{Extent, Layer};

pub const TILEJSON_VERSION: &str = "3.0.0";
pub const TILEJSON_MIN_ZOOM: u32 = 0;
pub const TILEJSON_MAX_ZOOM: u32 = 22;

/// Default zoom published in the `center` triple.
const CENTER_ZOOM: f64 = 10.0;

/// TileJSON document for one layer.
#[derive(Debug, Serialize)]
pub struct TileJson {
    pub tilejson: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub scheme: String,
    pub tiles: Vec<String>,
    pub minzoom: u32,
    pub maxzoom: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<[f64; 4]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center: Option<[f64; 3]>,
    pub vector_layers: Vec<VectorLayer>,
}

/// Descriptor for one vector layer inside a tile set.
#[derive(Debug, Serialize)]
pub struct VectorLayer {
    pub id: String,
    pub minzoom: u32,
    pub maxzoom: u32,
    pub fields: BTreeMap<String, String>,
}

/// Build the TileJSON document for a layer.
///
/// Field types are simplified to `"string"` across the board; clients that
/// need exact types can read the layer listing instead.
pub fn build_tilejson(layer: &Layer, bounds: Option<Extent>, base_url: &str) -> TileJson {
    let tile_url = format!("{base_url}/tiles/{}/{{z}}/{{x}}/{{y}}.mvt", layer.name);

    let bounds_arr = bounds.map(|b| [b.minx, b.miny, b.maxx, b.maxy]);
    let center = bounds.map(|b| {
        [
            (b.minx + b.maxx) / 2.0,
            (b.miny + b.maxy) / 2.0,
            CENTER_ZOOM,
        ]
    });

    let fields: BTreeMap<String, String> = layer
        .properties
        .iter()
        .map(|p| (p.clone(), "string".to_string()))
        .collect();

    TileJson {
        tilejson: TILEJSON_VERSION.to_string(),
        name: Some(layer.name.clone()),
        version: Some("1.0.0".to_string()),
        scheme: "xyz".to_string(),
        tiles: vec![tile_url],
        minzoom: TILEJSON_MIN_ZOOM,
        maxzoom: TILEJSON_MAX_ZOOM,
        bounds: bounds_arr,
        center,
        vector_layers: vec![VectorLayer {
            id: layer.name.clone(),
            minzoom: TILEJSON_MIN_ZOOM,
            maxzoom: TILEJSON_MAX_ZOOM,
            fields,
        }],
    }
}
