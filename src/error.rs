use thiserror::Error;

/// Errors from the DuckDB store layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Error reported by DuckDB itself
    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),

    /// Connection pool failure (exhausted or broken)
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// The query was abandoned before execution
    #[error("query cancelled")]
    Cancelled,

    /// Blocking worker failed to complete (panic or runtime shutdown)
    #[error("worker failure: {0}")]
    Runtime(String),
}

/// Errors from layer metadata discovery.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// No table with a geometry column matches the requested name
    #[error("layer not found: {0}")]
    LayerNotFound(String),

    /// The table exists but is hidden by the include/exclude policy
    #[error("layer not included: {0}")]
    LayerFiltered(String),

    /// Metadata discovery query failed
    #[error("catalog query failed: {0}")]
    Database(#[from] StoreError),
}

/// Errors from tile generation.
#[derive(Debug, Error)]
pub enum TileError {
    /// Layer resolution failed; propagated verbatim from the catalog
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The MVT query failed against the store
    #[error("tile generation failed: {0}")]
    Generation(StoreError),

    /// Client disconnected or the request deadline fired
    #[error("request cancelled")]
    Cancelled,
}
