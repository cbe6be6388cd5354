//! DuckDB store access.
//!
//! This module owns the connection pool against the spatial database and the
//! bridge between the async runtime and DuckDB's blocking client. All SQL in
//! the crate runs through [`Store::run`], which checks a connection out of
//! the pool on the blocking thread pool so store round-trips never stall the
//! request executor.
//!
//! The database is opened read-only in spirit: nothing in this crate issues
//! writes, and the spatial extension is loaded on every connection the pool
//! creates.

use std::time::Duration;

use duckdb::{Connection, DuckdbConnectionManager};
use tracing::{info, warn};

use crate::config::DatabaseOptions;
use crate::error::StoreError;

/// Health probe results for the store.
#[derive(Debug, Clone, Copy)]
pub struct StoreHealth {
    /// The database answered a trivial query
    pub database_ok: bool,

    /// The spatial extension answered a geometry function call
    pub spatial_ok: bool,
}

/// Pooled handle to the DuckDB database.
///
/// Cloning is cheap; all clones share one pool. The pool size is the upper
/// bound on concurrent store queries, so tile requests beyond it queue on
/// checkout rather than piling onto the database.
#[derive(Clone)]
pub struct Store {
    pool: r2d2::Pool<DuckdbConnectionManager>,
}

/// Loads the spatial extension on every connection the pool creates.
///
/// Connections are recycled past `max_lifetime`/`idle_timeout`, so a
/// startup-only load would leave later replacements without `ST_*`
/// functions. A failed load is logged but not fatal; the health endpoint
/// reports the extension as missing.
#[derive(Debug)]
struct SpatialExtension;

impl r2d2::CustomizeConnection<Connection, duckdb::Error> for SpatialExtension {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), duckdb::Error> {
        if let Err(e) = conn.execute_batch("INSTALL spatial; LOAD spatial;") {
            warn!("Failed to load spatial extension: {}", e);
        }
        Ok(())
    }
}

impl Store {
    /// Open the database file and configure the connection pool.
    ///
    /// Every pooled connection loads the spatial extension as it is created;
    /// a failure to load is logged but not fatal (the health endpoint
    /// reports it as degraded).
    pub fn open(opts: &DatabaseOptions) -> Result<Self, StoreError> {
        let manager = DuckdbConnectionManager::file(&opts.database_path)?;
        let store = Self::build(manager, opts)?;
        info!("Connected to DuckDB: {}", opts.database_path);
        Ok(store)
    }

    /// Open an in-memory database. Intended for tests.
    pub fn open_in_memory(opts: &DatabaseOptions) -> Result<Self, StoreError> {
        let manager = DuckdbConnectionManager::memory()?;
        Self::build(manager, opts)
    }

    fn build(manager: DuckdbConnectionManager, opts: &DatabaseOptions) -> Result<Self, StoreError> {
        let pool = r2d2::Pool::builder()
            .max_size(opts.max_open_conns)
            .min_idle(Some(opts.max_idle_conns.min(opts.max_open_conns)))
            .max_lifetime(Some(Duration::from_secs(opts.conn_max_lifetime)))
            .idle_timeout(Some(Duration::from_secs(opts.conn_max_idle_time)))
            .connection_customizer(Box::new(SpatialExtension))
            .build(manager)?;

        info!(
            "Connection pool configured: max_open_conns={} max_idle_conns={} conn_max_lifetime={}s conn_max_idle_time={}s",
            opts.max_open_conns, opts.max_idle_conns, opts.conn_max_lifetime, opts.conn_max_idle_time
        );

        Ok(Self { pool })
    }

    /// Run a blocking closure against a pooled connection.
    ///
    /// The closure executes on tokio's blocking thread pool; pool checkout
    /// errors and DuckDB errors both surface as [`StoreError`].
    pub async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Runtime(e.to_string()))?
    }

    /// Verify the database answers queries.
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.run(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i32>(0))
                .map_err(StoreError::from)?;
            Ok(())
        })
        .await
    }

    /// Verify the spatial extension is loaded.
    pub async fn spatial_loaded(&self) -> bool {
        self.run(|conn| {
            conn.query_row("SELECT ST_AsText(ST_Point(0, 0))", [], |row| {
                row.get::<_, String>(0)
            })
            .map_err(StoreError::from)?;
            Ok(())
        })
        .await
        .is_ok()
    }

    /// Run both health probes.
    pub async fn health(&self) -> StoreHealth {
        let database_ok = match self.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Database ping failed: {}", e);
                false
            }
        };

        let spatial_ok = database_ok && self.spatial_loaded().await;

        StoreHealth {
            database_ok,
            spatial_ok,
        }
    }
}
