//! Configuration for the tile server.
//!
//! Settings come from command-line arguments and `MVTS_`-prefixed
//! environment variables, with defaults for everything except the database
//! path.
//!
//! # Environment Variables
//!
//! - `MVTS_DATABASE_PATH` - DuckDB database file (required)
//! - `MVTS_DATABASE_TABLEINCLUDES` - comma-separated visible-table allowlist
//! - `MVTS_DATABASE_TABLEEXCLUDES` - comma-separated table denylist
//! - `MVTS_MAX_OPEN_CONNS` - connection pool size (default: 16)
//! - `MVTS_MAX_IDLE_CONNS` - idle connections kept warm (default: 4)
//! - `MVTS_CONN_MAX_LIFETIME` - pooled connection lifetime seconds (default: 3600)
//! - `MVTS_CONN_MAX_IDLE_TIME` - pooled connection idle seconds (default: 600)
//! - `MVTS_CACHE_ENABLED` - tile cache on/off (default: true)
//! - `MVTS_CACHE_MAX_ITEMS` - tile cache item bound (default: 10000)
//! - `MVTS_CACHE_MAX_MEMORY_MB` - tile cache advisory byte bound (default: 256)
//! - `MVTS_BROWSER_CACHE_MAX_AGE` - Cache-Control max-age seconds (default: 3600)
//! - `MVTS_CACHE_DISABLE_API` - hide the /cache routes (default: false)
//! - `MVTS_CACHE_API_KEY` - X-API-Key protecting the /cache routes
//! - `MVTS_HOST` / `MVTS_PORT` - bind address (default: 0.0.0.0:9000)
//! - `MVTS_URL_BASE` - absolute URL base used in TileJSON documents
//! - `MVTS_BASE_PATH` - route prefix, e.g. /tiles-api
//! - `MVTS_REQUEST_TIMEOUT` - server-wide handler timeout seconds (default: 30)

use clap::{Args, Parser};

/// Default bind host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 9000;

/// Default connection pool size.
pub const DEFAULT_MAX_OPEN_CONNS: u32 = 16;

/// Default tile cache item bound.
pub const DEFAULT_CACHE_MAX_ITEMS: usize = 10_000;

/// Default tile cache advisory memory bound in megabytes.
pub const DEFAULT_CACHE_MAX_MEMORY_MB: u64 = 256;

/// Default browser Cache-Control max-age in seconds (1 hour).
pub const DEFAULT_BROWSER_CACHE_MAX_AGE: u32 = 3600;

/// Database and connection pool settings.
#[derive(Args, Debug, Clone)]
pub struct DatabaseOptions {
    /// Path to the DuckDB database file.
    #[arg(long, env = "MVTS_DATABASE_PATH")]
    pub database_path: String,

    /// Tables (or schemas) to serve; empty means all tables with geometry.
    #[arg(long, env = "MVTS_DATABASE_TABLEINCLUDES", value_delimiter = ',')]
    pub table_includes: Vec<String>,

    /// Tables (or schemas) to hide.
    #[arg(long, env = "MVTS_DATABASE_TABLEEXCLUDES", value_delimiter = ',')]
    pub table_excludes: Vec<String>,

    /// Maximum open database connections.
    #[arg(long, default_value_t = DEFAULT_MAX_OPEN_CONNS, env = "MVTS_MAX_OPEN_CONNS")]
    pub max_open_conns: u32,

    /// Idle connections kept warm in the pool.
    #[arg(long, default_value_t = 4, env = "MVTS_MAX_IDLE_CONNS")]
    pub max_idle_conns: u32,

    /// Maximum lifetime of a pooled connection in seconds.
    #[arg(long, default_value_t = 3600, env = "MVTS_CONN_MAX_LIFETIME")]
    pub conn_max_lifetime: u64,

    /// Maximum idle time of a pooled connection in seconds.
    #[arg(long, default_value_t = 600, env = "MVTS_CONN_MAX_IDLE_TIME")]
    pub conn_max_idle_time: u64,
}

impl DatabaseOptions {
    /// Minimal options for unit tests against an in-memory database.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            database_path: ":memory:".to_string(),
            table_includes: Vec::new(),
            table_excludes: Vec::new(),
            max_open_conns: 2,
            max_idle_conns: 1,
            conn_max_lifetime: 3600,
            conn_max_idle_time: 600,
        }
    }
}

/// Tile cache settings.
#[derive(Args, Debug, Clone)]
pub struct CacheOptions {
    /// Enable the in-memory tile cache.
    #[arg(long, default_value_t = true, env = "MVTS_CACHE_ENABLED")]
    pub cache_enabled: bool,

    /// Maximum number of cached tiles.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_ITEMS, env = "MVTS_CACHE_MAX_ITEMS")]
    pub cache_max_items: usize,

    /// Advisory bound on cached tile bytes, in megabytes (0 = unbounded).
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_MEMORY_MB, env = "MVTS_CACHE_MAX_MEMORY_MB")]
    pub cache_max_memory_mb: u64,

    /// Cache-Control max-age sent with tile responses, in seconds.
    #[arg(long, default_value_t = DEFAULT_BROWSER_CACHE_MAX_AGE, env = "MVTS_BROWSER_CACHE_MAX_AGE")]
    pub browser_cache_max_age: u32,

    /// Disable the /cache management endpoints.
    #[arg(long, default_value_t = false, env = "MVTS_CACHE_DISABLE_API")]
    pub cache_disable_api: bool,

    /// API key required (as X-API-Key) on the /cache endpoints.
    #[arg(long, env = "MVTS_CACHE_API_KEY")]
    pub cache_api_key: Option<String>,
}

/// HTTP server settings.
#[derive(Args, Debug, Clone)]
pub struct ServerOptions {
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "MVTS_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "MVTS_PORT")]
    pub port: u16,

    /// Absolute URL base used in TileJSON documents; derived from the
    /// request Host header when unset.
    #[arg(long, env = "MVTS_URL_BASE")]
    pub url_base: Option<String>,

    /// Route prefix under which all endpoints are served, e.g. /tiles-api.
    #[arg(long, default_value = "", env = "MVTS_BASE_PATH")]
    pub base_path: String,

    /// Server-wide request timeout in seconds; expired requests get 503.
    #[arg(long, default_value_t = 30, env = "MVTS_REQUEST_TIMEOUT")]
    pub request_timeout: u64,
}

/// MVT tile server for DuckDB spatial databases.
///
/// Serves Mapbox Vector Tiles from the tables of a DuckDB database with the
/// spatial extension, with an in-memory tile cache in front of the store.
#[derive(Parser, Debug, Clone)]
#[command(name = "mvt-tileserver")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub database: DatabaseOptions,

    #[command(flatten)]
    pub cache: CacheOptions,

    #[command(flatten)]
    pub server: ServerOptions,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.database.database_path.is_empty() {
            return Err(
                "Database path is required. Set --database-path or MVTS_DATABASE_PATH"
                    .to_string(),
            );
        }

        if self.database.max_open_conns == 0 {
            return Err("max_open_conns must be greater than 0".to_string());
        }

        if self.cache.cache_enabled && self.cache.cache_max_items == 0 {
            return Err("cache_max_items must be greater than 0".to_string());
        }

        if self.server.request_timeout == 0 {
            return Err("request_timeout must be greater than 0".to_string());
        }

        if !self.server.base_path.is_empty() {
            if !self.server.base_path.starts_with('/') {
                return Err("base_path must start with '/'".to_string());
            }
            if self.server.base_path.ends_with('/') {
                return Err("base_path must not end with '/'".to_string());
            }
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
