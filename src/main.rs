//! MVT tile server binary.
//!
//! Opens the database, wires the catalog, engine, and cache together, and
//! serves the HTTP API.

use std::num::NonZeroUsize;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mvt_tileserver::{
    config::Config,
    server::{create_router, AppState, RouterConfig},
    store::Store,
    tile::{DbTileSource, TileCache},
    LayerCatalog,
};

#[tokio::main]
async fn main() {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("Starting mvt-tileserver");
    info!("  Database: {}", config.database.database_path);
    if !config.database.table_includes.is_empty() {
        info!("  Table includes: {:?}", config.database.table_includes);
    }
    if !config.database.table_excludes.is_empty() {
        info!("  Table excludes: {:?}", config.database.table_excludes);
    }

    let store = match Store::open(&config.database) {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    let mut catalog = LayerCatalog::new(store.clone());
    catalog.set_include_exclude(&config.database.table_includes, &config.database.table_excludes);

    let source = DbTileSource::new(store, catalog);

    let cache = if config.cache.cache_enabled {
        // validate() has already rejected a zero item bound.
        let max_items = NonZeroUsize::new(config.cache.cache_max_items)
            .unwrap_or(NonZeroUsize::MIN);
        TileCache::new(max_items, config.cache.cache_max_memory_mb)
    } else {
        info!("Tile cache disabled");
        TileCache::disabled()
    };

    let state = AppState::new(source, cache)
        .with_browser_cache_max_age(config.cache.browser_cache_max_age)
        .with_url_base(config.server.url_base.clone())
        .with_base_path(config.server.base_path.clone());

    let router = create_router(state, RouterConfig::from_config(&config));

    let addr = config.bind_address();
    info!("Listening on http://{}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "mvt_tileserver=debug,tower_http=debug"
    } else {
        "mvt_tileserver=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
