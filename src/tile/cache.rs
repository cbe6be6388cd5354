//! LRU cache for encoded MVT tiles.
//!
//! This module provides a bounded, thread-safe cache keyed by
//! `"{layer}:{z}:{x}:{y}"`, preventing repeated store queries for frequently
//! requested tiles.
//!
//! # Empty tiles
//!
//! A zero-length payload is a legitimate cached value meaning "no features in
//! this tile" and round-trips through the cache, so a cached empty tile can
//! be answered with 204 without touching the store. Absent and
//! present-but-empty are distinct states.
//!
//! # Bounds
//!
//! The item-count bound is hard: an insertion at capacity evicts the oldest
//! entry first. The memory bound is advisory: inserts always succeed, and
//! oversized contents are trimmed back by evicting the least recently used
//! entries afterwards.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Number of cached tiles
    pub size: u64,
    pub memory_bytes: u64,
    /// Hit percentage over all lookups
    pub hit_rate: f64,
}

/// Thread-safe LRU cache for MVT tile payloads.
///
/// Shared across all requests via `Arc`. Lookups and inserts take a short
/// mutex critical section; counters are atomics so [`TileCache::stats`]
/// never blocks writers.
pub struct TileCache {
    /// `None` when caching is disabled; a disabled cache always misses.
    inner: Option<Mutex<LruCache<String, Bytes>>>,
    max_memory_bytes: u64,

    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    current_size: AtomicU64,
    current_bytes: AtomicU64,
}

impl TileCache {
    /// Create an enabled cache bounded to `max_items` entries and an advisory
    /// `max_memory_mb` megabytes of payload.
    pub fn new(max_items: NonZeroUsize, max_memory_mb: u64) -> Self {
        info!(
            "Initialized tile cache: max_items={} max_memory={}MB",
            max_items, max_memory_mb
        );
        Self {
            inner: Some(Mutex::new(LruCache::new(max_items))),
            max_memory_bytes: max_memory_mb * 1024 * 1024,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            current_size: AtomicU64::new(0),
            current_bytes: AtomicU64::new(0),
        }
    }

    /// Create a disabled cache that always misses and rejects inserts.
    pub fn disabled() -> Self {
        Self {
            inner: None,
            max_memory_bytes: 0,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            current_size: AtomicU64::new(0),
            current_bytes: AtomicU64::new(0),
        }
    }

    /// Whether caching is enabled.
    pub fn enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Look up a tile, refreshing its recency on hit.
    ///
    /// An empty payload counts as a hit: the key is present and means the
    /// tile was generated and contained no features.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let inner = self.inner.as_ref()?;
        let hit = inner.lock().get(key).cloned();
        match hit {
            Some(tile) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Cache HIT: {}", key);
                Some(tile)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!("Cache MISS: {}", key);
                None
            }
        }
    }

    /// Insert or refresh a tile. Returns false iff the cache is disabled.
    ///
    /// The payload is copied before being retained, so callers may reuse
    /// request-scoped buffers freely. Empty payloads are stored like any
    /// other value.
    pub fn set(&self, key: &str, data: &[u8]) -> bool {
        let Some(inner) = self.inner.as_ref() else {
            return false;
        };

        let tile = Bytes::copy_from_slice(data);
        let tile_len = tile.len() as u64;

        let mut lru = inner.lock();
        match lru.push(key.to_owned(), tile) {
            // Same key: in-place replacement, only the byte count moves.
            Some((old_key, old_tile)) if old_key == key => {
                self.current_bytes
                    .fetch_sub(old_tile.len() as u64, Ordering::Relaxed);
                self.current_bytes.fetch_add(tile_len, Ordering::Relaxed);
            }
            // Capacity eviction: one entry out, one in.
            Some((evicted_key, evicted_tile)) => {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                self.current_bytes
                    .fetch_sub(evicted_tile.len() as u64, Ordering::Relaxed);
                self.current_bytes.fetch_add(tile_len, Ordering::Relaxed);
                debug!("Cache EVICT: {}", evicted_key);
            }
            None => {
                self.current_size.fetch_add(1, Ordering::Relaxed);
                self.current_bytes.fetch_add(tile_len, Ordering::Relaxed);
            }
        }

        // Advisory memory bound: shed oldest entries, but never the sole
        // remaining one, so an oversized tile still round-trips.
        if self.max_memory_bytes > 0 {
            while self.current_bytes.load(Ordering::Relaxed) > self.max_memory_bytes
                && lru.len() > 1
            {
                match lru.pop_lru() {
                    Some((evicted_key, evicted_tile)) => {
                        self.evictions.fetch_add(1, Ordering::Relaxed);
                        self.current_size.fetch_sub(1, Ordering::Relaxed);
                        self.current_bytes
                            .fetch_sub(evicted_tile.len() as u64, Ordering::Relaxed);
                        debug!("Cache EVICT (memory): {}", evicted_key);
                    }
                    None => break,
                }
            }
        }

        debug!("Cache SET: {} ({} bytes)", key, tile_len);
        true
    }

    /// Remove all entries and reset the size counters.
    pub fn clear(&self) {
        let Some(inner) = self.inner.as_ref() else {
            return;
        };
        inner.lock().clear();
        self.current_size.store(0, Ordering::Relaxed);
        self.current_bytes.store(0, Ordering::Relaxed);
        info!("Cache cleared");
    }

    /// Remove every tile belonging to `layer`, returning how many were
    /// removed. Explicit removals are not counted as evictions.
    pub fn clear_layer(&self, layer: &str) -> usize {
        let Some(inner) = self.inner.as_ref() else {
            return 0;
        };

        let prefix = format!("{layer}:");
        let mut lru = inner.lock();
        let matches: Vec<String> = lru
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(key, _)| key.clone())
            .collect();

        let mut removed = 0;
        for key in matches {
            if let Some(tile) = lru.pop(&key) {
                self.current_size.fetch_sub(1, Ordering::Relaxed);
                self.current_bytes
                    .fetch_sub(tile.len() as u64, Ordering::Relaxed);
                removed += 1;
            }
        }
        drop(lru);

        info!("Cleared {} tiles for layer {}", removed, layer);
        removed
    }

    /// Current counter snapshot. Does not take the map lock.
    pub fn stats(&self) -> CacheStats {
        if !self.enabled() {
            return CacheStats::default();
        }

        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            hits as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        CacheStats {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            size: self.current_size.load(Ordering::Relaxed),
            memory_bytes: self.current_bytes.load(Ordering::Relaxed),
            hit_rate,
        }
    }
}
