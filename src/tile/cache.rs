//! Byte-bounded LRU cache of encoded Deep Zoom tiles.
//!
//! Keys carry the slide name, Deep Zoom address and JPEG quality, so the
//! same tile at two qualities occupies two entries. Eviction is by total
//! encoded size; an entry cap bounds the LRU bookkeeping.

use std::num::NonZeroUsize;
use std::sync::Arc;

use bytes::Bytes;
use lru::LruCache;
use tokio::sync::Mutex;

/// Default cache capacity: 64MB
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 64 * 1024 * 1024;

const DEFAULT_MAX_ENTRIES: usize = 10_000;

// =============================================================================
// Cache Key
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileCacheKey {
    pub slide: Arc<str>,
    /// Deep Zoom level (0 = 1x1 pixel)
    pub level: u32,
    pub col: u32,
    pub row: u32,
    pub quality: u8,
}

impl TileCacheKey {
    pub fn new(slide: impl Into<Arc<str>>, level: u32, col: u32, row: u32, quality: u8) -> Self {
        Self {
            slide: slide.into(),
            level,
            col,
            row,
            quality,
        }
    }
}

// =============================================================================
// Tile Cache
// =============================================================================

struct Entries {
    lru: LruCache<TileCacheKey, Bytes>,
    bytes: usize,
}

/// Thread-safe tile cache, shared across handlers via `Arc`.
pub struct TileCache {
    entries: Mutex<Entries>,
    max_bytes: usize,
}

impl TileCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TILE_CACHE_CAPACITY)
    }

    /// Cache holding at most `max_bytes` of encoded tiles.
    pub fn with_capacity(max_bytes: usize) -> Self {
        Self::with_capacity_and_entries(max_bytes, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity_and_entries(max_bytes: usize, max_entries: usize) -> Self {
        let max_entries = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(Entries {
                lru: LruCache::new(max_entries),
                bytes: 0,
            }),
            max_bytes,
        }
    }

    /// Look up a tile, marking it recently used.
    pub async fn get(&self, key: &TileCacheKey) -> Option<Bytes> {
        self.entries.lock().await.lru.get(key).cloned()
    }

    /// Whether a tile is cached, without touching LRU order.
    pub async fn contains(&self, key: &TileCacheKey) -> bool {
        self.entries.lock().await.lru.contains(key)
    }

    /// Store a tile, then evict least-recently-used tiles until the total
    /// size fits. A tile larger than the whole capacity is not kept.
    pub async fn put(&self, key: TileCacheKey, data: Bytes) {
        let mut entries = self.entries.lock().await;
        let added = data.len();

        // `push` returns the replaced value or the entry evicted by the count cap
        if let Some((_, old)) = entries.lru.push(key, data) {
            entries.bytes = entries.bytes.saturating_sub(old.len());
        }
        entries.bytes += added;

        while entries.bytes > self.max_bytes {
            let Some((_, evicted)) = entries.lru.pop_lru() else {
                break;
            };
            entries.bytes = entries.bytes.saturating_sub(evicted.len());
        }
    }

    pub async fn remove(&self, key: &TileCacheKey) -> Option<Bytes> {
        let mut entries = self.entries.lock().await;
        let data = entries.lru.pop(key)?;
        entries.bytes = entries.bytes.saturating_sub(data.len());
        Some(data)
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.lock().await;
        entries.lru.clear();
        entries.bytes = 0;
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.lru.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.lru.is_empty()
    }

    /// Total bytes currently cached.
    pub async fn size(&self) -> usize {
        self.entries.lock().await.bytes
    }

    pub fn capacity(&self) -> usize {
        self.max_bytes
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
