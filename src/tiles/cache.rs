use crate::tiles::{bitmap::TileBitmap, key::TileKey};
use lru::LruCache;

/// Hit/miss counters for the bitmap cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
    pub bytes: usize,
}

/// Decoded tile bitmaps keyed by [`TileKey`] with LRU eviction.
///
/// Bounded by an entry count and a decoded-byte budget; whichever is hit
/// first evicts the least recently drawn tiles.
#[derive(Debug)]
pub struct BitmapCache {
    cache: LruCache<TileKey, TileBitmap>,
    max_entries: usize,
    max_bytes: usize,
    bytes: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl BitmapCache {
    /// Create a new cache with the given budgets; zero budgets are raised to one
    pub fn new(max_entries: usize, max_bytes: usize) -> Self {
        Self {
            cache: LruCache::unbounded(),
            max_entries: max_entries.max(1),
            max_bytes: max_bytes.max(1),
            bytes: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Create a cache sized for a typical inspection session (1024 tiles, 256 MiB)
    pub fn with_default_capacity() -> Self {
        Self::new(1024, 256 * 1024 * 1024)
    }

    /// Get a bitmap and mark it as recently drawn
    pub fn get(&mut self, key: &TileKey) -> Option<&TileBitmap> {
        match self.cache.get(key) {
            Some(bitmap) => {
                self.hits += 1;
                Some(bitmap)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Look up without touching recency or counters
    pub fn peek(&self, key: &TileKey) -> Option<&TileBitmap> {
        self.cache.peek(key)
    }

    /// Check if a tile is in the cache without retrieving it
    pub fn contains(&self, key: &TileKey) -> bool {
        self.cache.contains(key)
    }

    /// Insert a bitmap, evicting old entries until both budgets hold
    pub fn insert(&mut self, key: TileKey, bitmap: TileBitmap) {
        self.bytes += bitmap.byte_size();
        if let Some(previous) = self.cache.put(key, bitmap) {
            self.bytes = self.bytes.saturating_sub(previous.byte_size());
        }
        self.enforce_budget();
    }

    fn enforce_budget(&mut self) {
        while self.cache.len() > 1
            && (self.cache.len() > self.max_entries || self.bytes > self.max_bytes)
        {
            match self.cache.pop_lru() {
                Some((key, evicted)) => {
                    self.bytes = self.bytes.saturating_sub(evicted.byte_size());
                    self.evictions += 1;
                    log::debug!("evicted tile {key}");
                }
                None => break,
            }
        }
    }

    /// Remove a tile from the cache
    pub fn remove(&mut self, key: &TileKey) -> Option<TileBitmap> {
        let removed = self.cache.pop(key)?;
        self.bytes = self.bytes.saturating_sub(removed.byte_size());
        Some(removed)
    }

    /// Clear all tiles from the cache
    pub fn clear(&mut self) {
        self.cache.clear();
        self.bytes = 0;
    }

    /// Get the current number of cached tiles
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            entries: self.cache.len(),
            bytes: self.bytes,
        }
    }
}

impl Default for BitmapCache {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiles::key::Surface;
    use image::Rgba;

    fn key(x: u32) -> TileKey {
        TileKey::new(Surface::Top, 1, 0, x, 0, 512)
    }

    fn bitmap() -> TileBitmap {
        TileBitmap::solid(4, 4, Rgba([0, 0, 0, 255]))
    }

    #[test]
    fn test_cache_basic_operations() {
        let mut cache = BitmapCache::new(8, 1 << 20);
        assert!(cache.is_empty());

        cache.insert(key(1), bitmap());
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&key(1)));
        assert!(cache.get(&key(1)).is_some());
        assert!(cache.get(&key(2)).is_none());

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert_eq!(stats.bytes, 64);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().bytes, 0);
    }

    #[test]
    fn test_count_budget_evicts_least_recently_drawn() {
        let mut cache = BitmapCache::new(2, 1 << 20);
        cache.insert(key(1), bitmap());
        cache.insert(key(2), bitmap());

        // Drawing tile 1 makes tile 2 the eviction candidate
        assert!(cache.get(&key(1)).is_some());
        cache.insert(key(3), bitmap());

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&key(1)));
        assert!(!cache.contains(&key(2)));
        assert!(cache.contains(&key(3)));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_byte_budget() {
        // Each bitmap is 64 bytes, so only two fit in 150 bytes
        let mut cache = BitmapCache::new(100, 150);
        for x in 0..5 {
            cache.insert(key(x), bitmap());
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.stats().bytes <= 150);
    }

    #[test]
    fn test_reinsert_does_not_double_count_bytes() {
        let mut cache = BitmapCache::new(10, 1 << 20);
        cache.insert(key(1), bitmap());
        cache.insert(key(1), bitmap());
        assert_eq!(cache.stats().bytes, 64);
    }
}
