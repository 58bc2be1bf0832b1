use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lru::LruCache;
use tracing::{debug, warn};
use vrepo_types::{clock, Clock, SystemClock};

use crate::stats::CacheStats;

/// Bounds and defaults for a [`ContentCache`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub max_bytes: usize,
    pub default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            max_bytes: 64 * 1024 * 1024,
            default_ttl: Duration::from_secs(30 * 60),
        }
    }
}

struct CacheEntry {
    value: Arc<str>,
    size: usize,
    expires_at: Instant,
}

struct CacheState {
    entries: LruCache<String, CacheEntry>,
    total_bytes: usize,
    stats: CacheStats,
}

impl CacheState {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.pop(key)?;
        self.total_bytes -= entry.size;
        Some(entry)
    }

    fn evict_lru(&mut self) -> bool {
        match self.entries.pop_lru() {
            Some((key, entry)) => {
                self.total_bytes -= entry.size;
                self.stats.evictions += 1;
                debug!(key = %key, bytes = entry.size, "evicted least recently used entry");
                true
            }
            None => false,
        }
    }
}

/// LRU content cache bounded by entry count and byte budget, with TTLs.
///
/// All mutation happens under a single mutex; the loader passed to
/// [`ContentCache::warm`] runs outside it.
pub struct ContentCache {
    state: Mutex<CacheState>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
}

impl ContentCache {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                total_bytes: 0,
                stats: CacheStats::default(),
            }),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a value, promoting it to most-recently-used on a hit.
    ///
    /// An entry whose TTL has elapsed counts as a miss and is evicted.
    pub fn get(&self, key: &str) -> Option<Arc<str>> {
        let now = self.clock.now();
        let mut guard = self.state.lock().expect("cache lock poisoned");
        let state = &mut *guard;
        let expired = match state.entries.get(key) {
            Some(entry) if entry.expires_at > now => {
                state.stats.hits += 1;
                return Some(Arc::clone(&entry.value));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            state.remove(key);
            state.stats.expirations += 1;
            debug!(key = %key, "cache entry expired on read");
        }
        state.stats.misses += 1;
        None
    }

    /// Whether a live entry exists, without touching recency or counters.
    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now();
        let state = self.state.lock().expect("cache lock poisoned");
        state
            .entries
            .peek(key)
            .is_some_and(|entry| entry.expires_at > now)
    }

    /// Insert with the default TTL. See [`ContentCache::put_with_ttl`].
    pub fn put(&self, key: impl Into<String>, value: impl Into<Arc<str>>) -> bool {
        self.put_with_ttl(key, value, self.config.default_ttl)
    }

    /// Insert a value, evicting least-recently-used entries until both the
    /// count and byte bounds hold.
    ///
    /// Returns `false` if the value alone exceeds the byte budget; any
    /// previous value under the same key is dropped in that case.
    pub fn put_with_ttl(
        &self,
        key: impl Into<String>,
        value: impl Into<Arc<str>>,
        ttl: Duration,
    ) -> bool {
        let key = key.into();
        let value = value.into();
        let size = value.len();
        let expires_at = clock::deadline(self.clock.now(), ttl);

        let mut state = self.state.lock().expect("cache lock poisoned");
        state.remove(&key);

        if self.config.max_entries == 0 || size > self.config.max_bytes {
            state.stats.rejections += 1;
            warn!(
                key = %key,
                bytes = size,
                max_bytes = self.config.max_bytes,
                "value exceeds cache budget, not cached"
            );
            return false;
        }

        while state.entries.len() + 1 > self.config.max_entries
            || state.total_bytes + size > self.config.max_bytes
        {
            if !state.evict_lru() {
                break;
            }
        }

        state.total_bytes += size;
        state.stats.insertions += 1;
        state.entries.put(
            key,
            CacheEntry {
                value,
                size,
                expires_at,
            },
        );
        true
    }

    /// Remove a key. Returns `true` if it was present.
    pub fn remove(&self, key: &str) -> bool {
        let mut state = self.state.lock().expect("cache lock poisoned");
        state.remove(key).is_some()
    }

    /// Remove every entry whose TTL has elapsed, regardless of recency.
    ///
    /// Safe to call from a background job; returns the number removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = self.clock.now();
        let mut state = self.state.lock().expect("cache lock poisoned");
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            state.remove(key);
        }
        state.stats.expirations += expired.len() as u64;
        if !expired.is_empty() {
            debug!(removed = expired.len(), "expired cache entries swept");
        }
        expired.len()
    }

    /// Pre-populate up to `limit` keys that are not already cached.
    ///
    /// `loader` is invoked once per missing key; keys for which it returns
    /// `None` are skipped and do not count toward `limit`. Returns the number
    /// of entries inserted.
    pub fn warm<I, F>(&self, keys: I, limit: usize, mut loader: F) -> usize
    where
        I: IntoIterator<Item = String>,
        F: FnMut(&str) -> Option<Arc<str>>,
    {
        let mut warmed = 0;
        for key in keys {
            if warmed >= limit {
                break;
            }
            if self.contains(&key) {
                continue;
            }
            if let Some(value) = loader(&key) {
                if self.put(key, value) {
                    warmed += 1;
                }
            }
        }
        if warmed > 0 {
            debug!(warmed, "cache warmed");
        }
        warmed
    }

    /// Remaining TTL for a live key.
    pub fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        let state = self.state.lock().expect("cache lock poisoned");
        state
            .entries
            .peek(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.expires_at - now)
    }

    /// Drop every entry, returning the bytes released.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock().expect("cache lock poisoned");
        let freed = state.total_bytes;
        state.entries.clear();
        state.total_bytes = 0;
        freed
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("cache lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_bytes(&self) -> usize {
        self.state.lock().expect("cache lock poisoned").total_bytes
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock().expect("cache lock poisoned");
        CacheStats {
            entries: state.entries.len(),
            bytes: state.total_bytes,
            ..state.stats
        }
    }
}

impl Default for ContentCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl std::fmt::Debug for ContentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("ContentCache")
            .field("entries", &stats.entries)
            .field("bytes", &stats.bytes)
            .field("max_entries", &self.config.max_entries)
            .field("max_bytes", &self.config.max_bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use vrepo_types::ManualClock;

    fn cache(max_entries: usize, max_bytes: usize) -> (ContentCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let cache = ContentCache::with_clock(
            CacheConfig {
                max_entries,
                max_bytes,
                default_ttl: Duration::from_secs(60),
            },
            clock.clone(),
        );
        (cache, clock)
    }

    // -----------------------------------------------------------------------
    // Basic get/put
    // -----------------------------------------------------------------------

    #[test]
    fn put_then_get_returns_value() {
        let (cache, _) = cache(10, 1024);
        assert!(cache.put("k", "value"));
        assert_eq!(cache.get("k").as_deref(), Some("value"));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn miss_is_counted() {
        let (cache, _) = cache(10, 1024);
        assert!(cache.get("missing").is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn overwrite_replaces_bytes() {
        let (cache, _) = cache(10, 1024);
        cache.put("k", "aaaa");
        cache.put("k", "bb");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_bytes(), 2);
        assert_eq!(cache.get("k").as_deref(), Some("bb"));
    }

    // -----------------------------------------------------------------------
    // LRU eviction
    // -----------------------------------------------------------------------

    #[test]
    fn count_bound_evicts_oldest() {
        let (cache, _) = cache(2, 1024);
        cache.put("k1", "1");
        cache.put("k2", "2");
        cache.put("k3", "3");
        assert!(cache.get("k1").is_none());
        assert!(cache.get("k2").is_some());
        assert!(cache.get("k3").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn get_promotes_entry() {
        let (cache, _) = cache(2, 1024);
        cache.put("k1", "1");
        cache.put("k2", "2");
        cache.get("k1");
        cache.put("k3", "3");
        assert!(cache.contains("k1"));
        assert!(!cache.contains("k2"));
    }

    #[test]
    fn byte_bound_evicts_until_fit() {
        let (cache, _) = cache(100, 10);
        cache.put("a", "1234");
        cache.put("b", "1234");
        cache.put("c", "123456");
        assert!(!cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.total_bytes(), 6);
    }

    #[test]
    fn oversized_value_is_rejected() {
        let (cache, _) = cache(10, 4);
        cache.put("k", "ok");
        assert!(!cache.put("k", "too large"));
        assert!(!cache.contains("k"));
        assert_eq!(cache.stats().rejections, 1);
        assert_eq!(cache.total_bytes(), 0);
    }

    // -----------------------------------------------------------------------
    // TTL
    // -----------------------------------------------------------------------

    #[test]
    fn expired_entry_is_a_miss_and_evicted() {
        let (cache, clock) = cache(10, 1024);
        cache.put_with_ttl("k", "v", Duration::from_secs(5));
        clock.advance(Duration::from_secs(5));
        assert!(cache.get("k").is_none());
        assert_eq!(cache.len(), 0);
        let stats = cache.stats();
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn cleanup_expired_sweeps_regardless_of_recency() {
        let (cache, clock) = cache(10, 1024);
        cache.put_with_ttl("short", "v", Duration::from_secs(1));
        cache.put_with_ttl("long", "v", Duration::from_secs(100));
        cache.get("short");
        clock.advance(Duration::from_secs(2));
        assert_eq!(cache.cleanup_expired(), 1);
        assert!(cache.contains("long"));
        assert_eq!(cache.cleanup_expired(), 0);
    }

    #[test]
    fn remaining_ttl_decreases() {
        let (cache, clock) = cache(10, 1024);
        cache.put_with_ttl("k", "v", Duration::from_secs(10));
        clock.advance(Duration::from_secs(4));
        assert_eq!(cache.remaining_ttl("k"), Some(Duration::from_secs(6)));
        clock.advance(Duration::from_secs(6));
        assert_eq!(cache.remaining_ttl("k"), None);
    }

    #[test]
    fn unbounded_ttl_is_clamped() {
        let (cache, clock) = cache(10, 1024);
        assert!(cache.put_with_ttl("k", "v", Duration::MAX));
        assert_eq!(cache.remaining_ttl("k"), Some(vrepo_types::MAX_TTL));
        clock.advance(Duration::from_secs(365 * 24 * 60 * 60));
        assert_eq!(cache.get("k").as_deref(), Some("v"));
    }

    // -----------------------------------------------------------------------
    // Warming
    // -----------------------------------------------------------------------

    #[test]
    fn warm_loads_missing_keys_up_to_limit() {
        let (cache, _) = cache(10, 1024);
        cache.put("a", "cached");
        let mut calls = Vec::new();
        let keys = ["a", "b", "c", "d"].map(String::from);
        let warmed = cache.warm(keys, 2, |key| {
            calls.push(key.to_string());
            Some(Arc::from(format!("loaded {key}")))
        });
        assert_eq!(warmed, 2);
        assert_eq!(calls, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(cache.get("a").as_deref(), Some("cached"));
        assert!(!cache.contains("d"));
    }

    #[test]
    fn warm_skips_unloadable_keys() {
        let (cache, _) = cache(10, 1024);
        let keys = ["x", "y"].map(String::from);
        let warmed = cache.warm(keys, 5, |key| (key == "y").then(|| Arc::from("y!")));
        assert_eq!(warmed, 1);
        assert!(cache.contains("y"));
    }

    #[test]
    fn clear_returns_freed_bytes() {
        let (cache, _) = cache(10, 1024);
        cache.put("a", "123");
        cache.put("b", "45");
        assert_eq!(cache.clear(), 5);
        assert!(cache.is_empty());
    }

    // -----------------------------------------------------------------------
    // Bounds invariant
    // -----------------------------------------------------------------------

    proptest! {
        #[test]
        fn bounds_hold_after_every_put(
            max_entries in 1usize..8,
            max_bytes in 1usize..64,
            ops in proptest::collection::vec((0u8..12, 0usize..80), 1..60),
        ) {
            let (cache, _) = cache(max_entries, max_bytes);
            for (key, len) in ops {
                cache.put(format!("k{key}"), "x".repeat(len));
                prop_assert!(cache.len() <= max_entries);
                prop_assert!(cache.total_bytes() <= max_bytes);
                let stats = cache.stats();
                prop_assert_eq!(stats.entries, cache.len());
            }
        }
    }
}
