//! In-memory TTL caching.
//!
//! `TtlCache` is the shared expiry core: the response cache middleware keys
//! it by request fingerprint, and [`memo::Memoizer`] keys it by computation
//! fingerprint. Expiry is purely time-based; there is no LRU/LFU eviction.

pub mod memo;

use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

/// A single cached value with its lifetime bounds.
///
/// `expires_at` is fixed at insertion; entries are immutable once created.
#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    created_at: Instant,
    expires_at: Instant,
}

/// Statistics snapshot for observability. Not used for correctness.
#[derive(Debug, Clone, Serialize, Default)]
pub struct CacheStats {
    /// Number of live entries (may include not-yet-reaped expired ones).
    pub total_entries: usize,
    /// Approximate aggregate payload size in bytes.
    pub cache_size_bytes: usize,
    /// Age of the oldest entry in seconds, if any.
    pub oldest_entry_age_secs: Option<u64>,
}

/// A thread-safe map with per-entry time-to-live.
///
/// Expired entries behave as absent and are deleted lazily on lookup; an
/// optional [`TtlCache::cleanup_expired`] sweep reclaims entries that are
/// never looked up again. Inserting an existing key overwrites
/// (last-writer-wins).
pub struct TtlCache<K, V> {
    entries: DashMap<K, Entry<V>>,
    default_ttl: Duration,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    /// Create an empty cache with the given default TTL.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
        }
    }

    /// Get a fresh value, treating expired entries as absent.
    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub(crate) fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        match self.entries.get(key) {
            Some(entry) if now <= entry.expires_at => return Some(entry.value.clone()),
            Some(_) => {}
            None => return None,
        }
        // Lazy expiry: the read guard is released above, and the re-check
        // inside remove_if keeps a concurrent overwrite from being dropped.
        self.entries.remove_if(key, |_, entry| now > entry.expires_at);
        None
    }

    /// Insert a value, overwriting any previous entry for the key.
    pub fn insert(&self, key: K, value: V, ttl: Option<Duration>) {
        self.insert_at(key, value, ttl, Instant::now());
    }

    pub(crate) fn insert_at(&self, key: K, value: V, ttl: Option<Duration>, now: Instant) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        self.entries.insert(
            key,
            Entry {
                value,
                created_at: now,
                expires_at: now + ttl,
            },
        );
    }

    /// Remove a single key. Used for explicit invalidation.
    pub fn remove(&self, key: &K) {
        self.entries.remove(key);
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of entries currently held, including stale ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sweep expired entries. Optional; correctness relies on lazy expiry.
    pub fn cleanup_expired(&self) -> usize {
        self.cleanup_expired_at(Instant::now())
    }

    pub(crate) fn cleanup_expired_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| now <= entry.expires_at);
        before - self.entries.len()
    }

    /// Snapshot statistics, sizing each value with the given function.
    pub fn stats<F: Fn(&V) -> usize>(&self, size_of: F) -> CacheStats {
        let now = Instant::now();
        let mut total_entries = 0;
        let mut cache_size_bytes = 0;
        let mut oldest: Option<Instant> = None;

        for entry in self.entries.iter() {
            total_entries += 1;
            cache_size_bytes += size_of(&entry.value);
            oldest = Some(match oldest {
                Some(t) if t <= entry.created_at => t,
                _ => entry.created_at,
            });
        }

        CacheStats {
            total_entries,
            cache_size_bytes,
            oldest_entry_age_secs: oldest.map(|t| now.duration_since(t).as_secs()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> TtlCache<String, String> {
        TtlCache::new(Duration::from_secs(300))
    }

    #[test]
    fn round_trip() {
        let cache = cache();
        let now = Instant::now();

        cache.insert_at("k".to_string(), "v".to_string(), None, now);
        assert_eq!(cache.get_at(&"k".to_string(), now), Some("v".to_string()));
    }

    #[test]
    fn expiry_is_idempotent() {
        let cache = cache();
        let now = Instant::now();

        cache.insert_at("k".to_string(), "v".to_string(), Some(Duration::from_secs(10)), now);
        let later = now + Duration::from_secs(11);

        // First lookup after expiry misses and reaps the entry; the second
        // still misses (no resurrection).
        assert_eq!(cache.get_at(&"k".to_string(), later), None);
        assert_eq!(cache.get_at(&"k".to_string(), later), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn fresh_at_exact_ttl_boundary() {
        let cache = cache();
        let now = Instant::now();

        cache.insert_at("k".to_string(), "v".to_string(), Some(Duration::from_secs(10)), now);
        assert!(cache.get_at(&"k".to_string(), now + Duration::from_secs(10)).is_some());
        assert!(cache.get_at(&"k".to_string(), now + Duration::from_secs(10) + Duration::from_millis(1)).is_none());
    }

    #[test]
    fn overwrite_is_last_writer_wins() {
        let cache = cache();
        let now = Instant::now();

        cache.insert_at("k".to_string(), "first".to_string(), None, now);
        cache.insert_at("k".to_string(), "second".to_string(), None, now);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_at(&"k".to_string(), now), Some("second".to_string()));
    }

    #[test]
    fn cleanup_reaps_only_expired() {
        let cache = cache();
        let now = Instant::now();

        cache.insert_at("old".to_string(), "v".to_string(), Some(Duration::from_secs(5)), now);
        cache.insert_at("new".to_string(), "v".to_string(), Some(Duration::from_secs(500)), now);

        let removed = cache.cleanup_expired_at(now + Duration::from_secs(60));
        assert_eq!(removed, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn stats_reflect_contents() {
        let cache = cache();
        let now = Instant::now();

        cache.insert_at("a".to_string(), "four".to_string(), None, now);
        cache.insert_at("b".to_string(), "chars".to_string(), None, now);

        let stats = cache.stats(|v| v.len());
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.cache_size_bytes, 9);
        assert!(stats.oldest_entry_age_secs.is_some());
    }

    #[test]
    fn clear_and_remove() {
        let cache = cache();
        cache.insert("a".to_string(), "v".to_string(), None);
        cache.insert("b".to_string(), "v".to_string(), None);

        cache.remove(&"a".to_string());
        assert!(cache.get(&"a".to_string()).is_none());
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }
}
