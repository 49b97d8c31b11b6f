//! Memoization of pure async computations.
//!
//! The gateway's response cache is keyed by request fingerprint; this is the
//! same idea applied to an arbitrary computation boundary, keyed by a
//! caller-derived fingerprint of the call's logical identity.

use std::future::Future;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::cache::TtlCache;

/// Build a deterministic fingerprint from the parts identifying a call.
///
/// Equal part sequences produce equal fingerprints; callers are responsible
/// for normalizing argument order before fingerprinting.
pub fn fingerprint<'a, I: IntoIterator<Item = &'a str>>(parts: I) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        // Separator so ["ab", "c"] and ["a", "bc"] differ.
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

/// Caches results of a pure async computation under a fingerprint key.
///
/// No single-flight de-duplication: concurrent calls for the same key each
/// run the computation and the last writer wins. Acceptable for pure
/// computations; callers needing at-most-once must de-duplicate upstream.
pub struct Memoizer<V: Clone> {
    cache: TtlCache<String, V>,
}

impl<V: Clone> Memoizer<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: TtlCache::new(ttl),
        }
    }

    /// Return the cached value for `key`, or run `compute` and cache it.
    pub async fn get_or_compute<F, Fut>(&self, key: &str, compute: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        if let Some(value) = self.cache.get(&key.to_string()) {
            return value;
        }

        let value = compute().await;
        self.cache.insert(key.to_string(), value.clone(), None);
        value
    }

    /// Explicitly forget a key.
    pub fn invalidate(&self, key: &str) {
        self.cache.remove(&key.to_string());
    }

    /// Drop all memoized results.
    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
