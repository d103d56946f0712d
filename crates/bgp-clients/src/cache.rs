//! Memoized result cache for the prefix-origin validator.

use moka::sync::Cache;
use std::time::Duration;

/// Caches `(prefix, origin_asn) -> valid` for a configurable TTL so repeated
/// checks against the same candidate during a burst of updates don't each
/// round-trip to the validator.
pub struct PrefixOriginCache {
    cache: Cache<(String, u32), bool>,
}

impl PrefixOriginCache {
    /// Builds a cache with the given entry TTL (default 300s per spec).
    pub fn new(ttl: Duration) -> Self {
        let cache = Cache::builder().max_capacity(100_000).time_to_live(ttl).build();
        Self { cache }
    }

    /// Returns the memoized validity, if still fresh.
    pub fn get(&self, prefix: &str, origin_asn: u32) -> Option<bool> {
        self.cache.get(&(prefix.to_string(), origin_asn))
    }

    /// Records a validator result.
    pub fn insert(&self, prefix: &str, origin_asn: u32, valid: bool) {
        self.cache.insert((prefix.to_string(), origin_asn), valid);
    }

    /// Number of live entries.
    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    /// True if the cache currently holds nothing.
    pub fn is_empty(&self) -> bool {
        self.cache.entry_count() == 0
    }
}

impl Default for PrefixOriginCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hits_after_insert() {
        let cache = PrefixOriginCache::new(Duration::from_secs(60));
        cache.insert("203.0.113.0/24", 65000, true);
        assert_eq!(cache.get("203.0.113.0/24", 65000), Some(true));
        assert_eq!(cache.get("203.0.113.0/24", 65001), None);
    }
}
