// In-memory response cache implementation using DashMap
use crate::domain::model::CacheStats;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Normalized request identity: operation plus canonical parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    operation: &'static str,
    params: String,
}

impl CacheKey {
    /// Parameters are trimmed, case-folded and sorted by name, so
    /// `("nazev", " Ibuprofen")` and `("nazev", "ibuprofen")` share an entry.
    pub fn new(operation: &'static str, params: &[(&str, &str)]) -> Self {
        let mut canonical: Vec<(String, String)> = params
            .iter()
            .map(|(name, value)| (name.trim().to_lowercase(), value.trim().to_lowercase()))
            .collect();
        canonical.sort();
        let params = canonical
            .into_iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("&");
        Self { operation, params }
    }

    pub fn operation(&self) -> &str {
        self.operation
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created) < self.ttl
    }
}

/// Thread-safe TTL cache for remote responses.
///
/// Expiry is evaluated when an entry is read; nothing sweeps in the
/// background. Concurrent `put`s on one key resolve to the last writer.
pub struct ResponseCache<V> {
    map: DashMap<CacheKey, CacheEntry<V>>,
    ttl: Duration,
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(ttl: Duration, enabled: bool) -> Self {
        Self {
            map: DashMap::new(),
            ttl,
            enabled,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<V> {
        if !self.enabled {
            return None;
        }
        let now = Instant::now();
        let found = self
            .map
            .get(key)
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.value.clone());
        match found {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Cache hit: {}", key.operation());
                Some(value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, key: CacheKey, value: V) {
        if !self.enabled {
            return;
        }
        self.map.insert(
            key,
            CacheEntry {
                value,
                created: Instant::now(),
                ttl: self.ttl,
            },
        );
    }

    pub fn clear(&self) {
        let count = self.map.len();
        self.map.clear();
        debug!("Cache cleared ({} entries)", count);
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let entries = self.map.len();
        let fresh = self
            .map
            .iter()
            .filter(|entry| entry.value().is_fresh(now))
            .count();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries,
            stale_entries: entries.saturating_sub(fresh),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(q: &str) -> CacheKey {
        CacheKey::new("search", &[("nazev", q), ("limit", "5")])
    }

    #[tokio::test(start_paused = true)]
    async fn get_after_put_then_expiry() {
        let cache = ResponseCache::new(Duration::from_secs(300), true);
        cache.put(key("ibuprofen"), vec!["0000001".to_string()]);
        assert_eq!(cache.get(&key("ibuprofen")), Some(vec!["0000001".to_string()]));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(cache.get(&key("ibuprofen")).is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get(&key("ibuprofen")).is_none());
        // lazily expired: still stored, reported stale
        assert_eq!(cache.stats().stale_entries, 1);
    }

    #[test]
    fn key_is_canonical() {
        let a = CacheKey::new("search", &[("nazev", "  IBUPROFEN "), ("limit", "5")]);
        let b = CacheKey::new("search", &[("limit", "5"), ("nazev", "ibuprofen")]);
        assert_eq!(a, b);
        let c = CacheKey::new("search", &[("nazev", "ibuprofen"), ("limit", "10")]);
        assert_ne!(a, c);
        let d = CacheKey::new("detail", &[("nazev", "ibuprofen"), ("limit", "5")]);
        assert_ne!(a, d);
    }

    #[tokio::test(start_paused = true)]
    async fn put_overwrites() {
        let cache = ResponseCache::new(Duration::from_secs(10), true);
        cache.put(key("a"), 1u32);
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.put(key("a"), 2u32);
        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(cache.get(&key("a")), Some(2));
    }

    #[test]
    fn disabled_cache_never_stores() {
        let cache = ResponseCache::new(Duration::from_secs(10), false);
        cache.put(key("a"), 1u32);
        assert_eq!(cache.stats().entries, 0);
        assert_eq!(cache.get(&key("a")), None);
    }

    #[test]
    fn stats_count_hits_and_misses() {
        let cache = ResponseCache::new(Duration::from_secs(10), true);
        assert!(cache.get(&key("a")).is_none());
        cache.put(key("a"), 1u32);
        assert!(cache.get(&key("a")).is_some());
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }
}
