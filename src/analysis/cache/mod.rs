//! Two-tier memoization for stage outputs.
//!
//! Read path: in-process LRU first, then the shared tier, then the caller
//! computes and populates both. Write path inserts into both tiers; the
//! shared write is conditional (first writer wins), so concurrent sessions
//! racing on one fingerprint converge on the same value.
//!
//! The cache is best-effort by design: a shared-tier outage is logged,
//! counted, and degrades the lookup to recomputation; it never surfaces as
//! an error to the pipeline.

pub mod fingerprint;

use lru::LruCache;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

use crate::analysis::config::CacheConfig;
use crate::analysis::store::SharedCacheTier;

/// Hit/miss counters across both tiers.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub process_hits: AtomicU64,
    pub shared_hits: AtomicU64,
    pub misses: AtomicU64,
    pub shared_errors: AtomicU64,
}

impl CacheStats {
    /// Overall hit ratio in [0, 1]; 0 when nothing was looked up yet.
    pub fn hit_ratio(&self) -> f64 {
        let hits =
            self.process_hits.load(Ordering::Relaxed) + self.shared_hits.load(Ordering::Relaxed);
        let total = hits + self.misses.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// The multi-level cache.
pub struct MultiLevelCache {
    process: Mutex<LruCache<String, String>>,
    shared: Option<Arc<dyn SharedCacheTier>>,
    stats: CacheStats,
}

impl MultiLevelCache {
    /// Create with given configuration and optional shared tier.
    pub fn new(config: &CacheConfig, shared: Option<Arc<dyn SharedCacheTier>>) -> Self {
        let capacity = NonZeroUsize::new(config.process_tier_capacity.max(1))
            .expect("capacity is at least 1");
        Self {
            process: Mutex::new(LruCache::new(capacity)),
            shared: if config.shared_tier_enabled { shared } else { None },
            stats: CacheStats::default(),
        }
    }

    /// Look up a fingerprint: process tier, then shared tier (populating the
    /// process tier on a shared hit). None means the caller must compute.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if let Some(raw) = self.process.lock().get(key).cloned() {
            if let Some(value) = decode(key, &raw) {
                self.stats.process_hits.fetch_add(1, Ordering::Relaxed);
                return Some(value);
            }
        }

        if let Some(shared) = &self.shared {
            match shared.get(key).await {
                Ok(Some(raw)) => {
                    if let Some(value) = decode(key, &raw) {
                        self.stats.shared_hits.fetch_add(1, Ordering::Relaxed);
                        self.process.lock().put(key.to_string(), raw);
                        return Some(value);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    self.stats.shared_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(target: "vantage::cache", key, error = %e, "shared tier read failed; recomputing");
                }
            }
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Populate both tiers with a computed value.
    pub async fn put<T: Serialize>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(target: "vantage::cache", key, error = %e, "value not serializable; skipping cache");
                return;
            }
        };

        self.process.lock().put(key.to_string(), raw.clone());

        if let Some(shared) = &self.shared {
            if let Err(e) = shared.set_if_absent(key, raw).await {
                self.stats.shared_errors.fetch_add(1, Ordering::Relaxed);
                warn!(target: "vantage::cache", key, error = %e, "shared tier write failed");
            }
        }
    }

    /// Drop every entry under a key prefix from both tiers.
    pub async fn invalidate_prefix(&self, prefix: &str) {
        {
            let mut process = self.process.lock();
            let stale: Vec<String> = process
                .iter()
                .filter(|(k, _)| k.starts_with(prefix))
                .map(|(k, _)| k.clone())
                .collect();
            for key in stale {
                process.pop(&key);
            }
        }

        if let Some(shared) = &self.shared {
            if let Err(e) = shared.invalidate_prefix(prefix).await {
                self.stats.shared_errors.fetch_add(1, Ordering::Relaxed);
                warn!(target: "vantage::cache", prefix, error = %e, "shared tier invalidation failed");
            }
        }
    }

    /// Counter access for observability.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Option<T> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(target: "vantage::cache", key, error = %e, "cached value failed to decode; treating as miss");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::store::memory::MemoryCacheTier;
    use crate::errors::StoreError;
    use async_trait::async_trait;

    fn config(capacity: usize) -> CacheConfig {
        CacheConfig {
            process_tier_capacity: capacity,
            shared_tier_enabled: true,
        }
    }

    /// Shared tier that always errors, for outage-degradation tests.
    struct BrokenTier;

    #[async_trait]
    impl SharedCacheTier for BrokenTier {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("tier down".to_string()))
        }
        async fn set_if_absent(&self, _key: &str, _value: String) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("tier down".to_string()))
        }
        async fn invalidate_prefix(&self, _prefix: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("tier down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_miss_then_hit_returns_equal_value() {
        let cache = MultiLevelCache::new(&config(16), None);
        let value = vec![(String::from("consumer"), 0.8125), (String::from("market"), 0.5)];

        assert_eq!(cache.get::<Vec<(String, f64)>>("k1").await, None);
        cache.put("k1", &value).await;
        let hit: Vec<(String, f64)> = cache.get("k1").await.unwrap();
        assert_eq!(hit, value);
    }

    #[tokio::test]
    async fn test_shared_tier_serves_process_miss() {
        let shared = Arc::new(MemoryCacheTier::new());
        let cache_a = MultiLevelCache::new(&config(16), Some(shared.clone()));
        let cache_b = MultiLevelCache::new(&config(16), Some(shared.clone()));

        cache_a.put("k", &42_u64).await;

        // A different process-tier instance sees the value via the shared tier.
        let hit: u64 = cache_b.get("k").await.unwrap();
        assert_eq!(hit, 42);
        assert_eq!(cache_b.stats().shared_hits.load(Ordering::Relaxed), 1);

        // And the value is now promoted into B's process tier.
        let _: u64 = cache_b.get("k").await.unwrap();
        assert_eq!(cache_b.stats().process_hits.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_broken_shared_tier_degrades_to_miss() {
        let cache = MultiLevelCache::new(&config(16), Some(Arc::new(BrokenTier)));

        assert_eq!(cache.get::<u64>("k").await, None);
        cache.put("k", &7_u64).await; // shared write fails silently
        let hit: u64 = cache.get("k").await.unwrap(); // process tier still works
        assert_eq!(hit, 7);
        assert!(cache.stats().shared_errors.load(Ordering::Relaxed) >= 2);
    }

    #[tokio::test]
    async fn test_lru_eviction_respects_capacity() {
        let cache = MultiLevelCache::new(&config(2), None);
        cache.put("a", &1_u64).await;
        cache.put("b", &2_u64).await;
        cache.put("c", &3_u64).await; // evicts "a"

        assert_eq!(cache.get::<u64>("a").await, None);
        assert_eq!(cache.get::<u64>("b").await, Some(2));
        assert_eq!(cache.get::<u64>("c").await, Some(3));
    }

    #[tokio::test]
    async fn test_prefix_invalidation_hits_both_tiers() {
        let shared = Arc::new(MemoryCacheTier::new());
        let cache = MultiLevelCache::new(&config(16), Some(shared.clone()));

        cache.put("va1:s1:a", &1_u64).await;
        cache.put("va1:s2:a", &2_u64).await;
        cache.invalidate_prefix("va1:s1:").await;

        assert_eq!(cache.get::<u64>("va1:s1:a").await, None);
        assert_eq!(cache.get::<u64>("va1:s2:a").await, Some(2));
        assert_eq!(shared.len(), 1);
    }

    #[tokio::test]
    async fn test_hit_ratio() {
        let cache = MultiLevelCache::new(&config(16), None);
        assert_eq!(cache.stats().hit_ratio(), 0.0);

        cache.put("k", &1_u64).await;
        let _: Option<u64> = cache.get("missing").await;
        let _: Option<u64> = cache.get("k").await;

        assert!((cache.stats().hit_ratio() - 0.5).abs() < 1e-12);
    }
}
