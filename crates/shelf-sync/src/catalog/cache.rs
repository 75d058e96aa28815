//! # Catalog Response Cache
//!
//! In-memory TTL cache keyed by operation + parameters.
//!
//! ## Eviction
//! ```text
//! insert(new key) with len == max_entries
//!      │
//!      ▼
//! evict ceil(10% of len) entries with the oldest inserted_at
//!      │
//!      ▼
//! insert                       (1000 entries + 1 new key → 901)
//!
//! CacheSweeper: every sweep_interval, purge_expired()
//! ```
//!
//! Expired entries are also dropped lazily when read.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::config::CatalogSettings;

/// One cached response.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub data: V,
    pub inserted_at: Instant,
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Bounded map with a fixed time-to-live per entry.
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    ttl: Duration,
    max_entries: usize,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        TtlCache {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fresh value for `key`.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.lock();

        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.data.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Stores `value`, evicting the oldest tenth first when full.
    pub fn insert(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let now = Instant::now();
        let mut entries = self.lock();

        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            let count = entries.len().div_ceil(10).max(1);
            Self::evict_oldest(&mut entries, count);
        }

        entries.insert(
            key,
            CacheEntry {
                data: value,
                inserted_at: now,
                expires_at: now + self.ttl,
            },
        );
    }

    fn evict_oldest(entries: &mut HashMap<String, CacheEntry<V>>, count: usize) {
        let mut by_age: Vec<(Instant, String)> = entries
            .iter()
            .map(|(k, e)| (e.inserted_at, k.clone()))
            .collect();
        by_age.sort();

        for (_, key) in by_age.into_iter().take(count) {
            entries.remove(&key);
        }
        debug!(evicted = count, remaining = entries.len(), "Catalog cache full, evicted oldest entries");
    }

    /// Drops every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

// =============================================================================
// Background Sweep
// =============================================================================

/// Periodic purge of expired entries. Stops when dropped.
#[derive(Debug)]
pub struct CacheSweeper {
    handle: JoinHandle<()>,
}

impl CacheSweeper {
    /// Starts sweeping `cache` every `interval`. Needs a Tokio runtime.
    pub fn spawn<V>(cache: Arc<TtlCache<V>>, interval: Duration) -> Self
    where
        V: Clone + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let purged = cache.purge_expired();
                if purged > 0 {
                    debug!(purged, "Swept expired catalog entries");
                }
            }
        });

        CacheSweeper { handle }
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for CacheSweeper {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// =============================================================================
// Process-Wide Instance
// =============================================================================

/// Shared catalog responses, stored as validated JSON.
pub type ResponseCache = TtlCache<serde_json::Value>;

fn shared_slot() -> &'static Mutex<Option<Arc<ResponseCache>>> {
    static SHARED: OnceLock<Mutex<Option<Arc<ResponseCache>>>> = OnceLock::new();
    SHARED.get_or_init(|| Mutex::new(None))
}

/// The process-wide response cache, created from `settings` on first use.
pub fn shared_cache(settings: &CatalogSettings) -> Arc<ResponseCache> {
    let mut slot = shared_slot().lock().unwrap_or_else(|p| p.into_inner());
    Arc::clone(slot.get_or_insert_with(|| Arc::new(TtlCache::new(settings.ttl(), settings.max_entries))))
}

/// Drops the process-wide response cache.
pub fn reset_shared_cache() {
    *shared_slot().lock().unwrap_or_else(|p| p.into_inner()) = None;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = TtlCache::new(Duration::from_secs(3600), 10);
        cache.insert("product:SKU001", 1);
        assert_eq!(cache.get("product:SKU001"), Some(1));

        tokio::time::advance(Duration::from_secs(3599)).await;
        assert_eq!(cache.get("product:SKU001"), Some(1));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("product:SKU001"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_cache_evicts_oldest_tenth() {
        let cache = TtlCache::new(Duration::from_secs(3600), 1000);
        for i in 0..1000 {
            cache.insert(format!("k{}", i), i);
            tokio::time::advance(Duration::from_millis(1)).await;
        }
        assert_eq!(cache.len(), 1000);

        cache.insert("k1000", 1000);
        assert!(cache.len() <= 901);
        assert_eq!(cache.get("k0"), None);
        assert_eq!(cache.get("k99"), None);
        assert_eq!(cache.get("k100"), Some(100));
        assert_eq!(cache.get("k1000"), Some(1000));
    }

    #[tokio::test]
    async fn test_overwrite_does_not_evict() {
        let cache = TtlCache::new(Duration::from_secs(60), 2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("a", 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_purges_without_reads() {
        let cache = Arc::new(TtlCache::new(Duration::from_secs(10), 100));
        cache.insert("a", 1);
        let sweeper = CacheSweeper::spawn(Arc::clone(&cache), Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(cache.len(), 0);
        sweeper.stop();
    }

    #[test]
    fn test_shared_cache_reset() {
        let settings = CatalogSettings::default();
        reset_shared_cache();
        let first = shared_cache(&settings);
        assert!(Arc::ptr_eq(&first, &shared_cache(&settings)));
        reset_shared_cache();
        assert!(!Arc::ptr_eq(&first, &shared_cache(&settings)));
        reset_shared_cache();
    }
}
