//! TTL caches for remote metadata
//!
//! Directory ids, listing pages and pickcodes change rarely but cost a
//! rate-limited request each, so clients keep them in moka caches with a
//! fixed time-to-live. The caches are plain values handed to clients, so a
//! process can share one set between every account; keys always carry the
//! account's credential fingerprint.

use std::{sync::Arc, time::Duration};

use freestrm_core::config::CacheConfig;
use moka::sync::Cache;
use serde::Serialize;

use crate::client::ListPage;

/// A string-keyed cache whose entries expire a fixed time after insertion.
#[derive(Clone)]
pub struct TtlCache<V: Clone + Send + Sync + 'static> {
    cache: Cache<String, V>,
}

impl<V: Clone + Send + Sync + 'static> TtlCache<V> {
    pub fn new(ttl: Duration, max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();
        Self { cache }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.cache.get(key)
    }

    pub fn insert(&self, key: String, value: V) {
        self.cache.insert(key, value);
    }

    pub fn invalidate(&self, key: &str) {
        self.cache.invalidate(key);
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    /// Drop expired entries now instead of lazily.
    pub fn purge_expired(&self) {
        self.cache.run_pending_tasks();
    }

    /// Entries currently held, after pending maintenance.
    pub fn len(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Entry counts of each cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub dir_ids: u64,
    pub listings: u64,
    pub pickcodes: u64,
}

/// The caches one 115 client reads through
#[derive(Clone)]
pub struct DriveCaches {
    /// `path` -> directory id, 10 minutes by default
    pub dir_ids: TtlCache<String>,
    /// `(dir id, page)` -> listing page, 5 minutes by default
    pub listings: TtlCache<Arc<ListPage>>,
    /// file id -> pickcode, 30 minutes by default
    pub pickcodes: TtlCache<String>,
}

impl DriveCaches {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            dir_ids: TtlCache::new(
                Duration::from_secs(config.dir_id_ttl_secs),
                config.max_entries,
            ),
            listings: TtlCache::new(
                Duration::from_secs(config.listing_ttl_secs),
                config.max_entries,
            ),
            pickcodes: TtlCache::new(
                Duration::from_secs(config.pickcode_ttl_secs),
                config.max_entries,
            ),
        }
    }

    pub fn clear_all(&self) {
        self.dir_ids.clear();
        self.listings.clear();
        self.pickcodes.clear();
    }

    pub fn purge_expired(&self) {
        self.dir_ids.purge_expired();
        self.listings.purge_expired();
        self.pickcodes.purge_expired();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            dir_ids: self.dir_ids.len(),
            listings: self.listings.len(),
            pickcodes: self.pickcodes.len(),
        }
    }
}

impl Default for DriveCaches {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

/// Cache key scoped to one credential.
pub fn scoped_key(kind: &str, id: &str, fingerprint: &str) -> String {
    format!("{kind}:{id}:{fingerprint}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get() {
        let cache: TtlCache<String> = TtlCache::new(Duration::from_secs(60), 100);
        cache.insert("dir_id:/media:abc".into(), "42".into());
        assert_eq!(cache.get("dir_id:/media:abc").as_deref(), Some("42"));
        assert_eq!(cache.get("dir_id:/other:abc"), None);
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache: TtlCache<String> = TtlCache::new(Duration::from_millis(50), 100);
        cache.insert("k".into(), "v".into());
        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn keys_are_scoped_by_fingerprint() {
        let caches = DriveCaches::default();
        caches
            .pickcodes
            .insert(scoped_key("pickcode", "100", "aaaa"), "pc-a".into());
        assert_eq!(
            caches.pickcodes.get(&scoped_key("pickcode", "100", "bbbb")),
            None
        );
    }

    #[test]
    fn clear_all_and_stats() {
        let caches = DriveCaches::default();
        caches.dir_ids.insert("a".into(), "1".into());
        caches.pickcodes.insert("b".into(), "2".into());
        assert_eq!(caches.stats().dir_ids, 1);
        assert_eq!(caches.stats().pickcodes, 1);

        caches.clear_all();
        caches.purge_expired();
        assert_eq!(caches.dir_ids.get("a"), None);
        assert_eq!(
            caches.stats(),
            CacheStats {
                dir_ids: 0,
                listings: 0,
                pickcodes: 0
            }
        );
    }
}
