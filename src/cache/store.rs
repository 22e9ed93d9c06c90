//! Cache Store Module
//!
//! Main cache engine: a single reader-writer locked table with lazy TTL
//! expiration on reads and eager reclamation by the background sweeper.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::cache::stats::StatsRecorder;
use crate::cache::{CacheEntry, CacheStats};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::tasks::{spawn_sweeper, SweeperHandle};

type Table<V> = HashMap<String, CacheEntry<V>>;

/// State shared by every handle to one cache.
struct Shared<V> {
    /// Key-value storage, guarded as a whole
    entries: RwLock<Table<V>>,
    /// Performance statistics
    stats: StatsRecorder,
    /// TTL substituted for zero-TTL writes
    default_ttl: Duration,
}

// == Cache Store ==
/// Thread-safe in-memory cache with per-entry TTL.
///
/// Cloning is cheap and every clone operates on the same table. `get` only
/// takes the read lock and never removes anything: an expired entry is
/// reported absent but stays in memory until the sweeper, a `delete`, an
/// overwrite or a `flush` gets rid of it.
pub struct CacheStore<V> {
    shared: Arc<Shared<V>>,
}

/// Non-owning reference to a [`CacheStore`], held by the sweeper.
pub struct WeakCacheStore<V> {
    shared: Weak<Shared<V>>,
}

impl<V> CacheStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates a new cache and, when `cleanup_interval` is non-zero, starts its sweeper.
    ///
    /// # Arguments
    /// * `default_ttl` - TTL applied to writes that pass `Duration::ZERO`; zero means never expire
    /// * `cleanup_interval` - Sweeper period; zero disables background sweeping
    ///
    /// The returned handle controls the sweeper. Dropping it stops sweeping.
    pub fn new(default_ttl: Duration, cleanup_interval: Duration) -> (Self, SweeperHandle) {
        let store = Self {
            shared: Arc::new(Shared {
                entries: RwLock::new(HashMap::new()),
                stats: StatsRecorder::default(),
                default_ttl,
            }),
        };

        let sweeper = if cleanup_interval.is_zero() {
            debug!("Cleanup interval is zero, background sweeping disabled");
            SweeperHandle::disabled()
        } else {
            spawn_sweeper(store.downgrade(), cleanup_interval)
        };

        (store, sweeper)
    }

    /// Creates a new cache from configuration.
    pub fn from_config(config: &Config) -> (Self, SweeperHandle) {
        Self::new(config.default_ttl, config.cleanup_interval)
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Returns `None` if the key is absent or its entry has expired. Expired
    /// entries are left in place.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let value = self
            .read_entries()
            .get(key)
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| entry.value.clone());

        match value {
            Some(_) => self.shared.stats.record_hit(),
            None => self.shared.stats.record_miss(),
        }
        value
    }

    // == Set ==
    /// Stores a value, replacing any existing entry for the key.
    ///
    /// A zero `ttl` is replaced by the configured default TTL. If that is zero
    /// as well, the entry never expires.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let ttl = if ttl.is_zero() {
            self.shared.default_ttl
        } else {
            ttl
        };

        let entry = CacheEntry::new(value, ttl);
        if entry.expires_at.is_some() {
            debug!("Set key: {} (ttl: {:?})", key, ttl);
        } else {
            debug!("Set key: {} (no expiration)", key);
        }

        self.write_entries().insert(key, entry);
    }

    // == Delete ==
    /// Removes an entry by key.
    ///
    /// Fails with [`CacheError::NotFound`] if the key is absent. An entry that
    /// has expired but not been swept yet is still present and gets removed.
    pub fn delete(&self, key: &str) -> Result<()> {
        let removed = self.write_entries().remove(key);
        match removed {
            Some(_) => {
                debug!("Deleted key: {}", key);
                Ok(())
            }
            None => Err(CacheError::NotFound(key.to_string())),
        }
    }

    // == Flush ==
    /// Discards every entry in one step.
    pub fn flush(&self) {
        let discarded = std::mem::take(&mut *self.write_entries());
        info!("Flushed {} entries", discarded.len());
    }

    // == Sweep Phases ==
    /// Collects the keys whose entries have expired, under the read lock.
    pub fn expired_keys(&self) -> Vec<String> {
        let now = Instant::now();
        self.read_entries()
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Removes the given keys under the write lock, skipping any whose entry
    /// is no longer expired or has disappeared since it was collected.
    ///
    /// Returns the number of entries removed.
    pub fn evict_expired(&self, keys: &[String]) -> usize {
        if keys.is_empty() {
            return 0;
        }

        let now = Instant::now();
        let mut evicted = Vec::with_capacity(keys.len());
        {
            let mut entries = self.write_entries();
            for key in keys {
                let still_expired = entries
                    .get(key)
                    .is_some_and(|entry| entry.is_expired_at(now));
                if still_expired {
                    if let Some(entry) = entries.remove(key) {
                        evicted.push(entry);
                    }
                }
            }
        }

        let count = evicted.len();
        self.shared.stats.record_evictions(count);
        count
    }

    // == Cleanup Expired ==
    /// Runs one scan-and-evict pass on demand.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&self) -> usize {
        let keys = self.expired_keys();
        self.evict_expired(&keys)
    }
}

impl<V> CacheStore<V> {
    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.shared.stats.snapshot(self.len())
    }

    /// Returns true if an entry for `key` is physically stored, expired or not.
    pub fn contains_key(&self, key: &str) -> bool {
        self.read_entries().contains_key(key)
    }

    // == Length ==
    /// Returns the number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    // == Is Empty ==
    /// Returns true if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.read_entries().is_empty()
    }

    /// TTL substituted for zero-TTL writes.
    pub fn default_ttl(&self) -> Duration {
        self.shared.default_ttl
    }

    /// Creates a reference that does not keep the table alive.
    pub fn downgrade(&self) -> WeakCacheStore<V> {
        WeakCacheStore {
            shared: Arc::downgrade(&self.shared),
        }
    }

    // A panic while holding the lock cannot leave an entry half-written,
    // so a poisoned table is still consistent.
    fn read_entries(&self) -> RwLockReadGuard<'_, Table<V>> {
        self.shared
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, Table<V>> {
        self.shared
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V> Clone for CacheStore<V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<V> fmt::Debug for CacheStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("len", &self.len())
            .field("default_ttl", &self.shared.default_ttl)
            .finish()
    }
}

impl<V> WeakCacheStore<V> {
    /// Returns the cache if any strong handle is still alive.
    pub fn upgrade(&self) -> Option<CacheStore<V>> {
        self.shared.upgrade().map(|shared| CacheStore { shared })
    }
}

impl<V> Clone for WeakCacheStore<V> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use tokio_test::{assert_err, assert_ok};

    const SHORT_TTL: Duration = Duration::from_millis(20);
    const PAST_SHORT_TTL: Duration = Duration::from_millis(50);

    fn unswept(default_ttl: Duration) -> CacheStore<String> {
        let (store, sweeper) = CacheStore::new(default_ttl, Duration::ZERO);
        assert!(!sweeper.is_enabled());
        store
    }

    #[test]
    fn test_store_new() {
        let store = unswept(Duration::from_secs(300));
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
        assert_eq!(store.default_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn test_store_get_nonexistent() {
        let store = unswept(Duration::ZERO);
        assert_eq!(store.get("nonexistent"), None);
    }

    #[test]
    fn test_store_set_and_get() {
        let store = unswept(Duration::from_secs(300));

        store.set("key1", "value1".to_string(), Duration::ZERO);

        assert_eq!(store.get("key1").as_deref(), Some("value1"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_overwrite() {
        let store = unswept(Duration::from_secs(300));

        store.set("key1", "value1".to_string(), Duration::ZERO);
        store.set("key1", "value2".to_string(), Duration::ZERO);

        assert_eq!(store.get("key1").as_deref(), Some("value2"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_empty_key_is_valid() {
        let store = unswept(Duration::ZERO);

        store.set("", "empty".to_string(), Duration::ZERO);

        assert_eq!(store.get("").as_deref(), Some("empty"));
        assert_ok!(store.delete(""));
    }

    #[test]
    fn test_store_ttl_expiration_is_lazy() {
        let store = unswept(Duration::ZERO);

        store.set("key1", "value1".to_string(), SHORT_TTL);
        assert!(store.get("key1").is_some());

        sleep(PAST_SHORT_TTL);

        // Reported absent, but still physically stored
        assert_eq!(store.get("key1"), None);
        assert!(store.contains_key("key1"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_zero_ttl_uses_default() {
        let store = unswept(SHORT_TTL);

        store.set("key1", "value1".to_string(), Duration::ZERO);
        assert!(store.get("key1").is_some());

        sleep(PAST_SHORT_TTL);
        assert_eq!(store.get("key1"), None);
    }

    #[test]
    fn test_store_zero_ttl_and_zero_default_never_expires() {
        let store = unswept(Duration::ZERO);

        store.set("key1", "value1".to_string(), Duration::ZERO);
        sleep(PAST_SHORT_TTL);

        assert_eq!(store.get("key1").as_deref(), Some("value1"));
        assert_eq!(store.expired_keys(), Vec::<String>::new());
    }

    #[test]
    fn test_store_explicit_ttl_overrides_default() {
        let store = unswept(SHORT_TTL);

        store.set("key1", "value1".to_string(), Duration::from_secs(60));
        sleep(PAST_SHORT_TTL);

        assert!(store.get("key1").is_some());
    }

    #[test]
    fn test_store_delete() {
        let store = unswept(Duration::ZERO);

        store.set("key1", "value1".to_string(), Duration::ZERO);
        assert_ok!(store.delete("key1"));

        assert!(store.is_empty());
        assert_eq!(store.get("key1"), None);
    }

    #[test]
    fn test_store_delete_nonexistent() {
        let store = unswept(Duration::ZERO);
        store.set("other", "value".to_string(), Duration::ZERO);

        let err = assert_err!(store.delete("nonexistent"));
        assert_eq!(err, CacheError::NotFound("nonexistent".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_delete_expired_entry() {
        let store = unswept(Duration::ZERO);

        store.set("key1", "value1".to_string(), SHORT_TTL);
        sleep(PAST_SHORT_TTL);

        assert_ok!(store.delete("key1"));
        assert!(!store.contains_key("key1"));
    }

    #[test]
    fn test_store_flush() {
        let store = unswept(Duration::ZERO);

        store.set("key1", "value1".to_string(), Duration::ZERO);
        store.set("key2", "value2".to_string(), SHORT_TTL);
        store.flush();

        assert!(store.is_empty());
        assert_eq!(store.get("key1"), None);
        assert_eq!(store.get("key2"), None);

        // Table stays usable after a flush
        store.set("key3", "value3".to_string(), Duration::ZERO);
        assert_eq!(store.get("key3").as_deref(), Some("value3"));
    }

    #[test]
    fn test_store_cleanup_expired() {
        let store = unswept(Duration::ZERO);

        store.set("key1", "value1".to_string(), SHORT_TTL);
        store.set("key2", "value2".to_string(), Duration::from_secs(10));
        store.set("key3", "value3".to_string(), Duration::ZERO);

        sleep(PAST_SHORT_TTL);

        assert_eq!(store.cleanup_expired(), 1);
        assert_eq!(store.len(), 2);
        assert!(!store.contains_key("key1"));
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_evict_skips_refreshed_key() {
        let store = unswept(Duration::ZERO);

        store.set("key1", "stale".to_string(), SHORT_TTL);
        sleep(PAST_SHORT_TTL);

        let expired = store.expired_keys();
        assert_eq!(expired, vec!["key1".to_string()]);

        // Rewritten between scan and evict
        store.set("key1", "fresh".to_string(), Duration::from_secs(60));

        assert_eq!(store.evict_expired(&expired), 0);
        assert_eq!(store.get("key1").as_deref(), Some("fresh"));
    }

    #[test]
    fn test_evict_skips_deleted_key() {
        let store = unswept(Duration::ZERO);

        store.set("key1", "stale".to_string(), SHORT_TTL);
        sleep(PAST_SHORT_TTL);

        let expired = store.expired_keys();
        assert_ok!(store.delete("key1"));

        assert_eq!(store.evict_expired(&expired), 0);
        assert_eq!(store.stats().evictions, 0);
    }

    #[test]
    fn test_store_stats() {
        let store = unswept(Duration::ZERO);

        store.set("key1", "value1".to_string(), Duration::ZERO);
        store.set("key2", "value2".to_string(), SHORT_TTL);
        store.get("key1").unwrap(); // hit
        let _ = store.get("nonexistent"); // miss
        sleep(PAST_SHORT_TTL);
        let _ = store.get("key2"); // expired, miss

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.total_entries, 2);
    }

    #[test]
    fn test_clones_share_table() {
        let store = unswept(Duration::ZERO);
        let other = store.clone();

        store.set("key1", "value1".to_string(), Duration::ZERO);
        assert_eq!(other.get("key1").as_deref(), Some("value1"));

        other.flush();
        assert!(store.is_empty());
    }

    #[test]
    fn test_weak_handle_does_not_keep_table_alive() {
        let store = unswept(Duration::ZERO);
        let weak = store.downgrade();

        assert!(weak.upgrade().is_some());
        drop(store);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_generic_values() {
        let (store, _sweeper) = CacheStore::<Vec<u8>>::new(Duration::ZERO, Duration::ZERO);

        store.set("bytes", vec![1, 2, 3], Duration::ZERO);
        assert_eq!(store.get("bytes"), Some(vec![1, 2, 3]));
    }
}
