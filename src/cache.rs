//! Read-through TTL cache with whole-entry invalidation
//!
//! Entries are replaced or dropped as a unit and never patched in place. A
//! poisoned lock is treated as a miss (reads) or skipped (writes), so the
//! cache can only ever cost an extra remote call, never a wrong answer.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// In-memory cache whose entries expire after a fixed time-to-live
///
/// # Examples
///
/// ```
/// use clover::cache::TtlCache;
/// use std::time::Duration;
///
/// let cache: TtlCache<String, Vec<u32>> = TtlCache::new(Duration::from_secs(30));
/// cache.insert("user-1".to_string(), vec![1, 2, 3]);
/// assert_eq!(cache.get(&"user-1".to_string()), Some(vec![1, 2, 3]));
///
/// cache.invalidate(&"user-1".to_string());
/// assert_eq!(cache.get(&"user-1".to_string()), None);
/// ```
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, (V, Instant)>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create an empty cache. A zero `ttl` disables caching.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Time-to-live applied to new entries
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return a clone of the entry if it exists and has not expired
    pub fn get(&self, key: &K) -> Option<V> {
        let guard = self.entries.read().ok()?;
        let (value, expires_at) = guard.get(key)?;
        if Instant::now() < *expires_at {
            Some(value.clone())
        } else {
            None
        }
    }

    /// Store `value` under `key`, replacing any previous entry
    pub fn insert(&self, key: K, value: V) {
        if self.ttl.is_zero() {
            return;
        }
        let expires_at = Instant::now() + self.ttl;
        match self.entries.write() {
            Ok(mut guard) => {
                guard.retain(|_, (_, exp)| Instant::now() < *exp);
                guard.insert(key, (value, expires_at));
            }
            Err(_) => tracing::warn!("Failed to acquire write lock on cache"),
        }
    }

    /// Drop the entry for `key`
    pub fn invalidate(&self, key: &K) {
        match self.entries.write() {
            Ok(mut guard) => {
                guard.remove(key);
            }
            Err(_) => tracing::warn!("Failed to acquire write lock on cache"),
        }
    }

    /// Drop every entry whose key matches `predicate`
    pub fn invalidate_where<F>(&self, predicate: F)
    where
        F: Fn(&K) -> bool,
    {
        match self.entries.write() {
            Ok(mut guard) => guard.retain(|key, _| !predicate(key)),
            Err(_) => tracing::warn!("Failed to acquire write lock on cache"),
        }
    }

    /// Drop every entry
    pub fn clear(&self) {
        match self.entries.write() {
            Ok(mut guard) => guard.clear(),
            Err(_) => tracing::warn!("Failed to acquire write lock on cache"),
        }
    }

    /// Number of live (unexpired) entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .map(|guard| guard.values().filter(|(_, exp)| now < *exp).count())
            .unwrap_or(0)
    }

    /// Returns `true` when no live entry is cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_missing_key() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_secs(30));
        assert_eq!(cache.get(&"nope"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_insert_then_get() {
        let cache = TtlCache::new(Duration::from_secs(30));
        cache.insert("k", 7);
        assert_eq!(cache.get(&"k"), Some(7));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_insert_replaces_whole_entry() {
        let cache = TtlCache::new(Duration::from_secs(30));
        cache.insert("k", vec![1, 2]);
        cache.insert("k", vec![3]);
        assert_eq!(cache.get(&"k"), Some(vec![3]));
    }

    #[test]
    fn test_entries_expire() {
        let cache = TtlCache::new(Duration::from_millis(20));
        cache.insert("k", 1);
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.get(&"k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_ttl_disables_caching() {
        let cache = TtlCache::new(Duration::ZERO);
        cache.insert("k", 1);
        assert_eq!(cache.get(&"k"), None);
    }

    #[test]
    fn test_invalidate_only_drops_one_key() {
        let cache = TtlCache::new(Duration::from_secs(30));
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.invalidate(&"a");
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(2));
    }

    #[test]
    fn test_invalidate_where_matches_keys() {
        let cache = TtlCache::new(Duration::from_secs(30));
        cache.insert(("u-1", "a"), 1);
        cache.insert(("u-1", "b"), 2);
        cache.insert(("u-2", "a"), 3);
        cache.invalidate_where(|(user, _)| *user == "u-1");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&("u-2", "a")), Some(3));
    }

    #[test]
    fn test_clear_drops_everything() {
        let cache = TtlCache::new(Duration::from_secs(30));
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.clear();
        assert!(cache.is_empty());
    }
}
