use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

/// A stored value plus its absolute expiry. Entries are immutable:
/// updates replace the whole entry, never mutate it in place.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    pub fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// Bounded true-LRU cache with per-entry TTL. A `get` past the TTL behaves
/// as absent and evicts the entry lazily; when capacity is exceeded the
/// least-recently-touched entry goes first.
pub struct TtlCache<V> {
    inner: Mutex<LruCache<String, CacheEntry<V>>>,
    default_ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(max_size.max(1)).expect("cache capacity");
        Self {
            inner: Mutex::new(LruCache::new(cap)),
            default_ttl,
        }
    }

    /// Fresh hit: promotes the entry to most-recent and returns a clone.
    /// Expired hit: removes the entry and reports a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut guard = self.inner.lock().expect("cache lock");
        match guard.get(key) {
            Some(entry) if !entry.is_expired() => return Some(entry.value.clone()),
            Some(_) => {}
            None => return None,
        }
        guard.pop(key);
        None
    }

    /// Raw entry lookup without promotion or expiry eviction. Returns the
    /// entry even past its TTL; this is how stale-fallback candidates are
    /// captured before a normal `get` would evict them.
    pub fn peek_entry(&self, key: &str) -> Option<CacheEntry<V>> {
        let guard = self.inner.lock().expect("cache lock");
        guard.peek(key).cloned()
    }

    pub fn set(&self, key: &str, value: V, ttl: Option<Duration>) {
        let expires_at = Instant::now() + ttl.unwrap_or(self.default_ttl);
        let mut guard = self.inner.lock().expect("cache lock");
        guard.put(key.to_string(), CacheEntry { value, expires_at });
    }

    pub fn delete(&self, key: &str) {
        let mut guard = self.inner.lock().expect("cache lock");
        guard.pop(key);
    }

    pub fn clear(&self) {
        let mut guard = self.inner.lock().expect("cache lock");
        guard.clear();
    }

    pub fn len(&self) -> usize {
        let guard = self.inner.lock().expect("cache lock");
        guard.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(cap: usize) -> TtlCache<String> {
        TtlCache::new(cap, Duration::from_secs(60))
    }

    #[test]
    fn evicts_least_recently_touched_not_oldest_inserted() {
        let cache = cache(3);
        cache.set("a", "1".into(), None);
        cache.set("b", "2".into(), None);
        cache.set("c", "3".into(), None);

        // Touch the oldest-inserted entry so "b" becomes the LRU victim.
        assert!(cache.get("a").is_some());
        cache.set("d", "4".into(), None);

        assert!(cache.get("a").is_some(), "touched entry must survive");
        assert!(cache.get("b").is_none(), "least-recently-used entry evicted");
        assert!(cache.get("c").is_some());
        assert!(cache.get("d").is_some());
    }

    #[test]
    fn expired_get_reports_absent_and_removes_entry() {
        let cache = cache(4);
        cache.set("k", "v".into(), Some(Duration::from_millis(5)));
        std::thread::sleep(Duration::from_millis(20));

        assert!(cache.get("k").is_none());
        assert_eq!(cache.len(), 0, "lazy eviction removed the entry");
    }

    #[test]
    fn peek_entry_returns_expired_value_without_evicting() {
        let cache = cache(4);
        cache.set("k", "v".into(), Some(Duration::from_millis(5)));
        std::thread::sleep(Duration::from_millis(20));

        let entry = cache.peek_entry("k").expect("stale entry still present");
        assert!(entry.is_expired());
        assert_eq!(entry.value, "v");

        // A normal lookup afterwards evicts it.
        assert!(cache.get("k").is_none());
        assert!(cache.peek_entry("k").is_none());
    }

    #[test]
    fn delete_and_clear_remove_entries() {
        let cache = cache(4);
        cache.set("a", "1".into(), None);
        cache.set("b", "2".into(), None);

        cache.delete("a");
        assert!(cache.get("a").is_none());
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.get("b").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn set_replaces_and_refreshes_recency() {
        let cache = cache(2);
        cache.set("a", "1".into(), None);
        cache.set("b", "2".into(), None);
        cache.set("a", "updated".into(), None);
        cache.set("c", "3".into(), None);

        assert_eq!(cache.get("a").as_deref(), Some("updated"));
        assert!(cache.get("b").is_none(), "b was least recent after a's rewrite");
    }
}
