use rand::Rng;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Fraction of requests that trigger a cleanup pass.
pub const SWEEP_PROBABILITY: f64 = 0.1;

/// A cached value together with the instant it was stored.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub data: T,
    inserted_at: Instant,
    seq: u64,
}

impl<T> CacheEntry<T> {
    pub fn age(&self) -> Duration {
        self.inserted_at.elapsed()
    }
}

/// In-memory cache that bounds both staleness (TTL) and size (oldest-first
/// eviction), keyed by a request fingerprint string.
///
/// Reads never purge: `get` hands back whatever is stored and the caller
/// decides via `is_fresh` whether to use it. Cleanup runs through `sweep`,
/// normally invoked probabilistically per request with `maybe_sweep` so no
/// background task is needed.
#[derive(Debug)]
pub struct TtlCache<T> {
    ttl: Duration,
    max_size: usize,
    inner: Mutex<Inner<T>>,
}

#[derive(Debug)]
struct Inner<T> {
    map: HashMap<String, CacheEntry<T>>,
    // Tie-breaker for eviction when two entries share an instant.
    next_seq: u64,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        Self {
            ttl,
            max_size,
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                next_seq: 0,
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the stored entry, fresh or not.
    pub fn get(&self, key: &str) -> Option<CacheEntry<T>> {
        let inner = self.inner.lock().expect("cache mutex poisoned");
        inner.map.get(key).cloned()
    }

    pub fn is_fresh(&self, entry: &CacheEntry<T>) -> bool {
        entry.age() < self.ttl
    }

    /// Inserts or overwrites, stamping the entry with the current instant.
    pub fn insert(&self, key: impl Into<String>, data: T) {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.map.insert(
            key.into(),
            CacheEntry {
                data,
                inserted_at: Instant::now(),
                seq,
            },
        );
    }

    /// Removes every expired entry, then evicts oldest-first until the map
    /// holds at most `max_size` entries.
    pub fn sweep(&self) {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        let now = Instant::now();
        let ttl = self.ttl;
        inner
            .map
            .retain(|_, entry| now.duration_since(entry.inserted_at) <= ttl);

        if inner.map.len() > self.max_size {
            let mut by_age: Vec<(String, Instant, u64)> = inner
                .map
                .iter()
                .map(|(key, entry)| (key.clone(), entry.inserted_at, entry.seq))
                .collect();
            by_age.sort_by_key(|&(_, inserted_at, seq)| (inserted_at, seq));
            let excess = inner.map.len() - self.max_size;
            for (key, _, _) in by_age.into_iter().take(excess) {
                inner.map.remove(&key);
            }
        }
    }

    /// Runs `sweep` on roughly one call in ten.
    pub fn maybe_sweep(&self) {
        if rand::thread_rng().gen::<f64>() < SWEEP_PROBABILITY {
            self.sweep();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache mutex poisoned").map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minutes(n: u64) -> Duration {
        Duration::from_secs(n * 60)
    }

    #[test]
    fn get_returns_most_recent_insert() {
        let cache = TtlCache::new(minutes(15), 50);
        cache.insert("en-tech-normal", 1);
        cache.insert("en-tech-normal", 2);
        let entry = cache.get("en-tech-normal").unwrap();
        assert_eq!(entry.data, 2);
        assert!(cache.is_fresh(&entry));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn miss_on_unknown_key() {
        let cache: TtlCache<u32> = TtlCache::new(minutes(15), 50);
        assert!(cache.get("de-sports-preview").is_none());
    }

    #[test]
    fn stale_entry_survives_get_but_fails_freshness() {
        let cache = TtlCache::new(Duration::from_millis(20), 50);
        cache.insert("en-tech-normal", 7);
        std::thread::sleep(Duration::from_millis(40));
        // The store does not purge on read.
        let entry = cache.get("en-tech-normal").unwrap();
        assert!(!cache.is_fresh(&entry));
    }

    #[test]
    fn entry_within_ttl_is_fresh() {
        let cache = TtlCache::new(minutes(15), 50);
        cache.insert("en-tech-normal", 7);
        let entry = cache.get("en-tech-normal").unwrap();
        assert!(cache.is_fresh(&entry));
        assert_eq!(entry.data, 7);
    }

    #[test]
    fn sweep_removes_expired_entries() {
        let cache = TtlCache::new(Duration::from_millis(20), 50);
        cache.insert("old", 1);
        std::thread::sleep(Duration::from_millis(40));
        cache.insert("new", 2);
        cache.sweep();
        assert!(cache.get("old").is_none());
        assert!(cache.get("new").is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn sweep_evicts_oldest_beyond_max_size() {
        let cache = TtlCache::new(minutes(15), 50);
        for i in 0..51 {
            cache.insert(format!("key-{i}"), i);
        }
        assert_eq!(cache.len(), 51);
        cache.sweep();
        assert_eq!(cache.len(), 50);
        // The single oldest insert goes first.
        assert!(cache.get("key-0").is_none());
        for i in 1..51 {
            assert!(cache.get(&format!("key-{i}")).is_some(), "key-{i} evicted");
        }
    }

    #[test]
    fn eviction_keeps_most_recently_set_entries() {
        let cache = TtlCache::new(minutes(15), 3);
        for key in ["a", "b", "c", "d", "e"] {
            cache.insert(key, key.len());
        }
        cache.sweep();
        assert_eq!(cache.len(), 3);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
        assert!(cache.get("d").is_some());
        assert!(cache.get("e").is_some());
    }

    #[test]
    fn overwrite_refreshes_eviction_order() {
        let cache = TtlCache::new(minutes(15), 2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("a", 3); // "b" is now the oldest
        cache.insert("c", 4);
        cache.sweep();
        assert_eq!(cache.len(), 2);
        assert!(cache.get("b").is_none());
        assert_eq!(cache.get("a").unwrap().data, 3);
        assert_eq!(cache.get("c").unwrap().data, 4);
    }

    #[test]
    fn sweep_is_a_noop_within_bounds() {
        let cache = TtlCache::new(minutes(15), 50);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.sweep();
        assert_eq!(cache.len(), 2);
    }
}
