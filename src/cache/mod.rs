//! In-memory TTL cache with LRU eviction.
//!
//! Entries are keyed by `(namespace, key)`. An entry is fresh while
//! `now - stored_at < ttl`; expired entries are dropped lazily by [`TtlCache::get`], but stay
//! visible to [`TtlCache::lookup`] so that stale data can still be served while revalidating
//! or as a fallback on error. Capacity pressure evicts the least recently accessed entry.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

/// The opaque payload the request executor stores.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Namespace used when a caller does not pick one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Default maximum number of entries.
pub const DEFAULT_CAPACITY: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    namespace: String,
    key: String,
}

impl CacheKey {
    fn new(key: &str, namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            key: key.to_string(),
        }
    }
}

/// A single cached value and its bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub key: String,
    pub namespace: String,
    pub value: V,
    pub stored_at: Instant,
    pub ttl: Duration,
    last_access: u64,
}

impl<V> CacheEntry<V> {
    /// Time elapsed since the value was stored.
    #[must_use]
    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.stored_at)
    }

    /// Whether the entry is still within its TTL.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.age() < self.ttl
    }
}

/// Result of [`TtlCache::lookup`].
#[derive(Debug, Clone)]
pub struct Lookup<V> {
    pub value: V,
    /// False if the entry outlived its TTL.
    pub fresh: bool,
    pub age: Duration,
}

/// Counters since construction or the last [`TtlCache::reset_stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub sets: u64,
    pub size: usize,
}

#[derive(Debug)]
struct Inner<V> {
    entries: HashMap<CacheKey, CacheEntry<V>>,
    // access tick -> key, oldest first
    order: BTreeMap<u64, CacheKey>,
    tick: u64,
    stats: CacheStats,
}

impl<V> Inner<V> {
    fn touch(&mut self, key: &CacheKey) {
        self.tick += 1;
        let tick = self.tick;
        if let Some(entry) = self.entries.get_mut(key) {
            self.order.remove(&entry.last_access);
            entry.last_access = tick;
            self.order.insert(tick, key.clone());
        }
    }

    fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.last_access);
        Some(entry)
    }

    fn evict_lru(&mut self) -> Option<CacheKey> {
        let (_, key) = self.order.pop_first()?;
        self.entries.remove(&key);
        self.stats.evictions += 1;
        Some(key)
    }
}

/// A bounded key-value store with per-entry expiry.
#[derive(Debug)]
pub struct TtlCache<V = Payload> {
    inner: Mutex<Inner<V>>,
    max_entries: usize,
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl<V: Clone> TtlCache<V> {
    /// Creates a cache holding at most `max_entries` values (at least one).
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                tick: 0,
                stats: CacheStats::default(),
            }),
            max_entries: max_entries.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    /// Returns the value if it is still fresh. Expired entries are evicted.
    pub fn get(&self, key: &str, namespace: &str) -> Option<V> {
        let ck = CacheKey::new(key, namespace);
        let mut inner = self.lock();

        let fresh = inner.entries.get(&ck).map(CacheEntry::is_fresh);
        match fresh {
            Some(true) => {
                inner.stats.hits += 1;
                inner.touch(&ck);
                inner.entries.get(&ck).map(|e| e.value.clone())
            }
            Some(false) => {
                inner.remove(&ck);
                inner.stats.evictions += 1;
                inner.stats.misses += 1;
                None
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Returns the value whether or not it has expired, with its freshness.
    ///
    /// Counts a hit only for fresh entries. Nothing is evicted.
    pub fn lookup(&self, key: &str, namespace: &str) -> Option<Lookup<V>> {
        let ck = CacheKey::new(key, namespace);
        let mut inner = self.lock();

        let Some(entry) = inner.entries.get(&ck) else {
            inner.stats.misses += 1;
            return None;
        };
        let found = Lookup {
            value: entry.value.clone(),
            fresh: entry.is_fresh(),
            age: entry.age(),
        };
        if found.fresh {
            inner.stats.hits += 1;
        } else {
            inner.stats.misses += 1;
        }
        inner.touch(&ck);
        Some(found)
    }

    /// Inserts or overwrites a value. A zero `ttl` means "do not cache" and drops any existing
    /// entry for the key.
    pub fn set(&self, key: &str, value: V, ttl: Duration, namespace: &str) {
        let ck = CacheKey::new(key, namespace);
        let mut inner = self.lock();

        if ttl.is_zero() {
            inner.remove(&ck);
            return;
        }

        let existing = inner.remove(&ck).is_some();
        if !existing {
            while inner.entries.len() >= self.max_entries {
                if inner.evict_lru().is_none() {
                    break;
                }
            }
        }

        inner.entries.insert(
            ck.clone(),
            CacheEntry {
                key: ck.key.clone(),
                namespace: ck.namespace.clone(),
                value,
                stored_at: Instant::now(),
                ttl,
                last_access: 0,
            },
        );
        inner.touch(&ck);
        inner.stats.sets += 1;
    }

    /// Removes one entry. Returns whether it existed.
    pub fn remove(&self, key: &str, namespace: &str) -> bool {
        self.lock().remove(&CacheKey::new(key, namespace)).is_some()
    }

    /// Removes every entry, or only those in `namespace`.
    pub fn clear(&self, namespace: Option<&str>) {
        let mut inner = self.lock();
        match namespace {
            None => {
                inner.entries.clear();
                inner.order.clear();
            }
            Some(ns) => {
                let doomed: Vec<CacheKey> = inner
                    .entries
                    .keys()
                    .filter(|k| k.namespace == ns)
                    .cloned()
                    .collect();
                for k in &doomed {
                    inner.remove(k);
                }
            }
        }
    }

    /// A snapshot of an entry, including expired ones. Does not affect recency or counters.
    #[must_use]
    pub fn peek(&self, key: &str, namespace: &str) -> Option<CacheEntry<V>> {
        self.lock().entries.get(&CacheKey::new(key, namespace)).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            size: inner.entries.len(),
            ..inner.stats
        }
    }

    /// Zeroes the counters. Entries are kept.
    pub fn reset_stats(&self) {
        self.lock().stats = CacheStats::default();
    }
}
