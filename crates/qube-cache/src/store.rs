//! Member-set cache stores
//!
//! A store maps string keys to detached member sets. Stores are shared by
//! every in-flight query of the process, so they handle their own locking;
//! callers never lock around them.

use crate::options::CacheOptions;
use qube_core::DetachedMemberSet;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tracing::debug;

/// A thread-safe, string-keyed store of detached member sets
pub trait MemberSetCache: Send + Sync {
    /// Get a live entry
    fn get(&self, key: &str) -> Option<Arc<DetachedMemberSet>>;

    /// Get a live entry without counting it as a lookup
    fn peek(&self, key: &str) -> Option<Arc<DetachedMemberSet>>;

    /// Insert or replace an entry
    fn put(&self, key: String, value: DetachedMemberSet);

    /// Remove an entry; returns whether it existed
    fn remove(&self, key: &str) -> bool;

    /// Remove every entry whose key starts with `prefix`; returns the count
    fn remove_by_prefix(&self, prefix: &str) -> usize;

    /// Remove every entry
    fn clear(&self);

    /// Number of entries currently held, including any not yet purged
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Counters kept by [`InMemoryCache`]
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    puts: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheStats {
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

struct CacheEntry {
    value: Arc<DetachedMemberSet>,
    inserted_at: Instant,
    sequence: u64,
}

/// Entries plus their insertion order
///
/// `order` may hold keys that were since replaced or removed; an element
/// is live only while its sequence matches the entry's.
#[derive(Default)]
struct Entries {
    map: HashMap<String, CacheEntry>,
    order: VecDeque<(u64, String)>,
}

impl Entries {
    fn insert(&mut self, key: String, entry: CacheEntry) {
        self.order.push_back((entry.sequence, key.clone()));
        self.map.insert(key, entry);
        if self.order.len() > 2 * self.map.len() + 16 {
            self.compact();
        }
    }

    fn compact(&mut self) {
        let map = &self.map;
        self.order
            .retain(|(seq, key)| map.get(key).is_some_and(|e| e.sequence == *seq));
    }

    fn clear(&mut self) {
        self.map.clear();
        self.order.clear();
    }
}

/// In-process store with a global TTL and an overall entry cap
///
/// Expired entries are dropped lazily on access and eagerly whenever the
/// cap is reached; if the store is still full after that, the oldest tenth
/// of the entries is evicted.
pub struct InMemoryCache {
    entries: RwLock<Entries>,
    options: CacheOptions,
    sequence: AtomicU64,
    stats: CacheStats,
}

impl InMemoryCache {
    /// Create a new store
    pub fn new(options: CacheOptions) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            options,
            sequence: AtomicU64::new(0),
            stats: CacheStats::default(),
        }
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    /// Drop every expired entry; returns the count
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let removed = Self::purge_locked(&mut entries, &self.options);
        CacheStats::bump(&self.stats.expirations, removed as u64);
        removed
    }

    fn is_expired(entry: &CacheEntry, options: &CacheOptions) -> bool {
        entry.inserted_at.elapsed() >= options.ttl
    }

    fn purge_locked(entries: &mut Entries, options: &CacheOptions) -> usize {
        let before = entries.map.len();
        entries.map.retain(|_, e| !Self::is_expired(e, options));
        before - entries.map.len()
    }

    /// Pop the oldest live entries off the insertion queue
    fn evict_oldest_locked(entries: &mut Entries, count: usize) -> usize {
        let mut evicted = 0;
        while evicted < count {
            let Some((seq, key)) = entries.order.pop_front() else {
                break;
            };
            if entries.map.get(&key).is_some_and(|e| e.sequence == seq) {
                entries.map.remove(&key);
                evicted += 1;
            }
        }
        evicted
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new(CacheOptions::default())
    }
}

impl MemberSetCache for InMemoryCache {
    fn get(&self, key: &str) -> Option<Arc<DetachedMemberSet>> {
        if !self.options.enabled {
            return None;
        }

        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.map.get(key) {
                Some(entry) if !Self::is_expired(entry, &self.options) => {
                    CacheStats::bump(&self.stats.hits, 1);
                    return Some(Arc::clone(&entry.value));
                }
                Some(_) => {}
                None => {
                    CacheStats::bump(&self.stats.misses, 1);
                    return None;
                }
            }
        }

        // Expired: drop it under the write lock unless someone refreshed it meanwhile
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.map.get(key) {
            if Self::is_expired(entry, &self.options) {
                entries.map.remove(key);
                CacheStats::bump(&self.stats.expirations, 1);
            } else {
                CacheStats::bump(&self.stats.hits, 1);
                return Some(Arc::clone(&entry.value));
            }
        }
        CacheStats::bump(&self.stats.misses, 1);
        None
    }

    fn peek(&self, key: &str) -> Option<Arc<DetachedMemberSet>> {
        if !self.options.enabled {
            return None;
        }
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .map
            .get(key)
            .filter(|e| !Self::is_expired(e, &self.options))
            .map(|e| Arc::clone(&e.value))
    }

    fn put(&self, key: String, value: DetachedMemberSet) {
        if !self.options.enabled || self.options.max_entries == 0 {
            return;
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if !entries.map.contains_key(&key) && entries.map.len() >= self.options.max_entries {
            let expired = Self::purge_locked(&mut entries, &self.options);
            CacheStats::bump(&self.stats.expirations, expired as u64);

            if entries.map.len() >= self.options.max_entries {
                let batch = (self.options.max_entries / 10).max(1);
                let evicted = Self::evict_oldest_locked(&mut entries, batch);
                CacheStats::bump(&self.stats.evictions, evicted as u64);
                debug!("Evicted {} member sets from full cache", evicted);
            }
        }

        let entry = CacheEntry {
            value: Arc::new(value),
            inserted_at: Instant::now(),
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };
        entries.insert(key, entry);
        CacheStats::bump(&self.stats.puts, 1);
    }

    fn remove(&self, key: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.map.remove(key).is_some()
    }

    fn remove_by_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.map.len();
        entries.map.retain(|k, _| !k.starts_with(prefix));
        before - entries.map.len()
    }

    fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
    }

    fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.map.len()
    }
}
