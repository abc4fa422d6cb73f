//! Bounded in-memory tier for repeated identical queries within a session.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::clock::{Clock, is_expired};

/// Default number of entries kept.
pub const DEFAULT_MEMORY_CAPACITY: usize = 100;

/// Default entry lifetime.
pub const DEFAULT_MEMORY_TTL: Duration = Duration::from_secs(5 * 60);

/// Snapshot of memory-tier counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryCacheStats {
    /// Live and stale entries currently held.
    pub entries: usize,
    /// Maximum entries before eviction.
    pub capacity: usize,
    /// TTL in seconds.
    pub ttl_secs: u64,
    /// Reads that returned a value.
    pub hits: u64,
    /// Reads that found nothing or a stale entry.
    pub misses: u64,
    /// Writes, including replacements.
    pub sets: u64,
    /// Entries removed to make room.
    pub evictions: u64,
}

struct Slot<V> {
    value: V,
    inserted_at_ms: u64,
}

struct Inner<K, V> {
    slots: HashMap<K, Slot<V>>,
    // Insertion order, oldest first. Reads never reorder it.
    order: VecDeque<K>,
}

/// Key/value cache with a fixed capacity and TTL.
///
/// Eviction removes the earliest-inserted entry; reads do not refresh an
/// entry's position. Replacing an existing key moves it to the newest
/// position without evicting anything.
pub struct MemoryCache<K, V> {
    capacity: usize,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner<K, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    evictions: AtomicU64,
}

impl<K, V> MemoryCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates an empty cache. A `capacity` of zero is treated as one.
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            clock,
            inner: Mutex::new(Inner {
                slots: HashMap::new(),
                order: VecDeque::new(),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Creates a cache with the default capacity and TTL.
    #[must_use]
    pub fn with_defaults(clock: Arc<dyn Clock>) -> Self {
        Self::new(DEFAULT_MEMORY_CAPACITY, DEFAULT_MEMORY_TTL, clock)
    }

    /// Returns the value for `key` if present and younger than the TTL.
    ///
    /// A stale entry is removed as a side effect.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now_millis();
        let mut inner = self.lock();

        let fresh = match inner.slots.get(key) {
            None => None,
            Some(slot) if is_expired(slot.inserted_at_ms, now, self.ttl) => {
                Self::remove_locked(&mut inner, key);
                debug!("memory cache entry expired");
                None
            }
            Some(slot) => Some(slot.value.clone()),
        };
        drop(inner);

        if fresh.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        fresh
    }

    /// Inserts or replaces `key`.
    pub fn set(&self, key: K, value: V) {
        let now = self.clock.now_millis();
        let mut inner = self.lock();

        if inner.slots.contains_key(&key) {
            Self::remove_locked(&mut inner, &key);
        } else {
            while inner.slots.len() >= self.capacity {
                let Some(oldest) = inner.order.pop_front() else {
                    break;
                };
                inner.slots.remove(&oldest);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!("memory cache evicted oldest entry");
            }
        }

        inner.order.push_back(key.clone());
        inner.slots.insert(
            key,
            Slot {
                value,
                inserted_at_ms: now,
            },
        );
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    /// Removes every entry. Counters are kept.
    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        let removed = inner.slots.len();
        inner.slots.clear();
        inner.order.clear();
        removed
    }

    /// Number of entries held, including any not yet found stale.
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    /// True when no entries are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counter snapshot.
    pub fn stats(&self) -> MemoryCacheStats {
        MemoryCacheStats {
            entries: self.len(),
            capacity: self.capacity,
            ttl_secs: self.ttl.as_secs(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner<K, V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove_locked(inner: &mut Inner<K, V>, key: &K) {
        inner.slots.remove(key);
        if let Some(position) = inner.order.iter().position(|k| k == key) {
            inner.order.remove(position);
        }
    }
}

impl<K, V> std::fmt::Debug for MemoryCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
