//! Content-hash dedup cache.
//!
//! Existence of a hash means "already seen", independent of whether the
//! transaction is still queued: after a commit, hashes of applied
//! transactions stay cached to block replay while the transactions
//! themselves leave the queue.

use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;
use umber_types::Hash256;

/// Dedup cache over fixed-width content hashes.
///
/// A race between two admissions of the same hash must resolve to exactly
/// one `try_add` winner.
pub trait TxCache: Send + Sync {
    /// Insert a hash. Returns `true` if newly inserted, `false` if already
    /// present.
    fn try_add(&self, hash: Hash256) -> bool;

    /// Forget a hash, allowing the transaction to be resubmitted.
    fn remove(&self, hash: &Hash256);

    /// Drop all entries.
    fn reset(&self);
}

/// Bounded hash-set cache with first-in-first-out eviction.
///
/// Entries carry no payload; the set plus an insertion-order ring bound
/// memory at `capacity` fixed-size entries. All operations take the single
/// internal mutex, which serializes racing admissions of one hash.
pub struct MapTxCache {
    inner: Mutex<MapTxCacheInner>,
    capacity: usize,
}

struct MapTxCacheInner {
    set: HashSet<Hash256>,
    order: VecDeque<Hash256>,
}

impl MapTxCache {
    /// Create a cache bounded to `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(MapTxCacheInner {
                set: HashSet::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
            }),
            capacity: capacity.max(1),
        }
    }

    /// Number of cached hashes.
    pub fn len(&self) -> usize {
        self.inner.lock().set.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TxCache for MapTxCache {
    fn try_add(&self, hash: Hash256) -> bool {
        let mut inner = self.inner.lock();
        if !inner.set.insert(hash) {
            return false;
        }
        inner.order.push_back(hash);
        // Evict oldest entries past capacity. Stale order entries from
        // `remove` are skipped because they no longer exist in the set.
        while inner.set.len() > self.capacity {
            match inner.order.pop_front() {
                Some(old) => {
                    inner.set.remove(&old);
                }
                None => break,
            }
        }
        true
    }

    fn remove(&self, hash: &Hash256) {
        let mut inner = self.inner.lock();
        if inner.set.remove(hash) {
            // Lazy removal from the order ring: the entry is skipped at
            // eviction time. Compact when the ring has drifted far from
            // the live set to keep memory bounded.
            if inner.order.len() > inner.set.len().saturating_mul(2) + 16 {
                let set = std::mem::take(&mut inner.set);
                inner.order.retain(|h| set.contains(h));
                inner.set = set;
            }
        }
    }

    fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.set.clear();
        inner.order.clear();
    }
}

/// Pass-through cache used when caching is disabled by configuration.
///
/// Every `try_add` wins, so nothing is ever deduplicated.
pub struct NopTxCache;

impl TxCache for NopTxCache {
    fn try_add(&self, _hash: Hash256) -> bool {
        true
    }

    fn remove(&self, _hash: &Hash256) {}

    fn reset(&self) {}
}
