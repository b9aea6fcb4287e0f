//! Side pool for nonce-gapped transactions.
//!
//! A transaction whose nonce is ahead of its sender's expected next nonce
//! cannot be queued yet; it parks here until a commit closes the gap, at
//! which point the mempool promotes the contiguous run back through
//! admission. Parked transactions that never become promotable are evicted
//! after a configurable number of eviction periods.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use umber_types::{Address, Hash256};

use crate::error::MempoolError;
use crate::tx::MempoolTx;

/// Bounded pool of transactions waiting for their nonce gap to close.
pub struct PendingPool {
    max_size: usize,
    max_tx_per_address: usize,
    period: Duration,
    reserve_periods: u64,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    /// sender → nonce → parked transaction.
    addr_txs: HashMap<Address, BTreeMap<u64, Arc<MempoolTx>>>,
    /// hash → location, for dedup and hash queries.
    hashes: HashMap<Hash256, (Address, u64)>,
    /// Eviction periods each sender's transactions have sat through.
    period_counter: HashMap<Address, u64>,
}

/// What `add` displaced, if anything.
#[derive(Debug)]
pub enum PendingAdd {
    /// Parked in a fresh slot.
    Fresh,
    /// Replaced a cheaper parked transaction at the same (sender, nonce).
    Superseded(Arc<MempoolTx>),
}

impl PendingPool {
    /// Create a pool with the given bounds and eviction cadence.
    pub fn new(
        max_size: usize,
        max_tx_per_address: usize,
        period: Duration,
        reserve_periods: u64,
    ) -> Self {
        Self {
            max_size,
            max_tx_per_address,
            period,
            reserve_periods,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// The eviction sweep cadence.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Number of parked transactions.
    pub fn len(&self) -> usize {
        self.inner.lock().hashes.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this hash is parked.
    pub fn contains(&self, hash: &Hash256) -> bool {
        self.inner.lock().hashes.contains_key(hash)
    }

    /// Parked transaction by hash.
    pub fn get_by_hash(&self, hash: &Hash256) -> Option<Arc<MempoolTx>> {
        let inner = self.inner.lock();
        let (sender, nonce) = inner.hashes.get(hash)?;
        inner.addr_txs.get(sender)?.get(nonce).cloned()
    }

    /// Parked transaction at a (sender, nonce) slot.
    pub fn get(&self, sender: &Address, nonce: u64) -> Option<Arc<MempoolTx>> {
        self.inner.lock().addr_txs.get(sender)?.get(&nonce).cloned()
    }

    /// Park a transaction.
    ///
    /// A duplicate hash, a full pool, and a sender at its per-address cap
    /// are all rejected. A same-slot transaction with a strictly higher gas
    /// price supersedes the parked one.
    pub fn add(&self, tx: Arc<MempoolTx>) -> Result<PendingAdd, MempoolError> {
        let mut inner = self.inner.lock();
        let hash = tx.hash();
        if inner.hashes.contains_key(&hash) {
            return Err(MempoolError::AlreadyInPendingPool(hash));
        }
        let sender = tx.sender().clone();
        let nonce = tx.nonce();

        if let Some(parked) = inner.addr_txs.get(&sender).and_then(|m| m.get(&nonce)) {
            if tx.gas_price() <= parked.gas_price() {
                let threshold = parked.gas_price();
                return Err(MempoolError::ReplacementUnderpriced {
                    got: tx.gas_price(),
                    threshold,
                });
            }
            let parked = parked.clone();
            inner.hashes.remove(&parked.hash());
            inner.hashes.insert(hash, (sender.clone(), nonce));
            if let Some(m) = inner.addr_txs.get_mut(&sender) {
                m.insert(nonce, tx);
            }
            parked.mark_outdated();
            return Ok(PendingAdd::Superseded(parked));
        }

        if inner.hashes.len() >= self.max_size {
            return Err(MempoolError::PendingPoolIsFull {
                size: inner.hashes.len(),
                max: self.max_size,
            });
        }
        let per_addr = inner.addr_txs.get(&sender).map(|m| m.len()).unwrap_or(0);
        if per_addr >= self.max_tx_per_address {
            return Err(MempoolError::PendingPoolAddressLimitExceeded {
                address: sender.to_string(),
                limit: self.max_tx_per_address,
            });
        }

        inner.hashes.insert(hash, (sender.clone(), nonce));
        inner.addr_txs.entry(sender).or_default().insert(nonce, tx);
        Ok(PendingAdd::Fresh)
    }

    /// Unpark a (sender, nonce) slot.
    pub fn remove(&self, sender: &Address, nonce: u64) -> Option<Arc<MempoolTx>> {
        let mut inner = self.inner.lock();
        let tx = inner.addr_txs.get_mut(sender)?.remove(&nonce)?;
        inner.hashes.remove(&tx.hash());
        if inner.addr_txs.get(sender).is_some_and(|m| m.is_empty()) {
            inner.addr_txs.remove(sender);
            inner.period_counter.remove(sender);
        }
        Some(tx)
    }

    /// Unpark by hash.
    pub fn remove_by_hash(&self, hash: &Hash256) -> Option<Arc<MempoolTx>> {
        let location = {
            let inner = self.inner.lock();
            inner.hashes.get(hash).cloned()
        };
        let (sender, nonce) = location?;
        self.remove(&sender, nonce)
    }

    /// Drop every parked transaction of `sender` with nonce at or below
    /// `up_to`. A commit made these stale; they can never be promoted.
    pub fn clean_sender_up_to(&self, sender: &Address, up_to: u64) -> Vec<Arc<MempoolTx>> {
        let mut inner = self.inner.lock();
        let mut removed = Vec::new();
        if let Some(m) = inner.addr_txs.get_mut(sender) {
            let keep = m.split_off(&(up_to.saturating_add(1)));
            for (_, tx) in std::mem::replace(m, keep) {
                removed.push(tx);
            }
        }
        for tx in &removed {
            inner.hashes.remove(&tx.hash());
        }
        if inner.addr_txs.get(sender).is_some_and(|m| m.is_empty()) {
            inner.addr_txs.remove(sender);
            inner.period_counter.remove(sender);
        }
        removed
    }

    /// For each sender whose account nonce is known, report the senders
    /// whose gap has closed: a parked transaction exists exactly at the
    /// account's next nonce.
    ///
    /// The returned map is `sender → first promotable nonce`; the caller
    /// promotes the contiguous run starting there.
    pub fn promotable(&self, account_nonces: &HashMap<Address, u64>) -> HashMap<Address, u64> {
        let inner = self.inner.lock();
        let mut out = HashMap::new();
        for (sender, next_nonce) in account_nonces {
            if inner
                .addr_txs
                .get(sender)
                .is_some_and(|m| m.contains_key(next_nonce))
            {
                out.insert(sender.clone(), *next_nonce);
            }
        }
        out
    }

    /// One eviction tick: bump every sender's counter and evict the
    /// transactions of senders that have waited past the reserve.
    ///
    /// Returns the evicted transactions so the caller can uncache them.
    pub fn handle_period_counter(&self) -> Vec<Arc<MempoolTx>> {
        let mut inner = self.inner.lock();
        let mut expired = Vec::new();
        let senders: Vec<Address> = inner.addr_txs.keys().cloned().collect();
        for sender in senders {
            let count = inner.period_counter.entry(sender.clone()).or_insert(0);
            *count += 1;
            if *count > self.reserve_periods {
                if let Some(m) = inner.addr_txs.remove(&sender) {
                    for (_, tx) in m {
                        inner.hashes.remove(&tx.hash());
                        tx.mark_outdated();
                        expired.push(tx);
                    }
                }
                inner.period_counter.remove(&sender);
            }
        }
        expired
    }

    /// Drop everything.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.addr_txs.clear();
        inner.hashes.clear();
        inner.period_counter.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umber_types::{RawTx, TxEssentials};

    fn tx(sender: &str, nonce: u64, gas_price: u128) -> Arc<MempoolTx> {
        let raw = RawTx::from(format!("{sender}/{nonce}/{gas_price}").into_bytes());
        let essentials = TxEssentials::new(sender, nonce, gas_price, &raw);
        Arc::new(MempoolTx::new(raw, essentials, 1, nonce, 21_000, 0))
    }

    fn pool() -> PendingPool {
        PendingPool::new(100, 10, Duration::from_secs(3), 1)
    }

    // ------------------------------------------------------------------
    // Admission
    // ------------------------------------------------------------------

    #[test]
    fn add_and_get() {
        let pool = pool();
        let t = tx("a", 5, 10);
        let hash = t.hash();
        assert!(matches!(pool.add(t).unwrap(), PendingAdd::Fresh));
        assert_eq!(pool.len(), 1);
        assert!(pool.contains(&hash));
        assert_eq!(pool.get(&"a".into(), 5).unwrap().hash(), hash);
        assert_eq!(pool.get_by_hash(&hash).unwrap().nonce(), 5);
    }

    #[test]
    fn duplicate_hash_rejected() {
        let pool = pool();
        let t = tx("a", 5, 10);
        pool.add(t.clone()).unwrap();
        assert_eq!(
            pool.add(t.clone()).unwrap_err(),
            MempoolError::AlreadyInPendingPool(t.hash())
        );
    }

    #[test]
    fn size_cap_enforced() {
        let pool = PendingPool::new(2, 10, Duration::from_secs(3), 1);
        pool.add(tx("a", 5, 10)).unwrap();
        pool.add(tx("b", 5, 10)).unwrap();
        let err = pool.add(tx("c", 5, 10)).unwrap_err();
        assert_eq!(err, MempoolError::PendingPoolIsFull { size: 2, max: 2 });
    }

    #[test]
    fn per_address_cap_enforced() {
        let pool = PendingPool::new(100, 2, Duration::from_secs(3), 1);
        pool.add(tx("a", 5, 10)).unwrap();
        pool.add(tx("a", 6, 10)).unwrap();
        let err = pool.add(tx("a", 7, 10)).unwrap_err();
        assert!(matches!(
            err,
            MempoolError::PendingPoolAddressLimitExceeded { .. }
        ));
        // Other senders are unaffected.
        pool.add(tx("b", 5, 10)).unwrap();
    }

    #[test]
    fn higher_price_supersedes_same_slot() {
        let pool = pool();
        let old = tx("a", 5, 10);
        let old_hash = old.hash();
        pool.add(old).unwrap();

        let err = pool.add(tx("a", 5, 10)).unwrap_err();
        assert!(matches!(err, MempoolError::ReplacementUnderpriced { .. }));

        match pool.add(tx("a", 5, 20)).unwrap() {
            PendingAdd::Superseded(old) => {
                assert_eq!(old.hash(), old_hash);
                assert!(old.is_outdated());
            }
            PendingAdd::Fresh => panic!("expected supersede"),
        }
        assert_eq!(pool.len(), 1);
        assert!(!pool.contains(&old_hash));
        assert_eq!(pool.get(&"a".into(), 5).unwrap().gas_price(), 20);
    }

    // ------------------------------------------------------------------
    // Promotion
    // ------------------------------------------------------------------

    #[test]
    fn promotable_requires_exact_next_nonce() {
        let pool = pool();
        pool.add(tx("a", 5, 10)).unwrap();
        pool.add(tx("a", 6, 10)).unwrap();
        pool.add(tx("b", 9, 10)).unwrap();

        let mut nonces = HashMap::new();
        nonces.insert(Address::from("a"), 5);
        nonces.insert(Address::from("b"), 3); // gap not closed
        let promotable = pool.promotable(&nonces);
        assert_eq!(promotable.len(), 1);
        assert_eq!(promotable[&Address::from("a")], 5);
    }

    #[test]
    fn remove_walks_contiguous_run() {
        let pool = pool();
        pool.add(tx("a", 5, 10)).unwrap();
        pool.add(tx("a", 6, 10)).unwrap();
        pool.add(tx("a", 8, 10)).unwrap();

        assert!(pool.remove(&"a".into(), 5).is_some());
        assert!(pool.remove(&"a".into(), 6).is_some());
        assert!(pool.remove(&"a".into(), 7).is_none());
        assert_eq!(pool.len(), 1);
    }

    // ------------------------------------------------------------------
    // Expiry and cleanup
    // ------------------------------------------------------------------

    #[test]
    fn eviction_after_reserve_periods() {
        let pool = PendingPool::new(100, 10, Duration::from_secs(3), 1);
        pool.add(tx("a", 5, 10)).unwrap();

        // First tick: counter reaches 1, still within the reserve.
        assert!(pool.handle_period_counter().is_empty());
        assert_eq!(pool.len(), 1);

        // Second tick: counter passes the reserve, sender evicted.
        let expired = pool.handle_period_counter();
        assert_eq!(expired.len(), 1);
        assert!(expired[0].is_outdated());
        assert!(pool.is_empty());
    }

    #[test]
    fn removal_resets_eviction_clock() {
        let pool = PendingPool::new(100, 10, Duration::from_secs(3), 1);
        pool.add(tx("a", 5, 10)).unwrap();
        pool.handle_period_counter();
        // Unparking the sender's last tx clears its counter.
        pool.remove(&"a".into(), 5);
        pool.add(tx("a", 6, 10)).unwrap();
        assert!(pool.handle_period_counter().is_empty());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn clean_sender_drops_stale_nonces() {
        let pool = pool();
        pool.add(tx("a", 5, 10)).unwrap();
        pool.add(tx("a", 6, 10)).unwrap();
        pool.add(tx("a", 9, 10)).unwrap();

        let removed = pool.clean_sender_up_to(&"a".into(), 6);
        assert_eq!(removed.len(), 2);
        assert_eq!(pool.len(), 1);
        assert!(pool.get(&"a".into(), 9).is_some());
    }

    #[test]
    fn remove_by_hash() {
        let pool = pool();
        let t = tx("a", 5, 10);
        let hash = t.hash();
        pool.add(t).unwrap();
        assert_eq!(pool.remove_by_hash(&hash).unwrap().nonce(), 5);
        assert!(pool.is_empty());
        assert!(pool.remove_by_hash(&hash).is_none());
    }
}
