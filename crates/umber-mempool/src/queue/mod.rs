//! Pluggable ordering queues.
//!
//! The mempool talks to its queue through [`TxQueue`]; which implementation
//! backs it is a configuration choice made at startup:
//!
//! * [`BaseTxQueue`] — first-seen order, gossip order equals consumption
//!   order.
//! * [`GasTxQueue`] — descending gas price with per-sender nonce order
//!   pinned, plus a separate arrival-order list for gossip.
//!
//! Both share the arena list ([`arena::TxList`]) and the per-sender nonce
//! index ([`address_record::AddressRecord`]).

pub mod address_record;
pub mod arena;
mod base;
mod gas;

use std::sync::Arc;

use umber_types::{Address, Hash256};

use crate::config::{MempoolConfig, OrderPolicy};
use crate::error::MempoolError;
use crate::tx::MempoolTx;

pub use base::BaseTxQueue;
pub use gas::GasTxQueue;

/// What an insert did, beyond adding the element.
#[derive(Debug, Default)]
pub struct QueueInsert {
    /// Same-sender same-nonce element displaced by replace-by-fee.
    pub replaced: Option<Arc<MempoolTx>>,
}

/// Ordering queue: holds admitted transactions in consumption order and
/// answers hash and sender lookups.
///
/// All methods are safe to call concurrently; implementations keep their
/// internal critical sections short.
pub trait TxQueue: Send + Sync {
    /// Number of queued transactions.
    fn len(&self) -> usize;

    /// Whether the queue is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a validated transaction, applying replace-by-fee for a
    /// same-sender same-nonce duplicate.
    fn insert(
        &self,
        tx: Arc<MempoolTx>,
        price_bump_percent: u64,
    ) -> Result<QueueInsert, MempoolError>;

    /// Look up a queued transaction by content hash.
    fn get(&self, hash: &Hash256) -> Option<Arc<MempoolTx>>;

    /// Whether a transaction with this hash is queued.
    fn contains(&self, hash: &Hash256) -> bool {
        self.get(hash).is_some()
    }

    /// Remove a queued transaction by content hash.
    fn remove_by_hash(&self, hash: &Hash256) -> Option<Arc<MempoolTx>>;

    /// Remove and return every transaction of `sender` with nonce at or
    /// below `nonce`. Used after a commit advances the account nonce.
    fn clean_sender_up_to(&self, sender: &Address, nonce: u64) -> Vec<Arc<MempoolTx>>;

    /// Current contents in consumption order.
    fn snapshot(&self) -> Vec<Arc<MempoolTx>>;

    /// Current contents in gossip order (arrival order).
    fn broadcast_snapshot(&self) -> Vec<Arc<MempoolTx>>;

    /// The queued transaction with the lowest gas price, the eviction
    /// victim when the pool is full.
    fn min_gas_price_tx(&self) -> Option<Arc<MempoolTx>>;

    /// Highest queued nonce for a sender.
    fn pending_nonce(&self, sender: &Address) -> Option<u64>;

    /// Every sender with queued transactions.
    fn address_list(&self) -> Vec<Address>;

    /// Drop everything.
    fn clear(&self);
}

/// Build the queue the configuration asks for.
pub fn new_queue(config: &MempoolConfig) -> Arc<dyn TxQueue> {
    match config.order_policy {
        OrderPolicy::FirstSeen => Arc::new(BaseTxQueue::new()),
        OrderPolicy::GasPrice => Arc::new(GasTxQueue::new()),
    }
}
