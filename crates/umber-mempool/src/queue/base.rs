//! First-seen ordering queue.
//!
//! Consumption order is arrival order, except that a transaction filling a
//! nonce gap slots in front of its sender's higher nonces, and replacement
//! re-places the affected elements at the back. Gossip order equals
//! consumption order, so no second list is kept.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use umber_types::{Address, Hash256};

use crate::error::MempoolError;
use crate::queue::address_record::AddressRecord;
use crate::queue::arena::{Handle, TxList};
use crate::queue::{QueueInsert, TxQueue};
use crate::tx::MempoolTx;

/// FIFO queue over the arena list.
#[derive(Default)]
pub struct BaseTxQueue {
    list: Mutex<TxList>,
    record: AddressRecord,
    index: DashMap<Hash256, Handle>,
}

impl BaseTxQueue {
    /// An empty queue.
    pub fn new() -> Self {
        Self::default()
    }
}

/// As late as possible while staying in front of the sender's next nonce.
fn place_fifo(
    list: &mut TxList,
    _after: Option<Handle>,
    before: Option<Handle>,
    tx: Arc<MempoolTx>,
) -> Handle {
    match before {
        Some(b) if list.is_current(b) => list.insert_before(b, tx),
        _ => list.push_back(tx),
    }
}

impl TxQueue for BaseTxQueue {
    fn len(&self) -> usize {
        self.list.lock().len()
    }

    fn insert(
        &self,
        tx: Arc<MempoolTx>,
        price_bump_percent: u64,
    ) -> Result<QueueInsert, MempoolError> {
        let hash = tx.hash();
        let mut list = self.list.lock();
        let outcome =
            self.record
                .check_duplicate_and_insert(tx, &mut list, price_bump_percent, &place_fifo)?;
        if let Some(old) = &outcome.replaced {
            old.mark_outdated();
            self.index.remove(&old.hash());
        }
        self.index.insert(hash, outcome.handle);
        for (moved, handle) in &outcome.moved {
            self.index.insert(moved.hash(), *handle);
        }
        Ok(QueueInsert {
            replaced: outcome.replaced,
        })
    }

    fn get(&self, hash: &Hash256) -> Option<Arc<MempoolTx>> {
        let handle = *self.index.get(hash)?;
        self.list.lock().get(handle)
    }

    fn remove_by_hash(&self, hash: &Hash256) -> Option<Arc<MempoolTx>> {
        let mut list = self.list.lock();
        let (_, handle) = self.index.remove(hash)?;
        let tx = list.remove(handle)?;
        tx.mark_outdated();
        self.record.delete_item(tx.sender(), tx.nonce());
        Some(tx)
    }

    fn clean_sender_up_to(&self, sender: &Address, nonce: u64) -> Vec<Arc<MempoolTx>> {
        let mut list = self.list.lock();
        let removed = self.record.clean_items_up_to_nonce(&mut list, sender, nonce);
        for tx in &removed {
            tx.mark_outdated();
            self.index.remove(&tx.hash());
        }
        removed
    }

    fn snapshot(&self) -> Vec<Arc<MempoolTx>> {
        self.list.lock().iter().map(|(_, tx)| tx).collect()
    }

    fn broadcast_snapshot(&self) -> Vec<Arc<MempoolTx>> {
        self.snapshot()
    }

    fn min_gas_price_tx(&self) -> Option<Arc<MempoolTx>> {
        // No price ordering here; scan for the cheapest, latest-queued on
        // ties so the victim is the most recent of the cheapest.
        let list = self.list.lock();
        let mut min: Option<Arc<MempoolTx>> = None;
        for (_, tx) in list.iter() {
            match &min {
                Some(m) if tx.gas_price() > m.gas_price() => {}
                _ => min = Some(tx),
            }
        }
        min
    }

    fn pending_nonce(&self, sender: &Address) -> Option<u64> {
        self.record.max_nonce(sender)
    }

    fn address_list(&self) -> Vec<Address> {
        self.record.address_list()
    }

    fn clear(&self) {
        let mut list = self.list.lock();
        *list = TxList::new();
        self.record.clear();
        self.index.clear();
    }
}
