//! Fee-priority ordering queue.
//!
//! The main list is kept in descending gas-price order, with two carve-outs:
//! equal prices keep first-seen order, and a sender's transactions never
//! leave ascending nonce order whatever their prices. A second list holds
//! arrival order for gossip, so relay order is unaffected by fee sorting.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use umber_types::{Address, Hash256};

use crate::error::MempoolError;
use crate::queue::address_record::AddressRecord;
use crate::queue::arena::{Handle, TxList};
use crate::queue::{QueueInsert, TxQueue};
use crate::tx::MempoolTx;

/// Handles of one transaction in both lists.
#[derive(Debug, Clone, Copy)]
struct Indexed {
    main: Handle,
    broadcast: Handle,
}

/// Price-ordered queue with a separate arrival-order gossip list.
///
/// Lock order: main list, then broadcast list, then the hash index.
#[derive(Default)]
pub struct GasTxQueue {
    main: Mutex<TxList>,
    broadcast: Mutex<TxList>,
    record: AddressRecord,
    index: DashMap<Hash256, Indexed>,
}

impl GasTxQueue {
    /// An empty queue.
    pub fn new() -> Self {
        Self::default()
    }
}

fn place_by_price(
    list: &mut TxList,
    after: Option<Handle>,
    before: Option<Handle>,
    tx: Arc<MempoolTx>,
) -> Handle {
    list.insert_by_price_between(after, before, tx)
}

impl TxQueue for GasTxQueue {
    fn len(&self) -> usize {
        self.main.lock().len()
    }

    fn insert(
        &self,
        tx: Arc<MempoolTx>,
        price_bump_percent: u64,
    ) -> Result<QueueInsert, MempoolError> {
        let hash = tx.hash();
        let mut main = self.main.lock();
        let outcome = self.record.check_duplicate_and_insert(
            tx.clone(),
            &mut main,
            price_bump_percent,
            &place_by_price,
        )?;

        let mut broadcast = self.broadcast.lock();
        if let Some(old) = &outcome.replaced {
            old.mark_outdated();
            if let Some((_, indexed)) = self.index.remove(&old.hash()) {
                broadcast.remove(indexed.broadcast);
            }
        }
        let bc_handle = broadcast.push_back(tx);
        self.index.insert(
            hash,
            Indexed {
                main: outcome.handle,
                broadcast: bc_handle,
            },
        );
        // Re-placed higher nonces got new main handles; their gossip
        // position is unchanged.
        for (moved, handle) in &outcome.moved {
            if let Some(mut entry) = self.index.get_mut(&moved.hash()) {
                entry.main = *handle;
            }
        }
        Ok(QueueInsert {
            replaced: outcome.replaced,
        })
    }

    fn get(&self, hash: &Hash256) -> Option<Arc<MempoolTx>> {
        let indexed = *self.index.get(hash)?;
        self.main.lock().get(indexed.main)
    }

    fn remove_by_hash(&self, hash: &Hash256) -> Option<Arc<MempoolTx>> {
        let mut main = self.main.lock();
        let mut broadcast = self.broadcast.lock();
        let (_, indexed) = self.index.remove(hash)?;
        broadcast.remove(indexed.broadcast);
        let tx = main.remove(indexed.main)?;
        tx.mark_outdated();
        self.record.delete_item(tx.sender(), tx.nonce());
        Some(tx)
    }

    fn clean_sender_up_to(&self, sender: &Address, nonce: u64) -> Vec<Arc<MempoolTx>> {
        let mut main = self.main.lock();
        let removed = self.record.clean_items_up_to_nonce(&mut main, sender, nonce);
        let mut broadcast = self.broadcast.lock();
        for tx in &removed {
            tx.mark_outdated();
            if let Some((_, indexed)) = self.index.remove(&tx.hash()) {
                broadcast.remove(indexed.broadcast);
            }
        }
        removed
    }

    fn snapshot(&self) -> Vec<Arc<MempoolTx>> {
        self.main.lock().iter().map(|(_, tx)| tx).collect()
    }

    fn broadcast_snapshot(&self) -> Vec<Arc<MempoolTx>> {
        self.broadcast.lock().iter().map(|(_, tx)| tx).collect()
    }

    fn min_gas_price_tx(&self) -> Option<Arc<MempoolTx>> {
        let main = self.main.lock();
        let back = main.back()?;
        main.get(back)
    }

    fn pending_nonce(&self, sender: &Address) -> Option<u64> {
        self.record.max_nonce(sender)
    }

    fn address_list(&self) -> Vec<Address> {
        self.record.address_list()
    }

    fn clear(&self) {
        let mut main = self.main.lock();
        let mut broadcast = self.broadcast.lock();
        *main = TxList::new();
        *broadcast = TxList::new();
        self.record.clear();
        self.index.clear();
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

    fn keys(txs: &[Arc<MempoolTx>]) -> Vec<(String, u64)> {
        txs.iter()
            .map(|t| (t.sender().as_str().to_string(), t.nonce()))
            .collect()
    }

    #[test]
    fn orders_by_descending_price() {
        let queue = GasTxQueue::new();
        queue.insert(tx("a", 0, 10), 10).unwrap();
        queue.insert(tx("b", 0, 30), 10).unwrap();
        queue.insert(tx("c", 0, 20), 10).unwrap();
        let prices: Vec<u128> = queue.snapshot().iter().map(|t| t.gas_price()).collect();
        assert_eq!(prices, vec![30, 20, 10]);
        assert_eq!(queue.min_gas_price_tx().unwrap().gas_price(), 10);
    }

    #[test]
    fn broadcast_keeps_arrival_order() {
        let queue = GasTxQueue::new();
        queue.insert(tx("a", 0, 10), 10).unwrap();
        queue.insert(tx("b", 0, 30), 10).unwrap();
        queue.insert(tx("c", 0, 20), 10).unwrap();
        assert_eq!(
            keys(&queue.broadcast_snapshot()),
            vec![("a".into(), 0), ("b".into(), 0), ("c".into(), 0)]
        );
    }

    #[test]
    fn sender_nonce_order_beats_price() {
        let queue = GasTxQueue::new();
        queue.insert(tx("a", 0, 10), 10).unwrap();
        queue.insert(tx("b", 0, 50), 10).unwrap();
        // High price, but must stay behind a/0.
        queue.insert(tx("a", 1, 100), 10).unwrap();
        let order = keys(&queue.snapshot());
        let a0 = order.iter().position(|k| k == &("a".into(), 0)).unwrap();
        let a1 = order.iter().position(|k| k == &("a".into(), 1)).unwrap();
        assert!(a0 < a1);
    }

    #[test]
    fn replacement_resorts_higher_nonces() {
        let queue = GasTxQueue::new();
        queue.insert(tx("a", 0, 50), 10).unwrap();
        queue.insert(tx("a", 1, 40), 10).unwrap();
        queue.insert(tx("a", 2, 30), 10).unwrap();
        queue.insert(tx("b", 0, 45), 10).unwrap();

        let outcome = queue.insert(tx("a", 1, 1000), 10).unwrap();
        assert!(outcome.replaced.is_some());
        assert_eq!(queue.len(), 4);

        let a_nonces: Vec<u64> = keys(&queue.snapshot())
            .into_iter()
            .filter(|(s, _)| s == "a")
            .map(|(_, n)| n)
            .collect();
        assert_eq!(a_nonces, vec![0, 1, 2]);

        // Moved elements stay reachable by hash.
        let t2 = tx("a", 2, 30);
        assert_eq!(queue.get(&t2.hash()).unwrap().nonce(), 2);
    }

    #[test]
    fn underpriced_replacement_rejected() {
        let queue = GasTxQueue::new();
        queue.insert(tx("a", 0, 100), 10).unwrap();
        let err = queue.insert(tx("a", 0, 105), 10).unwrap_err();
        assert!(matches!(err, MempoolError::ReplacementUnderpriced { .. }));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn replacement_removes_old_from_broadcast() {
        let queue = GasTxQueue::new();
        let old = tx("a", 0, 100);
        let old_hash = old.hash();
        queue.insert(old, 10).unwrap();
        queue.insert(tx("a", 0, 200), 10).unwrap();

        assert_eq!(queue.broadcast_snapshot().len(), 1);
        assert_eq!(queue.broadcast_snapshot()[0].gas_price(), 200);
        assert!(queue.get(&old_hash).is_none());
    }

    #[test]
    fn remove_by_hash_removes_from_both_lists() {
        let queue = GasTxQueue::new();
        let t = tx("a", 0, 10);
        let hash = t.hash();
        queue.insert(t, 10).unwrap();
        queue.insert(tx("b", 0, 20), 10).unwrap();

        let removed = queue.remove_by_hash(&hash).unwrap();
        assert!(removed.is_outdated());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.broadcast_snapshot().len(), 1);
        assert_eq!(queue.pending_nonce(&"a".into()), None);
    }

    #[test]
    fn clean_sender_up_to_nonce() {
        let queue = GasTxQueue::new();
        for n in 0..4 {
            queue.insert(tx("a", n, 10 + n as u128), 10).unwrap();
        }
        let removed = queue.clean_sender_up_to(&"a".into(), 2);
        assert_eq!(removed.len(), 3);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.broadcast_snapshot().len(), 1);
        assert_eq!(queue.pending_nonce(&"a".into()), Some(3));
    }
}
