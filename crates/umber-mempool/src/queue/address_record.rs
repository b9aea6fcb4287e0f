//! Per-sender nonce index with replace-by-fee.
//!
//! Maps `sender → {nonce → queue element}` in a concurrent map so
//! independent senders never contend; mutation of one sender's entries
//! happens under that sender's map entry. List surgery is delegated to a
//! placement function supplied by the owning queue (append for the FIFO
//! queue, bounded price insertion for the fee-priority queue).
//!
//! Lock order: the queue's list mutex is taken before any map entry here.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use dashmap::DashMap;
use umber_types::Address;

use crate::error::MempoolError;
use crate::queue::arena::{Handle, TxList};
use crate::tx::MempoolTx;

/// One queued transaction of a sender, with its sort key denormalized so
/// replacement checks never touch the list.
#[derive(Debug, Clone, Copy)]
pub struct Item {
    /// Main-list element.
    pub handle: Handle,
    /// Offered gas price at insertion.
    pub gas_price: u128,
}

/// Placement function: insert `tx` into the list somewhere inside
/// `(after, before)` and return its new handle.
pub type PlaceFn<'a> =
    &'a dyn Fn(&mut TxList, Option<Handle>, Option<Handle>, Arc<MempoolTx>) -> Handle;

/// Outcome of a successful insert through the record.
#[derive(Debug)]
pub struct InsertOutcome {
    /// Handle of the newly placed element.
    pub handle: Handle,
    /// The element this insert replaced, if any.
    pub replaced: Option<Arc<MempoolTx>>,
    /// Same-sender elements that were re-placed to restore nonce order,
    /// with their new handles. The owning queue must refresh its hash
    /// index with these.
    pub moved: Vec<(Arc<MempoolTx>, Handle)>,
}

/// The price a replacement must strictly exceed: `old + old * bump / 100`.
pub fn price_bump_threshold(old: u128, bump_percent: u64) -> u128 {
    old.saturating_add(old / 100 * bump_percent as u128)
}

/// Concurrent `sender → {nonce → element}` index.
#[derive(Debug, Default)]
pub struct AddressRecord {
    items: DashMap<Address, BTreeMap<u64, Item>>,
}

impl AddressRecord {
    /// An empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an element without any replacement logic. Used for
    /// elements placed by the queue itself.
    pub fn add_item(&self, sender: &Address, nonce: u64, item: Item) {
        self.items.entry(sender.clone()).or_default().insert(nonce, item);
    }

    /// Insert `tx`, applying replace-by-fee when the sender already has an
    /// element at this nonce.
    ///
    /// A replacement is accepted only when the new gas price strictly
    /// exceeds [`price_bump_threshold`] of the existing entry. After a
    /// mid-sequence replacement, every element of this sender with a
    /// greater nonce is pulled out and re-placed in ascending nonce order,
    /// so the consumption order keeps nonces ascending within the sender.
    pub fn check_duplicate_and_insert(
        &self,
        tx: Arc<MempoolTx>,
        list: &mut TxList,
        bump_percent: u64,
        place: PlaceFn<'_>,
    ) -> Result<InsertOutcome, MempoolError> {
        let sender = tx.sender().clone();
        let nonce = tx.nonce();
        let gas_price = tx.gas_price();
        let mut entry = self.items.entry(sender).or_default();

        let max_nonce = entry.keys().next_back().copied();
        if max_nonce.is_none_or(|max| nonce > max) {
            // Pure append for this sender: place after its highest nonce.
            let after = max_nonce.and_then(|n| entry.get(&n)).map(|i| i.handle);
            let handle = place(list, after, None, tx);
            entry.insert(nonce, Item { handle, gas_price });
            return Ok(InsertOutcome {
                handle,
                replaced: None,
                moved: Vec::new(),
            });
        }

        if let Some(existing) = entry.get(&nonce) {
            let threshold = price_bump_threshold(existing.gas_price, bump_percent);
            if gas_price <= threshold {
                return Err(MempoolError::ReplacementUnderpriced {
                    got: gas_price,
                    threshold,
                });
            }
            let replaced = list.remove(existing.handle);
            let (after, before) = Self::bounds(&entry, list, nonce);
            let handle = place(list, after, before, tx);
            entry.insert(nonce, Item { handle, gas_price });

            // Re-place every higher nonce of this sender, ascending, each
            // anchored behind the previous one. Excluded bound: `nonce`
            // may be `u64::MAX`.
            let higher: Vec<u64> = entry
                .range((Bound::Excluded(nonce), Bound::Unbounded))
                .map(|(n, _)| *n)
                .collect();
            let mut anchor = handle;
            let mut moved = Vec::with_capacity(higher.len());
            for n in higher {
                let Some(item) = entry.get(&n).copied() else {
                    continue;
                };
                if let Some(t) = list.remove(item.handle) {
                    let new_handle = place(list, Some(anchor), None, t.clone());
                    entry.insert(
                        n,
                        Item {
                            handle: new_handle,
                            gas_price: item.gas_price,
                        },
                    );
                    anchor = new_handle;
                    moved.push((t, new_handle));
                }
            }
            return Ok(InsertOutcome {
                handle,
                replaced,
                moved,
            });
        }

        // New nonce below the sender's maximum: slot it between its
        // neighbors so nonce order holds.
        let (after, before) = Self::bounds(&entry, list, nonce);
        let handle = place(list, after, before, tx);
        entry.insert(nonce, Item { handle, gas_price });
        Ok(InsertOutcome {
            handle,
            replaced: None,
            moved: Vec::new(),
        })
    }

    /// Remove and return every element of `sender` with nonce at or below
    /// `up_to`. Drops the sender entry when it empties.
    pub fn clean_items_up_to_nonce(
        &self,
        list: &mut TxList,
        sender: &Address,
        up_to: u64,
    ) -> Vec<Arc<MempoolTx>> {
        let mut removed = Vec::new();
        if let Some(mut entry) = self.items.get_mut(sender) {
            let keep = entry.split_off(&(up_to.saturating_add(1)));
            for (_, item) in std::mem::replace(&mut *entry, keep) {
                if let Some(tx) = list.remove(item.handle) {
                    removed.push(tx);
                }
            }
        }
        self.items.remove_if(sender, |_, entry| entry.is_empty());
        removed
    }

    /// Drop a single `(sender, nonce)` slot.
    pub fn delete_item(&self, sender: &Address, nonce: u64) {
        if let Some(mut entry) = self.items.get_mut(sender) {
            entry.remove(&nonce);
        }
        self.items.remove_if(sender, |_, entry| entry.is_empty());
    }

    /// The sender's elements in ascending nonce order.
    pub fn get_items(&self, sender: &Address) -> Vec<Item> {
        self.items
            .get(sender)
            .map(|entry| entry.values().copied().collect())
            .unwrap_or_default()
    }

    /// Highest queued nonce for the sender.
    pub fn max_nonce(&self, sender: &Address) -> Option<u64> {
        self.items
            .get(sender)
            .and_then(|entry| entry.keys().next_back().copied())
    }

    /// Number of queued elements for the sender.
    pub fn count(&self, sender: &Address) -> usize {
        self.items.get(sender).map(|entry| entry.len()).unwrap_or(0)
    }

    /// All senders with queued elements.
    pub fn address_list(&self) -> Vec<Address> {
        self.items.iter().map(|e| e.key().clone()).collect()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.items.clear();
    }

    /// Bounds for placing `nonce`: just after the sender's greatest lower
    /// nonce and before its least greater nonce.
    fn bounds(
        entry: &BTreeMap<u64, Item>,
        list: &TxList,
        nonce: u64,
    ) -> (Option<Handle>, Option<Handle>) {
        let after = entry
            .range(..nonce)
            .next_back()
            .map(|(_, i)| i.handle)
            .filter(|h| list.is_current(*h));
        let before = entry
            .range((Bound::Excluded(nonce), Bound::Unbounded))
            .next()
            .map(|(_, i)| i.handle)
            .filter(|h| list.is_current(*h));
        (after, before)
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

    fn place_fifo(list: &mut TxList, _a: Option<Handle>, _b: Option<Handle>, t: Arc<MempoolTx>) -> Handle {
        list.push_back(t)
    }

    fn place_priced(
        list: &mut TxList,
        a: Option<Handle>,
        b: Option<Handle>,
        t: Arc<MempoolTx>,
    ) -> Handle {
        list.insert_by_price_between(a, b, t)
    }

    fn order(list: &TxList) -> Vec<(String, u64)> {
        list.iter()
            .map(|(_, t)| (t.sender().as_str().to_string(), t.nonce()))
            .collect()
    }

    #[test]
    fn bump_threshold_math() {
        assert_eq!(price_bump_threshold(100, 10), 110);
        // Integer division floors old/100 before scaling.
        assert_eq!(price_bump_threshold(95, 10), 95);
        assert_eq!(price_bump_threshold(250, 10), 270);
        assert_eq!(price_bump_threshold(0, 10), 0);
    }

    #[test]
    fn append_and_lookup() {
        let record = AddressRecord::new();
        let mut list = TxList::new();
        record
            .check_duplicate_and_insert(tx("a", 0, 10), &mut list, 10, &place_fifo)
            .unwrap();
        record
            .check_duplicate_and_insert(tx("a", 1, 10), &mut list, 10, &place_fifo)
            .unwrap();
        assert_eq!(record.count(&"a".into()), 2);
        assert_eq!(record.max_nonce(&"a".into()), Some(1));
        assert_eq!(record.get_items(&"a".into()).len(), 2);
    }

    #[test]
    fn replacement_needs_strict_bump() {
        let record = AddressRecord::new();
        let mut list = TxList::new();
        record
            .check_duplicate_and_insert(tx("a", 0, 100), &mut list, 10, &place_priced)
            .unwrap();

        // Exactly at the threshold is still rejected.
        let err = record
            .check_duplicate_and_insert(tx("a", 0, 110), &mut list, 10, &place_priced)
            .unwrap_err();
        assert_eq!(
            err,
            MempoolError::ReplacementUnderpriced {
                got: 110,
                threshold: 110
            }
        );

        let outcome = record
            .check_duplicate_and_insert(tx("a", 0, 111), &mut list, 10, &place_priced)
            .unwrap();
        assert_eq!(outcome.replaced.unwrap().gas_price(), 100);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn lower_fee_rejected_leaves_original() {
        let record = AddressRecord::new();
        let mut list = TxList::new();
        record
            .check_duplicate_and_insert(tx("a", 0, 100), &mut list, 10, &place_priced)
            .unwrap();
        assert!(
            record
                .check_duplicate_and_insert(tx("a", 0, 95), &mut list, 10, &place_priced)
                .is_err()
        );
        assert_eq!(list.len(), 1);
        assert_eq!(list.iter().next().unwrap().1.gas_price(), 100);
    }

    #[test]
    fn mid_sequence_replacement_restores_nonce_order() {
        let record = AddressRecord::new();
        let mut list = TxList::new();
        // Sender a: nonces 0..=2 with descending prices.
        record
            .check_duplicate_and_insert(tx("a", 0, 50), &mut list, 10, &place_priced)
            .unwrap();
        record
            .check_duplicate_and_insert(tx("a", 1, 40), &mut list, 10, &place_priced)
            .unwrap();
        record
            .check_duplicate_and_insert(tx("a", 2, 30), &mut list, 10, &place_priced)
            .unwrap();
        // Unrelated sender in between.
        record
            .check_duplicate_and_insert(tx("b", 0, 45), &mut list, 10, &place_priced)
            .unwrap();

        // Replace nonce 1 with a much higher price.
        let outcome = record
            .check_duplicate_and_insert(tx("a", 1, 1000), &mut list, 10, &place_priced)
            .unwrap();
        assert_eq!(outcome.moved.len(), 1);

        // Within sender a, nonce order must be ascending.
        let a_nonces: Vec<u64> = order(&list)
            .into_iter()
            .filter(|(s, _)| s == "a")
            .map(|(_, n)| n)
            .collect();
        assert_eq!(a_nonces, vec![0, 1, 2]);
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn gap_fill_lands_between_neighbors() {
        let record = AddressRecord::new();
        let mut list = TxList::new();
        record
            .check_duplicate_and_insert(tx("a", 0, 50), &mut list, 10, &place_priced)
            .unwrap();
        record
            .check_duplicate_and_insert(tx("a", 2, 40), &mut list, 10, &place_priced)
            .unwrap();
        // Nonce 1 with an extreme price still lands between 0 and 2.
        record
            .check_duplicate_and_insert(tx("a", 1, 9999), &mut list, 10, &place_priced)
            .unwrap();
        let a_nonces: Vec<u64> = order(&list).into_iter().map(|(_, n)| n).collect();
        assert_eq!(a_nonces, vec![0, 1, 2]);
    }

    #[test]
    fn replacement_at_max_nonce_does_not_wrap() {
        let record = AddressRecord::new();
        let mut list = TxList::new();
        record
            .check_duplicate_and_insert(tx("a", u64::MAX - 1, 50), &mut list, 10, &place_priced)
            .unwrap();
        record
            .check_duplicate_and_insert(tx("a", u64::MAX, 40), &mut list, 10, &place_priced)
            .unwrap();

        let outcome = record
            .check_duplicate_and_insert(tx("a", u64::MAX, 1000), &mut list, 10, &place_priced)
            .unwrap();
        assert_eq!(outcome.replaced.unwrap().gas_price(), 40);
        // Nothing above u64::MAX exists to re-place.
        assert!(outcome.moved.is_empty());

        let a_nonces: Vec<u64> = order(&list).into_iter().map(|(_, n)| n).collect();
        assert_eq!(a_nonces, vec![u64::MAX - 1, u64::MAX]);
        assert_eq!(record.max_nonce(&"a".into()), Some(u64::MAX));
    }

    #[test]
    fn clean_up_to_nonce() {
        let record = AddressRecord::new();
        let mut list = TxList::new();
        for n in 0..5 {
            record
                .check_duplicate_and_insert(tx("a", n, 10), &mut list, 10, &place_fifo)
                .unwrap();
        }
        let removed = record.clean_items_up_to_nonce(&mut list, &"a".into(), 2);
        assert_eq!(removed.len(), 3);
        assert_eq!(list.len(), 2);
        assert_eq!(record.count(&"a".into()), 2);

        let removed = record.clean_items_up_to_nonce(&mut list, &"a".into(), 100);
        assert_eq!(removed.len(), 2);
        assert!(record.address_list().is_empty());
    }

    #[test]
    fn delete_item_drops_empty_sender() {
        let record = AddressRecord::new();
        let mut list = TxList::new();
        record
            .check_duplicate_and_insert(tx("a", 0, 10), &mut list, 10, &place_fifo)
            .unwrap();
        record.delete_item(&"a".into(), 0);
        assert!(record.address_list().is_empty());
        assert_eq!(record.count(&"a".into()), 0);
    }
}
