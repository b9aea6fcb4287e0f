//! Arena-backed doubly-linked transaction list.
//!
//! Queue elements live in slots addressed by stable generation-checked
//! handles. Removal detaches a slot: it is spliced out of the live chain
//! but keeps its link fields, so a cursor parked on it can still advance
//! past. Detached slots wait in a small graveyard before their slot index
//! is recycled; a recycled slot bumps its generation, so any cursor still
//! holding the old handle observes a mismatch instead of walking into an
//! unrelated element.
//!
//! The list itself is not synchronized — the owning queue wraps it in a
//! mutex and keeps critical sections short.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::tx::MempoolTx;

/// Detached slots kept around before their index is recycled. Cursors that
/// lag further than this behind the head fall back to a front restart.
const GRAVEYARD_KEEP: usize = 64;

/// Stable reference to a list slot.
///
/// Valid as long as the slot generation matches; a stale handle is
/// detected, never followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    idx: u32,
    generation: u32,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    prev: Option<Handle>,
    next: Option<Handle>,
    detached: bool,
    tx: Option<Arc<MempoolTx>>,
}

/// Doubly-linked list of queued transactions over an arena of slots.
#[derive(Debug, Default)]
pub struct TxList {
    slots: Vec<Slot>,
    head: Option<Handle>,
    tail: Option<Handle>,
    len: usize,
    free: Vec<u32>,
    graveyard: VecDeque<u32>,
}

impl TxList {
    /// An empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (non-detached) elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the list has no live elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// First live element in consumption order.
    pub fn front(&self) -> Option<Handle> {
        self.head
    }

    /// Last live element.
    pub fn back(&self) -> Option<Handle> {
        self.tail
    }

    /// The transaction at a handle, if the slot is current and live.
    pub fn get(&self, handle: Handle) -> Option<Arc<MempoolTx>> {
        let slot = self.slot(handle)?;
        if slot.detached {
            return None;
        }
        slot.tx.clone()
    }

    /// The next live element after `handle`.
    ///
    /// Works from a detached slot too (its links were kept at detachment).
    /// Returns `None` past the tail or when the handle is stale.
    pub fn next_live(&self, handle: Handle) -> Option<Handle> {
        let mut cursor = self.slot(handle)?.next;
        while let Some(h) = cursor {
            let slot = self.slot(h)?;
            if !slot.detached {
                return Some(h);
            }
            cursor = slot.next;
        }
        None
    }

    /// Whether a handle still refers to the element it was created for.
    pub fn is_current(&self, handle: Handle) -> bool {
        self.slot(handle).is_some()
    }

    /// Append at the tail.
    pub fn push_back(&mut self, tx: Arc<MempoolTx>) -> Handle {
        let handle = self.alloc(tx);
        match self.tail {
            Some(tail) => {
                self.slots[tail.idx as usize].next = Some(handle);
                self.slots[handle.idx as usize].prev = Some(tail);
                self.tail = Some(handle);
            }
            None => {
                self.head = Some(handle);
                self.tail = Some(handle);
            }
        }
        self.len += 1;
        handle
    }

    /// Insert by descending gas price within `(after, before)`.
    ///
    /// Scans live elements starting just past `after` (or from the head)
    /// and stops at `before` (or the tail): the new element lands in front
    /// of the first element cheaper than it, ties keep first-seen order.
    /// The bounds pin per-sender nonce order — a transaction never jumps
    /// ahead of its sender's lower nonces or behind its higher ones,
    /// whatever its price.
    pub fn insert_by_price_between(
        &mut self,
        after: Option<Handle>,
        before: Option<Handle>,
        tx: Arc<MempoolTx>,
    ) -> Handle {
        let gas_price = tx.gas_price();
        let mut cursor = match after {
            Some(h) => self.next_live(h),
            None => self.head,
        };
        while let Some(h) = cursor {
            if Some(h) == before {
                break;
            }
            let slot_price = match self.get(h) {
                Some(t) => t.gas_price(),
                None => break,
            };
            if slot_price < gas_price {
                break;
            }
            cursor = self.next_live(h);
        }
        match cursor {
            Some(h) => self.insert_before(h, tx),
            None => self.push_back(tx),
        }
    }

    /// Detach an element, returning its transaction.
    ///
    /// The slot keeps its link fields so in-flight cursors advance past it;
    /// the index is recycled once the graveyard rotates.
    pub fn remove(&mut self, handle: Handle) -> Option<Arc<MempoolTx>> {
        let slot = self.slot(handle)?;
        if slot.detached {
            return None;
        }
        let (prev, next) = (slot.prev, slot.next);
        match prev {
            Some(p) => self.slots[p.idx as usize].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n.idx as usize].prev = prev,
            None => self.tail = prev,
        }
        let slot = &mut self.slots[handle.idx as usize];
        slot.detached = true;
        let tx = slot.tx.take();
        self.len -= 1;
        self.graveyard.push_back(handle.idx);
        self.reclaim();
        tx
    }

    /// Iterate live elements front to back. Caller holds the lock for the
    /// duration, so no detachment can interleave.
    pub fn iter(&self) -> TxListIter<'_> {
        TxListIter {
            list: self,
            cursor: self.head,
        }
    }

    /// Insert directly in front of a live element.
    pub fn insert_before(&mut self, at: Handle, tx: Arc<MempoolTx>) -> Handle {
        let handle = self.alloc(tx);
        let prev = self.slots[at.idx as usize].prev;
        self.slots[handle.idx as usize].prev = prev;
        self.slots[handle.idx as usize].next = Some(at);
        self.slots[at.idx as usize].prev = Some(handle);
        match prev {
            Some(p) => self.slots[p.idx as usize].next = Some(handle),
            None => self.head = Some(handle),
        }
        self.len += 1;
        handle
    }

    fn slot(&self, handle: Handle) -> Option<&Slot> {
        let slot = self.slots.get(handle.idx as usize)?;
        (slot.generation == handle.generation).then_some(slot)
    }

    fn alloc(&mut self, tx: Arc<MempoolTx>) -> Handle {
        if let Some(idx) = self.free.pop() {
            let slot = &mut self.slots[idx as usize];
            slot.prev = None;
            slot.next = None;
            slot.detached = false;
            slot.tx = Some(tx);
            return Handle {
                idx,
                generation: slot.generation,
            };
        }
        let idx = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            prev: None,
            next: None,
            detached: false,
            tx: Some(tx),
        });
        Handle { idx, generation: 0 }
    }

    fn reclaim(&mut self) {
        while self.graveyard.len() > GRAVEYARD_KEEP {
            if let Some(idx) = self.graveyard.pop_front() {
                let slot = &mut self.slots[idx as usize];
                slot.generation = slot.generation.wrapping_add(1);
                slot.prev = None;
                slot.next = None;
                self.free.push(idx);
            }
        }
    }
}

/// Front-to-back iterator over live elements.
pub struct TxListIter<'a> {
    list: &'a TxList,
    cursor: Option<Handle>,
}

impl<'a> Iterator for TxListIter<'a> {
    type Item = (Handle, Arc<MempoolTx>);

    fn next(&mut self) -> Option<Self::Item> {
        let handle = self.cursor?;
        let tx = self.list.get(handle)?;
        self.cursor = self.list.next_live(handle);
        Some((handle, tx))
    }
}
