//! The queued-transaction record.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;
use umber_types::{Address, Hash256, RawTx, TxEssentials};

/// Identifier of the peer that relayed a transaction to us. `0` is the
/// local node (RPC submission).
pub type PeerId = u16;

/// A transaction that passed first-time application validation.
///
/// Created by the mempool on a successful validation response and shared
/// (via `Arc`) between the ordering queue, the pending pool, and in-flight
/// reaps. Only the refinable fields are mutable, and only atomically: the
/// gas estimate (background simulation), the outdated flag (post-commit),
/// and the relaying-peer set.
#[derive(Debug)]
pub struct MempoolTx {
    /// Raw transaction payload.
    pub raw: RawTx,
    /// Application-extracted sender, nonce, gas price, and content hash.
    pub essentials: TxEssentials,
    /// Height this transaction was validated at.
    pub height: AtomicU64,
    /// Sender's expected next account nonce, as reported by the
    /// application at validation time.
    pub sender_nonce: u64,
    /// Gas the transaction claims it needs; refined in the background when
    /// gas estimation is enabled.
    gas_wanted: AtomicU64,
    /// Set once the transaction leaves the pool; late refinement results
    /// for it are discarded.
    outdated: AtomicBool,
    /// Whether the gas estimate came from simulation rather than the claim.
    simulated: AtomicBool,
    /// Peers that already relayed this transaction to us, to suppress
    /// re-gossip back to them.
    senders: RwLock<HashSet<PeerId>>,
}

impl MempoolTx {
    /// Build a record for a freshly validated transaction.
    pub fn new(
        raw: RawTx,
        essentials: TxEssentials,
        height: u64,
        sender_nonce: u64,
        gas_wanted: u64,
        relayed_by: PeerId,
    ) -> Self {
        let mut senders = HashSet::new();
        senders.insert(relayed_by);
        Self {
            raw,
            essentials,
            height: AtomicU64::new(height),
            sender_nonce,
            gas_wanted: AtomicU64::new(gas_wanted),
            outdated: AtomicBool::new(false),
            simulated: AtomicBool::new(false),
            senders: RwLock::new(senders),
        }
    }

    /// Content hash of the raw payload.
    pub fn hash(&self) -> Hash256 {
        self.essentials.hash
    }

    /// Sender address.
    pub fn sender(&self) -> &Address {
        &self.essentials.sender
    }

    /// Transaction nonce.
    pub fn nonce(&self) -> u64 {
        self.essentials.nonce
    }

    /// Offered gas price.
    pub fn gas_price(&self) -> u128 {
        self.essentials.gas_price
    }

    /// Serialized size in bytes.
    pub fn size(&self) -> usize {
        self.raw.len()
    }

    /// Validation height.
    pub fn validated_height(&self) -> u64 {
        self.height.load(Ordering::Relaxed)
    }

    /// Current gas estimate.
    pub fn gas_wanted(&self) -> u64 {
        self.gas_wanted.load(Ordering::Relaxed)
    }

    /// Replace the gas estimate with a simulated value.
    pub fn refine_gas(&self, gas: u64) {
        self.gas_wanted.store(gas, Ordering::Relaxed);
        self.simulated.store(true, Ordering::Relaxed);
    }

    /// Whether the gas estimate came from simulation.
    pub fn is_simulated(&self) -> bool {
        self.simulated.load(Ordering::Relaxed)
    }

    /// Mark the record as no longer queued.
    pub fn mark_outdated(&self) {
        self.outdated.store(true, Ordering::Relaxed);
    }

    /// Whether the record left the pool.
    pub fn is_outdated(&self) -> bool {
        self.outdated.load(Ordering::Relaxed)
    }

    /// Record a peer that relayed this transaction.
    pub fn record_sender(&self, peer: PeerId) {
        self.senders.write().insert(peer);
    }

    /// Whether the given peer already relayed this transaction to us.
    pub fn seen_from(&self, peer: PeerId) -> bool {
        self.senders.read().contains(&peer)
    }

    /// Take over another record's relaying-peer set, replacing this one's.
    ///
    /// Used when a record is rebuilt (pending-pool promotion revalidates
    /// and re-creates it) so the suppression set survives the rebuild.
    pub fn inherit_relayers(&self, other: &MempoolTx) {
        *self.senders.write() = other.senders.read().clone();
    }
}
