//! Raw transactions and application-extracted essentials.
//!
//! The mempool treats transaction payloads as opaque bytes. Everything it
//! needs for ordering — sender, nonce, gas price — is extracted by the
//! application during validation and carried alongside the payload as
//! [`TxEssentials`].

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::hash::Hash256;

/// A sender account address.
///
/// Opaque to the mempool; only equality and hashing matter. Stored as a
/// string the way the application renders it (e.g. bech32 or 0x-hex).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub String);

impl Address {
    /// Create an address from anything string-like.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// The address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the application reported no sender for this transaction.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Raw transaction payload as received from RPC or gossip.
///
/// Cheaply clonable; the same buffer is shared by the queue, the cache
/// bookkeeping, and any in-flight reap without copying.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct RawTx(pub Bytes);

impl RawTx {
    /// Wrap a byte vector as a raw transaction.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Serialized length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Content hash (SHA-256 of the payload).
    pub fn hash(&self) -> Hash256 {
        Hash256::digest(&self.0)
    }
}

impl From<Vec<u8>> for RawTx {
    fn from(v: Vec<u8>) -> Self {
        Self(Bytes::from(v))
    }
}

impl From<&[u8]> for RawTx {
    fn from(v: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(v))
    }
}

impl AsRef<[u8]> for RawTx {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Ordering-relevant fields the application extracts while validating.
///
/// The mempool never deserializes the payload itself; these denormalized
/// fields drive the per-sender nonce index and the fee-priority queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxEssentials {
    /// Sender account address.
    pub sender: Address,
    /// Per-sender sequence number.
    pub nonce: u64,
    /// Offered per-gas-unit price.
    pub gas_price: u128,
    /// Content hash of the raw payload.
    pub hash: Hash256,
}

impl TxEssentials {
    /// Build essentials for a payload, hashing it on the spot.
    pub fn new(sender: impl Into<Address>, nonce: u64, gas_price: u128, tx: &RawTx) -> Self {
        Self {
            sender: sender.into(),
            nonce,
            gas_price,
            hash: tx.hash(),
        }
    }
}
