//! Gossip wire format for transactions.
//!
//! Two shapes travel between peers: the bare payload, and a wrapper signed
//! by the relaying node. The wrapper lets a receiver accept a transaction
//! from a node on its allow-list with a lighter local check; a wrapper from
//! an unknown signer or with a bad signature is rejected before the payload
//! is looked at.
//!
//! Messages are serialized as MAGIC_BYTES prefix + bincode payload.

use std::collections::HashSet;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use thiserror::Error;
use umber_types::RawTx;

/// Wire format identifier, first bytes of every encoded message.
pub const MAGIC_BYTES: [u8; 4] = [0x55, 0x4D, 0x54, 0x58]; // "UMTX"

/// Hard cap on an encoded message, sanity bound against malformed peers.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Wire-level failures.
#[derive(Error, Debug)]
pub enum WireError {
    #[error("message too large: {size} > max {max}")]
    MessageTooLarge { size: usize, max: usize },
    #[error("encode error: {0}")]
    Encode(String),
    #[error("wrapped tx signer is not on the allow-list")]
    UnknownSigner,
    #[error("malformed signer key: {0}")]
    MalformedKey(String),
    #[error("bad wrapper signature: {0}")]
    BadSignature(String),
}

/// A transaction as it travels over gossip.
#[derive(Debug, Clone, bincode::Encode, bincode::Decode)]
pub enum TxMessage {
    /// Bare payload.
    Plain(Vec<u8>),
    /// Payload signed by the relaying node.
    Wrapped(WrappedTx),
}

/// A payload plus the relaying node's signature over it.
#[derive(Debug, Clone, bincode::Encode, bincode::Decode)]
pub struct WrappedTx {
    payload: Vec<u8>,
    /// Ed25519 public key of the signing node.
    signer: [u8; 32],
    /// Ed25519 signature over the payload bytes.
    signature: [u8; 64],
}

impl TxMessage {
    /// Encode as MAGIC_BYTES + bincode payload.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let payload = bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| WireError::Encode(e.to_string()))?;
        let size = MAGIC_BYTES.len() + payload.len();
        if size > MAX_MESSAGE_SIZE {
            return Err(WireError::MessageTooLarge {
                size,
                max: MAX_MESSAGE_SIZE,
            });
        }
        let mut out = Vec::with_capacity(size);
        out.extend_from_slice(&MAGIC_BYTES);
        out.extend_from_slice(&payload);
        Ok(out)
    }

    /// Decode from MAGIC_BYTES + bincode payload.
    ///
    /// Returns `None` for anything that does not parse: wrong magic,
    /// truncation, oversize, or trailing garbage.
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() > MAX_MESSAGE_SIZE || data.len() < MAGIC_BYTES.len() {
            return None;
        }
        let (magic, payload) = data.split_at(MAGIC_BYTES.len());
        if magic != MAGIC_BYTES {
            return None;
        }
        let (message, consumed): (Self, usize) =
            bincode::decode_from_slice(payload, bincode::config::standard()).ok()?;
        (consumed == payload.len()).then_some(message)
    }

    /// The carried payload, regardless of shape.
    pub fn payload(&self) -> RawTx {
        match self {
            TxMessage::Plain(bytes) => RawTx::from(bytes.clone()),
            TxMessage::Wrapped(wtx) => wtx.payload(),
        }
    }
}

impl WrappedTx {
    /// Sign a payload with this node's key.
    pub fn sign(payload: &RawTx, key: &SigningKey) -> Self {
        Self {
            payload: payload.as_bytes().to_vec(),
            signer: key.verifying_key().to_bytes(),
            signature: key.sign(payload.as_bytes()).to_bytes(),
        }
    }

    /// The wrapped payload.
    pub fn payload(&self) -> RawTx {
        RawTx::from(self.payload.clone())
    }

    /// The signing node's public key bytes.
    pub fn signer(&self) -> &[u8; 32] {
        &self.signer
    }

    /// Check the signer against the allow-list and the signature against
    /// the payload.
    pub fn verify(&self, allow_list: &NodeAllowList) -> Result<(), WireError> {
        if !allow_list.contains(&self.signer) {
            return Err(WireError::UnknownSigner);
        }
        let key = VerifyingKey::from_bytes(&self.signer)
            .map_err(|e| WireError::MalformedKey(e.to_string()))?;
        let signature = Signature::from_bytes(&self.signature);
        key.verify(&self.payload, &signature)
            .map_err(|e| WireError::BadSignature(e.to_string()))
    }
}

/// Node public keys whose wrapped transactions are trusted.
#[derive(Debug, Default, Clone)]
pub struct NodeAllowList {
    keys: HashSet<[u8; 32]>,
}

impl NodeAllowList {
    /// An empty allow-list; every wrapper is rejected.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trust a node key.
    pub fn allow(&mut self, key: [u8; 32]) {
        self.keys.insert(key);
    }

    /// Whether a key is trusted.
    pub fn contains(&self, key: &[u8; 32]) -> bool {
        self.keys.contains(key)
    }

    /// Number of trusted keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no key is trusted.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
