//! Error types for mempool admission and queries.

use thiserror::Error;
use umber_types::Hash256;

/// Admission, queue, and query errors.
///
/// None of these are fatal to the caller: duplicates and capacity failures
/// are retryable, pre-check and pricing failures indicate a bad submission.
/// Internal ordering-invariant violations are not represented here — they
/// panic, because they mean the exclusive-lock discipline was broken.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MempoolError {
    #[error("tx already exists in cache")]
    TxInCache,
    #[error("tx too large: {size} > max {max}")]
    TxTooLarge { max: usize, size: usize },
    #[error("mempool is full: {size} txs (max {max_size}), {bytes} bytes (max {max_bytes})")]
    MempoolIsFull {
        size: usize,
        max_size: usize,
        bytes: u64,
        max_bytes: u64,
    },
    #[error("pre-check failed: {0}")]
    PreCheck(String),
    #[error("application rejected tx: {0}")]
    AppRejected(String),
    #[error("tx gas price must be positive")]
    InvalidGasPrice,
    #[error("replacement underpriced: {got} <= threshold {threshold}")]
    ReplacementUnderpriced { got: u128, threshold: u128 },
    #[error("tx already in pending pool: {0}")]
    AlreadyInPendingPool(Hash256),
    #[error("pending pool is full: {size} >= {max}")]
    PendingPoolIsFull { size: usize, max: usize },
    #[error("pending pool per-address limit exceeded for {address}: {limit}")]
    PendingPoolAddressLimitExceeded { address: String, limit: usize },
    #[error("no such tx")]
    NoSuchTx,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_variants_display() {
        let errors = vec![
            MempoolError::TxInCache,
            MempoolError::TxTooLarge { max: 10, size: 11 },
            MempoolError::MempoolIsFull {
                size: 5,
                max_size: 5,
                bytes: 100,
                max_bytes: 100,
            },
            MempoolError::PreCheck("bad".into()),
            MempoolError::AppRejected("no account".into()),
            MempoolError::InvalidGasPrice,
            MempoolError::ReplacementUnderpriced {
                got: 100,
                threshold: 110,
            },
            MempoolError::AlreadyInPendingPool(Hash256::ZERO),
            MempoolError::PendingPoolIsFull { size: 9, max: 9 },
            MempoolError::PendingPoolAddressLimitExceeded {
                address: "a".into(),
                limit: 3,
            },
            MempoolError::NoSuchTx,
        ];
        for e in &errors {
            assert!(!format!("{e}").is_empty());
        }
    }

    #[test]
    fn replacement_underpriced_message() {
        let e = MempoolError::ReplacementUnderpriced {
            got: 100,
            threshold: 110,
        };
        assert_eq!(e.to_string(), "replacement underpriced: 100 <= threshold 110");
    }
}
