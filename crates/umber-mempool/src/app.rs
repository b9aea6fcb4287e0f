//! The application-validation boundary.
//!
//! The mempool never inspects transaction payloads itself. Admission
//! decisions come from an opaque asynchronous call into the application,
//! which checks the transaction against current account/contract state and
//! extracts the ordering essentials (sender, nonce, gas price).

use async_trait::async_trait;
use umber_types::{RawTx, TxEssentials};

/// Distinguishes the first-time check from the post-block recheck, which
/// the application may treat differently (e.g. skip signature recovery).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationKind {
    /// First-time admission check.
    New,
    /// Revalidation of a still-queued transaction after a commit.
    Recheck,
}

/// Outcome of one application-validation call.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Accept/reject decision.
    pub accepted: bool,
    /// Gas the transaction claims it needs.
    pub gas_wanted: u64,
    /// The sender's expected next account nonce.
    pub sender_nonce: u64,
    /// Extracted ordering fields; present when the payload parsed.
    pub essentials: Option<TxEssentials>,
    /// Human-readable rejection reason, empty on acceptance.
    pub log: String,
}

impl ValidationResult {
    /// A rejection carrying only a reason.
    pub fn rejected(log: impl Into<String>) -> Self {
        Self {
            accepted: false,
            gas_wanted: 0,
            sender_nonce: 0,
            essentials: None,
            log: log.into(),
        }
    }
}

/// Per-transaction result the block executor reports at `update` time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliverCode {
    /// Applied successfully; the sender's nonce advanced.
    Ok,
    /// Execution failed but gas was consumed, so the nonce still advanced.
    NonceConsumed,
    /// Rejected outright; the transaction may become valid later.
    Rejected,
}

impl DeliverCode {
    /// Whether the sender's account nonce advanced past this transaction.
    pub fn nonce_advanced(self) -> bool {
        matches!(self, DeliverCode::Ok | DeliverCode::NonceConsumed)
    }
}

/// Execution result for one committed transaction.
#[derive(Debug, Clone)]
pub struct DeliverResult {
    /// Outcome code.
    pub code: DeliverCode,
    /// Gas the execution actually consumed.
    pub gas_used: u64,
}

/// The opaque application-validation call.
///
/// The mempool releases its shared update lock before awaiting
/// [`AppValidator::validate_tx`] and reacquires it for the completion
/// path, so a stuck call stalls only the transactions awaiting it, never
/// the lock.
#[async_trait]
pub trait AppValidator: Send + Sync {
    /// Validate a transaction against current application state.
    async fn validate_tx(&self, tx: &RawTx, kind: ValidationKind) -> ValidationResult;

    /// Extract the ordering essentials from a raw payload without checking
    /// it against state.
    ///
    /// Called at `update` time for committed transactions this node never
    /// queued, so per-sender cleanup and gap promotion cover them too.
    /// `None` means the payload did not parse; such transactions are
    /// skipped.
    fn tx_info(&self, _tx: &RawTx) -> Option<TxEssentials> {
        None
    }

    /// Simulate a transaction to estimate its gas usage.
    ///
    /// Returns `None` when simulation is unavailable; the claimed
    /// `gas_wanted` stands in that case.
    async fn simulate_tx(&self, _tx: &RawTx) -> Option<u64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_result_has_no_essentials() {
        let res = ValidationResult::rejected("no account");
        assert!(!res.accepted);
        assert!(res.essentials.is_none());
        assert_eq!(res.log, "no account");
    }

    #[test]
    fn deliver_code_nonce_advanced() {
        assert!(DeliverCode::Ok.nonce_advanced());
        assert!(DeliverCode::NonceConsumed.nonce_advanced());
        assert!(!DeliverCode::Rejected.nonce_advanced());
    }
}
