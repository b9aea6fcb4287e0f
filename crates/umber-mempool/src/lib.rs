//! # umber-mempool
//! Transaction admission, ordering, and pending-transaction subsystem.
//!
//! The mempool sits between the wire/RPC ingestion layer and the block
//! executor. It admits client-submitted transactions through an
//! asynchronous application-validation boundary, keeps them in a pluggable
//! ordering queue (first-seen or fee-priority) with per-sender
//! replace-by-fee semantics, parks out-of-order nonces in a pending pool
//! until they become contiguous, and recommends a gas price from recent
//! block samples.
//!
//! Modules:
//! - [`cache`] — content-hash dedup cache
//! - [`queue`] — ordering queues and the per-sender address record
//! - [`pending`] — nonce-gap holding area
//! - [`oracle`] — gas price recommendation
//! - [`mempool`] — admission pipeline and post-block update
//! - [`app`] — the application-validation boundary
//! - [`wire`] — gossip wire message variants

pub mod app;
pub mod cache;
pub mod config;
pub mod error;
pub mod mempool;
pub mod oracle;
pub mod pending;
pub mod queue;
pub mod tx;
pub mod wire;

pub use app::{AppValidator, DeliverCode, DeliverResult, ValidationKind, ValidationResult};
pub use config::{DynamicConfig, GpMode, MempoolConfig, OrderPolicy};
pub use error::MempoolError;
pub use mempool::Mempool;
pub use tx::MempoolTx;
