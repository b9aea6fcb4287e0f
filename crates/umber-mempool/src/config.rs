//! Mempool configuration.
//!
//! [`MempoolConfig`] holds every recognized knob; [`DynamicConfig`] makes a
//! configuration runtime-swappable without torn reads: every operation
//! takes a [`DynamicConfig::snapshot`] and reads that `Arc` by value, and a
//! concurrent [`DynamicConfig::store`] simply swaps the `Arc` out for the
//! next reader.

use std::sync::Arc;

use parking_lot::RwLock;

/// Consumption-order policy for the main queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderPolicy {
    /// Strict first-seen order; broadcast and consumption order coincide.
    #[default]
    FirstSeen,
    /// Fee-priority consumption order with nonce-respecting placement;
    /// broadcast order stays first-seen.
    GasPrice,
}

/// Gas price oracle recommendation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpMode {
    /// Sample only the cheapest transactions of each recent block.
    #[default]
    Normal,
    /// Under congestion, blend in the most expensive samples as well so the
    /// recommendation rises faster.
    CongestionHigher,
    /// Always recommend the configured network minimum.
    Minimal,
}

/// Configuration for the mempool subsystem.
#[derive(Debug, Clone)]
pub struct MempoolConfig {
    /// Maximum size of a single transaction in bytes.
    pub max_tx_bytes: usize,
    /// Maximum total bytes of all queued transactions.
    pub max_txs_bytes: u64,
    /// Maximum number of queued transactions.
    pub size: usize,
    /// Ordering policy for block-proposal consumption.
    pub order_policy: OrderPolicy,
    /// Replace-by-fee price bump threshold, in percent.
    pub tx_price_bump: u64,
    /// Recheck all remaining transactions after every commit.
    pub recheck: bool,
    /// When `recheck` is off, still force a recheck every N blocks.
    pub force_recheck_gap: u64,
    /// Route nonce-gapped transactions through the pending pool.
    pub enable_pending_pool: bool,
    /// Global pending pool capacity.
    pub pending_pool_size: usize,
    /// Per-sender pending pool slot limit.
    pub pending_pool_max_tx_per_address: usize,
    /// Seconds between pending pool maintenance cycles.
    pub pending_pool_period_secs: u64,
    /// Pool cycles a sender may sit unpromoted before eviction.
    pub pending_pool_reserve_blocks: u64,
    /// Evict the lowest-fee queued transaction when over capacity instead
    /// of rejecting new submissions.
    pub enable_delete_min_gp_tx: bool,
    /// Dedup cache capacity in entries; 0 disables caching entirely.
    pub cache_size: usize,
    /// Maximum number of transactions reaped into one block.
    pub max_tx_num_per_block: u64,
    /// Refine gas estimates with background simulation after admission.
    pub enable_gas_estimation: bool,

    /// Oracle recommendation mode.
    pub gp_mode: GpMode,
    /// Tx count at or above which a block counts as congested.
    pub gp_max_tx_num: usize,
    /// Block gas usage at or above which a block counts as congested.
    pub gp_max_gas_used: u64,
    /// How many recent blocks of fee samples the oracle keeps.
    pub gp_window: usize,
    /// Network minimum gas price; also the uncongested recommendation.
    pub min_gas_price: u128,
    /// Recommendation ceiling, as a multiple of `min_gas_price`.
    pub max_gas_price_multiplier: u128,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_tx_bytes: 1024 * 1024,
            max_txs_bytes: 1024 * 1024 * 1024,
            size: 200_000,
            order_policy: OrderPolicy::GasPrice,
            tx_price_bump: 10,
            recheck: false,
            force_recheck_gap: 200,
            enable_pending_pool: false,
            pending_pool_size: 10_000,
            pending_pool_max_tx_per_address: 100,
            pending_pool_period_secs: 3,
            pending_pool_reserve_blocks: 100,
            enable_delete_min_gp_tx: false,
            cache_size: 300_000,
            max_tx_num_per_block: 300,
            enable_gas_estimation: false,
            gp_mode: GpMode::Normal,
            gp_max_tx_num: 300,
            gp_max_gas_used: 40_000_000,
            gp_window: 8,
            min_gas_price: 100_000_000,
            max_gas_price_multiplier: 5_000,
        }
    }
}

impl MempoolConfig {
    /// The oracle's recommendation ceiling.
    pub fn max_gas_price(&self) -> u128 {
        self.min_gas_price.saturating_mul(self.max_gas_price_multiplier)
    }
}

/// Atomically-swappable configuration handle.
///
/// Cloning is cheap; all clones observe the same underlying configuration.
#[derive(Debug, Clone, Default)]
pub struct DynamicConfig {
    inner: Arc<RwLock<Arc<MempoolConfig>>>,
}

impl DynamicConfig {
    /// Wrap a configuration for shared dynamic access.
    pub fn new(config: MempoolConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// The current configuration snapshot.
    ///
    /// The returned `Arc` stays coherent for the duration of the operation
    /// even if another thread swaps in a new configuration meanwhile.
    pub fn snapshot(&self) -> Arc<MempoolConfig> {
        Arc::clone(&self.inner.read())
    }

    /// Swap in a new configuration for subsequent operations.
    pub fn store(&self, config: MempoolConfig) {
        *self.inner.write() = Arc::new(config);
    }
}
