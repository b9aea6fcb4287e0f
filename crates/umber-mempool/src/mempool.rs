//! The mempool core.
//!
//! Owns the dedup cache, the ordering queue, the optional pending pool, and
//! the gas price oracle, and drives the three flows between them:
//!
//! * [`Mempool::check_tx`] — admission: gates, dedup, asynchronous
//!   application validation, then queue insert or pending-pool routing.
//! * [`Mempool::update`] — post-commit: committed transactions leave, the
//!   per-sender indexes are cleaned up to the committed nonces, survivors
//!   are optionally rechecked, and the oracle closes its block.
//! * background loops — pending-pool maintenance, promotion of gap-closed
//!   transactions, and gas-estimate refinement.
//!
//! `check_tx` takes the update lock shared and `update`/`flush` take it
//! exclusive, so queue mutation never interleaves with a commit. The
//! shared guard is released before awaiting application validation and
//! reacquired for the completion path: a stuck validation call stalls
//! only the transactions awaiting it, never the lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{RwLock, mpsc, watch};
use tracing::{debug, info, warn};
use umber_types::{Address, Hash256, RawTx};

use crate::app::{AppValidator, DeliverResult, ValidationKind};
use crate::cache::{MapTxCache, NopTxCache, TxCache};
use crate::config::{DynamicConfig, MempoolConfig};
use crate::error::MempoolError;
use crate::oracle::GasPriceOracle;
use crate::pending::{PendingAdd, PendingPool};
use crate::queue::{TxQueue, new_queue};
use crate::tx::{MempoolTx, PeerId};

/// Synchronous pre-filter run before application validation.
pub type PreCheckFn = Box<dyn Fn(&RawTx) -> Result<(), String> + Send + Sync>;

/// Capacity of the background gas-estimation queue.
const SIM_QUEUE_CAP: usize = 100_000;
/// Capacity of the pending-promotion probe queue.
const PROMOTE_QUEUE_CAP: usize = 10_000;

/// The transaction mempool.
pub struct Mempool {
    config: DynamicConfig,
    queue: Arc<dyn TxQueue>,
    cache: Arc<dyn TxCache>,
    pending: Option<Arc<PendingPool>>,
    oracle: GasPriceOracle,
    validator: Arc<dyn AppValidator>,
    pre_check: Mutex<Option<PreCheckFn>>,

    /// Shared by `check_tx`, exclusive for `update` and `flush`.
    update_lock: RwLock<()>,
    height: AtomicU64,
    txs_bytes: AtomicI64,

    /// Fires at most once per height when the queue becomes non-empty.
    txs_available: watch::Sender<bool>,
    notified_available: AtomicBool,

    sim_tx: mpsc::Sender<Arc<MempoolTx>>,
    sim_rx: Mutex<Option<mpsc::Receiver<Arc<MempoolTx>>>>,
    promote_tx: mpsc::Sender<(Address, u64)>,
    promote_rx: Mutex<Option<mpsc::Receiver<(Address, u64)>>>,
}

impl Mempool {
    /// Build a mempool over an application validator.
    ///
    /// Background loops are not running until [`Mempool::start`].
    pub fn new(config: MempoolConfig, validator: Arc<dyn AppValidator>) -> Arc<Self> {
        let cache: Arc<dyn TxCache> = if config.cache_size > 0 {
            Arc::new(MapTxCache::new(config.cache_size))
        } else {
            Arc::new(NopTxCache)
        };
        let pending = config.enable_pending_pool.then(|| {
            Arc::new(PendingPool::new(
                config.pending_pool_size,
                config.pending_pool_max_tx_per_address,
                Duration::from_secs(config.pending_pool_period_secs),
                config.pending_pool_reserve_blocks,
            ))
        });
        let oracle = GasPriceOracle::new(&config);
        let queue = new_queue(&config);
        let (sim_tx, sim_rx) = mpsc::channel(SIM_QUEUE_CAP);
        let (promote_tx, promote_rx) = mpsc::channel(PROMOTE_QUEUE_CAP);
        let (txs_available, _) = watch::channel(false);
        Arc::new(Self {
            config: DynamicConfig::new(config),
            queue,
            cache,
            pending,
            oracle,
            validator,
            pre_check: Mutex::new(None),
            update_lock: RwLock::new(()),
            height: AtomicU64::new(0),
            txs_bytes: AtomicI64::new(0),
            txs_available,
            notified_available: AtomicBool::new(false),
            sim_tx,
            sim_rx: Mutex::new(Some(sim_rx)),
            promote_tx,
            promote_rx: Mutex::new(Some(promote_rx)),
        })
    }

    /// Install a synchronous pre-filter, run after dedup and before
    /// application validation.
    pub fn set_pre_check(&self, f: PreCheckFn) {
        *self.pre_check.lock() = Some(f);
    }

    /// Spawn the background loops on the current tokio runtime.
    pub fn start(self: &Arc<Self>) {
        let config = self.config.snapshot();
        if config.enable_gas_estimation {
            if let Some(rx) = self.sim_rx.lock().take() {
                tokio::spawn(Arc::clone(self).simulation_routine(rx));
            }
        }
        if let Some(pool) = &self.pending {
            tokio::spawn(Arc::clone(self).pending_pool_job(Arc::clone(pool)));
            if let Some(rx) = self.promote_rx.lock().take() {
                tokio::spawn(Arc::clone(self).consume_promotions(rx));
            }
        }
    }

    // ------------------------------------------------------------------
    // Admission
    // ------------------------------------------------------------------

    /// Admit a transaction.
    ///
    /// The future resolves once with the admission outcome: queued,
    /// routed to the pending pool (still `Ok`), or rejected. The update
    /// lock is held shared for the pre-validation gates and again for the
    /// post-validation insert, but not across the validation await.
    pub async fn check_tx(&self, raw: RawTx, peer: PeerId) -> Result<(), MempoolError> {
        let hash = raw.hash();
        {
            let _admission = self.update_lock.read().await;
            let config = self.config.snapshot();

            if raw.len() > config.max_tx_bytes {
                return Err(MempoolError::TxTooLarge {
                    max: config.max_tx_bytes,
                    size: raw.len(),
                });
            }
            // Fail fast when full and eviction is off; with eviction on, the
            // decision needs the validated gas price and is made at insert.
            if !config.enable_delete_min_gp_tx {
                self.ensure_capacity(&config, raw.len())?;
            }

            if !self.cache.try_add(hash) {
                // Known transaction: remember the extra relayer so gossip does
                // not echo it back.
                if let Some(tx) = self.queue.get(&hash) {
                    tx.record_sender(peer);
                }
                return Err(MempoolError::TxInCache);
            }

            let pre_checked = {
                let pre_check = self.pre_check.lock();
                match pre_check.as_ref() {
                    Some(f) => f(&raw),
                    None => Ok(()),
                }
            };
            if let Err(reason) = pre_checked {
                self.cache.remove(&hash);
                return Err(MempoolError::PreCheck(reason));
            }
        }

        // The guard is dropped here: a commit may run while validation is
        // in flight, so the completion path re-reads height and capacity
        // under a fresh shared guard.
        let result = self.validator.validate_tx(&raw, ValidationKind::New).await;
        if !result.accepted {
            self.cache.remove(&hash);
            return Err(MempoolError::AppRejected(result.log));
        }
        let Some(essentials) = result.essentials else {
            self.cache.remove(&hash);
            return Err(MempoolError::AppRejected("essentials missing".into()));
        };
        if essentials.gas_price == 0 {
            self.cache.remove(&hash);
            return Err(MempoolError::InvalidGasPrice);
        }

        let _admission = self.update_lock.read().await;
        let config = self.config.snapshot();
        let tx = Arc::new(MempoolTx::new(
            raw,
            essentials,
            self.height(),
            result.sender_nonce,
            result.gas_wanted,
            peer,
        ));
        self.add_validated(tx, &config)
    }

    /// Post-validation insert: nonce routing, capacity, queue placement.
    fn add_validated(
        &self,
        tx: Arc<MempoolTx>,
        config: &MempoolConfig,
    ) -> Result<(), MempoolError> {
        let hash = tx.hash();

        // A nonce ahead of both the account and the queued tail is a gap.
        if config.enable_pending_pool {
            if let Some(pool) = &self.pending {
                let expected = match self.queue.pending_nonce(tx.sender()) {
                    Some(max_queued) => max_queued.saturating_add(1).max(tx.sender_nonce),
                    None => tx.sender_nonce,
                };
                if tx.nonce() > expected {
                    return self.park_pending(pool, tx);
                }
            }
        }

        if let Err(full) = self.ensure_capacity(config, tx.size()) {
            if !config.enable_delete_min_gp_tx {
                self.cache.remove(&hash);
                return Err(full);
            }
            if let Err(e) = self.evict_to_fit(&tx, config) {
                self.cache.remove(&hash);
                return Err(e);
            }
        }

        let size = tx.size() as i64;
        match self.queue.insert(Arc::clone(&tx), config.tx_price_bump) {
            Ok(outcome) => {
                self.txs_bytes.fetch_add(size, Ordering::Relaxed);
                if let Some(replaced) = outcome.replaced {
                    self.txs_bytes
                        .fetch_sub(replaced.size() as i64, Ordering::Relaxed);
                    self.cache.remove(&replaced.hash());
                    debug!(
                        sender = %tx.sender(),
                        nonce = tx.nonce(),
                        old_price = replaced.gas_price(),
                        "replaced queued tx"
                    );
                }
                self.enqueue_simulation(&tx, config);
                self.probe_promotion(tx.sender(), tx.nonce());
                self.notify_txs_available();
                Ok(())
            }
            Err(e) => {
                self.cache.remove(&hash);
                Err(e)
            }
        }
    }

    /// Route a nonce-gapped transaction to the pending pool.
    fn park_pending(&self, pool: &PendingPool, tx: Arc<MempoolTx>) -> Result<(), MempoolError> {
        let hash = tx.hash();
        match pool.add(Arc::clone(&tx)) {
            Ok(PendingAdd::Fresh) => {
                debug!(sender = %tx.sender(), nonce = tx.nonce(), "parked nonce-gapped tx");
                Ok(())
            }
            Ok(PendingAdd::Superseded(old)) => {
                self.cache.remove(&old.hash());
                Ok(())
            }
            Err(e) => {
                self.cache.remove(&hash);
                Err(e)
            }
        }
    }

    /// Evict ascending-fee victims until `tx` fits, or fail if `tx` itself
    /// would be the cheapest.
    fn evict_to_fit(&self, tx: &Arc<MempoolTx>, config: &MempoolConfig) -> Result<(), MempoolError> {
        while self.ensure_capacity(config, tx.size()).is_err() {
            let Some(victim) = self.queue.min_gas_price_tx() else {
                return self.ensure_capacity(config, tx.size());
            };
            let threshold = crate::queue::address_record::price_bump_threshold(
                victim.gas_price(),
                config.tx_price_bump,
            );
            if tx.gas_price() <= threshold {
                return Err(MempoolError::MempoolIsFull {
                    size: self.size(),
                    max_size: config.size,
                    bytes: self.txs_bytes(),
                    max_bytes: config.max_txs_bytes,
                });
            }
            self.drop_queued(&victim.hash(), true);
            info!(
                victim = %victim.hash(),
                price = victim.gas_price(),
                "evicted lowest-fee tx for a better-paying one"
            );
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Post-commit
    // ------------------------------------------------------------------

    /// Apply a committed block.
    ///
    /// `txs` and `results` are parallel: the block's transactions in order
    /// with their execution outcomes. Applied hashes stay cached to block
    /// replay; rejected ones are uncached so they can be resubmitted.
    pub async fn update(&self, height: u64, txs: &[RawTx], results: &[DeliverResult]) {
        let _commit = self.update_lock.write().await;
        let config = self.config.snapshot();
        self.height.store(height, Ordering::Relaxed);
        self.notified_available.store(false, Ordering::Relaxed);

        let mut committed: HashMap<Address, u64> = HashMap::new();
        for (i, raw) in txs.iter().enumerate() {
            let hash = raw.hash();
            let advanced = results
                .get(i)
                .map(|r| r.code.nonce_advanced())
                .unwrap_or(true);
            if !advanced {
                self.cache.remove(&hash);
            }

            let removed = self.queue.remove_by_hash(&hash);
            if let Some(tx) = &removed {
                self.txs_bytes.fetch_sub(tx.size() as i64, Ordering::Relaxed);
            }
            if advanced {
                // A block may carry transactions this node never held;
                // their sender and nonce still advance the account, so
                // fall back to parsing the committed payload.
                let info = removed
                    .as_ref()
                    .map(|tx| (tx.sender().clone(), tx.nonce(), tx.gas_price()))
                    .or_else(|| {
                        self.validator
                            .tx_info(raw)
                            .map(|e| (e.sender, e.nonce, e.gas_price))
                    });
                if let Some((sender, nonce, gas_price)) = info {
                    let entry = committed.entry(sender).or_insert(nonce);
                    *entry = (*entry).max(nonce);
                    if let Some(r) = results.get(i) {
                        self.oracle.observe(gas_price, r.gas_used);
                    }
                }
            }
            if let Some(pool) = &self.pending {
                pool.remove_by_hash(&hash);
            }
        }

        // Everything at or below a committed nonce is unplayable now.
        for (sender, nonce) in &committed {
            for tx in self.queue.clean_sender_up_to(sender, *nonce) {
                self.txs_bytes.fetch_sub(tx.size() as i64, Ordering::Relaxed);
                debug!(sender = %sender, nonce = tx.nonce(), "dropped stale-nonce tx");
            }
            if let Some(pool) = &self.pending {
                for tx in pool.clean_sender_up_to(sender, *nonce) {
                    self.cache.remove(&tx.hash());
                }
            }
        }

        // A commit may have closed pending-pool gaps.
        if let Some(pool) = &self.pending {
            let next_nonces: HashMap<Address, u64> = committed
                .iter()
                .map(|(s, n)| (s.clone(), n.saturating_add(1)))
                .collect();
            for (sender, nonce) in pool.promotable(&next_nonces) {
                self.send_promotion(sender, nonce);
            }
        }

        let force_recheck =
            config.force_recheck_gap > 0 && height % config.force_recheck_gap == 0;
        if !self.queue.is_empty() && (config.recheck || force_recheck) {
            self.recheck_txs().await;
        } else if self.queue.is_empty() && force_recheck {
            // Idle pool at a forced-recheck height: clear stuck hashes so
            // their transactions can be submitted again.
            self.cache.reset();
        }

        if config.enable_delete_min_gp_tx {
            self.trim_over_capacity(&config);
        }

        self.oracle.recommend(&config);

        if !self.queue.is_empty() {
            self.notify_txs_available();
        }
    }

    /// Revalidate every queued transaction against post-commit state.
    async fn recheck_txs(&self) {
        let snapshot = self.queue.snapshot();
        debug!(count = snapshot.len(), "rechecking queued txs");
        for tx in snapshot {
            if tx.is_outdated() {
                continue;
            }
            let result = self
                .validator
                .validate_tx(&tx.raw, ValidationKind::Recheck)
                .await;
            if !result.accepted {
                debug!(hash = %tx.hash(), log = %result.log, "recheck dropped tx");
                self.drop_queued(&tx.hash(), true);
            } else {
                tx.height.store(self.height(), Ordering::Relaxed);
            }
        }
    }

    /// Shed lowest-fee transactions until back under both capacity caps.
    fn trim_over_capacity(&self, config: &MempoolConfig) {
        while self.size() > config.size || self.txs_bytes() > config.max_txs_bytes {
            let Some(victim) = self.queue.min_gas_price_tx() else {
                return;
            };
            self.drop_queued(&victim.hash(), true);
            warn!(victim = %victim.hash(), "trimmed over-capacity mempool");
        }
    }

    /// Drop everything: queue, cache, pending pool, byte accounting.
    pub async fn flush(&self) {
        let _commit = self.update_lock.write().await;
        self.queue.clear();
        self.cache.reset();
        if let Some(pool) = &self.pending {
            pool.clear();
        }
        self.txs_bytes.store(0, Ordering::Relaxed);
        info!("mempool flushed");
    }

    // ------------------------------------------------------------------
    // Reaping and queries
    // ------------------------------------------------------------------

    /// Collect transactions for a block proposal, front to back, stopping
    /// at the first limit hit: total bytes, total gas, or the per-block
    /// transaction count. A hash is taken at most once per reap.
    pub fn reap_max_bytes_max_gas(
        &self,
        max_bytes: Option<u64>,
        max_gas: Option<u64>,
    ) -> Vec<RawTx> {
        let config = self.config.snapshot();
        let mut out = Vec::new();
        let mut seen: HashSet<Hash256> = HashSet::new();
        let mut total_bytes = 0u64;
        let mut total_gas = 0u64;
        for tx in self.queue.snapshot() {
            if out.len() as u64 >= config.max_tx_num_per_block {
                break;
            }
            if !seen.insert(tx.hash()) {
                continue;
            }
            let bytes = total_bytes.saturating_add(tx.size() as u64);
            if max_bytes.is_some_and(|cap| bytes > cap) {
                break;
            }
            let gas = total_gas.saturating_add(tx.gas_wanted());
            if max_gas.is_some_and(|cap| gas > cap) {
                break;
            }
            total_bytes = bytes;
            total_gas = gas;
            out.push(tx.raw.clone());
        }
        out
    }

    /// At most `max` transactions in consumption order.
    pub fn reap_max_txs(&self, max: usize) -> Vec<RawTx> {
        self.queue
            .snapshot()
            .into_iter()
            .take(max)
            .map(|tx| tx.raw.clone())
            .collect()
    }

    /// Queued transactions of one sender, ascending nonce, at most `max`.
    pub fn reap_user_txs(&self, sender: &Address, max: usize) -> Vec<RawTx> {
        let mut txs: Vec<Arc<MempoolTx>> = self
            .queue
            .snapshot()
            .into_iter()
            .filter(|tx| tx.sender() == sender)
            .collect();
        txs.sort_by_key(|tx| tx.nonce());
        txs.into_iter().take(max).map(|tx| tx.raw.clone()).collect()
    }

    /// Number of queued transactions for one sender.
    pub fn reap_user_txs_cnt(&self, sender: &Address) -> usize {
        self.queue
            .snapshot()
            .iter()
            .filter(|tx| tx.sender() == sender)
            .count()
    }

    /// Every sender with queued transactions.
    pub fn get_address_list(&self) -> Vec<Address> {
        self.queue.address_list()
    }

    /// Highest queued nonce for a sender.
    pub fn get_pending_nonce(&self, sender: &Address) -> Option<u64> {
        self.queue.pending_nonce(sender)
    }

    /// A queued or parked transaction by content hash.
    pub fn get_tx_by_hash(&self, hash: &Hash256) -> Result<RawTx, MempoolError> {
        if let Some(tx) = self.queue.get(hash) {
            return Ok(tx.raw.clone());
        }
        if let Some(pool) = &self.pending {
            if let Some(tx) = pool.get_by_hash(hash) {
                return Ok(tx.raw.clone());
            }
        }
        Err(MempoolError::NoSuchTx)
    }

    /// Number of queued transactions.
    pub fn size(&self) -> usize {
        self.queue.len()
    }

    /// Total bytes of queued transactions.
    pub fn txs_bytes(&self) -> u64 {
        self.txs_bytes.load(Ordering::Relaxed).max(0) as u64
    }

    /// Height of the last applied block.
    pub fn height(&self) -> u64 {
        self.height.load(Ordering::Relaxed)
    }

    /// The oracle's current gas price recommendation.
    pub fn recommended_gas_price(&self) -> u128 {
        self.oracle.recommended()
    }

    /// Live configuration handle; `store` swaps knobs for later operations.
    pub fn dynamic_config(&self) -> &DynamicConfig {
        &self.config
    }

    /// Gossip-order snapshot for the relay layer.
    pub fn broadcast_txs(&self) -> Vec<Arc<MempoolTx>> {
        self.queue.broadcast_snapshot()
    }

    /// Receiver that observes `true` whenever the queue turns non-empty
    /// for the current height.
    pub fn txs_available(&self) -> watch::Receiver<bool> {
        self.txs_available.subscribe()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn ensure_capacity(
        &self,
        config: &MempoolConfig,
        incoming: usize,
    ) -> Result<(), MempoolError> {
        let size = self.size();
        let bytes = self.txs_bytes();
        if size >= config.size || bytes.saturating_add(incoming as u64) > config.max_txs_bytes {
            return Err(MempoolError::MempoolIsFull {
                size,
                max_size: config.size,
                bytes,
                max_bytes: config.max_txs_bytes,
            });
        }
        Ok(())
    }

    /// Remove a queued tx, fix byte accounting, optionally uncache.
    fn drop_queued(&self, hash: &Hash256, uncache: bool) {
        if let Some(tx) = self.queue.remove_by_hash(hash) {
            self.txs_bytes.fetch_sub(tx.size() as i64, Ordering::Relaxed);
            if uncache {
                self.cache.remove(hash);
            }
        }
    }

    fn notify_txs_available(&self) {
        if !self.notified_available.swap(true, Ordering::Relaxed) {
            let _ = self.txs_available.send(true);
        }
    }

    /// Queue a freshly admitted tx for background gas refinement.
    fn enqueue_simulation(&self, tx: &Arc<MempoolTx>, config: &MempoolConfig) {
        if !config.enable_gas_estimation {
            return;
        }
        if self.sim_tx.try_send(Arc::clone(tx)).is_err() {
            warn!("gas estimation queue full, dropping request");
        }
    }

    /// If the sender's next nonce is parked, probe a promotion for it.
    fn probe_promotion(&self, sender: &Address, nonce: u64) {
        let Some(pool) = &self.pending else { return };
        let next = nonce.saturating_add(1);
        if pool.get(sender, next).is_some() {
            self.send_promotion(sender.clone(), next);
        }
    }

    fn send_promotion(&self, sender: Address, nonce: u64) {
        if self.promote_tx.try_send((sender, nonce)).is_err() {
            warn!("promotion queue full, dropping probe");
        }
    }

    // ------------------------------------------------------------------
    // Background loops
    // ------------------------------------------------------------------

    /// Periodic pending-pool maintenance: age counters, evict stale
    /// senders, uncache what was evicted.
    async fn pending_pool_job(self: Arc<Self>, pool: Arc<PendingPool>) {
        let mut ticker = tokio::time::interval(pool.period());
        loop {
            ticker.tick().await;
            let expired = pool.handle_period_counter();
            for tx in expired {
                self.cache.remove(&tx.hash());
                debug!(sender = %tx.sender(), nonce = tx.nonce(), "expired pending tx");
            }
        }
    }

    /// Drain promotion probes: revalidate each gap-closed transaction and
    /// move the contiguous run into the queue.
    async fn consume_promotions(self: Arc<Self>, mut rx: mpsc::Receiver<(Address, u64)>) {
        while let Some((sender, start)) = rx.recv().await {
            let Some(pool) = self.pending.clone() else { return };
            let mut nonce = start;
            while let Some(parked) = pool.get(&sender, nonce) {
                match self.promote_one(&parked).await {
                    Ok(()) => {
                        pool.remove(&sender, nonce);
                        nonce = nonce.saturating_add(1);
                    }
                    Err(MempoolError::MempoolIsFull { .. }) => {
                        // Stays parked; retried on the next pool cycle.
                        break;
                    }
                    Err(e) => {
                        pool.remove(&sender, nonce);
                        self.cache.remove(&parked.hash());
                        debug!(sender = %sender, nonce, error = %e, "promotion failed");
                        break;
                    }
                }
            }
        }
    }

    /// Revalidate and insert one formerly parked transaction. The hash is
    /// already cached from its first admission, so the cache is bypassed.
    /// As in `check_tx`, the update lock is only taken after validation
    /// completes.
    async fn promote_one(&self, parked: &Arc<MempoolTx>) -> Result<(), MempoolError> {
        let result = self
            .validator
            .validate_tx(&parked.raw, ValidationKind::New)
            .await;
        if !result.accepted {
            return Err(MempoolError::AppRejected(result.log));
        }
        let Some(essentials) = result.essentials else {
            return Err(MempoolError::AppRejected("essentials missing".into()));
        };

        let _admission = self.update_lock.read().await;
        let config = self.config.snapshot();
        let tx = Arc::new(MempoolTx::new(
            parked.raw.clone(),
            essentials,
            self.height(),
            result.sender_nonce,
            result.gas_wanted,
            0,
        ));
        // The parked record knows which peers relayed this transaction;
        // losing that would gossip it straight back to them.
        tx.inherit_relayers(parked);

        if let Err(full) = self.ensure_capacity(&config, tx.size()) {
            if !config.enable_delete_min_gp_tx {
                return Err(full);
            }
            self.evict_to_fit(&tx, &config)?;
        }
        let size = tx.size() as i64;
        let outcome = self.queue.insert(tx, config.tx_price_bump)?;
        self.txs_bytes.fetch_add(size, Ordering::Relaxed);
        if let Some(replaced) = outcome.replaced {
            self.txs_bytes
                .fetch_sub(replaced.size() as i64, Ordering::Relaxed);
            self.cache.remove(&replaced.hash());
        }
        self.notify_txs_available();
        Ok(())
    }

    /// Pull admitted transactions and refine their gas estimates through
    /// application simulation.
    async fn simulation_routine(self: Arc<Self>, mut rx: mpsc::Receiver<Arc<MempoolTx>>) {
        while let Some(tx) = rx.recv().await {
            if tx.is_outdated() {
                continue;
            }
            if let Some(gas) = self.validator.simulate_tx(&tx.raw).await {
                if !tx.is_outdated() {
                    tx.refine_gas(gas);
                }
            }
        }
    }
}
