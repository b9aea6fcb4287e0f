//! Recommended-gas-price oracle.
//!
//! During `update`, each committed transaction's gas price and gas usage is
//! fed into a per-block accumulator. At block close the block is reduced to
//! its lowest and highest observed price and pushed into a fixed-capacity
//! rolling window; the recommendation is derived from that window and only
//! rises above the configured floor while blocks are congested.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::{GpMode, MempoolConfig};

/// Price observations of the block being accumulated.
#[derive(Debug, Default, Clone)]
struct BlockSample {
    prices: Vec<u128>,
    gas_used: u64,
}

/// One closed block, reduced to its price extremes.
#[derive(Debug, Clone, Copy)]
struct BlockDigest {
    lowest: u128,
    highest: u128,
}

/// Rolling-window gas price oracle.
pub struct GasPriceOracle {
    current: Mutex<BlockSample>,
    window: Mutex<VecDeque<BlockDigest>>,
    /// Last published recommendation, served to queries between blocks.
    last: Mutex<u128>,
}

impl GasPriceOracle {
    /// An oracle with an empty window, recommending `floor` until the first
    /// block closes.
    pub fn new(config: &MempoolConfig) -> Self {
        Self {
            current: Mutex::new(BlockSample::default()),
            window: Mutex::new(VecDeque::with_capacity(config.gp_window)),
            last: Mutex::new(config.min_gas_price),
        }
    }

    /// Feed one committed transaction into the current block's accumulator.
    pub fn observe(&self, gas_price: u128, gas_used: u64) {
        let mut current = self.current.lock();
        current.prices.push(gas_price);
        current.gas_used = current.gas_used.saturating_add(gas_used);
    }

    /// Close the current block and publish a fresh recommendation.
    ///
    /// A block counts as congested when it used at least the configured gas
    /// cap or carried at least the configured transaction count. While
    /// blocks are not congested the recommendation stays at the floor
    /// (`min_gas_price`); under congestion it is taken from the rolling
    /// window and clamped to `[floor, floor * multiplier]`.
    pub fn recommend(&self, config: &MempoolConfig) -> u128 {
        let sample = {
            let mut current = self.current.lock();
            std::mem::take(&mut *current)
        };
        let congested = sample.gas_used >= config.gp_max_gas_used
            || sample.prices.len() >= config.gp_max_tx_num;

        if !sample.prices.is_empty() {
            let lowest = sample.prices.iter().copied().min().unwrap_or_default();
            let highest = sample.prices.iter().copied().max().unwrap_or_default();
            let mut window = self.window.lock();
            if window.len() >= config.gp_window.max(1) {
                window.pop_front();
            }
            window.push_back(BlockDigest { lowest, highest });
        }

        let price = match config.gp_mode {
            GpMode::Minimal => 0,
            GpMode::Normal | GpMode::CongestionHigher if !congested => config.min_gas_price,
            GpMode::Normal => self.windowed(|d| d.lowest, config),
            GpMode::CongestionHigher => self.windowed(|d| d.highest, config),
        };
        debug!(
            price,
            congested,
            txs = sample.prices.len(),
            gas_used = sample.gas_used,
            "gas price recommendation"
        );
        *self.last.lock() = price;
        price
    }

    /// The last published recommendation.
    pub fn recommended(&self) -> u128 {
        *self.last.lock()
    }

    /// Mean of the chosen per-block sample over the window, clamped to
    /// the configured band.
    fn windowed(&self, sample: impl Fn(&BlockDigest) -> u128, config: &MempoolConfig) -> u128 {
        let window = self.window.lock();
        if window.is_empty() {
            return config.min_gas_price;
        }
        let sum = window
            .iter()
            .map(sample)
            .fold(0u128, |acc, p| acc.saturating_add(p));
        let mean = sum / window.len() as u128;
        mean.clamp(config.min_gas_price, config.max_gas_price())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MempoolConfig {
        MempoolConfig {
            gp_max_tx_num: 300,
            gp_max_gas_used: 40_000_000,
            gp_window: 8,
            min_gas_price: 100,
            max_gas_price_multiplier: 500,
            ..MempoolConfig::default()
        }
    }

    fn fill_block(oracle: &GasPriceOracle, txs: usize, gas_each: u64, price: u128) {
        for i in 0..txs {
            oracle.observe(price + i as u128, gas_each);
        }
    }

    #[test]
    fn empty_block_recommends_floor() {
        let cfg = config();
        let oracle = GasPriceOracle::new(&cfg);
        assert_eq!(oracle.recommend(&cfg), 100);
        assert_eq!(oracle.recommended(), 100);
    }

    #[test]
    fn uncongested_block_stays_at_floor() {
        let cfg = config();
        let oracle = GasPriceOracle::new(&cfg);
        // Plenty of fee pressure but neither cap reached.
        fill_block(&oracle, 10, 1_000, 5_000);
        assert_eq!(oracle.recommend(&cfg), 100);
    }

    #[test]
    fn gas_congestion_raises_recommendation() {
        let mut cfg = config();
        cfg.gp_mode = GpMode::CongestionHigher;
        let oracle = GasPriceOracle::new(&cfg);
        fill_block(&oracle, 10, 4_000_000, 5_000);
        let price = oracle.recommend(&cfg);
        assert_eq!(price, 5_009); // highest price of the block
    }

    #[test]
    fn tx_count_congestion_raises_recommendation() {
        let mut cfg = config();
        cfg.gp_mode = GpMode::CongestionHigher;
        let oracle = GasPriceOracle::new(&cfg);
        fill_block(&oracle, 300, 10, 5_000);
        assert!(oracle.recommend(&cfg) > cfg.min_gas_price);
    }

    #[test]
    fn normal_mode_tracks_block_lows() {
        let mut cfg = config();
        cfg.gp_mode = GpMode::Normal;
        let oracle = GasPriceOracle::new(&cfg);
        // One whale price should not drag the recommendation up.
        fill_block(&oracle, 299, 140_000, 200);
        oracle.observe(1_000_000, 140_000);
        let price = oracle.recommend(&cfg);
        assert_eq!(price, 200); // block's lowest
    }

    #[test]
    fn minimal_mode_recommends_zero() {
        let mut cfg = config();
        cfg.gp_mode = GpMode::Minimal;
        let oracle = GasPriceOracle::new(&cfg);
        fill_block(&oracle, 300, 4_000_000, 5_000);
        assert_eq!(oracle.recommend(&cfg), 0);
    }

    #[test]
    fn recommendation_clamped_to_band() {
        let mut cfg = config();
        cfg.gp_mode = GpMode::CongestionHigher;
        let oracle = GasPriceOracle::new(&cfg);
        fill_block(&oracle, 300, 4_000_000, 10_000_000);
        let price = oracle.recommend(&cfg);
        assert_eq!(price, cfg.max_gas_price());
    }

    #[test]
    fn recommendation_averages_the_window() {
        let mut cfg = config();
        cfg.gp_mode = GpMode::Normal;
        let oracle = GasPriceOracle::new(&cfg);
        // Two congested blocks with lows 100 and 300: the recommendation
        // is their mean, not either extreme.
        fill_block(&oracle, 300, 10, 100);
        assert_eq!(oracle.recommend(&cfg), 100);
        fill_block(&oracle, 300, 10, 300);
        assert_eq!(oracle.recommend(&cfg), 200);
    }

    #[test]
    fn window_rolls_old_blocks_out() {
        let mut cfg = config();
        cfg.gp_mode = GpMode::CongestionHigher;
        cfg.gp_window = 2;
        let oracle = GasPriceOracle::new(&cfg);

        fill_block(&oracle, 300, 10, 50_000);
        oracle.recommend(&cfg);
        // Two cheaper congested blocks push the expensive one out.
        for _ in 0..2 {
            fill_block(&oracle, 300, 10, 300);
            oracle.recommend(&cfg);
        }
        assert_eq!(oracle.recommended(), 300 + 299);
    }

    #[test]
    fn congestion_subsides_back_to_floor() {
        let mut cfg = config();
        cfg.gp_mode = GpMode::CongestionHigher;
        let oracle = GasPriceOracle::new(&cfg);
        fill_block(&oracle, 300, 10, 5_000);
        assert!(oracle.recommend(&cfg) > cfg.min_gas_price);
        // Quiet block: floor again, whatever the window holds.
        fill_block(&oracle, 5, 10, 5_000);
        assert_eq!(oracle.recommend(&cfg), cfg.min_gas_price);
    }
}
