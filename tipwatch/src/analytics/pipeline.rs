//! Per-block metrics derivation and rolling history.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;

use crate::source::ChainSource;
use crate::types::{Block, BlockHash};

use super::anomaly::{self, AnomalyReport};
use super::config::AnalyticsConfig;
use super::subsidy::SubsidySchedule;

/// Metrics derived from one processed block. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BlockMetrics {
    pub height: u64,
    pub id: BlockHash,
    pub timestamp: u64,
    pub tx_count: u64,
    pub size_bytes: u64,
    pub weight: u64,
    /// Only the coinbase transaction was included.
    pub is_empty: bool,
    pub is_large: bool,
    /// Coinbase payout minus subsidy; 0 when the payout was unavailable.
    pub total_fees: i64,
    pub average_fee: f64,
    pub has_high_fees: bool,
}

impl BlockMetrics {
    fn derive(block: &Block, total_fees: i64, cfg: &AnalyticsConfig) -> Self {
        let average_fee = if block.tx_count == 0 {
            0.0
        } else {
            total_fees as f64 / block.tx_count as f64
        };
        let high_fee = i64::try_from(cfg.high_fee_sats).unwrap_or(i64::MAX);

        Self {
            height: block.height,
            id: block.id,
            timestamp: block.timestamp,
            tx_count: block.tx_count,
            size_bytes: block.size_bytes,
            weight: block.weight,
            is_empty: block.tx_count == 1,
            is_large: block.size_bytes > cfg.large_block_bytes,
            total_fees,
            average_fee,
            has_high_fees: total_fees > high_fee,
        }
    }
}

/// Output of [`MetricsPipeline::process_block`].
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessedBlock {
    pub metrics: BlockMetrics,
    pub anomalies: AnomalyReport,
    /// `false` when the coinbase payout could not be fetched and fees
    /// defaulted to zero.
    pub payout_available: bool,
}

/// Derives metrics block by block and keeps a capped FIFO history used
/// as the anomaly baseline.
///
/// The history is independent of the block window: it may outlive blocks
/// evicted from the window, and it records each block id at most once.
#[derive(Debug)]
pub struct MetricsPipeline {
    config: AnalyticsConfig,
    schedule: SubsidySchedule,
    history: VecDeque<BlockMetrics>,
    recorded: HashSet<BlockHash>,
}

impl MetricsPipeline {
    pub fn new(config: AnalyticsConfig) -> Self {
        let schedule = SubsidySchedule::new(config.base_subsidy_sats, config.halving_interval);
        Self {
            history: VecDeque::with_capacity(config.max_history),
            recorded: HashSet::with_capacity(config.max_history),
            config,
            schedule,
        }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// History, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &BlockMetrics> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Returns `true` if `id` currently has a record in the history.
    pub fn is_recorded(&self, id: &BlockHash) -> bool {
        self.recorded.contains(id)
    }

    /// Sum of `total_fees` over the history.
    pub fn total_fees(&self) -> i64 {
        self.history.iter().map(|m| m.total_fees).sum()
    }

    /// Fetches the coinbase payout, derives metrics, appends them to the
    /// history and runs the anomaly check with `sensitivity`.
    ///
    /// Returns `None` if the block already has a record in the history.
    /// An unavailable payout degrades to zero fees instead of failing.
    pub async fn process_block<S>(
        &mut self,
        source: &S,
        block: &Block,
        sensitivity: f64,
    ) -> Option<ProcessedBlock>
    where
        S: ChainSource,
    {
        if self.recorded.contains(&block.id) {
            tracing::debug!(height = block.height, id = %block.id.short(), "block already recorded");
            return None;
        }

        let payout = match source.get_coinbase_payout(&block.id).await {
            Ok(payout) => Some(payout),
            Err(e) => {
                tracing::warn!(height = block.height, error = %e, "coinbase payout unavailable, assuming zero fees");
                None
            }
        };
        let total_fees = payout.map_or(0, |p| self.schedule.fees(p, block.height));

        let metrics = BlockMetrics::derive(block, total_fees, &self.config);
        self.record(metrics.clone());
        let anomalies = self.detect(&metrics, sensitivity);

        Some(ProcessedBlock {
            metrics,
            anomalies,
            payout_available: payout.is_some(),
        })
    }

    /// Runs the anomaly check for `metrics` against the current history.
    pub fn detect(&self, metrics: &BlockMetrics, sensitivity: f64) -> AnomalyReport {
        let fees: Vec<f64> = self.history.iter().map(|m| m.total_fees as f64).collect();
        anomaly::detect(metrics.total_fees, metrics.is_empty, &fees, sensitivity)
    }

    fn record(&mut self, metrics: BlockMetrics) {
        self.recorded.insert(metrics.id);
        self.history.push_back(metrics);

        while self.history.len() > self.config.max_history {
            if let Some(evicted) = self.history.pop_front() {
                self.recorded.remove(&evicted.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::anomaly::{ANOMALY_WARMUP, AnomalyFlag};
    use crate::source::InMemoryChainSource;

    fn pipeline(max_history: usize) -> MetricsPipeline {
        MetricsPipeline::new(AnalyticsConfig {
            max_history,
            ..AnalyticsConfig::default()
        })
    }

    /// Chain with every block paying `subsidy + fee(height)`.
    fn paid_chain(len: u64, fee: impl Fn(u64) -> u64) -> InMemoryChainSource {
        let mut source = InMemoryChainSource::linear(len, "main");
        let schedule = SubsidySchedule::new(5_000_000_000, 210_000);
        for h in 0..len {
            let id = source.canonical_block(h).unwrap().id;
            source.set_payout(id, schedule.subsidy_at(h) + fee(h));
        }
        source
    }

    #[tokio::test]
    async fn derives_fees_and_flags() {
        let source = paid_chain(3, |h| if h == 2 { 20_000_000 } else { 7_000 });
        let mut p = pipeline(100);

        let b1 = source.canonical_block(1).unwrap().clone();
        let out = p.process_block(&source, &b1, 1.0).await.expect("new block");
        assert_eq!(out.metrics.total_fees, 7_000);
        assert!(out.payout_available);
        assert!(!out.metrics.has_high_fees);
        assert!((out.metrics.average_fee - 7_000.0 / b1.tx_count as f64).abs() < 1e-9);
        assert!(!out.anomalies.is_active());

        let b2 = source.canonical_block(2).unwrap().clone();
        let out = p.process_block(&source, &b2, 1.0).await.unwrap();
        assert!(out.metrics.has_high_fees);
        assert_eq!(p.total_fees(), 20_007_000);
    }

    #[tokio::test]
    async fn unavailable_payout_counts_as_zero_fees() {
        let source = InMemoryChainSource::linear(2, "main");
        let mut p = pipeline(10);
        let block = source.canonical_block(1).unwrap().clone();

        let out = p.process_block(&source, &block, 1.0).await.unwrap();
        assert_eq!(out.metrics.total_fees, 0);
        assert!(!out.payout_available);
        assert_eq!(p.history_len(), 1);
    }

    #[tokio::test]
    async fn history_is_capped_fifo_and_deduplicated() {
        let source = paid_chain(6, |h| h * 1_000);
        let mut p = pipeline(3);

        for h in 0..6 {
            let block = source.canonical_block(h).unwrap().clone();
            assert!(p.process_block(&source, &block, 1.0).await.is_some());
        }
        let heights: Vec<u64> = p.history().map(|m| m.height).collect();
        assert_eq!(heights, vec![3, 4, 5]);
        assert!(!p.is_recorded(&source.canonical_block(0).unwrap().id));

        let calls = source.calls();
        let again = source.canonical_block(5).unwrap().clone();
        assert!(p.process_block(&source, &again, 1.0).await.is_none());
        assert_eq!(source.calls(), calls, "recorded block must not be re-fetched");
        assert_eq!(p.history_len(), 3);
    }

    #[tokio::test]
    async fn anomalies_activate_after_warmup() {
        let len = ANOMALY_WARMUP as u64 + 1;
        let source = paid_chain(len, |h| if h == len - 1 { 90_000_000 } else { 10_000 + h });
        let mut p = pipeline(ANOMALY_WARMUP);

        for h in 0..len - 1 {
            let block = source.canonical_block(h).unwrap().clone();
            let out = p.process_block(&source, &block, 1.0).await.unwrap();
            if (h as usize) < ANOMALY_WARMUP - 1 {
                assert!(!out.anomalies.is_active(), "height {h} is still warming up");
            }
        }

        let spike = source.canonical_block(len - 1).unwrap().clone();
        let out = p.process_block(&source, &spike, 0.5).await.unwrap();
        assert!(out.anomalies.is_active());
        assert!(out.anomalies.flags.contains(&AnomalyFlag::HighFees));
    }
}
