//! Reconciliation engine.
//!
//! The [`Reconciler`] owns the block window and the metrics pipeline and
//! keeps the window consistent with the remote chain, one cycle at a time:
//!
//! - an empty window is initialised by walking back from the remote tip,
//! - a window whose head is still on the remote branch is extended,
//! - a window whose head was superseded is repaired: the common ancestor
//!   is searched for, everything above it is dropped, and the window is
//!   extended along the new branch (or rebuilt if no ancestor exists).
//!
//! Every block accepted into the window is pushed through the metrics
//! pipeline during the same cycle.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::analytics::MetricsPipeline;
use crate::metrics::MonitorMetrics;
use crate::source::ChainSource;
use crate::storage::WindowStore;
use crate::types::Block;

use super::ancestor::{AncestorSearch, find_common_ancestor};
use super::config::ReconcilerConfig;
use super::error::ReconcileError;
use super::state::{CycleReport, RepairSummary, SyncState};

/// Keeps a bounded window of recent blocks in line with a remote chain.
///
/// Generic over the [`ChainSource`] it observes. Exactly one cycle runs at
/// a time (`reconcile` takes `&mut self`); the caller drives the schedule.
pub struct Reconciler<S> {
    config: ReconcilerConfig,
    source: S,
    window: WindowStore,
    pipeline: MetricsPipeline,
    state: SyncState,
    metrics: Option<MonitorMetrics>,
}

impl<S> Reconciler<S>
where
    S: ChainSource + Sync,
{
    /// Creates a reconciler with an empty window.
    pub fn new(config: ReconcilerConfig, source: S, pipeline: MetricsPipeline) -> Self {
        Self {
            config,
            source,
            window: WindowStore::new(),
            pipeline,
            state: SyncState::Empty,
            metrics: None,
        }
    }

    /// Attaches Prometheus metrics updated on every cycle.
    pub fn with_metrics(mut self, metrics: MonitorMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub fn window(&self) -> &WindowStore {
        &self.window
    }

    pub fn pipeline(&self) -> &MetricsPipeline {
        &self.pipeline
    }

    /// Classification made by the most recent cycle.
    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Returns a mutable reference to the chain source.
    ///
    /// Mainly useful for tests and simulations driving an in-memory chain.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Runs one reconciliation cycle.
    ///
    /// On error the window is left in its last consistent state and the
    /// cycle may be retried.
    pub async fn reconcile(&mut self) -> Result<CycleReport, ReconcileError> {
        let started = Instant::now();
        let result = self.run_cycle().await;

        if self.window.is_empty() {
            self.state = SyncState::Empty;
        }

        match &result {
            Ok(report) => self.log_report(report),
            Err(ReconcileError::InvariantViolation(e)) => {
                tracing::error!(state = %self.state, error = %e, "cycle rejected inconsistent blocks");
            }
            Err(e) => {
                tracing::warn!(state = %self.state, error = %e, "cycle aborted");
            }
        }

        self.observe(|m| {
            m.cycle_seconds.observe(started.elapsed().as_secs_f64());
            match &result {
                Ok(report) => {
                    m.blocks_ingested.inc_by(report.ingested as u64);
                    if report.full_reset {
                        m.full_resets.inc();
                    }
                    for processed in &report.processed {
                        for flag in &processed.anomalies.flags {
                            m.anomalies.with_label_values(&[flag.as_str()]).inc();
                        }
                    }
                }
                Err(ReconcileError::Unavailable(_)) => m.source_unavailable.inc(),
                Err(ReconcileError::AncestorSearchExceeded { .. }) => {
                    m.ancestor_search_exceeded.inc()
                }
                Err(ReconcileError::InvariantViolation(_)) => {}
            }
            m.window_length.set(self.window.len() as i64);
            m.head_height
                .set(self.window.head().map_or(0, |b| b.height as i64));
        });

        result
    }

    /// Runs a cycle every `interval` until `shutdown` resolves, handing
    /// each successful report to `on_report`.
    ///
    /// `shutdown` is polled during cycles as well as between them; a cycle
    /// it interrupts is abandoned. Failed cycles are already logged and are
    /// retried on the next tick.
    pub async fn run_until<F>(
        &mut self,
        interval: Duration,
        shutdown: F,
        mut on_report: impl FnMut(&CycleReport),
    ) where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let result = tokio::select! {
                _ = &mut shutdown => return,
                result = self.reconcile() => result,
            };
            if let Ok(report) = result {
                on_report(&report);
            }

            tokio::select! {
                _ = &mut shutdown => return,
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    async fn run_cycle(&mut self) -> Result<CycleReport, ReconcileError> {
        let Some(head) = self.window.head().cloned() else {
            let mut report = self.classify(SyncState::Empty);
            self.initialize(self.config.sensitivity, &mut report)
                .await?;
            return Ok(report);
        };

        let tip_id = self.source.get_tip_id().await?;
        if tip_id == head.id {
            return Ok(self.classify(SyncState::Synced));
        }
        let tip = self.source.get_block(&tip_id).await?;

        // Remote block at the local head's height; `None` if the remote
        // tip fell below it.
        let remote_at_head = if tip.height < head.height {
            None
        } else if tip.height == head.height {
            Some(tip.clone())
        } else {
            Some(self.source.get_block_at_height(head.height).await?)
        };

        match remote_at_head {
            Some(remote) if remote.id == head.id => {
                let mut report = self.classify(SyncState::Stale);
                self.extend(&tip, self.config.extension_sensitivity, &mut report)
                    .await?;
                Ok(report)
            }
            remote => {
                let mut report = self.classify(SyncState::Diverged);
                self.observe(|m| m.reorgs_detected.inc());
                tracing::info!(
                    head_height = head.height,
                    head = %head.id.short(),
                    tip_height = tip.height,
                    "local head superseded by remote branch"
                );
                let start = remote.unwrap_or_else(|| tip.clone());
                self.repair(&tip, start, &mut report).await?;
                Ok(report)
            }
        }
    }

    fn classify(&mut self, state: SyncState) -> CycleReport {
        self.state = state;
        CycleReport::new(state)
    }

    /// Fills an empty window with up to `window_size` blocks ending at the
    /// remote tip, judging their fees with `sensitivity`.
    ///
    /// The walk is contiguous from the tip, so if a fetch fails part-way
    /// the blocks collected so far are still accepted.
    async fn initialize(
        &mut self,
        sensitivity: f64,
        report: &mut CycleReport,
    ) -> Result<(), ReconcileError> {
        let tip = self.source.get_tip().await?;
        let target = self.config.window_size.max(1);

        let mut batch = Vec::with_capacity(target);
        batch.push(tip);
        while batch.len() < target {
            let Some(parent_id) = batch.last().and_then(|b| b.parent_id) else {
                break;
            };
            match self.source.get_block(&parent_id).await {
                Ok(parent) => batch.push(parent),
                Err(e) => {
                    tracing::warn!(collected = batch.len(), error = %e, "initial walk cut short");
                    break;
                }
            }
        }

        batch.reverse();
        self.commit(batch, sensitivity, report).await
    }

    /// Pulls the blocks between the current head and `tip` into the window.
    ///
    /// The collected batch must link to the head as a whole; an aborted
    /// walk would leave a gap, so nothing is applied in that case.
    async fn extend(
        &mut self,
        tip: &Block,
        sensitivity: f64,
        report: &mut CycleReport,
    ) -> Result<(), ReconcileError> {
        let Some(head_height) = self.window.head().map(|b| b.height) else {
            return self.initialize(sensitivity, report).await;
        };
        let missing = tip.height.saturating_sub(head_height);
        if missing == 0 {
            return Ok(());
        }

        let mut batch = vec![tip.clone()];
        while (batch.len() as u64) < missing {
            let Some(parent_id) = batch.last().and_then(|b| b.parent_id) else {
                break;
            };
            match self.source.get_block(&parent_id).await {
                Ok(parent) => batch.push(parent),
                Err(e) => {
                    tracing::warn!(
                        collected = batch.len(),
                        missing,
                        error = %e,
                        "extension walk aborted, window left unchanged"
                    );
                    return Err(e.into());
                }
            }
        }

        batch.reverse();
        self.commit(batch, sensitivity, report).await
    }

    /// Resolves a diverged window against the remote branch containing
    /// `start` (the remote block at the head's height, or the tip).
    async fn repair(
        &mut self,
        tip: &Block,
        start: Block,
        report: &mut CycleReport,
    ) -> Result<(), ReconcileError> {
        let search = find_common_ancestor(
            &self.source,
            &self.window,
            start,
            self.config.max_ancestor_steps,
        )
        .await?;

        let (ancestor, steps) = match search {
            AncestorSearch::Found { block, steps } => (block, steps),
            AncestorSearch::NotFound { steps } => {
                tracing::info!(steps, "no common ancestor in window, full reset");
                return self.full_reset(report).await;
            }
        };

        let Some(index) = self.window.position(&ancestor.id) else {
            tracing::warn!(ancestor = %ancestor.id.short(), "ancestor vanished from window, full reset");
            return self.full_reset(report).await;
        };

        if index == 0 {
            tracing::info!("ancestor is the current head, nothing to repair");
            report.state = SyncState::Synced;
            self.state = SyncState::Synced;
            return Ok(());
        }

        self.window.truncate_from_index(index)?;
        tracing::info!(
            ancestor_height = ancestor.height,
            ancestor = %ancestor.id.short(),
            discarded = index,
            steps,
            "window trimmed to common ancestor"
        );
        report.repair = Some(RepairSummary {
            ancestor_id: ancestor.id,
            ancestor_height: ancestor.height,
            discarded: index,
            search_steps: steps,
        });

        self.extend(tip, self.config.extension_sensitivity, report)
            .await
    }

    /// Discards the window and rebuilds it along the new branch. Part of the
    /// reorg path, so the narrower extension bounds apply.
    async fn full_reset(&mut self, report: &mut CycleReport) -> Result<(), ReconcileError> {
        self.window.reset();
        report.full_reset = true;
        report.state = SyncState::Resetting;
        self.state = SyncState::Resetting;
        self.initialize(self.config.extension_sensitivity, report)
            .await
    }

    /// Prepends an oldest-first batch, feeding each block through the
    /// metrics pipeline, then trims the window to capacity.
    ///
    /// The batch is checked against the head before anything is applied.
    async fn commit(
        &mut self,
        batch: Vec<Block>,
        sensitivity: f64,
        report: &mut CycleReport,
    ) -> Result<(), ReconcileError> {
        self.window.check_batch(&batch)?;

        for block in batch {
            if let Some(processed) = self
                .pipeline
                .process_block(&self.source, &block, sensitivity)
                .await
            {
                report.processed.push(processed);
            }
            self.window.prepend(block)?;
            report.ingested += 1;
        }

        report.trimmed += self.window.trim_to_capacity(self.config.window_size);
        report.grew |= report.ingested > 0;
        Ok(())
    }

    fn observe(&self, f: impl FnOnce(&MonitorMetrics)) {
        if let Some(metrics) = &self.metrics {
            f(metrics);
        }
    }

    fn log_report(&self, report: &CycleReport) {
        let head = self.window.head();
        match report.state {
            SyncState::Synced => {
                tracing::debug!(height = head.map(|b| b.height), "window in sync");
            }
            state => {
                tracing::info!(
                    %state,
                    ingested = report.ingested,
                    trimmed = report.trimmed,
                    full_reset = report.full_reset,
                    head_height = head.map(|b| b.height),
                    window = self.window.len(),
                    "cycle complete"
                );
            }
        }
    }
}
