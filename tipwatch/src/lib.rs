//! Chain-tip monitor library crate.
//!
//! This crate keeps a bounded window of recent blocks consistent with a
//! remote blockchain and derives per-block fee analytics along the way:
//!
//! - strongly-typed domain types (`types`),
//! - read access to the remote chain (`source`),
//! - the head-first block window (`storage`),
//! - the reconciliation engine with reorg repair (`reconcile`),
//! - fee metrics and anomaly detection (`analytics`),
//! - Prometheus-based metrics (`metrics`),
//! - and a top-level monitor configuration (`config`).
//!
//! Binaries compose these pieces into a polling monitor; tests and
//! simulations drive the same engine against an in-memory chain.

pub mod analytics;
pub mod config;
pub mod metrics;
pub mod reconcile;
pub mod source;
pub mod storage;
pub mod types;

// Re-export top-level configuration types.
pub use config::{ConfigError, MetricsConfig, MonitorConfig, SourceConfig};

// Re-export the reconciliation engine.
pub use reconcile::{
    AncestorSearch, CycleReport, ReconcileError, Reconciler, ReconcilerConfig, RepairSummary,
    SyncState, find_common_ancestor,
};

// Re-export chain sources.
pub use source::{ChainSource, EsploraSource, InMemoryChainSource, SourceError};

// Re-export the block window.
pub use storage::{WindowError, WindowStore};

// Re-export analytics.
pub use analytics::{
    AnalyticsConfig, AnomalyFlag, AnomalyReport, BlockMetrics, MetricsPipeline, ProcessedBlock,
    SubsidySchedule,
};

// Re-export metrics registry and monitor metrics.
pub use metrics::{MetricsRegistry, MonitorMetrics, run_prometheus_http_server};

// Re-export domain types at the crate root for convenience.
pub use types::*;

/// Type alias for the reconciler used by the monitor binary.
pub type EsploraReconciler = Reconciler<EsploraSource>;
