//! Block analytics.
//!
//! Every block accepted into the window is pushed through the
//! [`MetricsPipeline`], which:
//!
//! - fetches the block's coinbase payout and derives total fees from the
//!   subsidy schedule ([`subsidy`]),
//! - builds a [`BlockMetrics`] record and appends it to a capped history,
//! - flags statistical fee outliers once the history has warmed up
//!   ([`anomaly`]).

pub mod anomaly;
pub mod config;
pub mod pipeline;
pub mod subsidy;

pub use anomaly::{ANOMALY_WARMUP, AnomalyFlag, AnomalyReport, IqrBounds};
pub use config::AnalyticsConfig;
pub use pipeline::{BlockMetrics, MetricsPipeline, ProcessedBlock};
pub use subsidy::SubsidySchedule;
