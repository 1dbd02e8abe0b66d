//! Metrics and instrumentation for the monitor.
//!
//! This module defines Prometheus-compatible metrics for the reconciler
//! and exposes a small HTTP exporter that serves `/metrics` in
//! Prometheus text format.
//!
//! Typical usage in a process:
//!
//! ```ignore
//! use std::net::SocketAddr;
//! use std::sync::Arc;
//! use tipwatch::metrics::{MetricsRegistry, run_prometheus_http_server};
//!
//! let registry = Arc::new(MetricsRegistry::new()?);
//! let addr: SocketAddr = "127.0.0.1:9898".parse()?;
//!
//! // Spawn the HTTP exporter in the background:
//! tokio::spawn(run_prometheus_http_server(registry.clone(), addr));
//!
//! // Hand the metrics to the reconciler:
//! let reconciler = reconciler.with_metrics(registry.monitor.clone());
//! ```

pub mod prometheus;

pub use self::prometheus::{MetricsRegistry, MonitorMetrics, run_prometheus_http_server};
