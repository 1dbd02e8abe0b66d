//! Prometheus-backed metrics and HTTP exporter.
//!
//! This module defines a [`MetricsRegistry`] that owns a Prometheus
//! registry and a set of strongly-typed monitor metrics, and an async
//! HTTP exporter that serves `/metrics` using `hyper`.

use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    Method, Request, Response, StatusCode, body::Incoming, header, server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Reconciliation and analytics metrics.
///
/// These are registered into a [`Registry`] and updated by the
/// reconciler when a handle is attached to it.
#[derive(Clone)]
pub struct MonitorMetrics {
    /// Wall-clock duration of a reconciliation cycle, in seconds.
    pub cycle_seconds: Histogram,
    /// Blocks accepted into the window.
    pub blocks_ingested: IntCounter,
    /// Cycles that classified the window as diverged from the remote tip.
    pub reorgs_detected: IntCounter,
    /// Full window resets (no common ancestor in the window).
    pub full_resets: IntCounter,
    /// Cycles aborted because the chain source was unavailable.
    pub source_unavailable: IntCounter,
    /// Ancestor searches that ran out of their step budget.
    pub ancestor_search_exceeded: IntCounter,
    /// Anomaly flags raised, labelled by flag name.
    pub anomalies: IntCounterVec,
    /// Current number of blocks in the window.
    pub window_length: IntGauge,
    /// Height of the current window head.
    pub head_height: IntGauge,
}

impl MonitorMetrics {
    /// Registers monitor metrics into the given `Registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        // Cycles mostly wait on paced remote calls, hence the long tail.
        let cycle_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "reconcile_cycle_seconds",
                "Time spent in one reconciliation cycle in seconds",
            )
            .buckets(vec![0.01, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
        )?;
        registry.register(Box::new(cycle_seconds.clone()))?;

        let blocks_ingested = IntCounter::with_opts(Opts::new(
            "blocks_ingested_total",
            "Total number of blocks accepted into the window",
        ))?;
        registry.register(Box::new(blocks_ingested.clone()))?;

        let reorgs_detected = IntCounter::with_opts(Opts::new(
            "reorgs_detected_total",
            "Total number of cycles that found the window diverged from the remote chain",
        ))?;
        registry.register(Box::new(reorgs_detected.clone()))?;

        let full_resets = IntCounter::with_opts(Opts::new(
            "full_resets_total",
            "Total number of window resets caused by a missing common ancestor",
        ))?;
        registry.register(Box::new(full_resets.clone()))?;

        let source_unavailable = IntCounter::with_opts(Opts::new(
            "source_unavailable_total",
            "Total number of cycles cut short by an unavailable chain source",
        ))?;
        registry.register(Box::new(source_unavailable.clone()))?;

        let ancestor_search_exceeded = IntCounter::with_opts(Opts::new(
            "ancestor_search_exceeded_total",
            "Total number of ancestor searches that exhausted their step budget",
        ))?;
        registry.register(Box::new(ancestor_search_exceeded.clone()))?;

        let anomalies = IntCounterVec::new(
            Opts::new("anomalies_total", "Total number of anomaly flags raised"),
            &["flag"],
        )?;
        registry.register(Box::new(anomalies.clone()))?;

        let window_length = IntGauge::with_opts(Opts::new(
            "window_length",
            "Number of blocks currently held in the window",
        ))?;
        registry.register(Box::new(window_length.clone()))?;

        let head_height = IntGauge::with_opts(Opts::new(
            "head_height",
            "Height of the current window head",
        ))?;
        registry.register(Box::new(head_height.clone()))?;

        Ok(Self {
            cycle_seconds,
            blocks_ingested,
            reorgs_detected,
            full_resets,
            source_unavailable,
            ancestor_search_exceeded,
            anomalies,
            window_length,
            head_height,
        })
    }
}

/// Wrapper around a Prometheus registry and the monitor metrics.
///
/// This is the main handle you pass around in the process. It can be
/// wrapped in an [`Arc`] and shared across tasks.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    pub monitor: MonitorMetrics,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with a fresh underlying `Registry`
    /// and registers the monitor metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("tipwatch".to_string()), None)?;
        let monitor = MonitorMetrics::register(&registry)?;
        Ok(Self { registry, monitor })
    }

    /// Encodes all metrics in this registry into the Prometheus text format.
    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("failed to encode Prometheus metrics: {e}");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Runs an HTTP server that exposes Prometheus metrics.
///
/// The server listens on `addr` and serves `GET /metrics` with the
/// Prometheus text exposition format. All other paths return 404.
pub async fn run_prometheus_http_server(
    metrics: Arc<MetricsRegistry>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let metrics = metrics.clone();
                handle_request(req, metrics)
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                tracing::debug!("prometheus HTTP connection error: {err}");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    metrics: Arc<MetricsRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    Ok(route(req.method(), req.uri().path(), &metrics))
}

fn route(method: &Method, path: &str, metrics: &MetricsRegistry) -> Response<Full<Bytes>> {
    let (status, content_type, body) = match (method, path) {
        (&Method::GET, "/metrics") => (
            StatusCode::OK,
            "text/plain; version=0.0.4",
            metrics.gather_text(),
        ),
        _ => (
            StatusCode::NOT_FOUND,
            "text/plain",
            "not found".to_string(),
        ),
    };

    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, header::HeaderValue::from_static(content_type));
    response
}
