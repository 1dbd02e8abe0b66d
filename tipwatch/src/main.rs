// src/main.rs
//
// Chain-tip monitor:
//
// - Esplora-backed chain source (paced, retrying HTTP client)
// - Bounded block window kept in line with the remote tip
// - Reorg detection and repair
// - Per-block fee metrics and anomaly flags, logged as they are produced
// - Prometheus metrics exporter on /metrics

use std::sync::Arc;

use tipwatch::{
    // Top-level config
    MonitorConfig,
    // Analytics
    MetricsPipeline,
    // Metrics
    MetricsRegistry,
    ProcessedBlock,
    // Reconciliation
    Reconciler,
    // Chain source
    EsploraReconciler,
    EsploraSource,
    run_prometheus_http_server,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "tipwatch=info".to_string()),
        )
        .init();

    if let Err(err) = run_monitor().await {
        tracing::error!("fatal error: {err}");
        std::process::exit(1);
    }
}

async fn run_monitor() -> Result<(), String> {
    let cfg = MonitorConfig::from_env().map_err(|e| format!("bad configuration: {e}"))?;
    cfg.validate().map_err(|e| e.to_string())?;

    // ---------------------------
    // Metrics registry + exporter
    // ---------------------------

    let metrics = Arc::new(
        MetricsRegistry::new()
            .map_err(|e| format!("failed to initialise metrics registry: {e}"))?,
    );

    if cfg.metrics.enabled {
        let metrics_clone = metrics.clone();
        let addr = cfg.metrics.listen_addr;
        tokio::spawn(async move {
            if let Err(e) = run_prometheus_http_server(metrics_clone, addr).await {
                tracing::error!("metrics HTTP server error: {e}");
            }
        });
        tracing::info!("metrics exporter listening on http://{addr}/metrics");
    }

    // ---------------------------
    // Chain source (Esplora HTTP)
    // ---------------------------

    let source = EsploraSource::new(&cfg.source)
        .map_err(|e| format!("failed to create Esplora client: {e}"))?;

    // ---------------------------
    // Reconciler + analytics
    // ---------------------------

    let pipeline = MetricsPipeline::new(cfg.analytics.clone());
    let mut reconciler: EsploraReconciler =
        Reconciler::new(cfg.reconciler.clone(), source, pipeline)
            .with_metrics(metrics.monitor.clone());

    tracing::info!(
        base_url = %cfg.source.base_url,
        window_size = cfg.reconciler.window_size,
        cycle_interval_secs = cfg.cycle_interval.as_secs(),
        "starting monitor"
    );

    // ---------------------------
    // Main reconciliation loop
    // ---------------------------

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };
    reconciler
        .run_until(cfg.cycle_interval, shutdown, |report| {
            for processed in &report.processed {
                log_processed(processed);
            }
        })
        .await;

    tracing::info!(
        head_height = reconciler.window().head().map(|b| b.height),
        history = reconciler.pipeline().history_len(),
        total_fees = reconciler.pipeline().total_fees(),
        "shutting down"
    );
    Ok(())
}

fn log_processed(processed: &ProcessedBlock) {
    let m = &processed.metrics;
    tracing::info!(
        height = m.height,
        id = %m.id.short(),
        tx_count = m.tx_count,
        size_bytes = m.size_bytes,
        total_fees = m.total_fees,
        average_fee = m.average_fee,
        empty = m.is_empty,
        large = m.is_large,
        high_fees = m.has_high_fees,
        "block processed"
    );

    if processed.anomalies.is_empty() {
        return;
    }
    let flags: Vec<&str> = processed.anomalies.flags.iter().map(|f| f.as_str()).collect();
    match &processed.anomalies.bounds {
        Some(bounds) => tracing::warn!(
            height = m.height,
            flags = ?flags,
            lower = bounds.lower,
            upper = bounds.upper,
            "fee anomaly"
        ),
        None => tracing::warn!(height = m.height, flags = ?flags, "block anomaly"),
    }
}
