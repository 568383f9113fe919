//! Prometheus Metrics Registry - Node Monitor Observability
//!
//! Registers and exposes Prometheus metrics for Grafana dashboards.
//! Covers tick timing, per-slot availability, failovers and alert
//! volume.

use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use prometheus::{
    Encoder, GaugeVec, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::domain::failover::AlertLevel;
use crate::domain::node::{NodeMode, NodeType, NodesHealth};

/// Centralized Prometheus metrics for the node monitor.
///
/// All metrics follow the naming convention `node_monitor_*`.
pub struct MonitorMetrics {
    /// Prometheus registry.
    registry: Registry,
    /// Completed health ticks.
    pub ticks: IntCounter,
    /// Ticks skipped because the previous one was still running.
    pub ticks_skipped: IntCounter,
    /// Tick wall time in seconds.
    pub tick_duration: Histogram,
    /// Slot availability (1 = available, 0 = not).
    pub node_available: GaugeVec,
    /// Swap attempts by node type, target mode and result.
    pub failovers: IntCounterVec,
    /// Alert lines queued, by level.
    pub alert_lines: IntCounterVec,
    /// Batched mails that the notifier rejected.
    pub notify_failures: IntCounter,
}

impl MonitorMetrics {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let ticks = IntCounter::new("node_monitor_ticks_total", "Completed node health ticks")?;

        let ticks_skipped = IntCounter::new(
            "node_monitor_ticks_skipped_total",
            "Ticks skipped while the previous tick was still running",
        )?;

        let tick_duration = Histogram::with_opts(
            HistogramOpts::new(
                "node_monitor_tick_duration_seconds",
                "Wall time of a node health tick",
            )
            .buckets(vec![0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0]),
        )?;

        let node_available = GaugeVec::new(
            Opts::new(
                "node_monitor_node_available",
                "Node slot availability (1=available, 0=unavailable)",
            ),
            &["node_type", "mode"],
        )?;

        let failovers = IntCounterVec::new(
            Opts::new("node_monitor_swaps_total", "Node swap attempts"),
            &["node_type", "target", "result"],
        )?;

        let alert_lines = IntCounterVec::new(
            Opts::new("node_monitor_alert_lines_total", "Alert lines queued for mail"),
            &["level"],
        )?;

        let notify_failures = IntCounter::new(
            "node_monitor_notify_failures_total",
            "Alert mails the notifier failed to send",
        )?;

        registry.register(Box::new(ticks.clone()))?;
        registry.register(Box::new(ticks_skipped.clone()))?;
        registry.register(Box::new(tick_duration.clone()))?;
        registry.register(Box::new(node_available.clone()))?;
        registry.register(Box::new(failovers.clone()))?;
        registry.register(Box::new(alert_lines.clone()))?;
        registry.register(Box::new(notify_failures.clone()))?;

        Ok(Self {
            registry,
            ticks,
            ticks_skipped,
            tick_duration,
            node_available,
            failovers,
            alert_lines,
            notify_failures,
        })
    }

    /// Mirror a published health value into the availability gauges.
    pub fn record_health(&self, health: &NodesHealth) {
        for (node_type, pair) in &health.nodes {
            for mode in NodeMode::ALL {
                let available = if pair.health.get(mode).available { 1.0 } else { 0.0 };
                self.node_available
                    .with_label_values(&[node_type.as_str(), mode.as_str()])
                    .set(available);
            }
        }
    }

    pub fn record_swap(&self, node_type: NodeType, target: NodeMode, success: bool) {
        let result = if success { "ok" } else { "failed" };
        self.failovers
            .with_label_values(&[node_type.as_str(), target.as_str(), result])
            .inc();
    }

    pub fn record_alert(&self, level: AlertLevel) {
        let label = match level {
            AlertLevel::Info => "info",
            AlertLevel::Warn => "warn",
            AlertLevel::Alert => "alert",
        };
        self.alert_lines.with_label_values(&[label]).inc();
    }

    /// Encode all metrics in the Prometheus text format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics);
                async move {
                    match metrics.encode() {
                        Ok(body) => (StatusCode::OK, body),
                        Err(e) => {
                            warn!(error = %e, "Failed to encode metrics");
                            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
                        }
                    }
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}
