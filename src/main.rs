//! Node Failover Monitor - Entry Point
//!
//! Initializes configuration, logging, the node pool and the state
//! store, then runs the node health poller until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml (or `$MONITOR_CONFIG`) + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Create snapshot repository, notifier and metrics registry
//! 4. Load the state store from the latest snapshot
//! 5. Create the JSON-RPC node pool and the node health observer
//! 6. Register the observer (rehydrates alert latches)
//! 7. Spawn persister, poller, health server and metrics server
//! 8. Wait for SIGINT → graceful shutdown (stop poller→flush→exit)

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use node_failover_monitor::adapters::chain::JsonRpcNodePool;
use node_failover_monitor::adapters::metrics::{HealthServer, HealthState, MonitorMetrics};
use node_failover_monitor::adapters::notify::{LogNotifier, WebhookNotifier};
use node_failover_monitor::adapters::persistence::{FileSnapshotRepository, MemorySnapshotRepository};
use node_failover_monitor::config::{self, AppConfig};
use node_failover_monitor::ports::notifier::Notifier;
use node_failover_monitor::ports::repository::SnapshotRepository;
use node_failover_monitor::usecases::node_health::NodeHealthObserver;
use node_failover_monitor::usecases::scheduler::spawn_poller;
use node_failover_monitor::usecases::state_store::StateStore;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let config_path = std::env::var("MONITOR_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = config::loader::load_config(&config_path)
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new(&config.monitor.log_level)
                }),
        )
        .json()
        .init();

    info!(
        name = %config.monitor.name,
        version = env!("CARGO_PKG_VERSION"),
        nodes = config.nodes.len(),
        interval_secs = config.node_health.interval_seconds,
        "Starting Node Failover Monitor"
    );

    // ── 3. Shutdown signal channel ──────────────────────────
    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);
    let health_state = Arc::new(HealthState::new());

    // ── 4. Outbound adapters ────────────────────────────────
    let repository = build_repository(&config).await?;
    let notifier = build_notifier(&config)?;
    let metrics = Arc::new(MonitorMetrics::new().context("Failed to register metrics")?);

    // ── 5. State store (rehydrated from latest snapshot) ────
    let store = StateStore::load(
        Arc::clone(&repository),
        Arc::clone(&notifier),
        config.persistence.store(),
    )
    .await;
    health_state.store_loaded.store(true, Ordering::Relaxed);

    // ── 6. Node pool + health observer ──────────────────────
    let pool = Arc::new(
        JsonRpcNodePool::new(&config.nodes, config.node_health.pool())
            .context("Failed to create node pool")?,
    );
    let observer = Arc::new(NodeHealthObserver::new(
        pool,
        Arc::clone(&notifier),
        Arc::clone(&metrics),
        config.node_health.timeouts(),
    ));
    store
        .register(Arc::clone(&observer))
        .await
        .context("Failed to register node health observer")?;

    // ── 7. Background tasks ─────────────────────────────────
    let persister_handle = store.spawn_persister(shutdown_tx.subscribe());

    let poller_handle = health_state.track_poller(spawn_poller(
        Arc::clone(&observer),
        config.node_health.interval(),
        shutdown_tx.subscribe(),
    ));

    let health_server = HealthServer::new(Arc::clone(&health_state), config.metrics.health_port);
    let health_shutdown = shutdown_tx.subscribe();
    let health_handle = tokio::spawn(async move {
        if let Err(e) = health_server.run(health_shutdown).await {
            error!(error = %e, "Health server failed");
        }
    });

    let metrics_handle = if config.metrics.enabled {
        let bind_address = config.metrics.bind_address.clone();
        let metrics_shutdown = shutdown_tx.subscribe();
        let metrics_ref = Arc::clone(&metrics);
        Some(tokio::spawn(async move {
            if let Err(e) = metrics_ref.serve(bind_address, metrics_shutdown).await {
                error!(error = %e, "Metrics server failed");
            }
        }))
    } else {
        None
    };

    info!("All tasks spawned, monitor is running");

    // ── 8. Wait for SIGINT ──────────────────────────────────
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("SIGINT received, initiating graceful shutdown");

    // ── Graceful shutdown (stop poller→flush→stop servers) ──

    // 1. Signal all tasks to stop
    let _ = shutdown_tx.send(());
    health_state.poller_running.store(false, Ordering::Relaxed);

    // 2. Let an in-flight tick finish (up to one probe timeout)
    let _ = tokio::time::timeout(
        Duration::from_secs(config.node_health.probe_timeout_seconds),
        poller_handle,
    )
    .await;

    // 3. Merge what the last tick published, then persist
    if tokio::time::timeout(Duration::from_secs(5), store.drain()).await.is_err() {
        warn!("Timed out merging pending publishes before the final flush");
    }
    match store.flush().await {
        Ok(written) => info!(written, "Final monitoring state flushed"),
        Err(e) => warn!(error = %e, "Failed to flush monitoring state"),
    }
    let _ = tokio::time::timeout(Duration::from_secs(5), persister_handle).await;

    // 4. Wait for servers to close
    let _ = tokio::time::timeout(Duration::from_secs(5), health_handle).await;
    if let Some(handle) = metrics_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    info!("Shutdown complete");
    Ok(())
}

async fn build_repository(config: &AppConfig) -> Result<Arc<dyn SnapshotRepository>> {
    if config.persistence.enabled {
        let repository = FileSnapshotRepository::new(&config.persistence.data_dir)
            .await
            .context("Failed to open snapshot storage")?;
        Ok(Arc::new(repository))
    } else {
        warn!("Persistence disabled, monitoring state is kept in memory only");
        Ok(Arc::new(MemorySnapshotRepository::new()))
    }
}

fn build_notifier(config: &AppConfig) -> Result<Arc<dyn Notifier>> {
    match config.notifier.webhook() {
        Some(webhook) => {
            info!(url = %webhook.url, "Alert mail relay configured");
            Ok(Arc::new(
                WebhookNotifier::new(webhook).context("Failed to create webhook notifier")?,
            ))
        }
        None => {
            warn!("No mail relay configured, alerts are only logged");
            Ok(Arc::new(LogNotifier))
        }
    }
}
