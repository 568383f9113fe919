//! State Store - Observer Registry and Persisted Monitoring Tree
//!
//! Owns the `subsystem → metric → Snapshot` tree for the whole
//! process. Observers register here; every value they publish is
//! merged into the tree (whole metric replaced, never patched) and
//! a debounced save is scheduled.
//!
//! Persistence flow:
//! 1. `load` reads the latest record (empty tree on first run or bad data)
//! 2. each merge marks the store dirty
//! 3. the persister waits out the debounce window, then compares the
//!    tree with the last persisted one and writes only on change
//! 4. a failed write is reported and retried in the next window
//!
//! Merging runs on one pump task per observer. `drain` waits until
//! every publish made so far is in the tree; shutdown drains before
//! its final flush.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, Notify, RwLock, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::snapshot::{
    MetricName, Snapshot, SubsystemName, SubsystemState, SystemState, same_data,
};
use crate::error::{MonitoringError, MonitoringResult};
use crate::ports::notifier::Notifier;
use crate::ports::repository::{SNAPSHOT_SCHEMA_VERSION, SnapshotRecord, SnapshotRepository};
use crate::usecases::observer::MetricObserver;

/// Persistence settings of the store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Quiet period that collapses bursts of merges into one write.
    pub debounce: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(5),
        }
    }
}

/// Result of a state query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StateView {
    System(SystemState),
    Subsystem(SubsystemState),
    Metric(Snapshot<Value>),
}

/// Type-erased handle the registry keeps per observer.
#[async_trait]
trait RegisteredObserver: Send + Sync {
    async fn forward_webhook(&self, payload: Value) -> MonitoringResult<()>;

    fn published(&self) -> u64;
}

#[async_trait]
impl<O: MetricObserver> RegisteredObserver for O {
    async fn forward_webhook(&self, payload: Value) -> MonitoringResult<()> {
        MetricObserver::on_webhook(self, payload).await
    }

    fn published(&self) -> u64 {
        self.channel().published()
    }
}

/// Registry entry: the observer and how many of its publishes were merged.
struct Registration {
    observer: Arc<dyn RegisteredObserver>,
    merged: watch::Receiver<u64>,
}

type SubsystemObservers = HashMap<MetricName, Registration>;

/// Process-wide monitoring state, constructed once by the composition root.
pub struct StateStore {
    state: RwLock<SystemState>,
    observers: RwLock<HashMap<SubsystemName, SubsystemObservers>>,
    /// Tree as of the last successful write.
    persisted: Mutex<SystemState>,
    dirty: Notify,
    repository: Arc<dyn SnapshotRepository>,
    notifier: Arc<dyn Notifier>,
    config: StoreConfig,
}

impl StateStore {
    /// Create the store from the latest persisted record.
    ///
    /// Never fails: a missing record, an unreadable one or one of
    /// another schema version all start from an empty tree.
    #[instrument(skip_all)]
    pub async fn load(
        repository: Arc<dyn SnapshotRepository>,
        notifier: Arc<dyn Notifier>,
        config: StoreConfig,
    ) -> Arc<Self> {
        let initial = match read_latest(repository.as_ref()).await {
            Ok(Some(state)) => {
                info!(subsystems = state.len(), "Monitoring state loaded");
                state
            }
            Ok(None) => {
                warn!("No monitoring state found, starting empty");
                SystemState::new()
            }
            Err(e) => {
                warn!(error = %e, "Failed to parse loaded system state, defaulting to empty state");
                report(
                    notifier.as_ref(),
                    "Monitoring Error. Failed to parse loaded system state.",
                    &e,
                )
                .await;
                SystemState::new()
            }
        };

        Arc::new(Self {
            state: RwLock::new(initial.clone()),
            observers: RwLock::new(HashMap::new()),
            persisted: Mutex::new(initial),
            dirty: Notify::new(),
            repository,
            notifier,
            config,
        })
    }

    // ── Registration ────────────────────────────────────────

    /// Register an observer and start merging its publishes.
    ///
    /// The observer is seeded with its persisted value (if any) before
    /// subscribing, so the seed itself never counts as an update.
    pub async fn register<O: MetricObserver>(
        self: &Arc<Self>,
        observer: Arc<O>,
    ) -> MonitoringResult<()> {
        let subsystem = observer.subsystem().to_string();
        let metric = observer.metric().to_string();
        let (merged_tx, merged_rx) = watch::channel(observer.channel().published());

        {
            let mut observers = self.observers.write().await;
            let metrics = observers.entry(subsystem.clone()).or_default();
            if metrics.contains_key(&metric) {
                return Err(MonitoringError::DuplicateRegistration { subsystem, metric });
            }
            let handle: Arc<dyn RegisteredObserver> = observer.clone();
            metrics.insert(
                metric.clone(),
                Registration {
                    observer: handle,
                    merged: merged_rx,
                },
            );
        }

        self.rehydrate(observer.as_ref()).await;

        // Subscribe before reading the count: publishes missed by the
        // subscription are then already part of the baseline.
        let updates = observer.channel().subscribe();
        merged_tx.send_replace(observer.channel().published());
        tokio::spawn(Arc::clone(self).pump(subsystem.clone(), metric.clone(), updates, merged_tx));

        info!(subsystem = %subsystem, metric = %metric, "Observer registered");
        Ok(())
    }

    async fn rehydrate<O: MetricObserver>(&self, observer: &O) {
        let persisted = {
            let state = self.state.read().await;
            state
                .get(observer.subsystem())
                .and_then(|metrics| metrics.get(observer.metric()))
                .map(|snapshot| snapshot.data.clone())
        };

        let Some(data) = persisted else {
            return;
        };

        match serde_json::from_value::<O::Data>(data) {
            Ok(value) => {
                observer.channel().seed(value);
                debug!(
                    subsystem = observer.subsystem(),
                    metric = observer.metric(),
                    "Observer rehydrated from persisted state"
                );
            }
            Err(e) => warn!(
                subsystem = observer.subsystem(),
                metric = observer.metric(),
                error = %e,
                "Persisted metric does not match observer payload, starting fresh"
            ),
        }
    }

    /// Drain one observer's publishes into the tree, in order.
    async fn pump<T: Serialize + Clone + Send + Sync + 'static>(
        self: Arc<Self>,
        subsystem: SubsystemName,
        metric: MetricName,
        mut updates: broadcast::Receiver<T>,
        merged: watch::Sender<u64>,
    ) {
        loop {
            match updates.recv().await {
                Ok(value) => {
                    if let Err(e) = self.merge(&subsystem, &metric, &value).await {
                        error!(
                            subsystem = %subsystem,
                            metric = %metric,
                            error = %e,
                            "Error updating monitoring state"
                        );
                    }
                    merged.send_modify(|count| *count += 1);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(subsystem = %subsystem, metric = %metric, dropped = n, "Observer updates lagged");
                    merged.send_modify(|count| *count += n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(subsystem = %subsystem, metric = %metric, "Observer channel closed");
                    return;
                }
            }
        }
    }

    /// Replace the snapshot of one metric and schedule a save.
    async fn merge<T: Serialize>(&self, subsystem: &str, metric: &str, value: &T) -> MonitoringResult<()> {
        let data = serde_json::to_value(value)?;

        self.state
            .write()
            .await
            .entry(subsystem.to_string())
            .or_default()
            .insert(metric.to_string(), Snapshot::now(data));

        self.dirty.notify_one();
        debug!(subsystem, metric, "Metric merged");
        Ok(())
    }

    // ── Queries ─────────────────────────────────────────────

    /// Whole tree, one subsystem, or one metric depending on the arguments.
    pub async fn get_state(
        &self,
        subsystem: Option<&str>,
        metric: Option<&str>,
    ) -> MonitoringResult<StateView> {
        match (subsystem, metric) {
            (None, None) => Ok(StateView::System(self.system_state().await)),
            (Some(subsystem), None) => self.subsystem_state(subsystem).await.map(StateView::Subsystem),
            (Some(subsystem), Some(metric)) => self.metric(subsystem, metric).await.map(StateView::Metric),
            (None, Some(metric)) => Err(MonitoringError::MetricNotFound {
                subsystem: String::new(),
                metric: metric.to_string(),
            }),
        }
    }

    pub async fn system_state(&self) -> SystemState {
        self.state.read().await.clone()
    }

    pub async fn subsystem_state(&self, subsystem: &str) -> MonitoringResult<SubsystemState> {
        self.state
            .read()
            .await
            .get(subsystem)
            .cloned()
            .ok_or_else(|| MonitoringError::SubsystemNotFound(subsystem.to_string()))
    }

    pub async fn metric(&self, subsystem: &str, metric: &str) -> MonitoringResult<Snapshot<Value>> {
        let state = self.state.read().await;
        let metrics = state
            .get(subsystem)
            .ok_or_else(|| MonitoringError::SubsystemNotFound(subsystem.to_string()))?;

        metrics
            .get(metric)
            .cloned()
            .ok_or_else(|| MonitoringError::MetricNotFound {
                subsystem: subsystem.to_string(),
                metric: metric.to_string(),
            })
    }

    /// Typed read of a single metric.
    pub async fn metric_data<T: DeserializeOwned>(
        &self,
        subsystem: &str,
        metric: &str,
    ) -> MonitoringResult<Snapshot<T>> {
        let snapshot = self.metric(subsystem, metric).await?;
        Ok(Snapshot {
            data: serde_json::from_value(snapshot.data)?,
            updated_at: snapshot.updated_at,
        })
    }

    // ── Webhooks ────────────────────────────────────────────

    /// Forward a pushed payload to the observer registered for the key.
    pub async fn on_webhook(&self, subsystem: &str, metric: &str, payload: Value) -> MonitoringResult<()> {
        let observer = {
            let observers = self.observers.read().await;
            observers
                .get(subsystem)
                .and_then(|metrics| metrics.get(metric))
                .map(|registration| Arc::clone(&registration.observer))
                .ok_or_else(|| MonitoringError::ObserverNotFound {
                    subsystem: subsystem.to_string(),
                    metric: metric.to_string(),
                })?
        };

        observer.forward_webhook(payload).await
    }

    // ── Persistence ─────────────────────────────────────────

    /// Spawn the debounced persister. On shutdown it flushes once more.
    pub fn spawn_persister(self: &Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let store = Arc::clone(self);

        tokio::spawn(async move {
            info!(debounce_ms = store.config.debounce.as_millis(), "State persister started");

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    () = store.dirty.notified() => {}
                }

                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    () = tokio::time::sleep(store.config.debounce) => {}
                }

                store.persist_or_retry().await;
            }

            store.drain().await;
            if let Err(e) = store.flush().await {
                error!(error = %e, "Final state flush failed");
            }
            info!("State persister stopped");
        })
    }

    /// Wait until every value published so far has been merged.
    pub async fn drain(&self) {
        let pending: Vec<(u64, watch::Receiver<u64>)> = {
            let observers = self.observers.read().await;
            observers
                .values()
                .flat_map(HashMap::values)
                .map(|registration| (registration.observer.published(), registration.merged.clone()))
                .collect()
        };

        for (target, mut merged) in pending {
            // Err: the pump has stopped and will merge nothing more.
            let _ = merged.wait_for(|count| *count >= target).await;
        }
    }

    /// Write the tree now if it differs from the last persisted one.
    ///
    /// Returns whether a write happened.
    #[instrument(skip(self))]
    pub async fn flush(&self) -> MonitoringResult<bool> {
        let mut persisted = self.persisted.lock().await;
        let current = self.state.read().await.clone();

        if same_data(&persisted, &current) {
            debug!("Monitoring state unchanged, skipping write");
            return Ok(false);
        }

        let data = serde_json::to_string(&current)?;
        self.repository
            .save(&SnapshotRecord::current(data))
            .await
            .context("Failed to save monitoring snapshot")?;

        info!(subsystems = current.len(), "Monitoring state persisted");
        *persisted = current;
        Ok(true)
    }

    async fn persist_or_retry(&self) {
        if let Err(e) = self.flush().await {
            error!(error = %e, "Error persisting the state");
            report(self.notifier.as_ref(), "Monitoring Error. Error persisting the state.", &e).await;
            // Retry in the next debounce window.
            self.dirty.notify_one();
        }
    }

    /// Check if the snapshot storage is reachable.
    pub async fn is_healthy(&self) -> bool {
        self.repository.is_healthy().await
    }
}

async fn read_latest(repository: &dyn SnapshotRepository) -> anyhow::Result<Option<SystemState>> {
    let Some(record) = repository
        .load_latest()
        .await
        .context("Failed to load latest snapshot")?
    else {
        return Ok(None);
    };

    anyhow::ensure!(
        record.version == SNAPSHOT_SCHEMA_VERSION,
        "Snapshot schema version {} does not match expected {}",
        record.version,
        SNAPSHOT_SCHEMA_VERSION
    );

    let state = serde_json::from_str(&record.data).context("Failed to parse snapshot JSON")?;
    Ok(Some(state))
}

async fn report(notifier: &dyn Notifier, subject: &str, error: &(dyn std::fmt::Display + Sync)) {
    if let Err(e) = notifier.send_alert(subject, &[error.to_string()]).await {
        warn!(error = %e, subject, "Failed to send monitoring error mail");
    }
}
