//! Integration Tests - End-to-end Monitor Component Testing
//!
//! Tests the interaction between the state store, the node health
//! observer and mocked ports. Uses mockall for trait mocking and
//! tokio::test for async tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use mockall::mock;
use mockall::predicate::*;
use serde_json::json;
use tokio::sync::broadcast;

use node_failover_monitor::adapters::metrics::MonitorMetrics;
use node_failover_monitor::adapters::persistence::MemorySnapshotRepository;
use node_failover_monitor::domain::node::{NodeError, NodeMode, NodeType, NodesHealth};
use node_failover_monitor::error::MonitoringError;
use node_failover_monitor::ports::node_pool::NodePool;
use node_failover_monitor::ports::notifier::Notifier;
use node_failover_monitor::ports::repository::{SnapshotRecord, SnapshotRepository};
use node_failover_monitor::usecases::node_health::{
    HealthTimeouts, METRIC, NodeHealthObserver, SUBJECT_ERROR, SUBSYSTEM,
};
use node_failover_monitor::usecases::observer::MetricObserver;
use node_failover_monitor::usecases::state_store::{StateStore, StateView, StoreConfig};

// ---- Mock Definitions ----

mock! {
    pub Pool {}

    #[async_trait::async_trait]
    impl NodePool for Pool {
        async fn check_nodes(&self) -> anyhow::Result<Vec<NodeError>>;
        fn connected_node(&self, node_type: NodeType) -> Option<NodeMode>;
        fn is_configured(&self, node_type: NodeType, mode: NodeMode) -> bool;
        async fn swap_node(&self, node_type: NodeType, mode: NodeMode) -> anyhow::Result<()>;
    }
}

mock! {
    pub Mailer {}

    #[async_trait::async_trait]
    impl Notifier for Mailer {
        async fn send_alert(&self, subject: &str, lines: &[String]) -> anyhow::Result<()>;
    }
}

mock! {
    pub Repo {}

    #[async_trait::async_trait]
    impl SnapshotRepository for Repo {
        async fn load_latest(&self) -> anyhow::Result<Option<SnapshotRecord>>;
        async fn save(&self, record: &SnapshotRecord) -> anyhow::Result<()>;
        async fn is_healthy(&self) -> bool;
    }
}

// ---- Helpers ----

type Outbox = Arc<Mutex<Vec<(String, Vec<String>)>>>;

/// Mailer that records every batch it receives.
fn recording_mailer() -> (MockMailer, Outbox) {
    let outbox: Outbox = Arc::default();
    let sink = Arc::clone(&outbox);
    let mut mailer = MockMailer::new();
    mailer.expect_send_alert().returning(move |subject, lines| {
        sink.lock().unwrap().push((subject.to_string(), lines.to_vec()));
        Ok(())
    });
    (mailer, outbox)
}

/// Pool with one fully configured pair serving from ACTIVE.
fn pool_with_pair(node_type: NodeType, errors: Vec<NodeError>) -> MockPool {
    let mut pool = MockPool::new();
    pool.expect_check_nodes().returning(move || Ok(errors.clone()));
    pool.expect_connected_node()
        .returning(move |t| (t == node_type).then_some(NodeMode::Active));
    pool.expect_is_configured().returning(move |t, _| t == node_type);
    pool
}

fn observer(pool: MockPool, mailer: Arc<dyn Notifier>) -> Arc<NodeHealthObserver> {
    Arc::new(NodeHealthObserver::new(
        Arc::new(pool),
        mailer,
        Arc::new(MonitorMetrics::new().unwrap()),
        HealthTimeouts::default(),
    ))
}

async fn store_on(repository: Arc<dyn SnapshotRepository>) -> Arc<StateStore> {
    StateStore::load(repository, Arc::new(MockMailer::new()), StoreConfig::default()).await
}

fn both_down(node_type: NodeType) -> Vec<NodeError> {
    vec![
        NodeError::new(node_type, Some(NodeMode::Active), format!("Failed to get {node_type} Active node infos")),
        NodeError::new(node_type, Some(NodeMode::Passive), format!("Failed to get {node_type} Passive node infos")),
    ]
}

// ---- Integration Tests ----

#[tokio::test]
async fn test_fresh_start_clean_tick_sends_no_mail() {
    let mut mailer = MockMailer::new();
    mailer.expect_send_alert().times(0);

    let store = store_on(Arc::new(MemorySnapshotRepository::new())).await;
    let state = store.get_state(None, None).await.unwrap();
    assert!(matches!(state, StateView::System(ref tree) if tree.is_empty()));

    let observer = observer(pool_with_pair(NodeType::Dex, Vec::new()), Arc::new(mailer));
    store.register(Arc::clone(&observer)).await.unwrap();

    let health = observer.fetch().await.unwrap();
    store.drain().await;

    assert!(health.all_nodes_healthy);
    let stored = store.metric_data::<NodesHealth>(SUBSYSTEM, METRIC).await.unwrap().data;
    assert_eq!(stored, health);
}

#[tokio::test]
async fn test_active_failure_fails_over_to_passive() {
    let mut pool = pool_with_pair(
        NodeType::Dex,
        vec![NodeError::new(NodeType::Dex, Some(NodeMode::Active), "dex Active node out of sync")],
    );
    pool.expect_swap_node()
        .with(eq(NodeType::Dex), eq(NodeMode::Passive))
        .times(1)
        .returning(|_, _| Ok(()));
    let (mailer, outbox) = recording_mailer();

    let store = store_on(Arc::new(MemorySnapshotRepository::new())).await;
    let observer = observer(pool, Arc::new(mailer));
    store.register(Arc::clone(&observer)).await.unwrap();

    observer.fetch().await.unwrap();
    store.drain().await;

    let stored = store.metric_data::<NodesHealth>(SUBSYSTEM, METRIC).await.unwrap().data;
    let dex = &stored.nodes[&NodeType::Dex].health;
    assert!(dex.passive.available);
    assert!(!dex.active.available);
    assert!(!stored.all_nodes_healthy);

    let mails = outbox.lock().unwrap();
    assert_eq!(mails.len(), 1);
    assert_eq!(mails[0].0, SUBJECT_ERROR);
    assert!(mails[0].1[0].starts_with("WARN."));
    assert!(mails[0].1[0].contains("switched to Passive"));
}

#[tokio::test]
async fn test_persistent_outage_alerts_once() {
    let (mailer, outbox) = recording_mailer();
    let observer = observer(pool_with_pair(NodeType::Output, both_down(NodeType::Output)), Arc::new(mailer));

    for tick in 1..=3 {
        let health = observer.fetch().await.unwrap();
        assert!(health.nodes[&NodeType::Output].mails.both_nodes_down, "tick {tick}");
    }

    let mails = outbox.lock().unwrap();
    assert_eq!(mails.len(), 1);
    let alerts: Vec<_> = mails[0].1.iter().filter(|l| l.starts_with("ALERT!")).collect();
    assert_eq!(alerts.len(), 1);
}

#[tokio::test]
async fn test_alert_latches_survive_restart() {
    let repository = Arc::new(MemorySnapshotRepository::new());

    // First process: alert once, persist.
    {
        let (mailer, outbox) = recording_mailer();
        let store = store_on(repository.clone()).await;
        let observer = observer(pool_with_pair(NodeType::Output, both_down(NodeType::Output)), Arc::new(mailer));
        store.register(Arc::clone(&observer)).await.unwrap();

        observer.fetch().await.unwrap();
        store.drain().await;
        assert!(store.flush().await.unwrap());
        assert_eq!(outbox.lock().unwrap().len(), 1);
    }

    // Second process: same outage, no repeated alert.
    let (mailer, outbox) = recording_mailer();
    let store = store_on(repository.clone()).await;
    let observer = observer(pool_with_pair(NodeType::Output, both_down(NodeType::Output)), Arc::new(mailer));
    store.register(Arc::clone(&observer)).await.unwrap();

    let rehydrated = observer.latest().unwrap();
    assert!(rehydrated.nodes[&NodeType::Output].mails.both_nodes_down);

    observer.fetch().await.unwrap();
    assert!(outbox.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_registration_rejected() {
    let store = store_on(Arc::new(MemorySnapshotRepository::new())).await;
    let first = observer(pool_with_pair(NodeType::Dex, Vec::new()), Arc::new(MockMailer::new()));
    let second = observer(pool_with_pair(NodeType::Dex, Vec::new()), Arc::new(MockMailer::new()));

    store.register(first).await.unwrap();
    let result = store.register(second).await;

    assert!(matches!(result, Err(MonitoringError::DuplicateRegistration { .. })));
}

#[tokio::test]
async fn test_node_health_rejects_webhooks() {
    let store = store_on(Arc::new(MemorySnapshotRepository::new())).await;
    let observer = observer(pool_with_pair(NodeType::Dex, Vec::new()), Arc::new(MockMailer::new()));
    store.register(observer).await.unwrap();

    let result = store.on_webhook(SUBSYSTEM, METRIC, json!({})).await;
    assert!(matches!(result, Err(MonitoringError::NotImplemented { .. })));

    let missing = store.on_webhook("node", "latency", json!({})).await;
    assert!(matches!(missing, Err(MonitoringError::ObserverNotFound { .. })));
}

#[tokio::test]
async fn test_unchanged_tree_is_written_once() {
    let mut repo = MockRepo::new();
    repo.expect_load_latest().returning(|| Ok(None));
    repo.expect_save().times(1).returning(|_| Ok(()));

    let store = store_on(Arc::new(repo)).await;
    let observer = observer(pool_with_pair(NodeType::Dex, Vec::new()), Arc::new(MockMailer::new()));
    store.register(Arc::clone(&observer)).await.unwrap();

    let health = observer.fetch().await.unwrap();
    store.drain().await;
    assert!(store.flush().await.unwrap());

    observer.publish(health);
    store.drain().await;
    assert!(!store.flush().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_flushes_pending_state() {
    let repository = Arc::new(MemorySnapshotRepository::new());
    let store = StateStore::load(
        repository.clone(),
        Arc::new(MockMailer::new()),
        StoreConfig {
            debounce: Duration::from_secs(60),
        },
    )
    .await;
    let observer = observer(pool_with_pair(NodeType::Dex, Vec::new()), Arc::new(MockMailer::new()));
    store.register(Arc::clone(&observer)).await.unwrap();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let persister = store.spawn_persister(shutdown_rx);

    observer.fetch().await.unwrap();
    store.drain().await;
    assert_eq!(repository.saves(), 0);

    shutdown_tx.send(()).unwrap();
    persister.await.unwrap();
    assert_eq!(repository.saves(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_right_after_tick_persists_it() {
    let repository = Arc::new(MemorySnapshotRepository::new());
    let store = StateStore::load(
        repository.clone(),
        Arc::new(MockMailer::new()),
        StoreConfig {
            debounce: Duration::from_secs(60),
        },
    )
    .await;
    let observer = observer(pool_with_pair(NodeType::Output, both_down(NodeType::Output)), Arc::new(recording_mailer().0));
    store.register(Arc::clone(&observer)).await.unwrap();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let persister = store.spawn_persister(shutdown_rx);

    // Shut down without yielding to the store after the tick.
    observer.fetch().await.unwrap();
    shutdown_tx.send(()).unwrap();
    persister.await.unwrap();

    let record = repository.record().await.expect("final flush wrote a record");
    let saved: serde_json::Value = serde_json::from_str(&record.data).unwrap();
    assert_eq!(saved[SUBSYSTEM][METRIC]["data"]["nodes"]["out"]["mails"]["bothNodesDown"], json!(true));
}
