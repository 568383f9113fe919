//! Node Health Observer - Failover Control Loop
//!
//! On every tick this observer probes the node pool, runs the failover
//! decision table for each node type in a fixed order, performs the
//! swaps the table asks for, sends one batched operator mail and
//! publishes the resulting `NodesHealth`.
//!
//! Ticks never overlap: a `fetch()` issued while the previous one is
//! still running fails with `TickInProgress` and leaves state alone.
//! Every collaborator call runs under its own timeout; a timed-out
//! probe counts as an error on every configured slot and a timed-out
//! swap takes the rule's failure branch.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::metrics::MonitorMetrics;
use crate::domain::failover::{Alert, PairProbe, Verdict, evaluate};
use crate::domain::node::{NodeError, NodeMode, NodeType, NodesHealth};
use crate::error::{MonitoringError, MonitoringResult};
use crate::ports::node_pool::NodePool;
use crate::ports::notifier::Notifier;
use crate::usecases::observer::{MetricChannel, MetricObserver};

pub const SUBSYSTEM: &str = "node";
pub const METRIC: &str = "health";

/// Mail subject when at least one node type changed state.
pub const SUBJECT_ERROR: &str = "Node Error";
/// Mail subject when only the global recovery line is queued.
pub const SUBJECT_RECOVERED: &str = "Node Recovered";

/// Upper bounds for each collaborator call of a tick.
#[derive(Debug, Clone, Copy)]
pub struct HealthTimeouts {
  pub probe: Duration,
  pub swap: Duration,
  pub notify: Duration,
}

impl Default for HealthTimeouts {
  fn default() -> Self {
    Self {
      probe: Duration::from_secs(30),
      swap: Duration::from_secs(10),
      notify: Duration::from_secs(15),
    }
  }
}

/// Observer publishing `NodesHealth` under `node/health`.
pub struct NodeHealthObserver {
  channel: MetricChannel<NodesHealth>,
  pool: Arc<dyn NodePool>,
  notifier: Arc<dyn Notifier>,
  metrics: Arc<MonitorMetrics>,
  timeouts: HealthTimeouts,
  tick_lock: Mutex<()>,
}

impl NodeHealthObserver {
  pub fn new(
    pool: Arc<dyn NodePool>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<MonitorMetrics>,
    timeouts: HealthTimeouts,
  ) -> Self {
    Self {
      channel: MetricChannel::new(SUBSYSTEM, METRIC),
      pool,
      notifier,
      metrics,
      timeouts,
      tick_lock: Mutex::new(()),
    }
  }

  /// Probe the pool; a failure or timeout marks every configured slot.
  async fn probe(&self) -> Vec<NodeError> {
    match with_timeout(self.timeouts.probe, self.pool.check_nodes()).await {
      Ok(errors) => errors,
      Err(e) => {
        error!(error = %e, "Node pool probe failed");
        NodeType::ALL
          .into_iter()
          .flat_map(|node_type| NodeMode::ALL.into_iter().map(move |mode| (node_type, mode)))
          .filter(|(node_type, mode)| self.pool.is_configured(*node_type, *mode))
          .map(|(node_type, mode)| {
            NodeError::new(node_type, Some(mode), format!("Failed to get {node_type} {mode} node infos: {e}"))
          })
          .collect()
      }
    }
  }

  async fn swap(&self, node_type: NodeType, target: NodeMode) -> bool {
    let result = with_timeout(self.timeouts.swap, self.pool.swap_node(node_type, target)).await;
    let swapped = match result {
      Ok(()) => {
        info!(node_type = %node_type, target = %target, "Node swapped");
        true
      }
      Err(e) => {
        warn!(node_type = %node_type, target = %target, error = %e, "Node swap failed");
        false
      }
    };
    self.metrics.record_swap(node_type, target, swapped);
    swapped
  }

  /// Run the decision table for every node type and apply the verdicts.
  async fn tick(&self, previous: &NodesHealth) -> (NodesHealth, Vec<String>) {
    let errors = self.probe().await;
    if !errors.is_empty() {
      let messages: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
      error!(errors = ?messages, "Node errors");
    }

    let mut next = previous.clone();
    let mut alerts: Vec<Alert> = Vec::new();

    for node_type in NodeType::ALL {
      let probe = PairProbe {
        connected: self.pool.connected_node(node_type),
        active_configured: self.pool.is_configured(node_type, NodeMode::Active),
        passive_configured: self.pool.is_configured(node_type, NodeMode::Passive),
        errors: errors.iter().filter(|e| e.node_type == node_type).cloned().collect(),
      };
      let before = previous.pair(node_type).cloned().unwrap_or_default();

      let verdict = evaluate(node_type, &probe, &before);
      let outcome = match verdict {
        Verdict::Settled(outcome) => outcome,
        Verdict::Swap { target, .. } => {
          let swapped = self.swap(node_type, target).await;
          verdict.resolve(swapped)
        }
      };

      if let Some(alert) = outcome.alert {
        self.metrics.record_alert(alert.level);
        alerts.push(alert);
      }
      next.nodes.insert(node_type, outcome.pair);
    }

    let has_type_lines = !alerts.is_empty();
    if !errors.is_empty() {
      next.all_nodes_healthy = false;
    } else if !previous.all_nodes_healthy {
      info!("All nodes recovered from errors");
      let alert = Alert::info("All nodes are up and running again!");
      self.metrics.record_alert(alert.level);
      alerts.push(alert);
      next.all_nodes_healthy = true;
    }

    let mut lines: Vec<String> = alerts.iter().map(ToString::to_string).collect();
    if has_type_lines {
      lines.extend(errors.into_iter().map(|e| e.message));
    }
    let subject = if has_type_lines { SUBJECT_ERROR } else { SUBJECT_RECOVERED };

    if !lines.is_empty() {
      self.send(subject, &lines).await;
    }

    (next, lines)
  }

  async fn send(&self, subject: &str, lines: &[String]) {
    match with_timeout(self.timeouts.notify, self.notifier.send_alert(subject, lines)).await {
      Ok(()) => debug!(subject, lines = lines.len(), "Alert mail sent"),
      Err(e) => {
        self.metrics.notify_failures.inc();
        error!(subject, error = %e, "Failed to send alert mail");
      }
    }
  }
}

#[async_trait]
impl MetricObserver for NodeHealthObserver {
  type Data = NodesHealth;

  fn channel(&self) -> &MetricChannel<NodesHealth> {
    &self.channel
  }

  #[instrument(skip(self), fields(subsystem = SUBSYSTEM, metric = METRIC))]
  async fn fetch(&self) -> MonitoringResult<NodesHealth> {
    let Ok(_guard) = self.tick_lock.try_lock() else {
      self.metrics.ticks_skipped.inc();
      warn!("Previous node health tick still running, skipping");
      return Err(MonitoringError::TickInProgress {
        subsystem: SUBSYSTEM.to_string(),
        metric: METRIC.to_string(),
      });
    };

    let started = Instant::now();
    let previous = self.latest().unwrap_or_default();
    let (health, lines) = self.tick(&previous).await;

    self.metrics.record_health(&health);
    self.metrics.ticks.inc();
    self.metrics.tick_duration.observe(started.elapsed().as_secs_f64());
    debug!(
      all_nodes_healthy = health.all_nodes_healthy,
      mail_lines = lines.len(),
      "Node health tick complete"
    );

    self.publish(health.clone());
    Ok(health)
  }
}

async fn with_timeout<T>(
  limit: Duration,
  call: impl Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
  match timeout(limit, call).await {
    Ok(result) => result,
    Err(_) => anyhow::bail!("timed out after {}ms", limit.as_millis()),
  }
}
