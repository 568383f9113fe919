//! Configuration Module - TOML-based Monitor Configuration
//!
//! Loads and validates configuration from `config.toml` (path
//! overridable via `MONITOR_CONFIG`). Node endpoints, timeouts and
//! alert channels are externalized here; nothing is hardcoded in the
//! domain layer.

pub mod loader;

use std::time::Duration;

use serde::Deserialize;

use crate::adapters::chain::NodePoolConfig;
use crate::adapters::notify::WebhookNotifierConfig;
use crate::domain::node::NodeType;
use crate::usecases::node_health::HealthTimeouts;
use crate::usecases::state_store::StoreConfig;

/// Top-level monitor configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before the monitor begins operation.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Monitor identity and logging.
  pub monitor: MonitorConfig,
  /// Node health tick and probe settings.
  #[serde(default)]
  pub node_health: NodeHealthConfig,
  /// State snapshot persistence.
  #[serde(default)]
  pub persistence: PersistenceConfig,
  /// Operator alert channel.
  #[serde(default)]
  pub notifier: NotifierConfig,
  /// Metrics and health endpoints.
  #[serde(default)]
  pub metrics: MetricsConfig,
  /// Node pairs, one entry per node type.
  #[serde(default)]
  pub nodes: Vec<NodeEndpointConfig>,
}

/// Monitor identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
  /// Human-readable instance name, used in logs.
  pub name: String,
  /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins.
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

/// Node health observer configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeHealthConfig {
  /// Tick interval (seconds).
  #[serde(default = "default_interval")]
  pub interval_seconds: u64,
  /// Upper bound for one full pool probe (seconds).
  #[serde(default = "default_probe_timeout")]
  pub probe_timeout_seconds: u64,
  /// Upper bound for all attempts against one endpoint (seconds).
  /// A hung endpoint only fails its own slot once this runs out.
  #[serde(default = "default_endpoint_timeout")]
  pub endpoint_timeout_seconds: u64,
  /// Upper bound for one swap call (seconds).
  #[serde(default = "default_swap_timeout")]
  pub swap_timeout_seconds: u64,
  /// Upper bound for sending the tick's mail (seconds).
  #[serde(default = "default_notify_timeout")]
  pub notify_timeout_seconds: u64,
  /// Per RPC request timeout (seconds).
  #[serde(default = "default_request_timeout")]
  pub request_timeout_seconds: u64,
  /// Attempts per endpoint probe.
  #[serde(default = "default_probe_attempts")]
  pub probe_attempts: u32,
  /// Delay between probe attempts (milliseconds).
  #[serde(default = "default_retry_delay")]
  pub retry_delay_ms: u64,
  /// Tolerated block/header distance before a node counts as out of sync.
  #[serde(default = "default_max_header_lag")]
  pub max_header_lag: u64,
}

impl Default for NodeHealthConfig {
  fn default() -> Self {
    Self {
      interval_seconds: default_interval(),
      probe_timeout_seconds: default_probe_timeout(),
      endpoint_timeout_seconds: default_endpoint_timeout(),
      swap_timeout_seconds: default_swap_timeout(),
      notify_timeout_seconds: default_notify_timeout(),
      request_timeout_seconds: default_request_timeout(),
      probe_attempts: default_probe_attempts(),
      retry_delay_ms: default_retry_delay(),
      max_header_lag: default_max_header_lag(),
    }
  }
}

impl NodeHealthConfig {
  pub const fn interval(&self) -> Duration {
    Duration::from_secs(self.interval_seconds)
  }

  pub const fn timeouts(&self) -> HealthTimeouts {
    HealthTimeouts {
      probe: Duration::from_secs(self.probe_timeout_seconds),
      swap: Duration::from_secs(self.swap_timeout_seconds),
      notify: Duration::from_secs(self.notify_timeout_seconds),
    }
  }

  /// Worst case for one endpoint: every attempt times out.
  pub const fn retry_budget(&self) -> Duration {
    let requests = Duration::from_secs(self.request_timeout_seconds.saturating_mul(self.probe_attempts as u64));
    let delays = Duration::from_millis(self.retry_delay_ms.saturating_mul(self.probe_attempts.saturating_sub(1) as u64));
    requests.saturating_add(delays)
  }

  pub const fn pool(&self) -> NodePoolConfig {
    NodePoolConfig {
      request_timeout: Duration::from_secs(self.request_timeout_seconds),
      endpoint_timeout: Duration::from_secs(self.endpoint_timeout_seconds),
      probe_attempts: self.probe_attempts,
      retry_delay: Duration::from_millis(self.retry_delay_ms),
      max_header_lag: self.max_header_lag,
    }
  }
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
  /// Write snapshots to disk. Disabled keeps them in memory only.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Directory holding `monitoring_state.json`.
  #[serde(default = "default_data_dir")]
  pub data_dir: String,
  /// Quiet period before a changed tree is written (seconds).
  #[serde(default = "default_debounce")]
  pub debounce_seconds: u64,
}

impl Default for PersistenceConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      data_dir: default_data_dir(),
      debounce_seconds: default_debounce(),
    }
  }
}

impl PersistenceConfig {
  pub const fn store(&self) -> StoreConfig {
    StoreConfig {
      debounce: Duration::from_secs(self.debounce_seconds),
    }
  }
}

/// Alert channel configuration.
///
/// Without a webhook URL alerts only go to the log.
#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
  /// Mail relay endpoint.
  pub webhook_url: Option<String>,
  /// Request timeout in seconds.
  #[serde(default = "default_notifier_timeout")]
  pub timeout_seconds: u64,
  /// Retries after the first failed post.
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
  /// Base backoff delay (milliseconds).
  #[serde(default = "default_retry_base_delay")]
  pub retry_base_delay_ms: u64,
}

impl Default for NotifierConfig {
  fn default() -> Self {
    Self {
      webhook_url: None,
      timeout_seconds: default_notifier_timeout(),
      max_retries: default_max_retries(),
      retry_base_delay_ms: default_retry_base_delay(),
    }
  }
}

impl NotifierConfig {
  /// Webhook settings, if a relay URL is configured.
  pub fn webhook(&self) -> Option<WebhookNotifierConfig> {
    let url = self.webhook_url.as_ref().filter(|url| !url.is_empty())?;
    Some(WebhookNotifierConfig {
      url: url.clone(),
      timeout: Duration::from_secs(self.timeout_seconds),
      max_retries: self.max_retries,
      retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
    })
  }
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
  /// Health check endpoint port.
  #[serde(default = "default_health_port")]
  pub health_port: u16,
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
      health_port: default_health_port(),
    }
  }
}

/// One node pair in the pool.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeEndpointConfig {
  /// Node role (`inp`, `dex`, `out`, `ref`, `int`).
  pub node_type: NodeType,
  /// JSON-RPC URL of the ACTIVE client.
  pub active_url: Option<String>,
  /// JSON-RPC URL of the PASSIVE client.
  pub passive_url: Option<String>,
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_true() -> bool {
  true
}

fn default_interval() -> u64 {
  60
}

fn default_probe_timeout() -> u64 {
  30
}

fn default_endpoint_timeout() -> u64 {
  25
}

fn default_swap_timeout() -> u64 {
  10
}

fn default_notify_timeout() -> u64 {
  15
}

fn default_request_timeout() -> u64 {
  5
}

fn default_notifier_timeout() -> u64 {
  10
}

fn default_probe_attempts() -> u32 {
  4
}

fn default_retry_delay() -> u64 {
  1000
}

fn default_max_header_lag() -> u64 {
  10
}

fn default_data_dir() -> String {
  "data".to_string()
}

fn default_debounce() -> u64 {
  5
}

fn default_max_retries() -> u32 {
  3
}

fn default_retry_base_delay() -> u64 {
  500
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

fn default_health_port() -> u16 {
  8080
}
