//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    name = %config.monitor.name,
    nodes = config.nodes.len(),
    interval_secs = config.node_health.interval_seconds,
    persistence = config.persistence.enabled,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig = toml::from_str(content)
    .with_context(|| "Failed to parse config.toml")?;

  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - Non-zero intervals and timeouts
/// - At most one entry per node type, each with at least one URL
/// - A probe timeout that fits inside the tick interval
/// - Endpoint retries that fit inside the endpoint timeout, which in
///   turn stays below the whole-pool probe timeout
fn validate_config(config: &AppConfig) -> Result<()> {
  anyhow::ensure!(
    !config.monitor.name.is_empty(),
    "monitor.name must not be empty"
  );

  // Node health validation
  let health = &config.node_health;
  anyhow::ensure!(
    health.interval_seconds > 0,
    "node_health.interval_seconds must be positive"
  );
  anyhow::ensure!(
    health.probe_timeout_seconds > 0
      && health.swap_timeout_seconds > 0
      && health.notify_timeout_seconds > 0,
    "node_health timeouts must be positive"
  );
  anyhow::ensure!(
    health.probe_timeout_seconds <= health.interval_seconds,
    "node_health.probe_timeout_seconds ({}) must not exceed interval_seconds ({})",
    health.probe_timeout_seconds,
    health.interval_seconds
  );
  anyhow::ensure!(
    health.probe_attempts > 0,
    "node_health.probe_attempts must be at least 1"
  );
  anyhow::ensure!(
    health.endpoint_timeout_seconds > 0 && health.request_timeout_seconds > 0,
    "node_health endpoint and request timeouts must be positive"
  );
  anyhow::ensure!(
    health.retry_budget() <= Duration::from_secs(health.endpoint_timeout_seconds),
    "node_health retries take up to {}ms (request_timeout_seconds x probe_attempts + retry delays), \
     more than endpoint_timeout_seconds ({})",
    health.retry_budget().as_millis(),
    health.endpoint_timeout_seconds
  );
  anyhow::ensure!(
    health.endpoint_timeout_seconds < health.probe_timeout_seconds,
    "node_health.endpoint_timeout_seconds ({}) must be below probe_timeout_seconds ({})",
    health.endpoint_timeout_seconds,
    health.probe_timeout_seconds
  );

  // Node pool validation
  let mut seen = HashSet::new();
  for (i, node) in config.nodes.iter().enumerate() {
    anyhow::ensure!(
      seen.insert(node.node_type),
      "Node {} ({}) is configured more than once",
      i,
      node.node_type
    );
    let has_url = [&node.active_url, &node.passive_url]
      .into_iter()
      .any(|url| url.as_deref().is_some_and(|url| !url.is_empty()));
    anyhow::ensure!(
      has_url,
      "Node {} ({}) needs an active_url or a passive_url",
      i,
      node.node_type
    );
  }

  // Persistence validation
  anyhow::ensure!(
    !config.persistence.enabled || !config.persistence.data_dir.is_empty(),
    "persistence.data_dir must not be empty when persistence is enabled"
  );

  Ok(())
}
