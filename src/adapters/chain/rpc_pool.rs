//! JSON-RPC Node Pool - Redundant Node Clients per Node Type
//!
//! Holds one ACTIVE and an optional PASSIVE RPC endpoint per node
//! type and tracks which of them serves traffic. Probing calls
//! `getblockchaininfo` on every configured endpoint concurrently.
//!
//! A probe reports an error when:
//! - the endpoint cannot be reached after all retries, or its retries
//!   outlast the endpoint timeout (only that slot fails)
//! - its block height trails its header height by more than the lag
//! - (pair level) ACTIVE and PASSIVE header heights drift apart by
//!   more than the lag

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, instrument, warn};

use crate::config::NodeEndpointConfig;
use crate::domain::node::{NodeError, NodeMode, NodeType};
use crate::ports::node_pool::NodePool;

/// Probe settings of the pool.
#[derive(Debug, Clone)]
pub struct NodePoolConfig {
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Budget for all attempts against one endpoint.
    pub endpoint_timeout: Duration,
    /// Attempts per probe before the endpoint counts as down.
    pub probe_attempts: u32,
    /// Delay between probe attempts.
    pub retry_delay: Duration,
    /// Tolerated block/header distance.
    pub max_header_lag: u64,
}

impl Default for NodePoolConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            endpoint_timeout: Duration::from_secs(25),
            probe_attempts: 4,
            retry_delay: Duration::from_secs(1),
            max_header_lag: 10,
        }
    }
}

/// Subset of `getblockchaininfo` the monitor needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BlockchainInfo {
    pub blocks: u64,
    pub headers: u64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<Value>,
}

#[derive(Debug, Default, Clone)]
struct PairEndpoints {
    active: Option<String>,
    passive: Option<String>,
}

impl PairEndpoints {
    fn get(&self, mode: NodeMode) -> Option<&str> {
        match mode {
            NodeMode::Active => self.active.as_deref(),
            NodeMode::Passive => self.passive.as_deref(),
        }
    }
}

/// Node pool backed by JSON-RPC endpoints.
pub struct JsonRpcNodePool {
    http: Client,
    endpoints: HashMap<NodeType, PairEndpoints>,
    connected: RwLock<HashMap<NodeType, NodeMode>>,
    config: NodePoolConfig,
}

impl JsonRpcNodePool {
    /// Build the pool; each node type starts on its ACTIVE client,
    /// or PASSIVE when no ACTIVE one is configured.
    pub fn new(nodes: &[NodeEndpointConfig], config: NodePoolConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let mut endpoints: HashMap<NodeType, PairEndpoints> = HashMap::new();
        for node in nodes {
            let pair = endpoints.entry(node.node_type).or_default();
            pair.active = node.active_url.clone().filter(|url| !url.is_empty());
            pair.passive = node.passive_url.clone().filter(|url| !url.is_empty());
        }

        let connected = endpoints
            .iter()
            .filter_map(|(node_type, pair)| {
                let mode = if pair.active.is_some() {
                    NodeMode::Active
                } else {
                    pair.passive.as_ref().map(|_| NodeMode::Passive)?
                };
                Some((*node_type, mode))
            })
            .collect();

        info!(node_types = endpoints.len(), "Node pool created");

        Ok(Self {
            http,
            endpoints,
            connected: RwLock::new(connected),
            config,
        })
    }

    async fn blockchain_info(&self, url: &str) -> Result<BlockchainInfo> {
        let body = json!({
            "jsonrpc": "1.0",
            "id": "node-monitor",
            "method": "getblockchaininfo",
            "params": [],
        });

        let response: RpcResponse<BlockchainInfo> = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .context("RPC request failed")?
            .error_for_status()
            .context("RPC endpoint returned error status")?
            .json()
            .await
            .context("Failed to parse RPC response")?;

        if let Some(error) = response.error.filter(|e| !e.is_null()) {
            anyhow::bail!("RPC error: {error}");
        }
        response.result.context("RPC response without result")
    }

    async fn probe_with_retry(&self, url: &str) -> Result<BlockchainInfo> {
        let mut last_error = None;

        for attempt in 0..self.config.probe_attempts.max(1) {
            if attempt > 0 {
                sleep(self.config.retry_delay).await;
            }
            match self.blockchain_info(url).await {
                Ok(info) => return Ok(info),
                Err(e) => {
                    debug!(url, attempt, error = %e, "Node probe attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Node probe not attempted")))
    }

    /// Probe one slot; unconfigured slots report nothing.
    async fn check_node(&self, node_type: NodeType, mode: NodeMode) -> (Vec<NodeError>, Option<BlockchainInfo>) {
        let Some(url) = self.endpoints.get(&node_type).and_then(|pair| pair.get(mode)) else {
            return (Vec::new(), None);
        };

        let limit = self.config.endpoint_timeout;
        let probed = timeout(limit, self.probe_with_retry(url))
            .await
            .unwrap_or_else(|_| Err(anyhow::anyhow!("timed out after {}ms", limit.as_millis())));

        match probed {
            Ok(info) => (node_lag_errors(node_type, mode, info, self.config.max_header_lag), Some(info)),
            Err(e) => {
                warn!(node_type = %node_type, mode = %mode, error = %e, "Node probe failed");
                let error = NodeError::new(node_type, Some(mode), format!("Failed to get {node_type} {mode} node infos: {e}"));
                (vec![error], None)
            }
        }
    }

    async fn check_pair(&self, node_type: NodeType) -> Vec<NodeError> {
        let ((mut errors, active), (passive_errors, passive)) = tokio::join!(
            self.check_node(node_type, NodeMode::Active),
            self.check_node(node_type, NodeMode::Passive),
        );
        errors.extend(passive_errors);

        if let (Some(active), Some(passive)) = (active, passive) {
            errors.extend(pair_sync_error(node_type, active, passive, self.config.max_header_lag));
        }

        errors
    }
}

fn node_lag_errors(node_type: NodeType, mode: NodeMode, info: BlockchainInfo, max_lag: u64) -> Vec<NodeError> {
    if info.blocks.saturating_add(max_lag) < info.headers {
        vec![NodeError::new(
            node_type,
            Some(mode),
            format!(
                "{node_type} {mode} node out of sync (blocks: {}, headers: {})",
                info.blocks, info.headers
            ),
        )]
    } else {
        Vec::new()
    }
}

fn pair_sync_error(
    node_type: NodeType,
    active: BlockchainInfo,
    passive: BlockchainInfo,
    max_lag: u64,
) -> Option<NodeError> {
    (active.headers.abs_diff(passive.headers) > max_lag).then(|| {
        NodeError::new(
            node_type,
            None,
            format!(
                "{node_type} nodes not in sync (active headers: {}, passive headers: {})",
                active.headers, passive.headers
            ),
        )
    })
}

#[async_trait]
impl NodePool for JsonRpcNodePool {
    #[instrument(skip(self))]
    async fn check_nodes(&self) -> Result<Vec<NodeError>> {
        let checks = NodeType::ALL
            .iter()
            .filter(|node_type| self.endpoints.contains_key(node_type))
            .map(|node_type| self.check_pair(*node_type));

        Ok(join_all(checks).await.into_iter().flatten().collect())
    }

    fn connected_node(&self, node_type: NodeType) -> Option<NodeMode> {
        self.connected
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&node_type)
            .copied()
    }

    fn is_configured(&self, node_type: NodeType, mode: NodeMode) -> bool {
        self.endpoints
            .get(&node_type)
            .is_some_and(|pair| pair.get(mode).is_some())
    }

    async fn swap_node(&self, node_type: NodeType, mode: NodeMode) -> Result<()> {
        anyhow::ensure!(
            self.is_configured(node_type, mode),
            "Tried to swap node {node_type} to {mode}, but the client is not available in the pool"
        );

        self.connected
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(node_type, mode);

        info!(node_type = %node_type, mode = %mode, "Swapped node");
        Ok(())
    }
}
