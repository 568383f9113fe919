//! Node Pool Port - Redundant Node Client Interface
//!
//! The pool owns one ACTIVE and one optional PASSIVE client per node
//! type and knows which of them currently serves traffic. The
//! monitor only probes it and asks it to swap.

use async_trait::async_trait;

use crate::domain::node::{NodeError, NodeMode, NodeType};

/// Trait for the node client pool.
#[async_trait]
pub trait NodePool: Send + Sync + 'static {
  /// Probe every configured client and return the failures found.
  ///
  /// Healthy clients produce no entry. Pair-level findings (e.g. the
  /// two clients out of sync) carry no mode.
  async fn check_nodes(&self) -> anyhow::Result<Vec<NodeError>>;

  /// Mode of the client currently serving `node_type`, if any.
  fn connected_node(&self, node_type: NodeType) -> Option<NodeMode>;

  /// Whether a client exists in the pool for this slot.
  fn is_configured(&self, node_type: NodeType, mode: NodeMode) -> bool;

  /// Route `node_type` traffic to the `mode` client.
  ///
  /// Fails when that client is not available in the pool.
  async fn swap_node(&self, node_type: NodeType, mode: NodeMode) -> anyhow::Result<()>;
}
