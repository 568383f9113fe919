//! Node pool domain types.
//!
//! Each logical node role is served by a redundant pair of RPC
//! clients: one ACTIVE, one PASSIVE standby. These types describe
//! what the health observer learned about each pair and which
//! alerts it already raised.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Logical blockchain node role.
///
/// Declaration order is the fixed evaluation order of a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeType {
    #[serde(rename = "inp")]
    Input,
    #[serde(rename = "dex")]
    Dex,
    #[serde(rename = "out")]
    Output,
    #[serde(rename = "ref")]
    Reference,
    #[serde(rename = "int")]
    Internal,
}

impl NodeType {
    /// Every node role in evaluation order.
    pub const ALL: [Self; 5] = [
        Self::Input,
        Self::Dex,
        Self::Output,
        Self::Reference,
        Self::Internal,
    ];

    /// Short identifier used in config, logs and alert text.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Input => "inp",
            Self::Dex => "dex",
            Self::Output => "out",
            Self::Reference => "ref",
            Self::Internal => "int",
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ACTIVE (serving) or PASSIVE (standby) slot of a node pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeMode {
    Active,
    Passive,
}

impl NodeMode {
    pub const ALL: [Self; 2] = [Self::Active, Self::Passive];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Passive => "passive",
        }
    }
}

impl std::fmt::Display for NodeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Passive => write!(f, "Passive"),
        }
    }
}

/// A failed probe reported by the node pool.
///
/// `mode` is `None` for pair-level findings, e.g. the two clients
/// drifting out of sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeError {
    pub node_type: NodeType,
    pub mode: Option<NodeMode>,
    pub message: String,
}

impl NodeError {
    pub fn new(node_type: NodeType, mode: Option<NodeMode>, message: impl Into<String>) -> Self {
        Self {
            node_type,
            mode,
            message: message.into(),
        }
    }
}

/// Health of one client slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeHealth {
    pub configured: bool,
    pub available: bool,
    pub errors: Vec<NodeError>,
}

impl NodeHealth {
    pub const fn up() -> Self {
        Self {
            configured: true,
            available: true,
            errors: Vec::new(),
        }
    }

    pub fn down(error: NodeError) -> Self {
        Self {
            configured: true,
            available: false,
            errors: vec![error],
        }
    }

    /// Healthy if configured, otherwise reported as absent.
    pub const fn standby(configured: bool) -> Self {
        Self {
            configured,
            available: configured,
            errors: Vec::new(),
        }
    }

    pub const fn unavailable(configured: bool) -> Self {
        Self {
            configured,
            available: false,
            errors: Vec::new(),
        }
    }
}

/// "Already alerted" latches, one per failure condition.
///
/// A latch is set when its alert is queued and cleared only once
/// the node pair is healthy again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MailFlags {
    pub both_nodes_down: bool,
    pub active_down_passive_not_configured: bool,
    pub passive_down_active_not_configured: bool,
    pub passive_down_active_remains_up: bool,
}

impl MailFlags {
    pub const fn any(&self) -> bool {
        self.both_nodes_down
            || self.active_down_passive_not_configured
            || self.passive_down_active_not_configured
            || self.passive_down_active_remains_up
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Health of both slots of a pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairHealth {
    pub active: NodeHealth,
    pub passive: NodeHealth,
}

impl PairHealth {
    pub fn get(&self, mode: NodeMode) -> &NodeHealth {
        match mode {
            NodeMode::Active => &self.active,
            NodeMode::Passive => &self.passive,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePairHealth {
    pub mails: MailFlags,
    pub health: PairHealth,
}

/// Payload of the `node/health` metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodesHealth {
    pub all_nodes_healthy: bool,
    /// Created lazily the first time a node type is evaluated.
    #[serde(default)]
    pub nodes: BTreeMap<NodeType, NodePairHealth>,
}

impl Default for NodesHealth {
    fn default() -> Self {
        Self {
            all_nodes_healthy: true,
            nodes: BTreeMap::new(),
        }
    }
}

impl NodesHealth {
    pub fn pair(&self, node_type: NodeType) -> Option<&NodePairHealth> {
        self.nodes.get(&node_type)
    }
}
