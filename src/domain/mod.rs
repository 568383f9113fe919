//! Domain layer - Core monitoring models and failover rules.
//!
//! Pure types and decisions for the node-health monitor. Nothing in
//! here performs I/O; the usecases layer feeds it probe results and
//! carries out the pool actions it asks for.

pub mod failover;
pub mod node;
pub mod snapshot;

// Re-export core types for convenience
pub use failover::{Alert, AlertLevel, Latch, Outcome, PairProbe, Verdict};
pub use node::{
    MailFlags, NodeError, NodeHealth, NodeMode, NodePairHealth, NodeType, NodesHealth,
    PairHealth,
};
pub use snapshot::{MetricName, Snapshot, SubsystemName, SubsystemState, SystemState};
