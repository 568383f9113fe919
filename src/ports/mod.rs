//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the monitoring core requires
//! from the surrounding system. Adapters implement these traits.
//!
//! Port categories:
//! - `NodePool`: probing and swapping the redundant node clients
//! - `Notifier`: operator alert mail
//! - `SnapshotRepository`: persistence of the monitoring state tree

pub mod node_pool;
pub mod notifier;
pub mod repository;
