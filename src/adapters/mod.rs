//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (JSON-RPC clients, HTTP mail relay, file I/O).
//! Each sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `chain`: JSON-RPC node pool with ACTIVE/PASSIVE clients
//! - `metrics`: Prometheus metrics export and health checks
//! - `notify`: Operator alert channels
//! - `persistence`: Monitoring state snapshots

pub mod chain;
pub mod metrics;
pub mod notify;
pub mod persistence;
