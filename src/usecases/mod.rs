//! Use Cases Layer - Application Business Logic
//!
//! Orchestrates domain logic with port interfaces to implement the
//! monitor's workflows.
//!
//! Use cases:
//! - `MetricObserver`: Producers of typed metric snapshots
//! - `StateStore`: Registry, queryable state tree, debounced persistence
//! - `NodeHealthObserver`: Node probing, failover and alert mail
//! - `spawn_poller`: Periodic refresh of pull-based observers

pub mod node_health;
pub mod observer;
pub mod scheduler;
pub mod state_store;
