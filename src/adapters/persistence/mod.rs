//! Persistence Adapters - Snapshot Storage
//!
//! Implements the `SnapshotRepository` port. The monitoring tree is a
//! single small document, so an atomic JSON file is all the storage
//! it needs. No database dependency.

pub mod memory;
pub mod state;

pub use memory::MemorySnapshotRepository;
pub use state::FileSnapshotRepository;
