//! Repository Port - Monitoring State Persistence Interface
//!
//! The whole monitoring tree is stored as one JSON document in a
//! single logical slot. Saving upserts that slot; nothing is appended.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version of the persisted tree layout.
///
/// Bump when a metric payload changes shape incompatibly; records with
/// another version are discarded at load instead of misread.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Id of the single logical snapshot slot.
pub const SNAPSHOT_SLOT_ID: u64 = 1;

/// Persisted form of the monitoring state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
  /// Slot identifier.
  pub id: u64,
  /// Layout version of `data`.
  #[serde(default)]
  pub version: u32,
  /// The serialized `SystemState` tree.
  pub data: String,
  /// When the record was written.
  pub timestamp: DateTime<Utc>,
}

impl SnapshotRecord {
  /// Build a record for the current slot and schema version.
  pub fn current(data: String) -> Self {
    Self {
      id: SNAPSHOT_SLOT_ID,
      version: SNAPSHOT_SCHEMA_VERSION,
      data,
      timestamp: Utc::now(),
    }
  }
}

/// Trait for snapshot storage providers.
#[async_trait]
pub trait SnapshotRepository: Send + Sync + 'static {
  /// Load the most recent record, `None` on first run.
  async fn load_latest(&self) -> anyhow::Result<Option<SnapshotRecord>>;

  /// Upsert the record into its slot.
  async fn save(&self, record: &SnapshotRecord) -> anyhow::Result<()>;

  /// Check if the storage is reachable and writable.
  async fn is_healthy(&self) -> bool;
}
