//! In-memory snapshot slot, used when persistence is disabled.

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::ports::repository::{SnapshotRecord, SnapshotRepository};

#[derive(Default)]
pub struct MemorySnapshotRepository {
    slot: Mutex<Option<SnapshotRecord>>,
    saves: AtomicUsize,
}

impl MemorySnapshotRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a record already in the slot.
    pub fn with_record(record: SnapshotRecord) -> Self {
        Self {
            slot: Mutex::new(Some(record)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of successful saves so far.
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub async fn record(&self) -> Option<SnapshotRecord> {
        self.slot.lock().await.clone()
    }
}

#[async_trait]
impl SnapshotRepository for MemorySnapshotRepository {
    async fn load_latest(&self) -> Result<Option<SnapshotRecord>> {
        Ok(self.slot.lock().await.clone())
    }

    async fn save(&self, record: &SnapshotRecord) -> Result<()> {
        *self.slot.lock().await = Some(record.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}
