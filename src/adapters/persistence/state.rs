//! File Snapshot Repository - Atomic JSON Monitoring State
//!
//! Keeps the single snapshot slot in `monitoring_state.json` using
//! atomic writes (write to tmp file, then rename). This guarantees
//! crash safety and prevents partial writes from corrupting state.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tracing::{info, instrument};

use crate::ports::repository::{SnapshotRecord, SnapshotRepository};

const STATE_FILE: &str = "monitoring_state.json";

/// Atomic JSON snapshot store.
///
/// The record is written to a temporary file first, then atomically
/// renamed over the state file. The file is always either the old
/// or the new record, never a partial write.
pub struct FileSnapshotRepository {
    /// Path to the state file.
    state_path: PathBuf,
    /// Temporary path for atomic writes.
    tmp_path: PathBuf,
}

impl FileSnapshotRepository {
    /// Create a repository in the given data directory.
    ///
    /// Creates the directory if it doesn't exist.
    pub async fn new(data_dir: &str) -> Result<Self> {
        let dir = Path::new(data_dir);
        fs::create_dir_all(dir)
            .await
            .context("Failed to create data directory")?;

        Ok(Self {
            state_path: dir.join(STATE_FILE),
            tmp_path: dir.join(format!("{STATE_FILE}.tmp")),
        })
    }
}

#[async_trait]
impl SnapshotRepository for FileSnapshotRepository {
    /// Returns `None` if no state file exists (first startup).
    #[instrument(skip(self))]
    async fn load_latest(&self) -> Result<Option<SnapshotRecord>> {
        if !fs::try_exists(&self.state_path).await.unwrap_or(false) {
            info!("No state file found, starting fresh");
            return Ok(None);
        }

        let json = fs::read_to_string(&self.state_path)
            .await
            .context("Failed to read state file")?;

        let record: SnapshotRecord =
            serde_json::from_str(&json).context("Failed to parse state file")?;

        info!(
            version = record.version,
            saved_at = %record.timestamp,
            "State snapshot loaded"
        );

        Ok(Some(record))
    }

    #[instrument(skip(self, record))]
    async fn save(&self, record: &SnapshotRecord) -> Result<()> {
        let json = serde_json::to_string_pretty(record)
            .context("Failed to serialize snapshot record")?;

        fs::write(&self.tmp_path, &json)
            .await
            .context("Failed to write tmp state file")?;

        fs::rename(&self.tmp_path, &self.state_path)
            .await
            .context("Failed to rename state file")?;

        info!(
            path = %self.state_path.display(),
            bytes = json.len(),
            "State snapshot saved"
        );

        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        match self.state_path.parent() {
            Some(dir) => fs::metadata(dir).await.is_ok(),
            None => true,
        }
    }
}
