//! Checkpoint store: the persisted cursor of each network's event stream.
//!
//! A checkpoint stores the last fully processed block (inclusive). The next
//! pass resumes at `block_number + 1`. Only the synchronization pass moves it:
//! forward through [`StatsStore::commit_window`](crate::store::StatsStore::commit_window),
//! or through an explicit [`CheckpointStore::pin_checkpoint`] on first run and on reset.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// A persisted checkpoint for one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Network slug (e.g. `"mainnet"`).
    pub network: String,
    /// Last processed block number (inclusive).
    pub block_number: u64,
    /// Unix timestamp of when this checkpoint was written.
    pub updated_at: i64,
}

impl Checkpoint {
    pub fn new(network: impl Into<String>, block_number: u64) -> Self {
        Self {
            network: network.into(),
            block_number,
            updated_at: chrono::Utc::now().timestamp(),
        }
    }

    /// The first block the next pass should scan.
    pub fn next_block(&self) -> u64 {
        self.block_number + 1
    }
}

/// Trait for storing and loading checkpoints.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the checkpoint for a network (`None` = never synced).
    async fn load_checkpoint(&self, network: &str) -> Result<Option<Checkpoint>, SyncError>;

    /// Unconditionally set (upsert) the checkpoint. Used for the first-run and
    /// reset pins; both are safe to repeat.
    async fn pin_checkpoint(&self, network: &str, block_number: u64) -> Result<(), SyncError>;

    /// Delete a network's checkpoint (administrative reset).
    async fn delete_checkpoint(&self, network: &str) -> Result<(), SyncError>;
}
