//! Storage traits for aggregate stats, window commits and pass leases.
//!
//! Backends live in `dripboard-storage` (memory, SQLite).

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::aggregator::{AccountDelta, ScoreWeights};
use crate::checkpoint::CheckpointStore;
use crate::error::SyncError;
use crate::types::{AccountStats, Window};

/// Everything one pass writes, applied as a single unit.
#[derive(Debug, Clone)]
pub struct WindowCommit {
    pub network: String,
    pub window: Window,
    pub deltas: BTreeMap<String, AccountDelta>,
    pub weights: ScoreWeights,
}

impl WindowCommit {
    /// Checkpoint the store must still hold for the commit to apply.
    pub fn expected_checkpoint(&self) -> u64 {
        self.window.expected_checkpoint()
    }
}

/// Aggregate stats storage plus the read queries used for ranking.
#[async_trait]
pub trait StatsStore: Send + Sync {
    /// Merge all deltas and advance the network's checkpoint to
    /// `window.to_block`, atomically.
    ///
    /// Fails with [`SyncError::CheckpointConflict`] and writes nothing if the
    /// stored checkpoint is not [`WindowCommit::expected_checkpoint`].
    async fn commit_window(&self, commit: WindowCommit) -> Result<(), SyncError>;

    /// Read one account's row. Never creates a row.
    async fn get_account(&self, address: &str) -> Result<Option<AccountStats>, SyncError>;

    /// Rows ordered by score descending, then address ascending.
    async fn top_by_score(&self, limit: usize) -> Result<Vec<AccountStats>, SyncError>;

    /// Number of rows whose score is strictly greater than `score`.
    async fn count_score_above(&self, score: u64) -> Result<u64, SyncError>;

    /// Total number of rows.
    async fn account_count(&self) -> Result<u64, SyncError>;

    /// Delete every row (administrative reset). Returns the number deleted.
    async fn clear_accounts(&self) -> Result<u64, SyncError>;
}

/// A time-limited claim on a network's synchronization pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub network: String,
    pub holder: String,
    /// Unix timestamp after which the lease may be taken over.
    pub expires_at: i64,
}

/// Result of a lease attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseOutcome {
    Acquired(Lease),
    /// Someone else holds an unexpired lease.
    Held(Lease),
}

/// Per-network mutual exclusion between passes.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Take the lease if it is free, expired, or already ours.
    async fn try_acquire_lease(
        &self,
        network: &str,
        holder: &str,
        ttl_secs: u64,
    ) -> Result<LeaseOutcome, SyncError>;

    /// Release the lease if `holder` still owns it.
    async fn release_lease(&self, network: &str, holder: &str) -> Result<(), SyncError>;
}

/// The full durable-store collaborator of the synchronization engine.
pub trait LeaderboardStore: CheckpointStore + StatsStore + LeaseStore {}

impl<T: CheckpointStore + StatsStore + LeaseStore + ?Sized> LeaderboardStore for T {}
