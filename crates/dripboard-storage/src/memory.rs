//! In-memory storage backend.
//!
//! Stores checkpoints, account stats and leases in RAM behind one mutex, so a
//! window commit is trivially atomic. Useful for tests and one-shot runs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use dripboard_core::checkpoint::{Checkpoint, CheckpointStore};
use dripboard_core::error::SyncError;
use dripboard_core::store::{Lease, LeaseOutcome, LeaseStore, StatsStore, WindowCommit};
use dripboard_core::types::AccountStats;

#[derive(Default)]
struct State {
    checkpoints: HashMap<String, Checkpoint>,
    accounts: HashMap<String, AccountStats>,
    leases: HashMap<String, Lease>,
}

/// In-memory leaderboard storage.
///
/// All data is lost when the process exits.
#[derive(Default)]
pub struct InMemoryStorage {
    state: Mutex<State>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, SyncError> {
        self.state
            .lock()
            .map_err(|_| SyncError::Storage("memory store mutex poisoned".into()))
    }
}

#[async_trait]
impl CheckpointStore for InMemoryStorage {
    async fn load_checkpoint(&self, network: &str) -> Result<Option<Checkpoint>, SyncError> {
        Ok(self.state()?.checkpoints.get(network).cloned())
    }

    async fn pin_checkpoint(&self, network: &str, block_number: u64) -> Result<(), SyncError> {
        self.state()?
            .checkpoints
            .insert(network.to_string(), Checkpoint::new(network, block_number));
        Ok(())
    }

    async fn delete_checkpoint(&self, network: &str) -> Result<(), SyncError> {
        self.state()?.checkpoints.remove(network);
        Ok(())
    }
}

#[async_trait]
impl StatsStore for InMemoryStorage {
    async fn commit_window(&self, commit: WindowCommit) -> Result<(), SyncError> {
        let mut state = self.state()?;
        let expected = commit.expected_checkpoint();
        let actual = state.checkpoints.get(&commit.network).map(|c| c.block_number);
        if actual != Some(expected) {
            return Err(SyncError::CheckpointConflict {
                network: commit.network,
                expected: Some(expected),
                actual,
            });
        }

        // Stage every row first so a failed merge leaves the state untouched.
        let now = chrono::Utc::now().timestamp();
        let mut staged = Vec::with_capacity(commit.deltas.len());
        for (address, delta) in &commit.deltas {
            let mut row = state
                .accounts
                .get(address)
                .cloned()
                .unwrap_or_else(|| AccountStats::empty(address.clone()));
            row.apply_delta(delta, &commit.weights, now)?;
            staged.push(row);
        }

        for row in staged {
            state.accounts.insert(row.address.clone(), row);
        }
        state.checkpoints.insert(
            commit.network.clone(),
            Checkpoint::new(&commit.network, commit.window.to_block),
        );
        Ok(())
    }

    async fn get_account(&self, address: &str) -> Result<Option<AccountStats>, SyncError> {
        Ok(self.state()?.accounts.get(address).cloned())
    }

    async fn top_by_score(&self, limit: usize) -> Result<Vec<AccountStats>, SyncError> {
        let mut rows: Vec<AccountStats> = self.state()?.accounts.values().cloned().collect();
        rows.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.address.cmp(&b.address)));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn count_score_above(&self, score: u64) -> Result<u64, SyncError> {
        Ok(self
            .state()?
            .accounts
            .values()
            .filter(|a| a.score > score)
            .count() as u64)
    }

    async fn account_count(&self) -> Result<u64, SyncError> {
        Ok(self.state()?.accounts.len() as u64)
    }

    async fn clear_accounts(&self) -> Result<u64, SyncError> {
        let mut state = self.state()?;
        let n = state.accounts.len() as u64;
        state.accounts.clear();
        Ok(n)
    }
}

#[async_trait]
impl LeaseStore for InMemoryStorage {
    async fn try_acquire_lease(
        &self,
        network: &str,
        holder: &str,
        ttl_secs: u64,
    ) -> Result<LeaseOutcome, SyncError> {
        let now = chrono::Utc::now().timestamp();
        let mut state = self.state()?;
        if let Some(current) = state.leases.get(network) {
            if current.holder != holder && current.expires_at > now {
                return Ok(LeaseOutcome::Held(current.clone()));
            }
        }
        let lease = Lease {
            network: network.to_string(),
            holder: holder.to_string(),
            expires_at: now.saturating_add(ttl_secs as i64),
        };
        state.leases.insert(network.to_string(), lease.clone());
        Ok(LeaseOutcome::Acquired(lease))
    }

    async fn release_lease(&self, network: &str, holder: &str) -> Result<(), SyncError> {
        let mut state = self.state()?;
        if state.leases.get(network).is_some_and(|l| l.holder == holder) {
            state.leases.remove(network);
        }
        Ok(())
    }
}
