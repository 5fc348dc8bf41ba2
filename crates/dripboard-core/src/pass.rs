//! Request and result types of a synchronization pass.

use serde::{Deserialize, Serialize};

use crate::planner::PlanStart;

/// What the trigger (CLI, scheduler, HTTP handler) asks for.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncRequest {
    pub network: String,
    /// Start height. Applied on reset, or on a first run.
    #[serde(default)]
    pub from_block: Option<u64>,
    #[serde(default)]
    pub reset: bool,
}

impl SyncRequest {
    pub fn network(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            ..Default::default()
        }
    }

    /// Rewind to `from_block` (or genesis / block 0 when `None`).
    pub fn reset(mut self, from_block: Option<u64>) -> Self {
        self.reset = true;
        self.from_block = from_block;
        self
    }

    pub fn from_block(mut self, block: u64) -> Self {
        self.from_block = Some(block);
        self
    }
}

/// A source address whose log fetch failed during the pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFailure {
    pub address: String,
    pub error: String,
}

/// Counts reported after a completed pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub network: String,
    pub contract_addresses: Vec<String>,
    pub start: PlanStart,
    pub from_block: u64,
    pub to_block: u64,
    /// Logs returned by all sources, before de-duplication.
    pub raw_log_count: usize,
    pub events_created: u64,
    pub events_withdrawn: u64,
    /// Logs of other events, plus removed logs and repeats of a log
    /// already seen in this pass.
    pub skipped: usize,
    /// Logs whose topic matched but whose payload did not decode.
    pub decode_errors: usize,
    pub accounts_updated: usize,
    /// Sources that could not be fetched. Their events in this window are
    /// not retried unless the caller resets.
    pub fetch_failures: Vec<FetchFailure>,
}

impl SyncSummary {
    pub fn is_partial(&self) -> bool {
        !self.fetch_failures.is_empty()
    }
}

/// The result of one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    Synced(SyncSummary),
    /// The checkpoint is already at (or past) the chain head.
    NothingToDo { network: String, from_block: u64, head: u64 },
}

impl SyncOutcome {
    pub fn summary(&self) -> Option<&SyncSummary> {
        match self {
            Self::Synced(s) => Some(s),
            Self::NothingToDo { .. } => None,
        }
    }
}
