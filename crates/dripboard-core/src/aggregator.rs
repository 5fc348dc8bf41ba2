//! Stat aggregator: folds decoded events into per-account deltas.
//!
//! Counts and amounts are sums, so the result does not depend on the order in
//! which events arrive. A pass folds every event of its window into one
//! [`AccountDelta`] per account; the store then merges all deltas and advances
//! the checkpoint in a single commit.

use std::collections::BTreeMap;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::types::{AccountStats, StreamEvent};

/// Points awarded per counted action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreWeights {
    #[serde(default = "default_stream_created")]
    pub stream_created: u64,
    #[serde(default = "default_withdrawal_claimed")]
    pub withdrawal_claimed: u64,
}

fn default_stream_created() -> u64 {
    10
}

fn default_withdrawal_claimed() -> u64 {
    5
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            stream_created: default_stream_created(),
            withdrawal_claimed: default_withdrawal_claimed(),
        }
    }
}

impl ScoreWeights {
    /// Score is a pure function of the two counters.
    pub fn score(&self, streams_created: u64, withdrawals_claimed: u64) -> u64 {
        streams_created
            .saturating_mul(self.stream_created)
            .saturating_add(withdrawals_claimed.saturating_mul(self.withdrawal_claimed))
    }
}

/// Pending increments for one account within a window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountDelta {
    pub streams_created: u64,
    pub withdrawals_claimed: u64,
    pub deposited: U256,
    pub withdrawn: U256,
}

impl AccountDelta {
    fn add(&mut self, event: &StreamEvent) -> Result<(), SyncError> {
        match event {
            StreamEvent::StreamCreated { sender, deposit } => {
                self.streams_created += 1;
                self.deposited = self.deposited.checked_add(*deposit).ok_or_else(|| {
                    SyncError::AmountOverflow {
                        address: sender.clone(),
                        field: "total_deposited",
                    }
                })?;
            }
            StreamEvent::StreamWithdrawn { recipient, amount } => {
                self.withdrawals_claimed += 1;
                self.withdrawn = self.withdrawn.checked_add(*amount).ok_or_else(|| {
                    SyncError::AmountOverflow {
                        address: recipient.clone(),
                        field: "total_withdrawn",
                    }
                })?;
            }
        }
        Ok(())
    }
}

impl AccountStats {
    /// Merge a delta into this row and recompute the score.
    pub fn apply_delta(
        &mut self,
        delta: &AccountDelta,
        weights: &ScoreWeights,
        now: i64,
    ) -> Result<(), SyncError> {
        let deposited = self.deposited()?.checked_add(delta.deposited).ok_or_else(|| {
            SyncError::AmountOverflow {
                address: self.address.clone(),
                field: "total_deposited",
            }
        })?;
        let withdrawn = self.withdrawn()?.checked_add(delta.withdrawn).ok_or_else(|| {
            SyncError::AmountOverflow {
                address: self.address.clone(),
                field: "total_withdrawn",
            }
        })?;

        self.streams_created += delta.streams_created;
        self.withdrawals_claimed += delta.withdrawals_claimed;
        self.total_deposited = deposited.to_string();
        self.total_withdrawn = withdrawn.to_string();
        self.score = weights.score(self.streams_created, self.withdrawals_claimed);
        self.updated_at = now;
        Ok(())
    }
}

/// Accumulates the deltas of one pass, keyed by lower-cased account address.
#[derive(Debug, Default)]
pub struct StatAggregator {
    deltas: BTreeMap<String, AccountDelta>,
    created: u64,
    withdrawn: u64,
}

impl StatAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the pending deltas.
    pub fn apply(&mut self, event: &StreamEvent) -> Result<(), SyncError> {
        let key = event.subject().to_ascii_lowercase();
        self.deltas.entry(key).or_default().add(event)?;
        match event {
            StreamEvent::StreamCreated { .. } => self.created += 1,
            StreamEvent::StreamWithdrawn { .. } => self.withdrawn += 1,
        }
        Ok(())
    }

    /// Number of `StreamCreated` events applied.
    pub fn created_count(&self) -> u64 {
        self.created
    }

    /// Number of `StreamWithdrawn` events applied.
    pub fn withdrawn_count(&self) -> u64 {
        self.withdrawn
    }

    /// Number of distinct accounts touched.
    pub fn account_count(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    pub fn into_deltas(self) -> BTreeMap<String, AccountDelta> {
        self.deltas
    }
}
