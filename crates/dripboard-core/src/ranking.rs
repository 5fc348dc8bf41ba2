//! Ranking queries over the current aggregate state. Read-only.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::store::StatsStore;
use crate::types::{normalize_address, AccountStats};

/// Default page size of [`Leaderboard::top`].
pub const DEFAULT_TOP_LIMIT: usize = 50;

/// A row of the leaderboard with its 1-based position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedAccount {
    pub rank: u64,
    #[serde(flatten)]
    pub stats: AccountStats,
}

/// Stats and rank of a single address. `rank == None` means unranked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRank {
    #[serde(flatten)]
    pub stats: AccountStats,
    pub rank: Option<u64>,
}

/// Answers "who is #N" and "where is address X".
pub struct Leaderboard<S: StatsStore + ?Sized> {
    store: Arc<S>,
}

impl<S: StatsStore + ?Sized> Leaderboard<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The top `limit` accounts by score. Ties are ordered by address, and
    /// each row's rank is its position in that ordering.
    pub async fn top(&self, limit: usize) -> Result<Vec<RankedAccount>, SyncError> {
        let rows = self.store.top_by_score(limit).await?;
        Ok(rows
            .into_iter()
            .enumerate()
            .map(|(idx, stats)| RankedAccount {
                rank: idx as u64 + 1,
                stats,
            })
            .collect())
    }

    /// Stats and rank for `address`: one plus the number of accounts with a
    /// strictly greater score. Unknown addresses come back zeroed and
    /// unranked; nothing is written.
    pub async fn account(&self, address: &str) -> Result<AccountRank, SyncError> {
        let address = normalize_address(address)?;
        match self.store.get_account(&address).await? {
            Some(stats) => {
                let above = self.store.count_score_above(stats.score).await?;
                Ok(AccountRank {
                    stats,
                    rank: Some(above + 1),
                })
            }
            None => Ok(AccountRank {
                stats: AccountStats::empty(address),
                rank: None,
            }),
        }
    }
}
