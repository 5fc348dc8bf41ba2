//! SQLite storage backend for Dripboard.
//!
//! Persists checkpoints, account stats and pass leases to a single SQLite
//! file. A window commit runs inside one transaction: the checkpoint
//! compare-and-set (which also advances it) and every account upsert either
//! all land or none do.
//!
//! # Usage
//! ```rust,no_run
//! use dripboard_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStorage::open("./leaderboard.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use dripboard_core::checkpoint::{Checkpoint, CheckpointStore};
use dripboard_core::error::SyncError;
use dripboard_core::store::{Lease, LeaseOutcome, LeaseStore, StatsStore, WindowCommit};
use dripboard_core::types::AccountStats;

/// How long a writer waits for another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

fn storage(e: sqlx::Error) -> SyncError {
    SyncError::Storage(e.to_string())
}

/// SQLite-backed storage for checkpoints, account stats and leases.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./leaderboard.db"`) or a full
    /// SQLite URL (`"sqlite:./leaderboard.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, SyncError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(storage)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(storage)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Pinned to a single connection that never expires, since every
    /// connection to `sqlite::memory:` is a separate database.
    pub async fn in_memory() -> Result<Self, SyncError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(storage)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    async fn init_schema(&self) -> Result<(), SyncError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                network      TEXT    NOT NULL PRIMARY KEY,
                block_number INTEGER NOT NULL,
                updated_at   INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS account_stats (
                address             TEXT    NOT NULL PRIMARY KEY,
                streams_created     INTEGER NOT NULL,
                withdrawals_claimed INTEGER NOT NULL,
                total_deposited     TEXT    NOT NULL,
                total_withdrawn     TEXT    NOT NULL,
                score               INTEGER NOT NULL,
                updated_at          INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_account_stats_score ON account_stats (score);")
            .execute(&self.pool)
            .await
            .map_err(storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS leases (
                network    TEXT    NOT NULL PRIMARY KEY,
                holder     TEXT    NOT NULL,
                expires_at INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(())
    }
}

fn stats_from_row(r: &SqliteRow) -> AccountStats {
    AccountStats {
        address: r.get("address"),
        streams_created: r.get::<i64, _>("streams_created") as u64,
        withdrawals_claimed: r.get::<i64, _>("withdrawals_claimed") as u64,
        total_deposited: r.get("total_deposited"),
        total_withdrawn: r.get("total_withdrawn"),
        score: r.get::<i64, _>("score") as u64,
        updated_at: r.get("updated_at"),
    }
}

const STATS_COLUMNS: &str = "address, streams_created, withdrawals_claimed, total_deposited, \
                             total_withdrawn, score, updated_at";

// ─── CheckpointStore impl ────────────────────────────────────────────────────

#[async_trait]
impl CheckpointStore for SqliteStorage {
    async fn load_checkpoint(&self, network: &str) -> Result<Option<Checkpoint>, SyncError> {
        let row = sqlx::query(
            "SELECT network, block_number, updated_at FROM checkpoints WHERE network = ?",
        )
        .bind(network)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        Ok(row.map(|r| Checkpoint {
            network: r.get("network"),
            block_number: r.get::<i64, _>("block_number") as u64,
            updated_at: r.get("updated_at"),
        }))
    }

    async fn pin_checkpoint(&self, network: &str, block_number: u64) -> Result<(), SyncError> {
        let cp = Checkpoint::new(network, block_number);
        sqlx::query(
            "INSERT OR REPLACE INTO checkpoints (network, block_number, updated_at)
             VALUES (?, ?, ?)",
        )
        .bind(&cp.network)
        .bind(cp.block_number as i64)
        .bind(cp.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        debug!(network, block = block_number, "checkpoint pinned");
        Ok(())
    }

    async fn delete_checkpoint(&self, network: &str) -> Result<(), SyncError> {
        sqlx::query("DELETE FROM checkpoints WHERE network = ?")
            .bind(network)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(())
    }
}

// ─── StatsStore impl ─────────────────────────────────────────────────────────

#[async_trait]
impl StatsStore for SqliteStorage {
    async fn commit_window(&self, commit: WindowCommit) -> Result<(), SyncError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;
        let now = chrono::Utc::now().timestamp();
        let expected = commit.expected_checkpoint();

        // The compare-and-set is the first statement so the write lock is
        // taken before anything is read. A read-first transaction would hold
        // a stale snapshot and fail with SQLITE_BUSY when another network's
        // commit got the lock in between.
        let advanced = sqlx::query(
            "UPDATE checkpoints SET block_number = ?, updated_at = ?
             WHERE network = ? AND block_number = ?",
        )
        .bind(commit.window.to_block as i64)
        .bind(now)
        .bind(&commit.network)
        .bind(expected as i64)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        if advanced.rows_affected() != 1 {
            let actual = sqlx::query("SELECT block_number FROM checkpoints WHERE network = ?")
                .bind(&commit.network)
                .fetch_optional(&mut *tx)
                .await
                .map_err(storage)?
                .map(|r| r.get::<i64, _>("block_number") as u64);
            // dropping `tx` rolls back
            return Err(SyncError::CheckpointConflict {
                network: commit.network,
                expected: Some(expected),
                actual,
            });
        }

        for (address, delta) in &commit.deltas {
            let existing = sqlx::query(&format!(
                "SELECT {STATS_COLUMNS} FROM account_stats WHERE address = ?"
            ))
            .bind(address)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage)?;

            let mut row = existing
                .as_ref()
                .map(stats_from_row)
                .unwrap_or_else(|| AccountStats::empty(address.clone()));
            row.apply_delta(delta, &commit.weights, now)?;

            sqlx::query(&format!(
                "INSERT OR REPLACE INTO account_stats ({STATS_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)"
            ))
            .bind(&row.address)
            .bind(row.streams_created as i64)
            .bind(row.withdrawals_claimed as i64)
            .bind(&row.total_deposited)
            .bind(&row.total_withdrawn)
            .bind(row.score as i64)
            .bind(row.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }

        tx.commit().await.map_err(storage)?;

        debug!(
            network = %commit.network,
            window = %commit.window,
            accounts = commit.deltas.len(),
            "window committed"
        );
        Ok(())
    }

    async fn get_account(&self, address: &str) -> Result<Option<AccountStats>, SyncError> {
        let row = sqlx::query(&format!(
            "SELECT {STATS_COLUMNS} FROM account_stats WHERE address = ?"
        ))
        .bind(address)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        Ok(row.as_ref().map(stats_from_row))
    }

    async fn top_by_score(&self, limit: usize) -> Result<Vec<AccountStats>, SyncError> {
        let rows = sqlx::query(&format!(
            "SELECT {STATS_COLUMNS} FROM account_stats ORDER BY score DESC, address ASC LIMIT ?"
        ))
        .bind(limit.min(i64::MAX as usize) as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        Ok(rows.iter().map(stats_from_row).collect())
    }

    async fn count_score_above(&self, score: u64) -> Result<u64, SyncError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM account_stats WHERE score > ?")
            .bind(score as i64)
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        Ok(row.get::<i64, _>("cnt") as u64)
    }

    async fn account_count(&self) -> Result<u64, SyncError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM account_stats")
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        Ok(row.get::<i64, _>("cnt") as u64)
    }

    async fn clear_accounts(&self) -> Result<u64, SyncError> {
        let res = sqlx::query("DELETE FROM account_stats")
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(res.rows_affected())
    }
}

// ─── LeaseStore impl ─────────────────────────────────────────────────────────

#[async_trait]
impl LeaseStore for SqliteStorage {
    async fn try_acquire_lease(
        &self,
        network: &str,
        holder: &str,
        ttl_secs: u64,
    ) -> Result<LeaseOutcome, SyncError> {
        let now = chrono::Utc::now().timestamp();
        let expires_at = now.saturating_add(ttl_secs as i64);

        let res = sqlx::query(
            "INSERT INTO leases (network, holder, expires_at) VALUES (?, ?, ?)
             ON CONFLICT(network) DO UPDATE
                SET holder = excluded.holder, expires_at = excluded.expires_at
                WHERE leases.holder = excluded.holder OR leases.expires_at <= ?",
        )
        .bind(network)
        .bind(holder)
        .bind(expires_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if res.rows_affected() > 0 {
            return Ok(LeaseOutcome::Acquired(Lease {
                network: network.to_string(),
                holder: holder.to_string(),
                expires_at,
            }));
        }

        let row = sqlx::query("SELECT holder, expires_at FROM leases WHERE network = ?")
            .bind(network)
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        Ok(LeaseOutcome::Held(Lease {
            network: network.to_string(),
            holder: row.get("holder"),
            expires_at: row.get("expires_at"),
        }))
    }

    async fn release_lease(&self, network: &str, holder: &str) -> Result<(), SyncError> {
        sqlx::query("DELETE FROM leases WHERE network = ? AND holder = ?")
            .bind(network)
            .bind(holder)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
