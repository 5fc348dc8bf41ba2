//! Leaderboard reads and the administrative reset.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;

use dripboard_core::checkpoint::CheckpointStore;
use dripboard_core::config::{NetworkTable, SyncConfig};
use dripboard_core::ranking::Leaderboard;
use dripboard_core::store::{LeaseOutcome, LeaseStore, StatsStore};
use dripboard_storage::SqliteStorage;

async fn open(db: &str) -> Result<Arc<SqliteStorage>> {
    let store = SqliteStorage::open(db)
        .await
        .with_context(|| format!("opening database {db}"))?;
    Ok(Arc::new(store))
}

/// `dripboard top`
pub async fn top(db: &str, limit: usize, json: bool) -> Result<()> {
    let board = Leaderboard::new(open(db).await?);
    let rows = board.top(limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    if rows.is_empty() {
        println!("leaderboard is empty");
        return Ok(());
    }
    println!("{:>5}  {:<42}  {:>6}  {:>7}  {:>11}", "RANK", "ADDRESS", "SCORE", "STREAMS", "WITHDRAWALS");
    for r in rows {
        println!(
            "{:>5}  {:<42}  {:>6}  {:>7}  {:>11}",
            r.rank, r.stats.address, r.stats.score, r.stats.streams_created, r.stats.withdrawals_claimed
        );
    }
    Ok(())
}

/// `dripboard rank <address>`
pub async fn rank(db: &str, address: &str, json: bool) -> Result<()> {
    let board = Leaderboard::new(open(db).await?);
    let r = board.account(address).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&r)?);
        return Ok(());
    }
    match r.rank {
        Some(rank) => println!("{}: rank #{rank}", r.stats.address),
        None => println!("{}: unranked", r.stats.address),
    }
    println!("  Score:           {}", r.stats.score);
    println!("  Streams created: {}", r.stats.streams_created);
    println!("  Withdrawals:     {}", r.stats.withdrawals_claimed);
    println!("  Total deposited: {}", r.stats.total_deposited);
    println!("  Total withdrawn: {}", r.stats.total_withdrawn);
    Ok(())
}

/// `dripboard reset-stats --network N`
///
/// Deletes every account row, then rewinds the network so the next pass
/// rebuilds from genesis (or from head − lookback when none is known).
pub async fn reset_stats(table: &NetworkTable, db: &str, network: &str) -> Result<()> {
    let net = table.get(network)?;
    let store = open(db).await?;
    let holder = format!("reset-stats-{}", std::process::id());

    match store
        .try_acquire_lease(network, &holder, SyncConfig::default().lease_ttl_secs)
        .await?
    {
        LeaseOutcome::Acquired(_) => {}
        LeaseOutcome::Held(lease) => {
            bail!("a sync pass for '{network}' is running (holder {})", lease.holder)
        }
    }

    let result = async {
        let deleted = store.clear_accounts().await?;
        match net.genesis_block {
            Some(genesis) => store.pin_checkpoint(network, genesis.saturating_sub(1)).await?,
            None => store.delete_checkpoint(network).await?,
        }
        Ok::<_, dripboard_core::SyncError>(deleted)
    }
    .await;

    store.release_lease(network, &holder).await?;
    let deleted = result?;

    info!(network, deleted, "leaderboard reset");
    println!("{network}: removed {deleted} account rows");
    match net.genesis_block {
        Some(genesis) => println!("  checkpoint pinned to {}", genesis.saturating_sub(1)),
        None => println!("  checkpoint cleared; next pass starts at head - lookback"),
    }
    Ok(())
}
