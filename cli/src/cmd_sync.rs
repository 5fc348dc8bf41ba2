//! `dripboard sync`: run one synchronization pass.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use dripboard_core::config::NetworkTable;
use dripboard_core::pass::{SyncOutcome, SyncRequest};
use dripboard_evm::{HttpRpcClient, SyncConfigBuilder};
use dripboard_storage::SqliteStorage;

pub struct SyncArgs {
    pub network: String,
    pub from_block: Option<u64>,
    pub reset: bool,
    pub max_range: Option<u64>,
    pub lookback: Option<u64>,
    pub json: bool,
}

pub async fn run(table: &NetworkTable, db: &str, args: SyncArgs) -> Result<()> {
    let network = table.get(&args.network)?.clone();
    let rpc_url = network.resolve_rpc_url()?;

    let mut builder = SyncConfigBuilder::new();
    if let Some(n) = args.max_range {
        builder = builder.max_range(n);
    }
    if let Some(n) = args.lookback {
        builder = builder.lookback(n);
    }
    let config = builder.build_config();

    let client = HttpRpcClient::new(&rpc_url, Duration::from_millis(config.fetch_timeout_ms))
        .context("building RPC client")?;
    let store = Arc::new(
        SqliteStorage::open(db)
            .await
            .with_context(|| format!("opening database {db}"))?,
    );
    let engine = SyncConfigBuilder::from_config(config).build(network, client, store);

    let mut request = SyncRequest::network(&args.network);
    if args.reset {
        request = request.reset(args.from_block);
    } else if let Some(from) = args.from_block {
        request = request.from_block(from);
    }

    let outcome = engine
        .sync(&request)
        .await
        .with_context(|| format!("sync pass for '{}' failed", args.network))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match outcome {
        SyncOutcome::NothingToDo {
            network,
            from_block,
            head,
        } => {
            println!("{network}: nothing to do (next block {from_block}, head {head})");
        }
        SyncOutcome::Synced(s) => {
            println!("{}: synced blocks {}..={}", s.network, s.from_block, s.to_block);
            println!("  Addresses:        {}", s.contract_addresses.join(", "));
            println!("  Raw logs:         {}", s.raw_log_count);
            println!("  StreamCreated:    {}", s.events_created);
            println!("  StreamWithdrawn:  {}", s.events_withdrawn);
            println!("  Skipped:          {}", s.skipped);
            println!("  Decode errors:    {}", s.decode_errors);
            println!("  Accounts updated: {}", s.accounts_updated);
            for f in &s.fetch_failures {
                println!("  ! fetch failed for {}: {}", f.address, f.error);
            }
        }
    }
    Ok(())
}
