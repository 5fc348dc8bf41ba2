//! dripboard CLI: run leaderboard sync passes and query the rankings.
//!
//! # Commands
//! ```text
//! dripboard sync        --network mainnet [--from-block N] [--reset] [--json]
//! dripboard top         [--limit 50] [--json]
//! dripboard rank        <address> [--json]
//! dripboard reset-stats --network mainnet
//! dripboard networks    [--config networks.json]
//! dripboard info
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

use dripboard_core::config::{NetworkTable, SyncConfig};
use dripboard_core::ranking::DEFAULT_TOP_LIMIT;

mod cmd_board;
mod cmd_sync;
mod logging;

#[derive(Parser)]
#[command(
    name = "dripboard",
    about = "Leaderboard synchronizer for the Drip payment-streaming contract",
    long_about = "
Scans StreamCreated / StreamWithdrawn events in bounded block windows,
aggregates per-account stats and answers ranking queries.

ENVIRONMENT VARIABLES:
  CELO_SEPOLIA_RPC_URL, CELO_RPC_URL   Celo Sepolia RPC endpoint
  CELO_MAINNET_RPC_URL                 Celo mainnet RPC endpoint
  LISK_RPC_URL                         Lisk RPC endpoint
  DRIPBOARD_DB                         SQLite database path
  RUST_LOG                             Log filter (overrides --verbose)
",
    version
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON logs on stderr
    #[arg(long, global = true)]
    log_json: bool,

    /// SQLite database file
    #[arg(long, global = true, env = "DRIPBOARD_DB", default_value = "./dripboard.db")]
    db: String,

    /// JSON network table replacing the built-in one
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one synchronization pass
    Sync {
        /// Network slug, e.g. mainnet
        #[arg(long, default_value = "sepolia")]
        network: String,
        /// Start height (first run, or with --reset)
        #[arg(long)]
        from_block: Option<u64>,
        /// Rewind the checkpoint to --from-block (or genesis). Account rows
        /// are kept, so events in the rewound range are counted again; run
        /// reset-stats instead for a clean rebuild
        #[arg(long)]
        reset: bool,
        /// Maximum blocks scanned per pass
        #[arg(long)]
        max_range: Option<u64>,
        /// Blocks behind head a first run starts when no genesis is known
        #[arg(long)]
        lookback: Option<u64>,
        /// Print the pass summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the top accounts by score
    Top {
        #[arg(long, default_value_t = DEFAULT_TOP_LIMIT)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },

    /// Show stats and rank for one address
    Rank {
        address: String,
        #[arg(long)]
        json: bool,
    },

    /// Clear all account stats and rewind a network to its genesis
    #[command(name = "reset-stats")]
    ResetStats {
        #[arg(long)]
        network: String,
    },

    /// List configured networks
    Networks,

    /// Show build and default configuration info
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(&logging::LogConfig::for_cli(cli.verbose, cli.log_json));

    let table = load_table(cli.config.as_deref())?;

    match cli.command {
        Commands::Sync {
            network,
            from_block,
            reset,
            max_range,
            lookback,
            json,
        } => {
            let args = cmd_sync::SyncArgs {
                network,
                from_block,
                reset,
                max_range,
                lookback,
                json,
            };
            cmd_sync::run(&table, &cli.db, args).await
        }
        Commands::Top { limit, json } => cmd_board::top(&cli.db, limit, json).await,
        Commands::Rank { address, json } => cmd_board::rank(&cli.db, &address, json).await,
        Commands::ResetStats { network } => cmd_board::reset_stats(&table, &cli.db, &network).await,
        Commands::Networks => cmd_networks(&table),
        Commands::Info => cmd_info(),
    }
}

fn load_table(path: Option<&str>) -> Result<NetworkTable> {
    Ok(match path {
        Some(path) => NetworkTable::from_file(path)?,
        None => NetworkTable::builtin(),
    })
}

fn cmd_networks(table: &NetworkTable) -> Result<()> {
    for net in table.networks.values() {
        println!("{} (chain {})", net.name, net.chain_id);
        match net.resolve_rpc_url() {
            Ok(url) => println!("  RPC:            {url}"),
            Err(_) => println!("  RPC:            <unset>"),
        }
        if !net.rpc_url_env.is_empty() {
            println!("  RPC env:        {}", net.rpc_url_env.join(", "));
        }
        println!("  Contract:       {}", net.contract_address);
        for addr in &net.implementation_addresses {
            println!("  Implementation: {addr}");
        }
        match net.genesis_block {
            Some(g) => println!("  Genesis block:  {g}"),
            None => println!("  Genesis block:  <head - lookback>"),
        }
    }
    Ok(())
}

fn cmd_info() -> Result<()> {
    let cfg = SyncConfig::default();
    println!("Dripboard v{}", env!("CARGO_PKG_VERSION"));
    println!("  Max range:        {} blocks/pass", cfg.max_range);
    println!("  First-run lookback: {} blocks", cfg.lookback);
    println!("  RPC timeout:      {} ms", cfg.fetch_timeout_ms);
    println!("  Lease TTL:        {} s", cfg.lease_ttl_secs);
    println!(
        "  Score:            created x {} + withdrawals x {}",
        cfg.weights.stream_created, cfg.weights.withdrawal_claimed
    );
    println!("  Events:           StreamCreated, StreamWithdrawn");
    println!("  Storage backends: memory, SQLite (feature: sqlite)");
    Ok(())
}
