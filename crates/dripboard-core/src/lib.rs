//! dripboard-core: domain model of the Drip leaderboard synchronizer.
//!
//! # Architecture
//!
//! ```text
//! SyncEngine (dripboard-evm), one pass per call
//!     ├── RangePlanner    (checkpoint + head → window)
//!     ├── LogFetcher      (per-address eth_getLogs, failures isolated)
//!     ├── EventDecoder    (StreamCreated / StreamWithdrawn / skipped / error)
//!     ├── StatAggregator  (per-account deltas, order independent)
//!     └── LeaderboardStore
//!           ├── CheckpointStore (resume position per network)
//!           ├── StatsStore      (atomic window commit + ranking reads)
//!           └── LeaseStore      (one pass per network at a time)
//! ```

pub mod aggregator;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod pass;
pub mod planner;
pub mod ranking;
pub mod store;
pub mod types;

pub use aggregator::{AccountDelta, ScoreWeights, StatAggregator};
pub use checkpoint::{Checkpoint, CheckpointStore};
pub use config::{NetworkConfig, NetworkTable, SyncConfig};
pub use error::SyncError;
pub use pass::{FetchFailure, SyncOutcome, SyncRequest, SyncSummary};
pub use planner::{Plan, PlanStart, RangePlanner};
pub use ranking::{AccountRank, Leaderboard, RankedAccount, DEFAULT_TOP_LIMIT};
pub use store::{LeaderboardStore, Lease, LeaseOutcome, LeaseStore, StatsStore, WindowCommit};
pub use types::{normalize_address, AccountStats, DecodedEvent, StreamEvent, Window};

pub use alloy_primitives::U256;
