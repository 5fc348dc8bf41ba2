//! Fluent builder API for sync configuration and engines.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use dripboard_core::config::NetworkTable;
//! use dripboard_evm::{HttpRpcClient, SyncConfigBuilder};
//! use dripboard_storage::InMemoryStorage;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let network = NetworkTable::builtin().get("mainnet")?.clone();
//! let client = HttpRpcClient::new(network.resolve_rpc_url()?, Duration::from_secs(30))?;
//!
//! let engine = SyncConfigBuilder::new()
//!     .max_range(500)
//!     .lease_ttl_secs(120)
//!     .build(network, client, Arc::new(InMemoryStorage::new()));
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use dripboard_core::aggregator::ScoreWeights;
use dripboard_core::config::{NetworkConfig, SyncConfig};
use dripboard_core::store::LeaderboardStore;

use crate::fetcher::EvmRpcClient;
use crate::sync::SyncEngine;

/// Fluent builder for `SyncConfig`.
#[derive(Default)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
    holder: Option<String>,
}

impl SyncConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration (e.g. one loaded from a file).
    pub fn from_config(config: SyncConfig) -> Self {
        Self {
            config,
            holder: None,
        }
    }

    /// Maximum blocks per pass. Clamped to at least 1.
    pub fn max_range(mut self, blocks: u64) -> Self {
        self.config.max_range = blocks.max(1);
        self
    }

    /// How far behind head a first run starts when no genesis is configured.
    pub fn lookback(mut self, blocks: u64) -> Self {
        self.config.lookback = blocks;
        self
    }

    /// Timeout for each RPC call in milliseconds.
    pub fn fetch_timeout_ms(mut self, ms: u64) -> Self {
        self.config.fetch_timeout_ms = ms;
        self
    }

    pub fn lease_ttl_secs(mut self, secs: u64) -> Self {
        self.config.lease_ttl_secs = secs;
        self
    }

    pub fn weights(mut self, weights: ScoreWeights) -> Self {
        self.config.weights = weights;
        self
    }

    /// Lease holder id used by the built engine.
    pub fn holder(mut self, holder: impl Into<String>) -> Self {
        self.holder = Some(holder.into());
        self
    }

    /// Build the `SyncConfig`.
    pub fn build_config(self) -> SyncConfig {
        self.config
    }

    /// Build a `SyncEngine` for `network`.
    pub fn build<C, S>(self, network: NetworkConfig, client: C, store: Arc<S>) -> SyncEngine<C, S>
    where
        C: EvmRpcClient,
        S: LeaderboardStore + ?Sized,
    {
        let engine = SyncEngine::new(network, self.config, client, store);
        match self.holder {
            Some(holder) => engine.with_holder(holder),
            None => engine,
        }
    }
}
