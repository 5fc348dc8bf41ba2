//! One synchronization pass: plan → fetch → decode → aggregate → commit.
//!
//! ```text
//! acquire lease (per network)
//!   head ← eth_blockNumber
//!   plan ← RangePlanner(checkpoint, head)        pin checkpoint on first run / reset
//!   logs ← eth_getLogs per address (concurrent)  failures recorded, not fatal
//!   events ← decode, drop removed + duplicates
//!   deltas ← StatAggregator
//!   commit_window(deltas, checkpoint := to)      atomic, compare-and-set
//! release lease
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use dripboard_core::aggregator::StatAggregator;
use dripboard_core::config::{NetworkConfig, SyncConfig};
use dripboard_core::error::SyncError;
use dripboard_core::pass::{SyncOutcome, SyncRequest, SyncSummary};
use dripboard_core::planner::RangePlanner;
use dripboard_core::store::{LeaderboardStore, LeaseOutcome, WindowCommit};

use crate::decoder::{DecodeOutcome, EventDecoder};
use crate::fetcher::{EvmRpcClient, LogFetcher};

/// Runs synchronization passes for one network against one store.
pub struct SyncEngine<C, S: ?Sized> {
    network: NetworkConfig,
    config: SyncConfig,
    planner: RangePlanner,
    fetcher: LogFetcher<C>,
    decoder: EventDecoder,
    store: Arc<S>,
    holder: String,
}

impl<C, S> SyncEngine<C, S>
where
    C: EvmRpcClient,
    S: LeaderboardStore + ?Sized,
{
    pub fn new(network: NetworkConfig, config: SyncConfig, client: C, store: Arc<S>) -> Self {
        Self {
            planner: RangePlanner::new(config.max_range, config.lookback),
            fetcher: LogFetcher::new(client, Duration::from_millis(config.fetch_timeout_ms)),
            decoder: EventDecoder::new(),
            holder: default_holder(),
            network,
            config,
            store,
        }
    }

    /// Override the lease holder id (defaults to `<pid>-<nanos>`).
    pub fn with_holder(mut self, holder: impl Into<String>) -> Self {
        self.holder = holder.into();
        self
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Run one pass. Holds the network lease for its whole duration.
    pub async fn sync(&self, request: &SyncRequest) -> Result<SyncOutcome, SyncError> {
        let network = self.network.name.as_str();
        if request.network != network {
            return Err(SyncError::Config(format!(
                "engine is configured for network '{network}', got request for '{}'",
                request.network
            )));
        }
        let addresses = self.network.source_addresses()?;

        match self
            .store
            .try_acquire_lease(network, &self.holder, self.config.lease_ttl_secs)
            .await?
        {
            LeaseOutcome::Acquired(_) => {}
            LeaseOutcome::Held(lease) => {
                warn!(network, holder = %lease.holder, "another pass holds the lease");
                return Err(SyncError::LeaseHeld {
                    network: network.to_string(),
                    holder: lease.holder,
                });
            }
        }

        let result = self.run_pass(request, addresses).await;

        if let Err(e) = self.store.release_lease(network, &self.holder).await {
            warn!(network, error = %e, "failed to release lease; it will expire");
        }
        if let Err(e) = &result {
            warn!(network, error = %e, "sync pass failed; checkpoint not advanced");
        }
        result
    }

    async fn run_pass(
        &self,
        request: &SyncRequest,
        addresses: Vec<String>,
    ) -> Result<SyncOutcome, SyncError> {
        let network = self.network.name.as_str();

        let head = self.fetcher.head_block_number().await?;
        let last = self
            .store
            .load_checkpoint(network)
            .await?
            .map(|cp| cp.block_number);

        let plan = self.planner.plan(
            last,
            head,
            self.network.genesis_block,
            request.reset,
            request.from_block,
        );

        if let Some(pin) = plan.pin {
            self.store.pin_checkpoint(network, pin).await?;
            info!(network, checkpoint = pin, start = ?plan.start, "checkpoint pinned");
        }

        let Some(window) = plan.window else {
            info!(network, from = plan.from_block, head, "nothing to do");
            return Ok(SyncOutcome::NothingToDo {
                network: network.to_string(),
                from_block: plan.from_block,
                head,
            });
        };

        info!(network, %window, head, addresses = addresses.len(), "sync pass started");

        let fetched = self.fetcher.fetch(&addresses, window).await;
        let raw_log_count = fetched.logs.len();

        let mut seen: HashSet<(String, u64, u64)> = HashSet::new();
        let mut aggregator = StatAggregator::new();
        let mut skipped = 0usize;
        let mut decode_errors = 0usize;

        for sourced in &fetched.logs {
            let log = &sourced.log;
            if log.is_removed() {
                skipped += 1;
                continue;
            }
            if let (Some(block), Some(index)) = (log.block_number_u64(), log.log_index_u64()) {
                if !seen.insert((sourced.source.clone(), block, index)) {
                    debug!(source = %sourced.source, block, index, "duplicate log dropped");
                    skipped += 1;
                    continue;
                }
            }

            match self.decoder.decode(&sourced.source, log) {
                DecodeOutcome::Matched(ev) => {
                    debug!(
                        event = ev.event.name(),
                        account = ev.event.subject(),
                        block = ev.block_number,
                        tx = %ev.tx_hash,
                        "decoded"
                    );
                    aggregator.apply(&ev.event)?;
                }
                DecodeOutcome::Skipped => skipped += 1,
                DecodeOutcome::DecodeError(reason) => {
                    warn!(
                        source = %sourced.source,
                        tx = log.transaction_hash.as_deref().unwrap_or(""),
                        %reason,
                        "failed to decode log"
                    );
                    decode_errors += 1;
                }
            }
        }

        let events_created = aggregator.created_count();
        let events_withdrawn = aggregator.withdrawn_count();
        let accounts_updated = aggregator.account_count();

        self.store
            .commit_window(WindowCommit {
                network: network.to_string(),
                window,
                deltas: aggregator.into_deltas(),
                weights: self.config.weights,
            })
            .await?;

        let summary = SyncSummary {
            network: network.to_string(),
            contract_addresses: addresses,
            start: plan.start,
            from_block: window.from_block,
            to_block: window.to_block,
            raw_log_count,
            events_created,
            events_withdrawn,
            skipped,
            decode_errors,
            accounts_updated,
            fetch_failures: fetched.failures,
        };

        info!(
            network,
            %window,
            raw_logs = raw_log_count,
            created = events_created,
            withdrawn = events_withdrawn,
            skipped,
            decode_errors,
            accounts = accounts_updated,
            partial = summary.is_partial(),
            "sync pass complete"
        );
        Ok(SyncOutcome::Synced(summary))
    }
}

fn default_holder() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{}-{nanos}", std::process::id())
}
