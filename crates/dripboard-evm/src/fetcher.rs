//! EVM log fetcher.
//!
//! Queries `eth_getLogs` once per source address over a planned window.
//! Addresses are fetched concurrently and independently: an unreachable
//! implementation address costs only its own contribution, never the
//! proxy's logs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use dripboard_core::error::SyncError;
use dripboard_core::pass::FetchFailure;
use dripboard_core::types::Window;

/// A raw EVM log as returned by `eth_getLogs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    /// `None` for pending logs.
    #[serde(default)]
    pub block_number: Option<String>,
    #[serde(default)]
    pub block_hash: Option<String>,
    #[serde(default)]
    pub transaction_hash: Option<String>,
    #[serde(default)]
    pub log_index: Option<String>,
    #[serde(default)]
    pub removed: Option<bool>,
}

impl RawLog {
    pub fn block_number_u64(&self) -> Option<u64> {
        self.block_number.as_deref().and_then(parse_hex_u64)
    }

    pub fn log_index_u64(&self) -> Option<u64> {
        self.log_index.as_deref().and_then(parse_hex_u64)
    }

    /// Returns `true` if this log was removed by a reorg.
    pub fn is_removed(&self) -> bool {
        self.removed.unwrap_or(false)
    }
}

/// A raw log tagged with the address it was requested from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcedLog {
    pub source: String,
    pub log: RawLog,
}

/// Everything one window fetch produced: the union of logs across
/// addresses that answered, and one entry per address that did not.
#[derive(Debug, Default)]
pub struct FetchResult {
    pub logs: Vec<SourcedLog>,
    pub failures: Vec<FetchFailure>,
}

/// The chain RPC surface the sync pass needs.
#[async_trait]
pub trait EvmRpcClient: Send + Sync {
    async fn get_block_number(&self) -> Result<u64, SyncError>;
    async fn get_logs(&self, address: &str, from: u64, to: u64) -> Result<Vec<RawLog>, SyncError>;
}

#[async_trait]
impl<C: EvmRpcClient + ?Sized> EvmRpcClient for Arc<C> {
    async fn get_block_number(&self) -> Result<u64, SyncError> {
        (**self).get_block_number().await
    }

    async fn get_logs(&self, address: &str, from: u64, to: u64) -> Result<Vec<RawLog>, SyncError> {
        (**self).get_logs(address, from, to).await
    }
}

/// Wraps an [`EvmRpcClient`] with per-call timeouts and per-address
/// failure isolation.
pub struct LogFetcher<C> {
    client: C,
    timeout: Duration,
}

impl<C: EvmRpcClient> LogFetcher<C> {
    pub fn new(client: C, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Fetch the current chain head block number.
    ///
    /// A failure here is fatal for the pass: without a head there is no window.
    pub async fn head_block_number(&self) -> Result<u64, SyncError> {
        match tokio::time::timeout(self.timeout, self.client.get_block_number()).await {
            Ok(res) => res,
            Err(_) => Err(SyncError::Rpc(format!(
                "eth_blockNumber timed out after {}ms",
                self.timeout.as_millis()
            ))),
        }
    }

    /// Fetch logs in `window` from every address concurrently.
    pub async fn fetch(&self, addresses: &[String], window: Window) -> FetchResult {
        let calls = addresses.iter().map(|address| async move {
            let res = tokio::time::timeout(
                self.timeout,
                self.client
                    .get_logs(address, window.from_block, window.to_block),
            )
            .await
            .unwrap_or_else(|_| {
                Err(SyncError::Rpc(format!(
                    "eth_getLogs timed out after {}ms",
                    self.timeout.as_millis()
                )))
            });
            (address, res)
        });

        let mut out = FetchResult::default();
        for (address, res) in join_all(calls).await {
            match res {
                Ok(logs) => {
                    debug!(%address, %window, count = logs.len(), "fetched logs");
                    out.logs.extend(logs.into_iter().map(|log| SourcedLog {
                        source: address.clone(),
                        log,
                    }));
                }
                Err(e) => {
                    warn!(%address, %window, error = %e, "log fetch failed; continuing without this address");
                    out.failures.push(FetchFailure {
                        address: address.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        out
    }
}

/// Parse a hex-encoded quantity (with or without `0x`) to u64.
pub fn parse_hex_u64(s: &str) -> Option<u64> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.is_empty() {
        return None;
    }
    u64::from_str_radix(s, 16).ok()
}
