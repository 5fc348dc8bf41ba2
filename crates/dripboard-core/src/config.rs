//! Sync configuration and the per-network configuration table.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::aggregator::ScoreWeights;
use crate::error::SyncError;
use crate::types::normalize_address;

/// Tuning knobs shared by every network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Maximum number of blocks scanned per pass (per `eth_getLogs` call).
    #[serde(default = "default_max_range")]
    pub max_range: u64,
    /// How far behind head a first run starts when no genesis is configured.
    #[serde(default = "default_lookback")]
    pub lookback: u64,
    /// Timeout applied to every RPC call, in milliseconds.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    /// Lifetime of a pass lease; a crashed pass blocks others at most this long.
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: u64,
    #[serde(default)]
    pub weights: ScoreWeights,
}

fn default_max_range() -> u64 {
    1_000
}
fn default_lookback() -> u64 {
    1_000
}
fn default_fetch_timeout_ms() -> u64 {
    30_000
}
fn default_lease_ttl_secs() -> u64 {
    300
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_range: default_max_range(),
            lookback: default_lookback(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            lease_ttl_secs: default_lease_ttl_secs(),
            weights: ScoreWeights::default(),
        }
    }
}

/// Chain and contract settings for one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network slug used as the checkpoint key (e.g. `"mainnet"`).
    /// Defaults to the table key when loaded from JSON.
    #[serde(default)]
    pub name: String,
    pub chain_id: u64,
    /// Fallback JSON-RPC endpoint.
    #[serde(default)]
    pub rpc_url: String,
    /// Environment variables consulted (in order) before `rpc_url`.
    #[serde(default)]
    pub rpc_url_env: Vec<String>,
    /// The contract (proxy) address events are emitted from.
    pub contract_address: String,
    /// Implementation addresses behind the proxy, also scanned.
    #[serde(default)]
    pub implementation_addresses: Vec<String>,
    /// First block with contract activity, if known.
    #[serde(default)]
    pub genesis_block: Option<u64>,
}

impl NetworkConfig {
    /// Resolve the RPC endpoint: first non-empty env var, then `rpc_url`.
    pub fn resolve_rpc_url(&self) -> Result<String, SyncError> {
        self.rpc_url_env
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .map(|v| v.trim().to_string())
            .find(|v| !v.is_empty())
            .or_else(|| Some(self.rpc_url.trim().to_string()).filter(|u| !u.is_empty()))
            .ok_or_else(|| {
                SyncError::Config(format!("no RPC endpoint configured for network '{}'", self.name))
            })
    }

    /// All addresses to scan, normalized and de-duplicated, proxy first.
    pub fn source_addresses(&self) -> Result<Vec<String>, SyncError> {
        if self.contract_address.trim().is_empty() {
            return Err(SyncError::Config(format!(
                "no contract address configured for network '{}'",
                self.name
            )));
        }
        let mut out: Vec<String> = Vec::new();
        for raw in std::iter::once(&self.contract_address).chain(&self.implementation_addresses) {
            let addr = normalize_address(raw).map_err(|_| {
                SyncError::Config(format!("invalid contract address '{raw}' for '{}'", self.name))
            })?;
            if !out.contains(&addr) {
                out.push(addr);
            }
        }
        Ok(out)
    }
}

/// Network configurations keyed by slug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkTable {
    pub networks: BTreeMap<String, NetworkConfig>,
}

impl NetworkTable {
    /// The deployments of the streaming contract known at build time.
    pub fn builtin() -> Self {
        let networks = [
            NetworkConfig {
                name: "sepolia".into(),
                chain_id: 11_142_220,
                rpc_url: "https://forno.celo-sepolia.celo-testnet.org".into(),
                rpc_url_env: vec!["CELO_SEPOLIA_RPC_URL".into(), "CELO_RPC_URL".into()],
                contract_address: "0xfAaB5005f7844eC5499cF258F52dE29EDc74aa31".into(),
                implementation_addresses: vec![],
                genesis_block: None,
            },
            NetworkConfig {
                name: "mainnet".into(),
                chain_id: 42_220,
                rpc_url: "https://rpc.ankr.com/celo".into(),
                rpc_url_env: vec!["CELO_MAINNET_RPC_URL".into()],
                contract_address: "0x5530975fDe062FE6706298fF3945E3d1a17A310a".into(),
                implementation_addresses: vec![
                    "0xEAD6aF75911455673EF50975E8a429Eb67267703".into(),
                ],
                genesis_block: Some(53_003_427),
            },
            NetworkConfig {
                name: "lisk".into(),
                chain_id: 1_135,
                rpc_url: "https://rpc.api.lisk.com".into(),
                rpc_url_env: vec!["LISK_RPC_URL".into()],
                contract_address: "0x87BcC4Ef6817d3137568Be91f019bC4e35d9A4b6".into(),
                implementation_addresses: vec![],
                genesis_block: None,
            },
        ];
        Self {
            networks: networks.into_iter().map(|n| (n.name.clone(), n)).collect(),
        }
    }

    /// Parse a table from JSON: `{"networks": {"<slug>": {...}}}`.
    pub fn from_json(json: &str) -> Result<Self, SyncError> {
        let mut table: Self = serde_json::from_str(json)
            .map_err(|e| SyncError::Config(format!("invalid network table: {e}")))?;
        for (slug, net) in table.networks.iter_mut() {
            if net.name.is_empty() {
                net.name = slug.clone();
            }
        }
        Ok(table)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SyncError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    pub fn get(&self, network: &str) -> Result<&NetworkConfig, SyncError> {
        self.networks
            .get(network)
            .ok_or_else(|| SyncError::Config(format!("unknown network '{network}'")))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.networks.keys().map(String::as_str)
    }
}

impl Default for NetworkTable {
    fn default() -> Self {
        Self::builtin()
    }
}
