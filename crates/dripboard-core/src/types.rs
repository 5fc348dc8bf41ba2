//! Shared types for the synchronization pipeline.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

// ─── Window ──────────────────────────────────────────────────────────────────

/// A bounded, contiguous block range scanned in one pass (both ends inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub from_block: u64,
    pub to_block: u64,
}

impl Window {
    pub fn new(from_block: u64, to_block: u64) -> Self {
        Self {
            from_block,
            to_block,
        }
    }

    /// Number of blocks covered by the window.
    pub fn width(&self) -> u64 {
        self.to_block - self.from_block + 1
    }

    pub fn contains(&self, block: u64) -> bool {
        block >= self.from_block && block <= self.to_block
    }

    /// The checkpoint value the store must hold before this window commits.
    pub fn expected_checkpoint(&self) -> u64 {
        self.from_block.saturating_sub(1)
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.from_block, self.to_block)
    }
}

// ─── Decoded events ──────────────────────────────────────────────────────────

/// The leaderboard-relevant events emitted by the streaming contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    StreamCreated { sender: String, deposit: U256 },
    StreamWithdrawn { recipient: String, amount: U256 },
}

impl StreamEvent {
    /// The account the event is credited to (lower-cased `0x…`).
    pub fn subject(&self) -> &str {
        match self {
            Self::StreamCreated { sender, .. } => sender,
            Self::StreamWithdrawn { recipient, .. } => recipient,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::StreamCreated { .. } => "StreamCreated",
            Self::StreamWithdrawn { .. } => "StreamWithdrawn",
        }
    }
}

/// A typed event together with where it was found on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvent {
    pub event: StreamEvent,
    /// Contract address the log was fetched from.
    pub source: String,
    pub block_number: u64,
    pub log_index: u64,
    pub tx_hash: String,
}

// ─── AccountStats ────────────────────────────────────────────────────────────

/// Aggregate leaderboard statistics for one account.
///
/// Amounts are decimal strings of the token's base unit so they survive any
/// storage backend without precision loss.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStats {
    pub address: String,
    pub streams_created: u64,
    pub withdrawals_claimed: u64,
    pub total_deposited: String,
    pub total_withdrawn: String,
    pub score: u64,
    /// Unix timestamp (seconds) of the last update.
    pub updated_at: i64,
}

impl AccountStats {
    /// A zeroed row for `address`. Used for unranked lookups and as the
    /// starting point of a create-if-absent upsert.
    pub fn empty(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            streams_created: 0,
            withdrawals_claimed: 0,
            total_deposited: "0".into(),
            total_withdrawn: "0".into(),
            score: 0,
            updated_at: 0,
        }
    }

    pub fn deposited(&self) -> Result<U256, SyncError> {
        parse_amount(&self.total_deposited)
    }

    pub fn withdrawn(&self) -> Result<U256, SyncError> {
        parse_amount(&self.total_withdrawn)
    }
}

/// Parse a decimal amount string as stored in [`AccountStats`].
pub fn parse_amount(s: &str) -> Result<U256, SyncError> {
    U256::from_str_radix(s.trim(), 10)
        .map_err(|e| SyncError::Storage(format!("invalid stored amount '{s}': {e}")))
}

/// Validate and lower-case an EVM address (`0x` + 40 hex chars).
pub fn normalize_address(address: &str) -> Result<String, SyncError> {
    let trimmed = address.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| SyncError::InvalidAddress(address.to_string()))?;
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(SyncError::InvalidAddress(address.to_string()));
    }
    Ok(format!("0x{}", hex.to_ascii_lowercase()))
}

// ─── Tests ────────────────────────────────────────────────────────────────────
