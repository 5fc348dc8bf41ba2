//! Error types for the leaderboard synchronization pipeline.

use thiserror::Error;

/// Errors that can occur during a synchronization pass or a leaderboard read.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Sync for network '{network}' already running (lease held by {holder})")]
    LeaseHeld { network: String, holder: String },

    #[error("Checkpoint for network '{network}' moved: expected {expected:?}, found {actual:?}")]
    CheckpointConflict {
        network: String,
        expected: Option<u64>,
        actual: Option<u64>,
    },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Amount overflow while aggregating {field} for {address}")]
    AmountOverflow { address: String, field: &'static str },

    #[error("{0}")]
    Other(String),
}

impl SyncError {
    /// Returns `true` for configuration problems (fatal, nothing was touched).
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns `true` if calling again later may succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Rpc(_) | Self::LeaseHeld { .. } | Self::CheckpointConflict { .. }
        )
    }
}
