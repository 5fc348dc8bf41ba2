//! Range planner: turns (checkpoint, chain head) into the next scan window.
//!
//! The window is capped at `max_range` blocks so a single `eth_getLogs` call
//! stays under provider range limits, which also bounds the work of one pass.

use serde::{Deserialize, Serialize};

use crate::types::Window;

/// How the start of a plan was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStart {
    /// Continuing after an existing checkpoint.
    Resume,
    /// No checkpoint yet: genesis height, explicit start, or head − lookback.
    FirstRun,
    /// Operator-requested reset; the only way the checkpoint moves backward.
    Reset,
}

/// The outcome of planning one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// First block that should be scanned.
    pub from_block: u64,
    /// Checkpoint value to write before fetching (first run and reset only).
    pub pin: Option<u64>,
    /// The window to scan, or `None` when `from_block` is past the head.
    pub window: Option<Window>,
    pub start: PlanStart,
}

/// Computes scan windows.
#[derive(Debug, Clone, Copy)]
pub struct RangePlanner {
    max_range: u64,
    lookback: u64,
}

impl RangePlanner {
    /// `max_range` is clamped to at least one block.
    pub fn new(max_range: u64, lookback: u64) -> Self {
        Self {
            max_range: max_range.max(1),
            lookback,
        }
    }

    pub fn max_range(&self) -> u64 {
        self.max_range
    }

    /// Plan the next window.
    ///
    /// - `last_processed`: the stored checkpoint, `None` if never synced.
    /// - `head`: the chain's current block height.
    /// - `genesis`: the network's configured first-event height, if any.
    /// - `reset` / `requested_from`: the operator's overrides from the request.
    pub fn plan(
        &self,
        last_processed: Option<u64>,
        head: u64,
        genesis: Option<u64>,
        reset: bool,
        requested_from: Option<u64>,
    ) -> Plan {
        let (from_block, pin, start) = if reset {
            let from = requested_from.or(genesis).unwrap_or(0);
            (from, Some(from.saturating_sub(1)), PlanStart::Reset)
        } else if let Some(last) = last_processed {
            if let Some(requested) = requested_from {
                tracing::warn!(
                    requested,
                    checkpoint = last,
                    "explicit start block ignored without reset; resuming from checkpoint"
                );
            }
            (last.saturating_add(1), None, PlanStart::Resume)
        } else {
            let from = requested_from
                .or(genesis)
                .unwrap_or_else(|| head.saturating_sub(self.lookback));
            (from, Some(from.saturating_sub(1)), PlanStart::FirstRun)
        };

        let window = if from_block > head {
            None
        } else {
            let to_block = from_block
                .saturating_add(self.max_range - 1)
                .min(head);
            Some(Window::new(from_block, to_block))
        };

        Plan {
            from_block,
            pin,
            window,
            start,
        }
    }
}

impl Default for RangePlanner {
    fn default() -> Self {
        Self::new(1000, 1000)
    }
}
