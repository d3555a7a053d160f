//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default slot length.
pub const DEFAULT_SLOT_DURATION_MS: u64 = 10_000;

/// Default cap on transactions pulled from the pool per proposal.
pub const DEFAULT_MAX_BLOCK_TRANSACTIONS: usize = 10;

/// Consensus engine settings. Durations are in milliseconds so the struct
/// maps directly onto the node's config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Length of one slot
    pub slot_duration_ms: u64,
    /// Deadline for the proposal and validation steps; 0 means half a slot
    pub step_timeout_ms: u64,
    /// Maximum transactions per proposed block
    pub max_block_transactions: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            slot_duration_ms: DEFAULT_SLOT_DURATION_MS,
            step_timeout_ms: 0,
            max_block_transactions: DEFAULT_MAX_BLOCK_TRANSACTIONS,
        }
    }
}

impl EngineConfig {
    /// Slot interval, at least one millisecond.
    pub fn slot_duration(&self) -> Duration {
        Duration::from_millis(self.slot_duration_ms.max(1))
    }

    /// Per-step deadline, never longer than a slot.
    pub fn step_timeout(&self) -> Duration {
        let slot = self.slot_duration();
        if self.step_timeout_ms == 0 {
            (slot / 2).max(Duration::from_millis(1))
        } else {
            Duration::from_millis(self.step_timeout_ms).min(slot)
        }
    }
}
