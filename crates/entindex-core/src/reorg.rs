//! Reorg description and rollback planning.
//!
//! Detection itself happens at the reader (parent-hash mismatch against the
//! cursor); this module describes what must be rolled back once the fork
//! point is known.

use crate::tracker::BlockTracker;
use crate::types::BlockHeader;

/// Describes a detected chain reorganization.
#[derive(Debug, Clone)]
pub struct ReorgEvent {
    /// First invalidated block number — everything at or above this height
    /// is reverted.
    pub divergent_block: u64,
    /// The committed blocks being dropped, most recent first.
    pub dropped_blocks: Vec<BlockHeader>,
    /// Number of blocks rolled back.
    pub depth: u64,
}

impl ReorgEvent {
    /// Plan a rollback given the fork point: every tracked block at or
    /// above `divergent_block` is dropped.
    pub fn at_divergence(divergent_block: u64, tracker: &BlockTracker) -> Self {
        let mut dropped = Vec::new();
        for number in tracker.numbers_newest_first() {
            if number < divergent_block {
                break;
            }
            if let Some(h) = tracker.get(number) {
                dropped.push(h.clone());
            }
        }
        let depth = dropped.len() as u64;
        Self {
            divergent_block,
            dropped_blocks: dropped,
            depth,
        }
    }

    /// The block the store reverts to and the cursor rewinds to.
    pub fn revert_target(&self) -> u64 {
        self.divergent_block.saturating_sub(1)
    }
}
