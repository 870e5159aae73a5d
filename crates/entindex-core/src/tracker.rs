//! Block tracker — a sliding window of recently committed headers used for
//! parent-hash chain verification and reorg recovery.

use std::collections::VecDeque;

use crate::types::BlockHeader;

/// Tracks the last N committed block headers.
///
/// The window bounds how deep a reorg can be recovered from: a fork point
/// older than the window is unrecoverable and surfaces as a fatal error in
/// the orchestrator.
pub struct BlockTracker {
    /// Sliding window of recent blocks (oldest first).
    window: VecDeque<BlockHeader>,
    /// Maximum number of blocks to retain.
    window_size: usize,
}

impl BlockTracker {
    /// Create a new tracker. A window of 128 covers deep reorgs for all
    /// major EVM chains.
    pub fn new(window_size: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(window_size),
            window_size,
        }
    }

    /// Record a newly committed block.
    ///
    /// Returns `Err(header)` without recording if the block does not extend
    /// the current head — the caller should have gone through reorg
    /// recovery first.
    pub fn push(&mut self, header: BlockHeader) -> Result<(), BlockHeader> {
        if let Some(head) = self.window.back() {
            if !header.extends(head) {
                return Err(header);
            }
        }
        if self.window.len() >= self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(header);
        Ok(())
    }

    /// The current head (most recently committed block).
    pub fn head(&self) -> Option<&BlockHeader> {
        self.window.back()
    }

    /// Returns the tracked header at `number`, if still in the window.
    pub fn get(&self, number: u64) -> Option<&BlockHeader> {
        self.window.iter().find(|b| b.number == number)
    }

    /// Number of blocks in the window.
    pub fn len(&self) -> usize {
        self.window.len()
    }

    /// Returns `true` if the window is empty.
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Tracked block numbers, newest first — the order reorg recovery walks
    /// them in.
    pub fn numbers_newest_first(&self) -> impl Iterator<Item = u64> + '_ {
        self.window.iter().rev().map(|b| b.number)
    }

    /// Rewind the tracker to a given block number, discarding everything
    /// after it.
    pub fn rewind_to(&mut self, block_number: u64) {
        while let Some(back) = self.window.back() {
            if back.number > block_number {
                self.window.pop_back();
            } else {
                break;
            }
        }
    }
}
