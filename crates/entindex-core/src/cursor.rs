//! Indexer cursor — the indexer's position in the chain.

use serde::{Deserialize, Serialize};

/// The next block to process, plus the hash of the last committed block.
///
/// The reader uses the hash to verify that the next fetched block extends
/// the committed chain; a mismatch means a reorg. Before the first commit
/// there is no previous block, so the hash is `None` and continuity is not
/// checked for the first fetched block. Storing the next height directly
/// keeps a start block of 0 exact — there is no previous height to derive
/// it from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    next_block: u64,
    last_hash: Option<String>,
}

impl Cursor {
    /// Cursor positioned so that `from_block` is the next block to process.
    pub fn starting_at(from_block: u64) -> Self {
        Self {
            next_block: from_block,
            last_hash: None,
        }
    }

    /// Cursor positioned just after a committed block — checkpoint resume.
    pub fn at(block_number: u64, block_hash: impl Into<String>) -> Self {
        Self {
            next_block: block_number + 1,
            last_hash: Some(block_hash.into()),
        }
    }

    /// Advance past a newly committed block.
    pub fn advance(&mut self, block_number: u64, block_hash: impl Into<String>) {
        self.next_block = block_number + 1;
        self.last_hash = Some(block_hash.into());
    }

    /// Rewind to an earlier committed block (reorg recovery).
    pub fn rewind(&mut self, block_number: u64, block_hash: impl Into<String>) {
        self.next_block = block_number + 1;
        self.last_hash = Some(block_hash.into());
    }

    /// The next block to process.
    pub fn next_block(&self) -> u64 {
        self.next_block
    }

    /// The last committed block, `None` before the first commit.
    pub fn last_committed(&self) -> Option<u64> {
        self.last_hash.as_ref().map(|_| self.next_block - 1)
    }

    /// Hash of the last committed block, `None` before the first commit.
    pub fn last_hash(&self) -> Option<&str> {
        self.last_hash.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_cursor_has_no_hash() {
        let cursor = Cursor::starting_at(100);
        assert_eq!(cursor.next_block(), 100);
        assert!(cursor.last_hash().is_none());
        assert!(cursor.last_committed().is_none());
    }

    #[test]
    fn genesis_start_targets_block_zero() {
        let mut cursor = Cursor::starting_at(0);
        assert_eq!(cursor.next_block(), 0);
        assert!(cursor.last_committed().is_none());

        cursor.advance(0, "0xgenesis");
        assert_eq!(cursor.last_committed(), Some(0));
        assert_eq!(cursor.next_block(), 1);
    }

    #[test]
    fn resume_positions_after_checkpoint() {
        let cursor = Cursor::at(100, "0xaaa");
        assert_eq!(cursor.next_block(), 101);
        assert_eq!(cursor.last_committed(), Some(100));
        assert_eq!(cursor.last_hash(), Some("0xaaa"));
    }

    #[test]
    fn advance_and_rewind() {
        let mut cursor = Cursor::starting_at(100);
        cursor.advance(100, "0xaaa");
        cursor.advance(101, "0xbbb");
        assert_eq!(cursor.next_block(), 102);

        cursor.rewind(100, "0xaaa");
        assert_eq!(cursor.last_committed(), Some(100));
        assert_eq!(cursor.last_hash(), Some("0xaaa"));
    }
}
