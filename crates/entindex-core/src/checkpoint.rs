//! Checkpoints — the durable marker of the last fully committed block.
//!
//! A checkpoint is written as part of the same durable transaction that
//! applies a block's entity mutations, so crash recovery always resumes
//! from a block boundary with no partial entity state.

use serde::{Deserialize, Serialize};

/// A persisted checkpoint for one indexer on one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Chain slug (e.g. `"ethereum"`).
    pub chain_id: String,
    /// Unique indexer identifier.
    pub indexer_id: String,
    /// Last committed block number.
    pub block_number: u64,
    /// Last committed block hash.
    pub block_hash: String,
    /// Unix timestamp of when this checkpoint was saved.
    pub updated_at: i64,
}

impl Checkpoint {
    /// Build a checkpoint stamped with the current time.
    pub fn new(
        chain_id: impl Into<String>,
        indexer_id: impl Into<String>,
        block_number: u64,
        block_hash: impl Into<String>,
    ) -> Self {
        Self {
            chain_id: chain_id.into(),
            indexer_id: indexer_id.into(),
            block_number,
            block_hash: block_hash.into(),
            updated_at: chrono::Utc::now().timestamp(),
        }
    }
}
