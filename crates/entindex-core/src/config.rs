//! Indexer configuration and runtime state.

use serde::{Deserialize, Serialize};

use crate::types::LogFilter;

/// What `update` does when the target entity does not exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingUpdate {
    /// Fail with entity-not-found (default — updates never create).
    #[default]
    Fail,
    /// Upsert: treat the update as an insert.
    Insert,
}

/// How the orchestrator reacts when a handler fails.
///
/// Re-deriving the same event deterministically reproduces the same error,
/// so retries are bounded and the failure always surfaces to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerFailurePolicy {
    /// Roll back the block and halt the run with a diagnostic.
    Halt,
    /// Roll back and re-process the block up to `max_attempts` times, then
    /// halt with the original diagnostic.
    Retry { max_attempts: u32 },
}

impl Default for HandlerFailurePolicy {
    fn default() -> Self {
        Self::Halt
    }
}

/// Configuration for an indexer instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Unique name for this indexer (used for checkpoint keys).
    pub id: String,
    /// Chain to index (e.g. `"ethereum"`).
    pub chain: String,
    /// First block to index.
    pub from_block: u64,
    /// Optional end block (for bounded runs). `None` = run forever.
    pub to_block: Option<u64>,
    /// Number of blocks to wait before considering a block confirmed.
    pub confirmation_depth: u64,
    /// How many blocks to batch-fetch per `eth_getLogs` call.
    pub batch_size: u64,
    /// Block polling interval when the head has not advanced (milliseconds).
    pub poll_interval_ms: u64,
    /// How many committed blocks to keep revertible (reorg window).
    pub reorg_window: u64,
    /// Event/address filter.
    pub filter: LogFilter,
    /// Upsert behavior for `update` on a missing entity.
    pub on_missing_update: MissingUpdate,
    /// Reaction to handler failures.
    pub on_handler_error: HandlerFailurePolicy,
    /// Log each dropped unrecognized log at debug level. Default off: a
    /// contract may emit events the indexer does not track.
    pub log_unrecognized: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            id: "default".into(),
            chain: "ethereum".into(),
            from_block: 0,
            to_block: None,
            confirmation_depth: 12,
            batch_size: 1000,
            poll_interval_ms: 2000,
            reorg_window: 128,
            filter: LogFilter::default(),
            on_missing_update: MissingUpdate::Fail,
            on_handler_error: HandlerFailurePolicy::Halt,
            log_unrecognized: false,
        }
    }
}

/// Runtime state of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexerState {
    /// Not yet started.
    Idle,
    /// Waiting on the reader for the next block.
    Fetching,
    /// Decoding the fetched block's logs.
    Decoding,
    /// Invoking handlers inside the block transaction.
    Dispatching,
    /// Applying the block's buffer and advancing the checkpoint.
    Committing,
    /// Reverting to the fork point after a reorg.
    RollingBack,
    /// Terminated (shutdown, end of range, or unrecoverable failure).
    Stopped,
}

impl std::fmt::Display for IndexerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Fetching => write!(f, "fetching"),
            Self::Decoding => write!(f, "decoding"),
            Self::Dispatching => write!(f, "dispatching"),
            Self::Committing => write!(f, "committing"),
            Self::RollingBack => write!(f, "rolling-back"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}
