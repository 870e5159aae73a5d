//! Error types for the entindex pipeline.

use thiserror::Error;

/// Errors that can occur during indexing.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Decode error at block {block_number} log {log_index}: {source}")]
    Decode {
        block_number: u64,
        log_index: u32,
        #[source]
        source: DecodeError,
    },

    #[error("Handler error for {event} at block {block_number} log {log_index}: {source}")]
    Handler {
        event: String,
        block_number: u64,
        log_index: u32,
        #[source]
        source: HandlerError,
    },

    #[error("Reorg detected at block {block_number}: expected parent {expected}, got {actual}")]
    ReorgDetected {
        block_number: u64,
        expected: String,
        actual: String,
    },

    #[error("Indexer aborted: {reason}")]
    Aborted { reason: String },

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Returns `true` if the error is a reorg (recoverable via rollback).
    pub fn is_reorg(&self) -> bool {
        matches!(self, Self::ReorgDetected { .. })
    }
}

impl From<StoreError> for IndexerError {
    fn from(e: StoreError) -> Self {
        Self::Storage(e.to_string())
    }
}

/// Errors from the entity store.
///
/// `EntityExists` and `EntityNotFound` are the handler-visible failure modes
/// of `insert` and `update`/`delete`; `Backend` wraps durable-storage
/// failures, which are fatal for the current run.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("entity {entity} with id '{id}' already exists")]
    EntityExists { entity: String, id: String },

    #[error("entity {entity} with id '{id}' not found")]
    EntityNotFound { entity: String, id: String },

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Errors that can occur while decoding a single log against a recognized
/// schema. An unrecognized signature is not an error — it is a skip.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("ABI decode failed: {reason}")]
    AbiDecodeFailed { reason: String },

    #[error("missing required field: {field}")]
    MissingField { field: String },

    #[error("invalid raw log: {reason}")]
    InvalidLog { reason: String },
}

/// Errors returned by event handlers.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("missing event param: {name}")]
    MissingParam { name: String },

    #[error("bad event param {name}: {reason}")]
    BadParam { name: String, reason: String },

    #[error("{0}")]
    Other(String),
}

/// Errors from the schema and handler registries.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("handler already registered for {address} / {event}")]
    DuplicateHandler { address: String, event: String },

    #[error("schema already registered for fingerprint {fingerprint}")]
    DuplicateSchema { fingerprint: String },
}
