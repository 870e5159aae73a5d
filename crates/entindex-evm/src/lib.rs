//! entindex-evm — the EVM side of the pipeline.
//!
//! [`ChainReader`] pulls confirmed blocks and their logs from a JSON-RPC
//! provider, [`EvmDecoder`] turns recognized logs into typed events, and
//! [`Indexer`] drives the fetch → decode → dispatch → commit loop with
//! reorg recovery.

pub mod builder;
pub mod decoder;
pub mod orchestrator;
pub mod reader;
pub mod retry;

pub use builder::IndexerBuilder;
pub use decoder::{DecodeOutcome, EvmDecoder};
pub use orchestrator::Indexer;
pub use reader::{BlockData, ChainReader, NextBlock, RpcClient};
pub use retry::{RetryConfig, RetryPolicy};
