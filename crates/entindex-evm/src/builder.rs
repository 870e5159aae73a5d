//! Fluent builder for wiring up an [`Indexer`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use entindex_core::{HandlerRegistry, LogFilter, SchemaRegistry};
//! use entindex_evm::IndexerBuilder;
//! use entindex_store::MemoryPersistence;
//! # use entindex_evm::reader::RpcClient;
//! # fn wire(client: impl RpcClient) {
//! let (indexer, shutdown) = IndexerBuilder::new()
//!     .id("gravatar")
//!     .chain("ethereum")
//!     .from_block(6_175_000)
//!     .confirmation_depth(12)
//!     .filter(LogFilter::address("0x2E645469f354BB4F5c8a05B3b30A929361cf77eC"))
//!     .build(
//!         client,
//!         SchemaRegistry::new(),
//!         HandlerRegistry::new(),
//!         Arc::new(MemoryPersistence::new()),
//!     );
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::watch;

use entindex_core::{
    HandlerFailurePolicy, HandlerRegistry, IndexerConfig, LogFilter, MissingUpdate,
    SchemaRegistry,
};
use entindex_store::Persistence;

use crate::orchestrator::Indexer;
use crate::reader::RpcClient;
use crate::retry::RetryConfig;

/// Fluent builder over [`IndexerConfig`] plus the reader's retry policy.
#[derive(Default)]
pub struct IndexerBuilder {
    config: IndexerConfig,
    retry: RetryConfig,
}

impl IndexerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexer name, used for checkpoint keys.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.config.id = id.into();
        self
    }

    /// Chain to index.
    pub fn chain(mut self, chain: impl Into<String>) -> Self {
        self.config.chain = chain.into();
        self
    }

    /// First block to index.
    pub fn from_block(mut self, block: u64) -> Self {
        self.config.from_block = block;
        self
    }

    /// End block for bounded runs.
    pub fn to_block(mut self, block: u64) -> Self {
        self.config.to_block = Some(block);
        self
    }

    /// Blocks behind head before a block counts as confirmed.
    pub fn confirmation_depth(mut self, depth: u64) -> Self {
        self.config.confirmation_depth = depth;
        self
    }

    /// Blocks per `eth_getLogs` batch.
    pub fn batch_size(mut self, size: u64) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Polling interval when the head has not advanced.
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// How many committed blocks stay revertible.
    pub fn reorg_window(mut self, window: u64) -> Self {
        self.config.reorg_window = window;
        self
    }

    /// Address/topic filter for the reader.
    pub fn filter(mut self, filter: LogFilter) -> Self {
        self.config.filter = filter;
        self
    }

    /// Upsert behavior for `update` on a missing entity.
    pub fn on_missing_update(mut self, mode: MissingUpdate) -> Self {
        self.config.on_missing_update = mode;
        self
    }

    /// Reaction to handler failures.
    pub fn on_handler_error(mut self, policy: HandlerFailurePolicy) -> Self {
        self.config.on_handler_error = policy;
        self
    }

    /// Log each dropped unrecognized log at debug level.
    pub fn log_unrecognized(mut self, enabled: bool) -> Self {
        self.config.log_unrecognized = enabled;
        self
    }

    /// RPC retry/backoff configuration.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// The assembled [`IndexerConfig`], without building the indexer.
    pub fn build_config(self) -> IndexerConfig {
        self.config
    }

    /// Build the indexer and its shutdown handle.
    pub fn build<C: RpcClient>(
        self,
        client: C,
        schemas: SchemaRegistry,
        handlers: HandlerRegistry,
        persistence: Arc<dyn Persistence>,
    ) -> (Indexer<C>, watch::Sender<bool>) {
        Indexer::new(self.config, client, schemas, handlers, persistence, self.retry)
    }
}
