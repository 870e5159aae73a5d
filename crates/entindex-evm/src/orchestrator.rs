//! The indexer orchestrator — drives fetch → decode → dispatch → commit.
//!
//! One orchestrator per chain. Each iteration asks the reader for the next
//! confirmed block, decodes its logs, dispatches the recognized events into
//! a fresh block transaction, and commits the buffer atomically together
//! with the checkpoint. A reorg rolls the store back to the fork point and
//! resumes; it is recovery, not failure.
//!
//! Shutdown is honored only at block boundaries, so a block is always either
//! fully committed or not applied at all.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use entindex_core::{
    BlockTracker, Cursor, DecodedEvent, HandlerFailurePolicy, HandlerRegistry, IndexerConfig,
    IndexerError, IndexerState, Mutation, ReorgEvent, SchemaRegistry,
};
use entindex_store::{EntityStore, Persistence};

use crate::decoder::{DecodeOutcome, EvmDecoder};
use crate::reader::{BlockData, ChainReader, NextBlock, RpcClient};
use crate::retry::{RetryConfig, RetryPolicy};

/// The per-chain indexing engine.
pub struct Indexer<C: RpcClient> {
    config: IndexerConfig,
    reader: ChainReader<C>,
    decoder: EvmDecoder,
    schemas: SchemaRegistry,
    handlers: HandlerRegistry,
    store: EntityStore,
    tracker: BlockTracker,
    cursor: Cursor,
    state: IndexerState,
    shutdown: watch::Receiver<bool>,
}

impl<C: RpcClient> Indexer<C> {
    /// Wire up an indexer. Returns the shutdown handle; sending `true`
    /// stops the run at the next block boundary.
    pub fn new(
        config: IndexerConfig,
        client: C,
        schemas: SchemaRegistry,
        handlers: HandlerRegistry,
        persistence: Arc<dyn Persistence>,
        retry: RetryConfig,
    ) -> (Self, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let reader = ChainReader::new(
            client,
            RetryPolicy::new(retry),
            config.confirmation_depth,
            config.batch_size,
            config.to_block,
        );
        let store = EntityStore::new(
            config.chain.clone(),
            config.id.clone(),
            config.reorg_window,
            persistence,
        );
        let cursor = Cursor::starting_at(config.from_block);
        let tracker = BlockTracker::new(config.reorg_window as usize);
        let indexer = Self {
            reader,
            decoder: EvmDecoder::new(),
            schemas,
            handlers,
            store,
            tracker,
            cursor,
            state: IndexerState::Idle,
            shutdown: rx,
            config,
        };
        (indexer, tx)
    }

    pub fn state(&self) -> IndexerState {
        self.state
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Run until the end of the configured range, shutdown, or an
    /// unrecoverable error.
    pub async fn run(&mut self) -> Result<(), IndexerError> {
        if let Some(cp) = self.store.load().await? {
            if cp.block_number + 1 > self.config.from_block {
                info!(
                    chain = %self.config.chain,
                    block = cp.block_number,
                    hash = %cp.block_hash,
                    "resuming from checkpoint"
                );
                self.cursor = Cursor::at(cp.block_number, cp.block_hash);
            }
        }

        loop {
            if *self.shutdown.borrow() {
                info!(chain = %self.config.chain, next_block = self.cursor.next_block(), "shutdown requested");
                self.state = IndexerState::Stopped;
                return Ok(());
            }

            self.state = IndexerState::Fetching;
            match self.reader.next_block(&self.cursor, &self.config.filter).await? {
                NextBlock::EndOfStream => {
                    info!(chain = %self.config.chain, next_block = self.cursor.next_block(), "end of range reached");
                    self.state = IndexerState::Stopped;
                    return Ok(());
                }
                NextBlock::NotReady => self.wait_for_head().await,
                NextBlock::ReorgDetected { divergent_block, expected, actual } => {
                    warn!(
                        chain = %self.config.chain,
                        block = divergent_block,
                        expected = %expected,
                        actual = %actual,
                        "reorg detected"
                    );
                    self.state = IndexerState::RollingBack;
                    self.rollback(divergent_block).await?;
                }
                NextBlock::Block(block) => {
                    if let Err(e) = self.process_block(block).await {
                        self.state = IndexerState::Stopped;
                        return Err(e);
                    }
                }
            }
        }
    }

    async fn wait_for_head(&mut self) {
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)) => {}
            _ = shutdown.changed() => {}
        }
    }

    async fn process_block(&mut self, block: BlockData) -> Result<(), IndexerError> {
        let header = block.header;

        self.state = IndexerState::Decoding;
        let mut events = Vec::new();
        for log in &block.logs {
            match self.decoder.decode(log, &self.schemas) {
                Ok(DecodeOutcome::Decoded(event)) => events.push(event),
                Ok(DecodeOutcome::Unrecognized) => {
                    if self.config.log_unrecognized {
                        debug!(
                            block = log.block_number,
                            log_index = log.log_index,
                            topic0 = log.topic0().unwrap_or(""),
                            "unrecognized log dropped"
                        );
                    }
                }
                Err(e) => {
                    warn!(
                        block = log.block_number,
                        log_index = log.log_index,
                        error = %e,
                        "log decode failed, skipping"
                    );
                }
            }
        }

        let max_attempts = match self.config.on_handler_error {
            HandlerFailurePolicy::Halt => 1,
            HandlerFailurePolicy::Retry { max_attempts } => max_attempts.max(1),
        };

        let mut attempt = 1u32;
        let mutations = loop {
            self.state = IndexerState::Dispatching;
            // Handlers are deterministic over (events, committed state), so
            // only the dispatch step is retried; the buffer of a failed
            // attempt is discarded whole.
            match self.dispatch_block(&events) {
                Ok(m) => break m,
                Err(e) => {
                    warn!(
                        block = header.number,
                        attempt,
                        max_attempts,
                        error = %e,
                        "handler failed, block buffer discarded"
                    );
                    if attempt >= max_attempts {
                        return Err(e);
                    }
                    attempt += 1;
                }
            }
        };

        self.state = IndexerState::Committing;
        // The tracker enforces head continuity; a rejected push means the
        // block must not be committed.
        if let Err(rejected) = self.tracker.push(header.clone()) {
            return Err(IndexerError::Other(format!(
                "block {} does not extend the tracked chain",
                rejected.number
            )));
        }
        let mutation_count = mutations.len();
        self.store.commit(header.number, &header.hash, mutations).await?;
        self.cursor.advance(header.number, header.hash);

        info!(
            chain = %self.config.chain,
            block = header.number,
            events = events.len(),
            mutations = mutation_count,
            "block committed"
        );
        Ok(())
    }

    /// Dispatch a block's events, in log order, into one fresh transaction.
    fn dispatch_block(&self, events: &[DecodedEvent]) -> Result<Vec<Mutation>, IndexerError> {
        let mut ctx = self.store.begin_block(self.config.on_missing_update);
        for event in events {
            match self.handlers.dispatch(event, &mut ctx) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(event = %event.event, address = %event.address, "no handler registered, event skipped");
                }
                Err(e) => {
                    return Err(IndexerError::Handler {
                        event: event.event.clone(),
                        block_number: event.block_number,
                        log_index: event.log_index,
                        source: e,
                    });
                }
            }
        }
        Ok(ctx.into_mutations())
    }

    /// Walk back from the divergence point to the deepest block both sides
    /// agree on, revert the store to it, and rewind cursor and tracker.
    async fn rollback(&mut self, divergent_block: u64) -> Result<(), IndexerError> {
        self.reader.invalidate_cache();

        let floor = self
            .cursor
            .last_committed()
            .unwrap_or(self.config.from_block)
            .saturating_sub(self.config.reorg_window);
        let mut number = divergent_block.saturating_sub(1);
        let fork = loop {
            if number < self.config.from_block {
                break None;
            }
            let local = match self.tracker.get(number) {
                Some(h) => Some(h.hash.clone()),
                None => self.store.block_hash(number).await?,
            };
            let Some(local) = local else {
                return Err(IndexerError::Aborted {
                    reason: format!("fork point below block {number} is outside the reorg window"),
                });
            };
            let canonical = self.reader.canonical_header(number).await?;
            if canonical.as_ref().map(|h| h.hash.as_str()) == Some(local.as_str()) {
                break Some((number, local));
            }
            if number <= floor {
                return Err(IndexerError::Aborted {
                    reason: format!(
                        "chain diverged deeper than the reorg window (no common ancestor above block {floor})"
                    ),
                });
            }
            number -= 1;
        };

        match fork {
            Some((fork_point, fork_hash)) => {
                let reorg = ReorgEvent::at_divergence(fork_point + 1, &self.tracker);
                self.store.revert_to(fork_point).await?;
                self.tracker.rewind_to(fork_point);
                self.cursor.rewind(fork_point, fork_hash);
                warn!(
                    chain = %self.config.chain,
                    fork_point,
                    depth = reorg.depth,
                    "reorg recovered, resuming"
                );
            }
            None => {
                // Everything the indexer ever committed was orphaned.
                let target = self.config.from_block.saturating_sub(1);
                self.store.revert_to(target).await?;
                self.tracker.rewind_to(target);
                self.cursor = Cursor::starting_at(self.config.from_block);
                warn!(
                    chain = %self.config.chain,
                    from_block = self.config.from_block,
                    "entire indexed range reverted, restarting from configured start block"
                );
            }
        }
        Ok(())
    }
}
