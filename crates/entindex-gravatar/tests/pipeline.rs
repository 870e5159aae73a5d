//! End-to-end pipeline tests: scripted chains driven through the full
//! fetch → decode → dispatch → commit loop, including a reorg.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use alloy_dyn_abi::DynSolValue;
use alloy_primitives::U256;
use async_trait::async_trait;

use entindex_core::{
    BlockHeader, Entity, HandlerFailurePolicy, HandlerRegistry, IndexerError, LogFilter, RawLog,
    SchemaRegistry,
};
use entindex_evm::{IndexerBuilder, RpcClient};
use entindex_gravatar::{
    register_handlers, register_schemas, schemas, Gravatar, GRAVATAR_REGISTRY,
};
use entindex_store::MemoryPersistence;

const OWNER: &str = "0xd8da6bf26964af9d7eed9e03e53415d37aa96045";

// ─── Scripted chain ───────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct Chain {
    headers: Vec<BlockHeader>,
    logs: HashMap<u64, Vec<RawLog>>,
}

impl Chain {
    fn head(&self) -> u64 {
        self.headers.last().map(|h| h.number).unwrap_or(0)
    }

    fn header(&self, number: u64) -> Option<BlockHeader> {
        self.headers.iter().find(|h| h.number == number).cloned()
    }

    fn push_block(&mut self, hash: &str) -> u64 {
        let number = self.head() + 1;
        let parent_hash = self
            .headers
            .last()
            .map(|h| h.hash.clone())
            .unwrap_or_else(|| "0x0".to_string());
        self.headers.push(BlockHeader {
            number,
            hash: hash.into(),
            parent_hash,
            timestamp: (number * 12) as i64,
            tx_count: 1,
        });
        number
    }

    fn push_log(&mut self, event: &str, id: u64, display_name: &str) {
        let header = self.headers.last().expect("push_block first").clone();
        let fingerprint = schemas()
            .into_iter()
            .find(|s| s.event == event)
            .expect("known gravatar event")
            .fingerprint;
        let owner: alloy_primitives::Address = OWNER.parse().unwrap();
        let data = DynSolValue::Tuple(vec![
            DynSolValue::Uint(U256::from(id), 256),
            DynSolValue::Address(owner),
            DynSolValue::String(display_name.into()),
            DynSolValue::String(format!("https://example.com/{id}.png")),
        ])
        .abi_encode_params();

        let logs = self.logs.entry(header.number).or_default();
        logs.push(RawLog {
            block_number: header.number,
            block_hash: header.hash.clone(),
            tx_hash: format!("0xtx{}x{}", header.number, logs.len()),
            log_index: logs.len() as u32,
            address: GRAVATAR_REGISTRY.into(),
            topics: vec![fingerprint],
            data,
        });
    }
}

/// Serves `before` until `get_block_number` has been called more than
/// `switch_after` times, then serves `after` — simulating the node
/// switching to a heavier fork between polls.
struct SwitchingRpc {
    before: Chain,
    after: Option<Chain>,
    switch_after: u32,
    head_calls: AtomicU32,
}

impl SwitchingRpc {
    fn steady(chain: Chain) -> Self {
        Self {
            before: chain,
            after: None,
            switch_after: u32::MAX,
            head_calls: AtomicU32::new(0),
        }
    }

    fn forking(before: Chain, after: Chain, switch_after: u32) -> Self {
        Self {
            before,
            after: Some(after),
            switch_after,
            head_calls: AtomicU32::new(0),
        }
    }

    fn active(&self) -> &Chain {
        match &self.after {
            Some(after) if self.head_calls.load(Ordering::SeqCst) > self.switch_after => after,
            _ => &self.before,
        }
    }
}

#[async_trait]
impl RpcClient for SwitchingRpc {
    async fn get_block_number(&self) -> Result<u64, IndexerError> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.active().head())
    }

    async fn get_block(&self, number: u64) -> Result<Option<BlockHeader>, IndexerError> {
        Ok(self.active().header(number))
    }

    async fn get_logs(
        &self,
        from: u64,
        to: u64,
        _filter: &LogFilter,
    ) -> Result<Vec<RawLog>, IndexerError> {
        let chain = self.active();
        let mut out = Vec::new();
        for n in from..=to {
            if let Some(logs) = chain.logs.get(&n) {
                out.extend(logs.iter().cloned());
            }
        }
        Ok(out)
    }
}

fn wiring() -> (SchemaRegistry, HandlerRegistry) {
    let mut schema_registry = SchemaRegistry::new();
    register_schemas(&mut schema_registry).unwrap();
    let mut handlers = HandlerRegistry::new();
    register_handlers(&mut handlers).unwrap();
    (schema_registry, handlers)
}

fn builder(to_block: u64) -> IndexerBuilder {
    IndexerBuilder::new()
        .id("gravatar")
        .chain("testchain")
        .from_block(1)
        .to_block(to_block)
        .confirmation_depth(0)
        .poll_interval_ms(1)
        .filter(LogFilter::address(GRAVATAR_REGISTRY))
}

fn gravatar(indexer_store: &entindex_store::EntityStore, id: &str) -> Option<Gravatar> {
    indexer_store
        .get(Gravatar::KIND, id)
        .as_ref()
        .and_then(Gravatar::from_row)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn insert_then_update_round_trip() {
    let mut chain = Chain::default();
    chain.push_block("0xa1");
    chain.push_log("NewGravatar", 1, "Alice");
    chain.push_block("0xa2");
    chain.push_log("UpdatedGravatar", 1, "Alice Cooper");

    let (schema_registry, handlers) = wiring();
    let (mut indexer, _shutdown) = builder(2).build(
        SwitchingRpc::steady(chain),
        schema_registry,
        handlers,
        Arc::new(MemoryPersistence::new()),
    );
    indexer.run().await.unwrap();

    let alice = gravatar(indexer.store(), "1").unwrap();
    assert_eq!(alice.display_name, "Alice Cooper");
    assert_eq!(alice.owner, OWNER);
    assert_eq!(indexer.store().checkpoint().unwrap().block_number, 2);
}

#[tokio::test]
async fn in_block_ordering_makes_insert_visible_to_update() {
    let mut chain = Chain::default();
    chain.push_block("0xa1");
    chain.push_log("NewGravatar", 1, "First");
    chain.push_log("UpdatedGravatar", 1, "Second");

    let (schema_registry, handlers) = wiring();
    let (mut indexer, _shutdown) = builder(1).build(
        SwitchingRpc::steady(chain),
        schema_registry,
        handlers,
        Arc::new(MemoryPersistence::new()),
    );
    indexer.run().await.unwrap();

    assert_eq!(gravatar(indexer.store(), "1").unwrap().display_name, "Second");
}

#[tokio::test]
async fn duplicate_new_gravatar_halts_and_discards_block() {
    let mut chain = Chain::default();
    chain.push_block("0xa1");
    chain.push_log("NewGravatar", 1, "Alice");
    chain.push_block("0xa2");
    chain.push_log("NewGravatar", 1, "Imposter");
    chain.push_log("NewGravatar", 2, "Bob");

    let (schema_registry, handlers) = wiring();
    let (mut indexer, _shutdown) = builder(2).build(
        SwitchingRpc::steady(chain),
        schema_registry,
        handlers,
        Arc::new(MemoryPersistence::new()),
    );
    let err = indexer.run().await.unwrap_err();
    assert!(matches!(err, IndexerError::Handler { block_number: 2, .. }));

    // Block 1 stands; nothing from block 2 leaked through
    assert_eq!(gravatar(indexer.store(), "1").unwrap().display_name, "Alice");
    assert!(gravatar(indexer.store(), "2").is_none());
    assert_eq!(indexer.store().checkpoint().unwrap().block_number, 1);
}

#[tokio::test]
async fn update_on_missing_id_halts_with_store_untouched() {
    let mut chain = Chain::default();
    chain.push_block("0xa1");
    chain.push_log("UpdatedGravatar", 9, "Ghost");

    let (schema_registry, handlers) = wiring();
    let (mut indexer, _shutdown) = builder(1).build(
        SwitchingRpc::steady(chain),
        schema_registry,
        handlers,
        Arc::new(MemoryPersistence::new()),
    );
    let err = indexer.run().await.unwrap_err();
    assert!(matches!(err, IndexerError::Handler { .. }));
    assert!(gravatar(indexer.store(), "9").is_none());
    assert!(indexer.store().checkpoint().is_none());
}

#[tokio::test]
async fn bounded_retry_surfaces_deterministic_handler_failure() {
    let mut chain = Chain::default();
    chain.push_block("0xa1");
    chain.push_log("UpdatedGravatar", 9, "Ghost");

    let (schema_registry, handlers) = wiring();
    let (mut indexer, _shutdown) = builder(1)
        .on_handler_error(HandlerFailurePolicy::Retry { max_attempts: 3 })
        .build(
            SwitchingRpc::steady(chain),
            schema_registry,
            handlers,
            Arc::new(MemoryPersistence::new()),
        );
    // Replaying the same event reproduces the same error; after the retry
    // budget it must surface rather than loop
    let err = indexer.run().await.unwrap_err();
    assert!(matches!(err, IndexerError::Handler { .. }));
    assert!(indexer.store().checkpoint().is_none());
}

#[tokio::test]
async fn unrecognized_and_foreign_logs_are_dropped() {
    let mut chain = Chain::default();
    chain.push_block("0xa1");
    chain.push_log("NewGravatar", 1, "Alice");
    // A log from another contract with an untracked signature
    chain.logs.entry(1).or_default().push(RawLog {
        block_number: 1,
        block_hash: "0xa1".into(),
        tx_hash: "0xother".into(),
        log_index: 5,
        address: GRAVATAR_REGISTRY.into(),
        topics: vec![format!("0x{}", "ee".repeat(32))],
        data: vec![],
    });

    let (schema_registry, handlers) = wiring();
    let (mut indexer, _shutdown) = builder(1).build(
        SwitchingRpc::steady(chain),
        schema_registry,
        handlers,
        Arc::new(MemoryPersistence::new()),
    );
    indexer.run().await.unwrap();
    assert!(gravatar(indexer.store(), "1").is_some());
    assert_eq!(indexer.store().checkpoint().unwrap().block_number, 1);
}

#[tokio::test]
async fn reorg_reverts_forked_blocks_and_resumes() {
    // Canonical chain A: 12 blocks; profiles created at 3 and 10
    let mut before = Chain::default();
    for n in 1..=12u64 {
        before.push_block(&format!("0xa{n}"));
        match n {
            3 => before.push_log("NewGravatar", 3, "keeper"),
            10 => before.push_log("NewGravatar", 10, "short-lived"),
            _ => {}
        }
    }

    // Fork B: shares blocks 1-9, replaces 10-12 and extends to 13
    let mut after = Chain::default();
    for n in 1..=9u64 {
        after.push_block(&format!("0xa{n}"));
        if n == 3 {
            after.push_log("NewGravatar", 3, "keeper");
        }
    }
    for n in 10..=13u64 {
        after.push_block(&format!("0xb{n}"));
        if n == 10 {
            after.push_log("NewGravatar", 100, "replacement");
        }
    }

    let (schema_registry, handlers) = wiring();
    // One head call per processed block: the fork appears after block 12
    let rpc = SwitchingRpc::forking(before, after, 12);
    let (mut indexer, _shutdown) = builder(13).build(
        rpc,
        schema_registry,
        handlers,
        Arc::new(MemoryPersistence::new()),
    );
    indexer.run().await.unwrap();

    // Fork-side state is gone, shared prefix survives, new branch applied
    assert!(gravatar(indexer.store(), "10").is_none());
    assert_eq!(gravatar(indexer.store(), "3").unwrap().display_name, "keeper");
    assert_eq!(gravatar(indexer.store(), "100").unwrap().display_name, "replacement");

    let cp = indexer.store().checkpoint().unwrap();
    assert_eq!(cp.block_number, 13);
    assert_eq!(cp.block_hash, "0xb13");
    assert_eq!(indexer.cursor().last_committed(), Some(13));
}

#[tokio::test]
async fn reprocessing_a_reverted_block_reproduces_its_state() {
    // Revert a committed block, then replay the identical block from the
    // same chain: handlers must land on exactly the state they produced
    // the first time.
    let mut chain = Chain::default();
    chain.push_block("0xa1");
    chain.push_log("NewGravatar", 1, "Alice");
    chain.push_block("0xa2");
    chain.push_log("UpdatedGravatar", 1, "Alice Cooper");
    chain.push_log("NewGravatar", 2, "Bob");

    let persistence = Arc::new(MemoryPersistence::new());

    let (schema_registry, handlers) = wiring();
    let (mut first, _s1) = builder(2).build(
        SwitchingRpc::steady(chain.clone()),
        schema_registry,
        handlers,
        persistence.clone(),
    );
    first.run().await.unwrap();

    let alice_once = gravatar(first.store(), "1").unwrap();
    let bob_once = gravatar(first.store(), "2").unwrap();

    // Drop block 2 as a rollback would
    first.store().revert_to(1).await.unwrap();
    assert_eq!(gravatar(first.store(), "1").unwrap().display_name, "Alice");
    assert!(gravatar(first.store(), "2").is_none());
    assert_eq!(first.store().checkpoint().unwrap().block_number, 1);

    // Replay block 2 from the checkpoint
    let (schema_registry, handlers) = wiring();
    let (mut second, _s2) = builder(2).build(
        SwitchingRpc::steady(chain),
        schema_registry,
        handlers,
        persistence,
    );
    second.run().await.unwrap();

    assert_eq!(gravatar(second.store(), "1").unwrap(), alice_once);
    assert_eq!(gravatar(second.store(), "2").unwrap(), bob_once);
    assert_eq!(second.store().checkpoint().unwrap().block_number, 2);
}

#[tokio::test]
async fn replay_after_restart_is_idempotent() {
    // Same chain indexed twice over one persistence backend: the second run
    // resumes past the checkpoint instead of re-dispatching, so no
    // duplicate-insert failures occur and state is unchanged.
    let mut chain = Chain::default();
    chain.push_block("0xa1");
    chain.push_log("NewGravatar", 1, "Alice");
    chain.push_block("0xa2");
    chain.push_log("UpdatedGravatar", 1, "Alice Cooper");

    let persistence = Arc::new(MemoryPersistence::new());

    let (schema_registry, handlers) = wiring();
    let (mut first, _s1) = builder(2).build(
        SwitchingRpc::steady(chain.clone()),
        schema_registry,
        handlers,
        persistence.clone(),
    );
    first.run().await.unwrap();

    let (schema_registry, handlers) = wiring();
    let (mut second, _s2) = builder(2).build(
        SwitchingRpc::steady(chain),
        schema_registry,
        handlers,
        persistence,
    );
    second.run().await.unwrap();

    let alice = gravatar(second.store(), "1").unwrap();
    assert_eq!(alice.display_name, "Alice Cooper");
    assert_eq!(second.store().checkpoint().unwrap().block_number, 2);
}
