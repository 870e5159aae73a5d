//! EVM chain reader.
//!
//! Wraps a JSON-RPC client behind the [`RpcClient`] trait, batches
//! `eth_getLogs` over confirmed ranges, and hands the orchestrator one
//! verified block at a time. Parent-hash continuity against the cursor is
//! checked here, so a reorg surfaces as [`NextBlock::ReorgDetected`] before
//! any log of the forked block is processed.

use std::collections::HashMap;
use std::future::Future;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use entindex_core::{BlockHeader, Cursor, IndexerError, LogFilter, RawLog};

use crate::retry::RetryPolicy;

/// Minimal JSON-RPC surface the reader needs.
///
/// Implementations over raw JSON-RPC responses can build headers and logs
/// with [`header_from_json`] and [`log_from_json`].
#[async_trait]
pub trait RpcClient: Send + Sync {
    /// Current head block number.
    async fn get_block_number(&self) -> Result<u64, IndexerError>;
    /// Header for a block, `None` if the node does not have it yet.
    async fn get_block(&self, number: u64) -> Result<Option<BlockHeader>, IndexerError>;
    /// All logs in `[from, to]` matching the filter.
    async fn get_logs(
        &self,
        from: u64,
        to: u64,
        filter: &LogFilter,
    ) -> Result<Vec<RawLog>, IndexerError>;
}

/// One confirmed block with its matching logs, in log-index order.
#[derive(Debug, Clone)]
pub struct BlockData {
    pub header: BlockHeader,
    pub logs: Vec<RawLog>,
}

/// Outcome of asking the reader for the block after the cursor.
#[derive(Debug)]
pub enum NextBlock {
    /// The next confirmed block, continuity verified.
    Block(BlockData),
    /// The head has not advanced far enough yet — poll again later.
    NotReady,
    /// The configured end block has been passed.
    EndOfStream,
    /// The fetched block's parent hash does not match the committed chain.
    ReorgDetected {
        divergent_block: u64,
        expected: String,
        actual: String,
    },
}

/// Prefetched logs for a contiguous confirmed range. Empty when `from > to`.
struct LogCache {
    from: u64,
    to: u64,
    by_block: HashMap<u64, Vec<RawLog>>,
}

impl LogCache {
    fn empty() -> Self {
        Self { from: 1, to: 0, by_block: HashMap::new() }
    }

    fn covers(&self, number: u64) -> bool {
        self.from <= number && number <= self.to
    }
}

/// Reader over an [`RpcClient`] with retry, confirmation depth, and
/// range-batched log fetching.
pub struct ChainReader<C> {
    client: C,
    policy: RetryPolicy,
    confirmation_depth: u64,
    batch_size: u64,
    to_block: Option<u64>,
    cache: LogCache,
}

impl<C: RpcClient> ChainReader<C> {
    pub fn new(
        client: C,
        policy: RetryPolicy,
        confirmation_depth: u64,
        batch_size: u64,
        to_block: Option<u64>,
    ) -> Self {
        Self {
            client,
            policy,
            confirmation_depth,
            batch_size: batch_size.max(1),
            to_block,
            cache: LogCache::empty(),
        }
    }

    /// Fetch the block after the cursor, if it is confirmed.
    pub async fn next_block(
        &mut self,
        cursor: &Cursor,
        filter: &LogFilter,
    ) -> Result<NextBlock, IndexerError> {
        let next = cursor.next_block();
        if let Some(to) = self.to_block {
            if next > to {
                return Ok(NextBlock::EndOfStream);
            }
        }

        let head = self
            .with_retries("get_block_number", || self.client.get_block_number())
            .await?;
        let confirmed = head.saturating_sub(self.confirmation_depth);
        if next > confirmed {
            return Ok(NextBlock::NotReady);
        }

        let header = match self
            .with_retries("get_block", || self.client.get_block(next))
            .await?
        {
            Some(h) => h,
            None => return Ok(NextBlock::NotReady),
        };

        if let Some(expected) = cursor.last_hash() {
            if header.parent_hash != expected {
                return Ok(NextBlock::ReorgDetected {
                    divergent_block: next,
                    expected: expected.to_string(),
                    actual: header.parent_hash.clone(),
                });
            }
        }

        if !self.cache.covers(next) {
            self.refill_cache(next, confirmed, filter).await?;
        }
        let mut logs = self.cache.by_block.remove(&next).unwrap_or_default();
        // Topic-less (anonymous-event) logs pass through unless an explicit
        // topic0 filter is set; the decoder classifies them as unrecognized.
        logs.retain(|l| {
            filter.matches_address(&l.address)
                && l.topic0()
                    .map(|t| filter.matches_topic0(t))
                    .unwrap_or(filter.topic0_values.is_empty())
        });
        logs.sort_by_key(|l| l.log_index);

        Ok(NextBlock::Block(BlockData { header, logs }))
    }

    /// Header of `number` on the node's current canonical chain. Used by
    /// reorg recovery to locate the fork point.
    pub async fn canonical_header(
        &self,
        number: u64,
    ) -> Result<Option<BlockHeader>, IndexerError> {
        self.with_retries("get_block", || self.client.get_block(number))
            .await
    }

    /// Drop prefetched logs. Called after a rollback — the cached range may
    /// belong to the abandoned fork.
    pub fn invalidate_cache(&mut self) {
        self.cache = LogCache::empty();
    }

    async fn refill_cache(
        &mut self,
        from: u64,
        confirmed: u64,
        filter: &LogFilter,
    ) -> Result<(), IndexerError> {
        let mut to = (from + self.batch_size - 1).min(confirmed);
        if let Some(end) = self.to_block {
            to = to.min(end);
        }
        let logs = self
            .with_retries("get_logs", || self.client.get_logs(from, to, filter))
            .await?;

        let mut by_block: HashMap<u64, Vec<RawLog>> = HashMap::new();
        for log in logs {
            by_block.entry(log.block_number).or_default().push(log);
        }
        self.cache = LogCache { from, to, by_block };
        Ok(())
    }

    async fn with_retries<T, F, Fut>(&self, what: &str, op: F) -> Result<T, IndexerError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, IndexerError>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e @ IndexerError::Rpc(_)) => {
                    attempt += 1;
                    match self.policy.backoff(attempt) {
                        Some(delay) => {
                            warn!(what, attempt, error = %e, "rpc call failed, retrying");
                            tokio::time::sleep(delay).await;
                        }
                        None => return Err(e),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// ─── JSON-RPC response helpers ────────────────────────────────────────────────

/// Parse a hex-encoded quantity (with or without `0x`) to u64. `None` on
/// malformed input, so a corrupt response surfaces as a parse failure
/// instead of a silent block 0.
pub fn parse_hex_u64(s: &str) -> Option<u64> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16).ok()
}

/// Convert an `eth_getBlockByNumber` response to a [`BlockHeader`].
pub fn header_from_json(v: &Value) -> Option<BlockHeader> {
    Some(BlockHeader {
        number: parse_hex_u64(v["number"].as_str()?)?,
        hash: v["hash"].as_str()?.to_string(),
        parent_hash: v["parentHash"].as_str()?.to_string(),
        timestamp: parse_hex_u64(v["timestamp"].as_str()?)? as i64,
        tx_count: v["transactions"].as_array().map(|a| a.len() as u32).unwrap_or(0),
    })
}

/// Convert one `eth_getLogs` entry to a [`RawLog`].
pub fn log_from_json(v: &Value) -> Option<RawLog> {
    let data_hex = v["data"].as_str()?;
    let data = hex::decode(data_hex.strip_prefix("0x").unwrap_or(data_hex)).ok()?;
    let topics = v["topics"]
        .as_array()?
        .iter()
        .filter_map(|t| t.as_str().map(String::from))
        .collect();
    Some(RawLog {
        block_number: parse_hex_u64(v["blockNumber"].as_str()?)?,
        block_hash: v["blockHash"].as_str()?.to_string(),
        tx_hash: v["transactionHash"].as_str()?.to_string(),
        log_index: parse_hex_u64(v["logIndex"].as_str()?)? as u32,
        address: v["address"].as_str()?.to_string(),
        topics,
        data,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryConfig;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Linear chain of blocks from `start` to `len`; every block carries one
    /// log from `address`.
    struct LinearChain {
        start: u64,
        len: u64,
        address: String,
        topic0: String,
        failures: AtomicU32,
    }

    impl LinearChain {
        fn new(len: u64) -> Self {
            Self {
                start: 1,
                len,
                address: "0xc0ffee".into(),
                topic0: format!("0x{}", "ab".repeat(32)),
                failures: AtomicU32::new(0),
            }
        }

        fn from_genesis(len: u64) -> Self {
            Self { start: 0, ..Self::new(len) }
        }

        fn header(&self, n: u64) -> BlockHeader {
            BlockHeader {
                number: n,
                hash: format!("0xh{n}"),
                parent_hash: format!("0xh{}", n.saturating_sub(1)),
                timestamp: (n * 12) as i64,
                tx_count: 1,
            }
        }
    }

    #[async_trait]
    impl RpcClient for LinearChain {
        async fn get_block_number(&self) -> Result<u64, IndexerError> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(IndexerError::Rpc("connection reset".into()));
            }
            Ok(self.len)
        }

        async fn get_block(&self, number: u64) -> Result<Option<BlockHeader>, IndexerError> {
            Ok((number >= self.start && number <= self.len).then(|| self.header(number)))
        }

        async fn get_logs(
            &self,
            from: u64,
            to: u64,
            _filter: &LogFilter,
        ) -> Result<Vec<RawLog>, IndexerError> {
            Ok((from.max(self.start)..=to.min(self.len))
                .map(|n| RawLog {
                    block_number: n,
                    block_hash: format!("0xh{n}"),
                    tx_hash: format!("0xt{n}"),
                    log_index: 0,
                    address: self.address.clone(),
                    topics: vec![self.topic0.clone()],
                    data: vec![],
                })
                .collect())
        }
    }

    fn reader(chain: LinearChain, depth: u64, to_block: Option<u64>) -> ChainReader<LinearChain> {
        let policy = RetryPolicy::new(RetryConfig {
            initial_backoff: std::time::Duration::from_millis(1),
            ..Default::default()
        });
        ChainReader::new(chain, policy, depth, 100, to_block)
    }

    #[tokio::test]
    async fn serves_confirmed_blocks_in_order() {
        let mut r = reader(LinearChain::new(20), 5, None);
        let cursor = Cursor::starting_at(1);
        match r.next_block(&cursor, &LogFilter::default()).await.unwrap() {
            NextBlock::Block(b) => {
                assert_eq!(b.header.number, 1);
                assert_eq!(b.logs.len(), 1);
            }
            other => panic!("expected Block, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn genesis_start_serves_block_zero_first() {
        let mut r = reader(LinearChain::from_genesis(4), 0, None);
        let mut cursor = Cursor::starting_at(0);
        for n in 0..=4 {
            match r.next_block(&cursor, &LogFilter::default()).await.unwrap() {
                NextBlock::Block(b) => {
                    assert_eq!(b.header.number, n);
                    cursor.advance(n, b.header.hash);
                }
                other => panic!("expected block {n}, got {other:?}"),
            }
        }
        assert_eq!(cursor.last_committed(), Some(4));
    }

    #[tokio::test]
    async fn confirmation_depth_holds_back_head() {
        let mut r = reader(LinearChain::new(10), 5, None);
        let mut cursor = Cursor::starting_at(6);
        // Block 6 > confirmed head (10 - 5 = 5)
        assert!(matches!(
            r.next_block(&cursor, &LogFilter::default()).await.unwrap(),
            NextBlock::NotReady
        ));
        cursor = Cursor::starting_at(5);
        assert!(matches!(
            r.next_block(&cursor, &LogFilter::default()).await.unwrap(),
            NextBlock::Block(_)
        ));
    }

    #[tokio::test]
    async fn end_of_stream_past_to_block() {
        let mut r = reader(LinearChain::new(20), 0, Some(3));
        let mut cursor = Cursor::starting_at(1);
        for n in 1..=3 {
            match r.next_block(&cursor, &LogFilter::default()).await.unwrap() {
                NextBlock::Block(b) => cursor.advance(n, b.header.hash),
                other => panic!("expected Block, got {other:?}"),
            }
        }
        assert!(matches!(
            r.next_block(&cursor, &LogFilter::default()).await.unwrap(),
            NextBlock::EndOfStream
        ));
    }

    #[tokio::test]
    async fn parent_hash_mismatch_is_reorg() {
        let mut r = reader(LinearChain::new(20), 0, None);
        let cursor = Cursor::at(4, "0xnot-the-real-hash-of-4");
        match r.next_block(&cursor, &LogFilter::default()).await.unwrap() {
            NextBlock::ReorgDetected { divergent_block, .. } => {
                assert_eq!(divergent_block, 5);
            }
            other => panic!("expected ReorgDetected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn filter_drops_unmatched_logs() {
        let mut r = reader(LinearChain::new(20), 0, None);
        let cursor = Cursor::starting_at(1);
        let filter = LogFilter::address("0xsomeoneelse");
        match r.next_block(&cursor, &filter).await.unwrap() {
            NextBlock::Block(b) => assert!(b.logs.is_empty()),
            other => panic!("expected Block, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transient_rpc_failures_are_retried() {
        let chain = LinearChain::new(20);
        chain.failures.store(2, Ordering::SeqCst);
        let mut r = reader(chain, 0, None);
        let cursor = Cursor::starting_at(1);
        assert!(matches!(
            r.next_block(&cursor, &LogFilter::default()).await.unwrap(),
            NextBlock::Block(_)
        ));
    }

    /// Every block carries a single log with no topics at all, the shape an
    /// anonymous Solidity event produces.
    struct AnonymousChain;

    #[async_trait]
    impl RpcClient for AnonymousChain {
        async fn get_block_number(&self) -> Result<u64, IndexerError> {
            Ok(5)
        }

        async fn get_block(&self, number: u64) -> Result<Option<BlockHeader>, IndexerError> {
            Ok(Some(BlockHeader {
                number,
                hash: format!("0xh{number}"),
                parent_hash: format!("0xh{}", number.saturating_sub(1)),
                timestamp: (number * 12) as i64,
                tx_count: 1,
            }))
        }

        async fn get_logs(
            &self,
            from: u64,
            to: u64,
            _filter: &LogFilter,
        ) -> Result<Vec<RawLog>, IndexerError> {
            Ok((from..=to)
                .map(|n| RawLog {
                    block_number: n,
                    block_hash: format!("0xh{n}"),
                    tx_hash: format!("0xt{n}"),
                    log_index: 0,
                    address: "0xc0ffee".into(),
                    topics: vec![],
                    data: vec![1],
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn anonymous_logs_reach_the_decoder() {
        let policy = RetryPolicy::new(RetryConfig::default());
        let mut r = ChainReader::new(AnonymousChain, policy, 0, 100, None);
        let cursor = Cursor::starting_at(1);
        match r.next_block(&cursor, &LogFilter::default()).await.unwrap() {
            NextBlock::Block(b) => {
                assert_eq!(b.logs.len(), 1);
                assert!(b.logs[0].topics.is_empty());
            }
            other => panic!("expected Block, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn topic_filter_drops_anonymous_logs() {
        let policy = RetryPolicy::new(RetryConfig::default());
        let mut r = ChainReader::new(AnonymousChain, policy, 0, 100, None);
        let cursor = Cursor::starting_at(1);
        let filter = LogFilter::default().topic0(format!("0x{}", "cd".repeat(32)));
        match r.next_block(&cursor, &filter).await.unwrap() {
            NextBlock::Block(b) => assert!(b.logs.is_empty()),
            other => panic!("expected Block, got {other:?}"),
        }
    }

    #[test]
    fn json_helpers() {
        assert_eq!(parse_hex_u64("0xff"), Some(255));
        assert_eq!(parse_hex_u64("0x"), None);
        assert_eq!(parse_hex_u64("not-a-quantity"), None);
        let log = log_from_json(&serde_json::json!({
            "address": "0xc0ffee",
            "topics": ["0xsig"],
            "data": "0xdead",
            "blockNumber": "0x10",
            "blockHash": "0xbh",
            "transactionHash": "0xth",
            "logIndex": "0x2",
        }))
        .unwrap();
        assert_eq!(log.block_number, 16);
        assert_eq!(log.log_index, 2);
        assert_eq!(log.data, vec![0xde, 0xad]);
    }

    #[test]
    fn malformed_quantities_are_rejected() {
        let log = log_from_json(&serde_json::json!({
            "address": "0xc0ffee",
            "topics": ["0xsig"],
            "data": "0xdead",
            "blockNumber": "0xzz",
            "blockHash": "0xbh",
            "transactionHash": "0xth",
            "logIndex": "0x2",
        }));
        assert!(log.is_none());

        let header = header_from_json(&serde_json::json!({
            "number": "garbage",
            "hash": "0xh",
            "parentHash": "0xp",
            "timestamp": "0x1",
            "transactions": [],
        }));
        assert!(header.is_none());
    }
}
