//! Shared types for the ingestion pipeline.

use serde::{Deserialize, Serialize};

// ─── BlockHeader ──────────────────────────────────────────────────────────────

/// A minimal block header — enough for the orchestrator to track progress
/// and verify parent-hash continuity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block number.
    pub number: u64,
    /// Block hash (`0x…`).
    pub hash: String,
    /// Parent block hash (`0x…`).
    pub parent_hash: String,
    /// Unix timestamp of the block (seconds since epoch).
    pub timestamp: i64,
    /// Number of transactions in the block.
    pub tx_count: u32,
}

impl BlockHeader {
    /// Returns `true` if `parent` is the direct parent of `self`.
    pub fn extends(&self, parent: &BlockHeader) -> bool {
        self.number == parent.number + 1 && self.parent_hash == parent.hash
    }
}

// ─── RawLog ───────────────────────────────────────────────────────────────────

/// A raw, undecoded contract log as produced by the chain reader.
///
/// `topics[0]` is the event signature hash; additional topics are indexed
/// parameters. `data` holds the ABI-encoded non-indexed parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLog {
    /// Block number the log was emitted in.
    pub block_number: u64,
    /// Hash of that block.
    pub block_hash: String,
    /// Transaction hash.
    pub tx_hash: String,
    /// Log index within the block — dispatch order.
    pub log_index: u32,
    /// Contract address that emitted the log.
    pub address: String,
    /// Ordered topics (`0x…` 32-byte hex strings).
    pub topics: Vec<String>,
    /// ABI-encoded non-indexed parameters.
    pub data: Vec<u8>,
}

impl RawLog {
    /// Returns `topics[0]` — the event signature fingerprint — if present.
    pub fn topic0(&self) -> Option<&str> {
        self.topics.first().map(|s| s.as_str())
    }
}

// ─── LogFilter ────────────────────────────────────────────────────────────────

/// Filter for which logs the reader fetches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogFilter {
    /// Only fetch logs from these contract addresses (empty = all addresses).
    pub addresses: Vec<String>,
    /// Only fetch logs with these topic[0] values (empty = all events).
    pub topic0_values: Vec<String>,
}

impl LogFilter {
    /// Create a filter for a single contract address.
    pub fn address(addr: impl Into<String>) -> Self {
        Self {
            addresses: vec![addr.into()],
            ..Default::default()
        }
    }

    /// Add a topic0 filter (event signature hash).
    pub fn topic0(mut self, topic: impl Into<String>) -> Self {
        self.topic0_values.push(topic.into());
        self
    }

    /// Returns `true` if `address` matches this filter.
    pub fn matches_address(&self, address: &str) -> bool {
        self.addresses.is_empty()
            || self.addresses.iter().any(|a| a.eq_ignore_ascii_case(address))
    }

    /// Returns `true` if `topic0` matches this filter.
    pub fn matches_topic0(&self, topic0: &str) -> bool {
        self.topic0_values.is_empty()
            || self.topic0_values.iter().any(|t| t.eq_ignore_ascii_case(topic0))
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_extends_parent() {
        let parent = BlockHeader {
            number: 100,
            hash: "0xaaa".into(),
            parent_hash: "0x000".into(),
            timestamp: 1000,
            tx_count: 5,
        };
        let child = BlockHeader {
            number: 101,
            hash: "0xbbb".into(),
            parent_hash: "0xaaa".into(),
            timestamp: 1012,
            tx_count: 3,
        };
        assert!(child.extends(&parent));
        assert!(!parent.extends(&child));
    }

    #[test]
    fn header_extends_false_on_gap() {
        let a = BlockHeader {
            number: 100,
            hash: "0xaaa".into(),
            parent_hash: "0x000".into(),
            timestamp: 1000,
            tx_count: 0,
        };
        let b = BlockHeader {
            number: 102, // gap
            hash: "0xccc".into(),
            parent_hash: "0xaaa".into(),
            timestamp: 1024,
            tx_count: 0,
        };
        assert!(!b.extends(&a));
    }

    #[test]
    fn log_filter_matches_address() {
        let f = LogFilter::address("0xAbCdEf");
        assert!(f.matches_address("0xabcdef")); // case-insensitive
        assert!(!f.matches_address("0x111111"));
    }

    #[test]
    fn log_filter_empty_matches_all() {
        let f = LogFilter::default();
        assert!(f.matches_address("0xanything"));
        assert!(f.matches_topic0("0xanything"));
    }

    #[test]
    fn raw_log_topic0() {
        let log = RawLog {
            block_number: 1,
            block_hash: "0xb".into(),
            tx_hash: "0xt".into(),
            log_index: 0,
            address: "0xa".into(),
            topics: vec!["0xsig".into(), "0xidx".into()],
            data: vec![],
        };
        assert_eq!(log.topic0(), Some("0xsig"));
    }
}
