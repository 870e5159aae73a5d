//! Event schemas — the declared shape of each tracked contract event.
//!
//! A schema names the event, lists its fields in ABI order, and carries the
//! keccak256 fingerprint of the canonical signature (`topics[0]` on the
//! wire). The registry maps fingerprints to schemas for O(1) lookup during
//! decoding; logs whose fingerprint has no schema are not tracked.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tiny_keccak::{Hasher, Keccak};

use crate::error::RegistryError;

/// Field types a schema can declare. The `Display` form is the canonical
/// Solidity type name used in event signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Unsigned integer. Width in bits.
    Uint(u16),
    /// Signed integer. Width in bits.
    Int(u16),
    Bool,
    /// Fixed-size byte array (bytes1..bytes32). Length in bytes.
    Bytes(u8),
    /// Variable-length byte array.
    BytesVec,
    /// UTF-8 string.
    Str,
    /// 20-byte EVM address.
    Address,
}

impl FieldKind {
    /// Reference types are stored as a keccak hash when indexed — the
    /// original value is unrecoverable from the topic.
    pub fn is_reference(&self) -> bool {
        matches!(self, FieldKind::Str | FieldKind::BytesVec)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Uint(bits) => write!(f, "uint{bits}"),
            FieldKind::Int(bits) => write!(f, "int{bits}"),
            FieldKind::Bool => write!(f, "bool"),
            FieldKind::Bytes(n) => write!(f, "bytes{n}"),
            FieldKind::BytesVec => write!(f, "bytes"),
            FieldKind::Str => write!(f, "string"),
            FieldKind::Address => write!(f, "address"),
        }
    }
}

/// Definition of a single field within an event schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub kind: FieldKind,
    /// EVM: is this an indexed topic?
    pub indexed: bool,
}

impl FieldDef {
    pub fn new(kind: FieldKind) -> Self {
        Self { kind, indexed: false }
    }

    pub fn indexed(kind: FieldKind) -> Self {
        Self { kind, indexed: true }
    }
}

/// A declared event shape: name, ordered fields, and signature fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSchema {
    /// Event name as emitted by the contract, e.g. `"NewGravatar"`.
    pub event: String,
    /// Contract address this schema is scoped to — `None` means any address.
    pub address: Option<String>,
    /// Ordered field definitions (order matters for ABI decode).
    pub fields: Vec<(String, FieldDef)>,
    /// keccak256 of the canonical signature — matches `topics[0]`.
    pub fingerprint: String,
}

impl EventSchema {
    /// Build a schema and compute its fingerprint from the field list.
    pub fn new(event: impl Into<String>, fields: Vec<(&str, FieldDef)>) -> Self {
        let event = event.into();
        let fields: Vec<(String, FieldDef)> =
            fields.into_iter().map(|(n, d)| (n.to_string(), d)).collect();
        let signature = canonical_signature(&event, &fields);
        let fingerprint = keccak256_signature(&signature);
        Self {
            event,
            address: None,
            fields,
            fingerprint,
        }
    }

    /// Scope the schema to a single contract address.
    pub fn at_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// The canonical ABI signature, e.g. `"NewGravatar(uint256,address,string,string)"`.
    pub fn signature(&self) -> String {
        canonical_signature(&self.event, &self.fields)
    }

    /// Returns only the indexed fields (decoded from `topics[1..]`).
    pub fn indexed_fields(&self) -> Vec<(&str, &FieldDef)> {
        self.fields
            .iter()
            .filter(|(_, f)| f.indexed)
            .map(|(k, v)| (k.as_str(), v))
            .collect()
    }

    /// Returns only the non-indexed fields (decoded from the data payload).
    pub fn data_fields(&self) -> Vec<(&str, &FieldDef)> {
        self.fields
            .iter()
            .filter(|(_, f)| !f.indexed)
            .map(|(k, v)| (k.as_str(), v))
            .collect()
    }

    /// Returns `true` if the schema applies to a log emitted by `address`.
    pub fn matches_address(&self, address: &str) -> bool {
        match &self.address {
            Some(a) => a.eq_ignore_ascii_case(address),
            None => true,
        }
    }
}

fn canonical_signature(event: &str, fields: &[(String, FieldDef)]) -> String {
    let types: Vec<String> = fields.iter().map(|(_, d)| d.kind.to_string()).collect();
    format!("{event}({})", types.join(","))
}

/// Compute the keccak256 fingerprint of an event signature string.
pub fn keccak256_signature(signature: &str) -> String {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(signature.as_bytes());
    hasher.finalize(&mut output);
    format!("0x{}", hex::encode(output))
}

/// Extract the fingerprint from a log's topics (`topics[0]`).
/// Returns `None` if topics is empty or the first topic is malformed.
pub fn fingerprint_from_topics(topics: &[String]) -> Option<&str> {
    let first = topics.first()?;
    let hex = first.strip_prefix("0x").unwrap_or(first);
    if hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(first.as_str())
    } else {
        None
    }
}

/// In-memory fingerprint → schema registry.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    by_fingerprint: HashMap<String, EventSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema. Two schemas with the same fingerprint would make
    /// decoding ambiguous, so re-registration is rejected.
    pub fn register(&mut self, schema: EventSchema) -> Result<(), RegistryError> {
        let key = schema.fingerprint.to_ascii_lowercase();
        if self.by_fingerprint.contains_key(&key) {
            return Err(RegistryError::DuplicateSchema {
                fingerprint: schema.fingerprint,
            });
        }
        self.by_fingerprint.insert(key, schema);
        Ok(())
    }

    /// Look up a schema by fingerprint (`topics[0]`).
    pub fn get(&self, fingerprint: &str) -> Option<&EventSchema> {
        self.by_fingerprint.get(&fingerprint.to_ascii_lowercase())
    }

    /// Number of registered schemas.
    pub fn len(&self) -> usize {
        self.by_fingerprint.len()
    }

    /// Returns `true` if no schemas are registered.
    pub fn is_empty(&self) -> bool {
        self.by_fingerprint.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer_schema() -> EventSchema {
        EventSchema::new(
            "Transfer",
            vec![
                ("from", FieldDef::indexed(FieldKind::Address)),
                ("to", FieldDef::indexed(FieldKind::Address)),
                ("value", FieldDef::new(FieldKind::Uint(256))),
            ],
        )
    }

    #[test]
    fn erc20_transfer_fingerprint() {
        // Well-known topic0 for Transfer(address,address,uint256)
        let schema = transfer_schema();
        assert_eq!(schema.signature(), "Transfer(address,address,uint256)");
        assert_eq!(
            schema.fingerprint,
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn indexed_and_data_field_split() {
        let schema = transfer_schema();
        assert_eq!(schema.indexed_fields().len(), 2);
        assert_eq!(schema.data_fields().len(), 1);
        assert_eq!(schema.data_fields()[0].0, "value");
    }

    #[test]
    fn registry_lookup_case_insensitive() {
        let mut reg = SchemaRegistry::new();
        reg.register(transfer_schema()).unwrap();
        let fp = "0xDDF252AD1BE2C89B69C2B068FC378DAA952BA7F163C4A11628F55A4DF523B3EF";
        assert!(reg.get(fp).is_some());
    }

    #[test]
    fn registry_rejects_duplicate() {
        let mut reg = SchemaRegistry::new();
        reg.register(transfer_schema()).unwrap();
        let err = reg.register(transfer_schema()).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateSchema { .. }));
    }

    #[test]
    fn fingerprint_from_topics_validates() {
        let good = vec![
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef".to_string(),
        ];
        assert!(fingerprint_from_topics(&good).is_some());
        assert!(fingerprint_from_topics(&[]).is_none());
        assert!(fingerprint_from_topics(&["0xnothex".to_string()]).is_none());
    }

    #[test]
    fn address_scoping() {
        let schema = transfer_schema().at_address("0xAbC");
        assert!(schema.matches_address("0xabc"));
        assert!(!schema.matches_address("0xdef"));
    }
}
