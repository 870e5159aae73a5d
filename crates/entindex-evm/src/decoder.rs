//! ABI event decoder for EVM logs.
//!
//! A log is matched to a schema by its `topics[0]` fingerprint. Indexed
//! parameters decode from `topics[1..]` (one 32-byte word each); non-indexed
//! parameters decode from the data payload as an ABI-encoded sequence.
//! Decoded words are normalized into [`FieldValue`]s so nothing downstream
//! touches raw ABI encoding.

use std::collections::HashMap;

use alloy_dyn_abi::{DynSolType, DynSolValue};

use entindex_core::schema::fingerprint_from_topics;
use entindex_core::{
    DecodeError, DecodedEvent, EventSchema, FieldDef, FieldKind, FieldValue, RawLog,
    SchemaRegistry,
};

/// Outcome of decoding one raw log.
#[derive(Debug)]
pub enum DecodeOutcome {
    /// The fingerprint matched a registered schema and decoding succeeded.
    Decoded(DecodedEvent),
    /// No schema for this log's fingerprint (or address scope) — not an
    /// error, the log is simply not tracked.
    Unrecognized,
}

/// The EVM log decoder. Stateless and cheap to clone.
#[derive(Debug, Default, Clone)]
pub struct EvmDecoder;

impl EvmDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode a raw log against the registry.
    ///
    /// Returns `Err` only when the fingerprint *was* recognized but the
    /// payload does not match the schema — the caller decides whether to
    /// skip or halt.
    pub fn decode(
        &self,
        raw: &RawLog,
        registry: &SchemaRegistry,
    ) -> Result<DecodeOutcome, DecodeError> {
        let Some(fingerprint) = fingerprint_from_topics(&raw.topics) else {
            return Ok(DecodeOutcome::Unrecognized);
        };
        let Some(schema) = registry.get(fingerprint) else {
            return Ok(DecodeOutcome::Unrecognized);
        };
        if !schema.matches_address(&raw.address) {
            return Ok(DecodeOutcome::Unrecognized);
        }

        let mut params: HashMap<String, FieldValue> = HashMap::new();

        for (i, (name, def)) in schema.indexed_fields().iter().enumerate() {
            // topics[0] is the signature
            let topic = raw.topics.get(i + 1).ok_or_else(|| DecodeError::MissingField {
                field: name.to_string(),
            })?;
            params.insert(name.to_string(), decode_topic(topic, def)?);
        }

        for (name, value) in decode_data(&raw.data, &schema.data_fields())? {
            params.insert(name, value);
        }

        Ok(DecodeOutcome::Decoded(DecodedEvent {
            event: schema.event.clone(),
            address: raw.address.clone(),
            tx_hash: raw.tx_hash.clone(),
            block_number: raw.block_number,
            log_index: raw.log_index,
            params,
        }))
    }

    /// The fingerprint a log would be matched under, if it has one.
    pub fn fingerprint<'a>(&self, raw: &'a RawLog) -> Option<&'a str> {
        fingerprint_from_topics(&raw.topics)
    }
}

/// Map a schema field kind to the alloy type used to decode it.
fn kind_to_dyn(kind: &FieldKind) -> DynSolType {
    match kind {
        FieldKind::Uint(bits) => DynSolType::Uint(*bits as usize),
        FieldKind::Int(bits) => DynSolType::Int(*bits as usize),
        FieldKind::Bool => DynSolType::Bool,
        FieldKind::Bytes(n) => DynSolType::FixedBytes(*n as usize),
        FieldKind::BytesVec => DynSolType::Bytes,
        FieldKind::Str => DynSolType::String,
        FieldKind::Address => DynSolType::Address,
    }
}

/// Decode a single indexed topic (always one 32-byte word).
///
/// Value types are stored padded in the topic and decode directly.
/// Reference types (string, bytes) are stored as the keccak256 of their
/// encoding — the original value is unrecoverable, so the raw hash is
/// surfaced as `Bytes`.
fn decode_topic(topic_hex: &str, def: &FieldDef) -> Result<FieldValue, DecodeError> {
    let hex_str = topic_hex.strip_prefix("0x").unwrap_or(topic_hex);
    let word = hex::decode(hex_str).map_err(|e| DecodeError::InvalidLog {
        reason: format!("invalid topic hex: {e}"),
    })?;
    if word.len() != 32 {
        return Err(DecodeError::InvalidLog {
            reason: format!("topic is {} bytes, expected 32", word.len()),
        });
    }
    if def.kind.is_reference() {
        return Ok(FieldValue::Bytes(word));
    }
    let value = kind_to_dyn(&def.kind)
        .abi_decode(&word)
        .map_err(|e| DecodeError::AbiDecodeFailed {
            reason: format!("topic decode: {e}"),
        })?;
    Ok(normalize(value))
}

/// Decode the non-indexed parameters from the data payload.
fn decode_data(
    data: &[u8],
    fields: &[(&str, &FieldDef)],
) -> Result<Vec<(String, FieldValue)>, DecodeError> {
    if fields.is_empty() {
        return Ok(Vec::new());
    }
    let tuple = DynSolType::Tuple(fields.iter().map(|(_, d)| kind_to_dyn(&d.kind)).collect());
    let decoded = tuple
        .abi_decode_sequence(data)
        .map_err(|e| DecodeError::AbiDecodeFailed { reason: e.to_string() })?;
    let values = match decoded {
        DynSolValue::Tuple(vals) => vals,
        other => vec![other],
    };
    if values.len() != fields.len() {
        return Err(DecodeError::AbiDecodeFailed {
            reason: format!("expected {} values, decoded {}", fields.len(), values.len()),
        });
    }
    Ok(fields
        .iter()
        .zip(values)
        .map(|((name, _), value)| (name.to_string(), normalize(value)))
        .collect())
}

/// Normalize an alloy value into a [`FieldValue`].
fn normalize(value: DynSolValue) -> FieldValue {
    match value {
        DynSolValue::Uint(v, _) => match u128::try_from(v) {
            Ok(small) => FieldValue::Uint(small),
            Err(_) => FieldValue::BigUint(v.to_string()),
        },
        DynSolValue::Int(v, _) => FieldValue::BigInt(v.to_string()),
        DynSolValue::Bool(b) => FieldValue::Bool(b),
        DynSolValue::Address(a) => FieldValue::Address(format!("0x{}", hex::encode(a.as_slice()))),
        DynSolValue::FixedBytes(word, size) => FieldValue::Bytes(word[..size].to_vec()),
        DynSolValue::Bytes(b) => FieldValue::Bytes(b),
        DynSolValue::String(s) => FieldValue::Str(s),
        _ => FieldValue::Null,
    }
}

/// Helper for building a registry from a schema list, used by plugin wiring.
pub fn registry_from(schemas: Vec<EventSchema>) -> Result<SchemaRegistry, entindex_core::RegistryError> {
    let mut registry = SchemaRegistry::new();
    for schema in schemas {
        registry.register(schema)?;
    }
    Ok(registry)
}
