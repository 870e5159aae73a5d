//! Decoded events — the typed output of the decoder, input to handlers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::HandlerError;
use crate::value::FieldValue;

/// A fully decoded contract event. Only produced for logs whose fingerprint
/// matched a registered schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodedEvent {
    /// Matched schema's event name, e.g. `"NewGravatar"`.
    pub event: String,
    /// Contract address that emitted the event.
    pub address: String,
    /// Transaction hash.
    pub tx_hash: String,
    /// Block number.
    pub block_number: u64,
    /// Log index within the block — dispatch order.
    pub log_index: u32,
    /// Decoded, normalized parameter values keyed by field name.
    pub params: HashMap<String, FieldValue>,
}

impl DecodedEvent {
    /// Get a parameter value by name.
    pub fn param(&self, name: &str) -> Option<&FieldValue> {
        self.params.get(name)
    }

    /// Get a parameter or fail with the handler-facing missing-param error.
    pub fn require(&self, name: &str) -> Result<&FieldValue, HandlerError> {
        self.params.get(name).ok_or_else(|| HandlerError::MissingParam {
            name: name.to_string(),
        })
    }
}
