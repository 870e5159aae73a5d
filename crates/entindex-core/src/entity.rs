//! Entity rows and mutations.
//!
//! Entities are schema-typed records keyed by a unique `id`. Handlers never
//! write entities directly — they emit `Mutation`s through the block context,
//! and the store applies them at commit. Insert, update, and delete are
//! distinct operations with distinct failure modes; nothing is inferred from
//! the shape of the record.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::value::FieldValue;

/// A single persisted entity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRow {
    /// Unique key within the entity type.
    pub id: String,
    /// Field name → value. BTreeMap for stable serialization order.
    pub fields: BTreeMap<String, FieldValue>,
}

impl EntityRow {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Get a field value by name.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

/// A typed view over an `EntityRow`. Plugins implement this for their
/// schema-declared entities (e.g. `Gravatar`).
pub trait Entity: Sized {
    /// Entity type name — the store table key.
    const KIND: &'static str;

    /// The entity's unique id.
    fn id(&self) -> &str;

    /// Convert to the untyped row representation.
    fn to_row(&self) -> EntityRow;

    /// Reconstruct from a row. Returns `None` if required fields are
    /// missing or mistyped.
    fn from_row(row: &EntityRow) -> Option<Self>;
}

/// One buffered store mutation, recorded in dispatch order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Mutation {
    Insert { entity: String, row: EntityRow },
    Update { entity: String, row: EntityRow },
    Delete { entity: String, id: String },
}

impl Mutation {
    /// The entity type this mutation targets.
    pub fn entity(&self) -> &str {
        match self {
            Mutation::Insert { entity, .. }
            | Mutation::Update { entity, .. }
            | Mutation::Delete { entity, .. } => entity,
        }
    }

    /// The entity id this mutation targets.
    pub fn id(&self) -> &str {
        match self {
            Mutation::Insert { row, .. } | Mutation::Update { row, .. } => &row.id,
            Mutation::Delete { id, .. } => id,
        }
    }
}
