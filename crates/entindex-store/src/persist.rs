//! Durable persistence behind the entity store.
//!
//! A backend applies one committed block at a time: entity changes, the undo
//! journal for that block, the block hash, and the checkpoint all land in a
//! single durable transaction — crash mid-commit leaves no partial state.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use entindex_core::{Checkpoint, EntityRow, Mutation, StoreError};

/// Undo information for one mutation: the value the entity had before the
/// mutation was applied (`None` = did not exist). Replayed in reverse to
/// revert a block.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct UndoEntry {
    pub entity: String,
    pub id: String,
    pub prev: Option<EntityRow>,
}

/// A durable backend for entity tables, undo journal, block hashes, and
/// checkpoints.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Apply one committed block atomically: entity mutations, the block's
    /// undo journal, its block hash, and the checkpoint. Journal and block
    /// hashes older than `prune_before` may be discarded — they are outside
    /// the reorg window.
    async fn apply(
        &self,
        checkpoint: &Checkpoint,
        mutations: &[Mutation],
        undo: &[UndoEntry],
        prune_before: u64,
    ) -> Result<(), StoreError>;

    /// Revert all blocks above `block_number` by replaying their undo
    /// journals in reverse, and rewind the checkpoint accordingly.
    async fn revert_to(
        &self,
        chain_id: &str,
        indexer_id: &str,
        block_number: u64,
    ) -> Result<(), StoreError>;

    /// Load all committed entities for a chain: `(entity kind, row)` pairs.
    async fn load_entities(&self, chain_id: &str) -> Result<Vec<(String, EntityRow)>, StoreError>;

    /// Load the checkpoint for a chain + indexer pair.
    async fn load_checkpoint(
        &self,
        chain_id: &str,
        indexer_id: &str,
    ) -> Result<Option<Checkpoint>, StoreError>;

    /// The recorded hash of a committed block, if still inside the reorg
    /// window.
    async fn block_hash(
        &self,
        chain_id: &str,
        block_number: u64,
    ) -> Result<Option<String>, StoreError>;
}

// ─── In-memory backend ────────────────────────────────────────────────────────

#[derive(Default)]
struct MemState {
    /// chain → (entity, id) → row
    entities: HashMap<String, HashMap<(String, String), EntityRow>>,
    /// chain → block → undo entries in mutation order
    journal: HashMap<String, BTreeMap<u64, Vec<UndoEntry>>>,
    /// chain → block → hash
    blocks: HashMap<String, BTreeMap<u64, String>>,
    /// (chain, indexer) → checkpoint
    checkpoints: HashMap<(String, String), Checkpoint>,
}

/// In-memory persistence for tests and ephemeral indexers.
///
/// All data is lost when the process exits; the commit/revert semantics are
/// identical to the SQLite backend.
#[derive(Default)]
pub struct MemoryPersistence {
    state: Mutex<MemState>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn apply(
        &self,
        checkpoint: &Checkpoint,
        mutations: &[Mutation],
        undo: &[UndoEntry],
        prune_before: u64,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let chain = checkpoint.chain_id.clone();

        let entities = state.entities.entry(chain.clone()).or_default();
        for m in mutations {
            match m {
                Mutation::Insert { entity, row } | Mutation::Update { entity, row } => {
                    entities.insert((entity.clone(), row.id.clone()), row.clone());
                }
                Mutation::Delete { entity, id } => {
                    entities.remove(&(entity.clone(), id.clone()));
                }
            }
        }

        let journal = state.journal.entry(chain.clone()).or_default();
        journal.insert(checkpoint.block_number, undo.to_vec());
        journal.retain(|b, _| *b >= prune_before);

        let blocks = state.blocks.entry(chain.clone()).or_default();
        blocks.insert(checkpoint.block_number, checkpoint.block_hash.clone());
        blocks.retain(|b, _| *b >= prune_before);

        state.checkpoints.insert(
            (chain, checkpoint.indexer_id.clone()),
            checkpoint.clone(),
        );
        Ok(())
    }

    async fn revert_to(
        &self,
        chain_id: &str,
        indexer_id: &str,
        block_number: u64,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();

        let reverted: Vec<(u64, Vec<UndoEntry>)> = state
            .journal
            .get(chain_id)
            .map(|j| {
                j.range(block_number + 1..)
                    .map(|(b, e)| (*b, e.clone()))
                    .collect()
            })
            .unwrap_or_default();

        let entities = state.entities.entry(chain_id.to_string()).or_default();
        for (_, entries) in reverted.iter().rev() {
            for entry in entries.iter().rev() {
                let key = (entry.entity.clone(), entry.id.clone());
                match &entry.prev {
                    Some(row) => {
                        entities.insert(key, row.clone());
                    }
                    None => {
                        entities.remove(&key);
                    }
                }
            }
        }

        if let Some(j) = state.journal.get_mut(chain_id) {
            j.retain(|b, _| *b <= block_number);
        }
        let surviving_hash = state
            .blocks
            .get_mut(chain_id)
            .map(|blocks| {
                blocks.retain(|b, _| *b <= block_number);
                blocks.get(&block_number).cloned()
            })
            .unwrap_or(None);

        let key = (chain_id.to_string(), indexer_id.to_string());
        match surviving_hash {
            Some(hash) => {
                state.checkpoints.insert(
                    key,
                    Checkpoint::new(chain_id, indexer_id, block_number, hash),
                );
            }
            None => {
                state.checkpoints.remove(&key);
            }
        }
        Ok(())
    }

    async fn load_entities(&self, chain_id: &str) -> Result<Vec<(String, EntityRow)>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .entities
            .get(chain_id)
            .map(|m| {
                m.iter()
                    .map(|((entity, _), row)| (entity.clone(), row.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn load_checkpoint(
        &self,
        chain_id: &str,
        indexer_id: &str,
    ) -> Result<Option<Checkpoint>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .checkpoints
            .get(&(chain_id.to_string(), indexer_id.to_string()))
            .cloned())
    }

    async fn block_hash(
        &self,
        chain_id: &str,
        block_number: u64,
    ) -> Result<Option<String>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .blocks
            .get(chain_id)
            .and_then(|b| b.get(&block_number))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entindex_core::FieldValue;

    fn row(id: &str, owner: &str) -> EntityRow {
        EntityRow::new(id).field("owner", FieldValue::Address(owner.into()))
    }

    fn insert(id: &str, owner: &str) -> Mutation {
        Mutation::Insert {
            entity: "Gravatar".into(),
            row: row(id, owner),
        }
    }

    #[tokio::test]
    async fn apply_then_load() {
        let p = MemoryPersistence::new();
        let cp = Checkpoint::new("ethereum", "idx", 100, "0xaaa");
        let undo = vec![UndoEntry {
            entity: "Gravatar".into(),
            id: "1".into(),
            prev: None,
        }];
        p.apply(&cp, &[insert("1", "0xA")], &undo, 0).await.unwrap();

        let entities = p.load_entities("ethereum").await.unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].0, "Gravatar");

        let loaded = p.load_checkpoint("ethereum", "idx").await.unwrap().unwrap();
        assert_eq!(loaded.block_number, 100);
        assert_eq!(p.block_hash("ethereum", 100).await.unwrap().unwrap(), "0xaaa");
    }

    #[tokio::test]
    async fn revert_restores_previous_values() {
        let p = MemoryPersistence::new();

        // Block 100 inserts id=1 owner=A
        let cp100 = Checkpoint::new("ethereum", "idx", 100, "0xaaa");
        p.apply(
            &cp100,
            &[insert("1", "0xA")],
            &[UndoEntry { entity: "Gravatar".into(), id: "1".into(), prev: None }],
            0,
        )
        .await
        .unwrap();

        // Block 101 updates id=1 owner=B
        let cp101 = Checkpoint::new("ethereum", "idx", 101, "0xbbb");
        p.apply(
            &cp101,
            &[Mutation::Update { entity: "Gravatar".into(), row: row("1", "0xB") }],
            &[UndoEntry {
                entity: "Gravatar".into(),
                id: "1".into(),
                prev: Some(row("1", "0xA")),
            }],
            0,
        )
        .await
        .unwrap();

        p.revert_to("ethereum", "idx", 100).await.unwrap();

        let entities = p.load_entities("ethereum").await.unwrap();
        assert_eq!(entities[0].1.get("owner").unwrap().as_address(), Some("0xA"));
        let cp = p.load_checkpoint("ethereum", "idx").await.unwrap().unwrap();
        assert_eq!(cp.block_number, 100);
        assert_eq!(cp.block_hash, "0xaaa");
        assert!(p.block_hash("ethereum", 101).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn revert_past_all_blocks_clears_checkpoint() {
        let p = MemoryPersistence::new();
        let cp = Checkpoint::new("ethereum", "idx", 100, "0xaaa");
        p.apply(
            &cp,
            &[insert("1", "0xA")],
            &[UndoEntry { entity: "Gravatar".into(), id: "1".into(), prev: None }],
            0,
        )
        .await
        .unwrap();

        p.revert_to("ethereum", "idx", 99).await.unwrap();
        assert!(p.load_checkpoint("ethereum", "idx").await.unwrap().is_none());
        assert!(p.load_entities("ethereum").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pruning_drops_old_journal() {
        let p = MemoryPersistence::new();
        for b in 100u64..=105 {
            let cp = Checkpoint::new("ethereum", "idx", b, format!("0x{b}"));
            p.apply(&cp, &[], &[], b.saturating_sub(2)).await.unwrap();
        }
        // Window of 2: hashes for 103.. retained, older pruned
        assert!(p.block_hash("ethereum", 102).await.unwrap().is_none());
        assert!(p.block_hash("ethereum", 104).await.unwrap().is_some());
    }
}
