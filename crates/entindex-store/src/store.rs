//! The entity store: committed tables, undo journal, and checkpoint.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use entindex_core::{Checkpoint, EntityRow, MissingUpdate, Mutation, StoreError};

use crate::buffer::BlockContext;
use crate::persist::{Persistence, UndoEntry};

#[derive(Default)]
struct Tables {
    /// (entity, id) → row, committed state only.
    entities: HashMap<(String, String), EntityRow>,
    /// block → undo entries in mutation order, bounded by the reorg window.
    journal: BTreeMap<u64, Vec<UndoEntry>>,
    checkpoint: Option<Checkpoint>,
}

/// Committed entity state for one chain + indexer pair.
///
/// Reads are served from in-memory tables; every commit lands in the
/// [`Persistence`] backend first, then the tables — a crash between the two
/// is repaired by reloading from the backend at startup.
pub struct EntityStore {
    chain_id: String,
    indexer_id: String,
    reorg_window: u64,
    persistence: Arc<dyn Persistence>,
    tables: RwLock<Tables>,
}

impl EntityStore {
    pub fn new(
        chain_id: impl Into<String>,
        indexer_id: impl Into<String>,
        reorg_window: u64,
        persistence: Arc<dyn Persistence>,
    ) -> Self {
        Self {
            chain_id: chain_id.into(),
            indexer_id: indexer_id.into(),
            reorg_window,
            persistence,
            tables: RwLock::new(Tables::default()),
        }
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn indexer_id(&self) -> &str {
        &self.indexer_id
    }

    /// Load committed entities and the checkpoint from the backend,
    /// replacing the in-memory tables. Returns the checkpoint, if any.
    pub async fn load(&self) -> Result<Option<Checkpoint>, StoreError> {
        let rows = self.persistence.load_entities(&self.chain_id).await?;
        let checkpoint = self
            .persistence
            .load_checkpoint(&self.chain_id, &self.indexer_id)
            .await?;

        let mut tables = self.tables.write().unwrap();
        tables.entities = rows
            .into_iter()
            .map(|(entity, row)| ((entity, row.id.clone()), row))
            .collect();
        tables.journal.clear();
        tables.checkpoint = checkpoint.clone();

        if let Some(cp) = &checkpoint {
            info!(
                chain = %self.chain_id,
                indexer = %self.indexer_id,
                block = cp.block_number,
                entities = tables.entities.len(),
                "store loaded"
            );
        }
        Ok(checkpoint)
    }

    /// Open a write buffer for one block's handlers.
    pub fn begin_block(&self, on_missing_update: MissingUpdate) -> BlockContext<'_> {
        BlockContext::new(self, on_missing_update)
    }

    /// Committed value of an entity. Does not see any open block buffer.
    pub fn get(&self, entity: &str, id: &str) -> Option<EntityRow> {
        let tables = self.tables.read().unwrap();
        tables
            .entities
            .get(&(entity.to_string(), id.to_string()))
            .cloned()
    }

    pub fn checkpoint(&self) -> Option<Checkpoint> {
        self.tables.read().unwrap().checkpoint.clone()
    }

    /// The recorded hash of a committed block, if still revertible.
    pub async fn block_hash(&self, block_number: u64) -> Result<Option<String>, StoreError> {
        self.persistence.block_hash(&self.chain_id, block_number).await
    }

    /// Commit one block's buffered mutations atomically: undo entries are
    /// derived from the pre-commit state, the backend applies everything in
    /// one transaction, then the in-memory tables catch up.
    pub async fn commit(
        &self,
        block_number: u64,
        block_hash: &str,
        mutations: Vec<Mutation>,
    ) -> Result<Checkpoint, StoreError> {
        let undo = self.undo_entries(&mutations);
        let checkpoint = Checkpoint::new(&self.chain_id, &self.indexer_id, block_number, block_hash);
        let prune_before = block_number.saturating_sub(self.reorg_window);

        self.persistence
            .apply(&checkpoint, &mutations, &undo, prune_before)
            .await?;

        let mut tables = self.tables.write().unwrap();
        for m in &mutations {
            match m {
                Mutation::Insert { entity, row } | Mutation::Update { entity, row } => {
                    tables
                        .entities
                        .insert((entity.clone(), row.id.clone()), row.clone());
                }
                Mutation::Delete { entity, id } => {
                    tables.entities.remove(&(entity.clone(), id.clone()));
                }
            }
        }
        tables.journal.insert(block_number, undo);
        tables.journal.retain(|b, _| *b >= prune_before);
        tables.checkpoint = Some(checkpoint.clone());

        debug!(
            chain = %self.chain_id,
            block = block_number,
            mutations = mutations.len(),
            "block committed"
        );
        Ok(checkpoint)
    }

    /// Revert every committed block above `block_number`, restoring entity
    /// state as of that block. The backend reverts first; the in-memory
    /// journal then replays in reverse.
    pub async fn revert_to(&self, block_number: u64) -> Result<(), StoreError> {
        self.persistence
            .revert_to(&self.chain_id, &self.indexer_id, block_number)
            .await?;
        let checkpoint = self
            .persistence
            .load_checkpoint(&self.chain_id, &self.indexer_id)
            .await?;

        let mut tables = self.tables.write().unwrap();
        let reverted: Vec<(u64, Vec<UndoEntry>)> = tables
            .journal
            .range(block_number + 1..)
            .map(|(b, e)| (*b, e.clone()))
            .collect();
        for (_, entries) in reverted.iter().rev() {
            for entry in entries.iter().rev() {
                let key = (entry.entity.clone(), entry.id.clone());
                match &entry.prev {
                    Some(row) => {
                        tables.entities.insert(key, row.clone());
                    }
                    None => {
                        tables.entities.remove(&key);
                    }
                }
            }
        }
        tables.journal.retain(|b, _| *b <= block_number);
        tables.checkpoint = checkpoint;

        info!(
            chain = %self.chain_id,
            indexer = %self.indexer_id,
            block = block_number,
            blocks_reverted = reverted.len(),
            "store reverted"
        );
        Ok(())
    }

    /// Undo entries for a mutation batch: for each mutation, the value the
    /// target had just before it, simulated against committed state.
    fn undo_entries(&self, mutations: &[Mutation]) -> Vec<UndoEntry> {
        let tables = self.tables.read().unwrap();
        let mut sim: HashMap<(String, String), Option<EntityRow>> = HashMap::new();
        let mut undo = Vec::with_capacity(mutations.len());

        for m in mutations {
            let key = (m.entity().to_string(), m.id().to_string());
            let prev = match sim.get(&key) {
                Some(buffered) => buffered.clone(),
                None => tables.entities.get(&key).cloned(),
            };
            undo.push(UndoEntry {
                entity: key.0.clone(),
                id: key.1.clone(),
                prev,
            });
            let next = match m {
                Mutation::Insert { row, .. } | Mutation::Update { row, .. } => Some(row.clone()),
                Mutation::Delete { .. } => None,
            };
            sim.insert(key, next);
        }
        undo
    }
}
