//! The block-scoped write buffer handed to handlers.

use std::collections::HashMap;

use entindex_core::{EntityContext, EntityRow, MissingUpdate, Mutation, StoreError};

use crate::store::EntityStore;

/// The per-block transaction handle passed into each handler invocation.
///
/// Mutations accumulate in dispatch order; reads see the buffer first, then
/// committed state — so within one block, an earlier event's mutation is
/// visible to a later event's handler. The buffer is taken by the
/// orchestrator at commit, or simply dropped to roll the block back.
pub struct BlockContext<'s> {
    store: &'s EntityStore,
    mutations: Vec<Mutation>,
    /// Buffered view: `Some(row)` = visible value, `None` = deleted.
    overlay: HashMap<(String, String), Option<EntityRow>>,
    on_missing_update: MissingUpdate,
}

impl<'s> BlockContext<'s> {
    pub(crate) fn new(store: &'s EntityStore, on_missing_update: MissingUpdate) -> Self {
        Self {
            store,
            mutations: Vec::new(),
            overlay: HashMap::new(),
            on_missing_update,
        }
    }

    /// The buffered mutations, in dispatch order.
    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    /// Consume the context, yielding the buffer for commit.
    pub fn into_mutations(self) -> Vec<Mutation> {
        self.mutations
    }

    fn visible(&self, entity: &str, id: &str) -> Option<EntityRow> {
        let key = (entity.to_string(), id.to_string());
        match self.overlay.get(&key) {
            Some(buffered) => buffered.clone(),
            None => self.store.get(entity, id),
        }
    }
}

impl EntityContext for BlockContext<'_> {
    fn insert(&mut self, entity: &str, row: EntityRow) -> Result<(), StoreError> {
        if self.visible(entity, &row.id).is_some() {
            return Err(StoreError::EntityExists {
                entity: entity.to_string(),
                id: row.id,
            });
        }
        self.overlay
            .insert((entity.to_string(), row.id.clone()), Some(row.clone()));
        self.mutations.push(Mutation::Insert {
            entity: entity.to_string(),
            row,
        });
        Ok(())
    }

    fn update(&mut self, entity: &str, row: EntityRow) -> Result<(), StoreError> {
        if self.visible(entity, &row.id).is_none() {
            match self.on_missing_update {
                MissingUpdate::Fail => {
                    return Err(StoreError::EntityNotFound {
                        entity: entity.to_string(),
                        id: row.id,
                    });
                }
                MissingUpdate::Insert => {
                    // Upsert mode: the missing target becomes an insert.
                    return self.insert(entity, row);
                }
            }
        }
        self.overlay
            .insert((entity.to_string(), row.id.clone()), Some(row.clone()));
        self.mutations.push(Mutation::Update {
            entity: entity.to_string(),
            row,
        });
        Ok(())
    }

    fn delete(&mut self, entity: &str, id: &str) -> Result<(), StoreError> {
        if self.visible(entity, id).is_none() {
            return Err(StoreError::EntityNotFound {
                entity: entity.to_string(),
                id: id.to_string(),
            });
        }
        self.overlay.insert((entity.to_string(), id.to_string()), None);
        self.mutations.push(Mutation::Delete {
            entity: entity.to_string(),
            id: id.to_string(),
        });
        Ok(())
    }

    fn get(&self, entity: &str, id: &str) -> Option<EntityRow> {
        self.visible(entity, id)
    }
}
