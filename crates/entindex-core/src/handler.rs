//! Event handler trait, transaction-scoped store context, and the
//! handler registry.
//!
//! Handlers are synchronous and non-suspending: a handler is a pure function
//! of the event and the current store state, and its only side effects are
//! mutations recorded through the context. All blocking I/O happens outside
//! the handler boundary, in the orchestrator.

use std::collections::HashMap;
use std::sync::Arc;

use crate::entity::EntityRow;
use crate::error::{HandlerError, RegistryError, StoreError};
use crate::event::DecodedEvent;

/// The store operations visible to a handler, scoped to the in-flight block
/// transaction. Created fresh per block by the orchestrator, discarded after
/// commit or rollback; handlers must not retain it.
///
/// Reads see mutations buffered earlier in the same block, then committed
/// state.
pub trait EntityContext {
    /// Buffer an insert. Fails with `EntityExists` if the id is already
    /// present (committed or buffered).
    fn insert(&mut self, entity: &str, row: EntityRow) -> Result<(), StoreError>;

    /// Buffer an update. Fails with `EntityNotFound` if the id is absent,
    /// unless upsert mode is configured on the store.
    fn update(&mut self, entity: &str, row: EntityRow) -> Result<(), StoreError>;

    /// Buffer a delete. Fails with `EntityNotFound` if the id is absent.
    fn delete(&mut self, entity: &str, id: &str) -> Result<(), StoreError>;

    /// Read an entity as visible at this point in the block.
    fn get(&self, entity: &str, id: &str) -> Option<EntityRow>;
}

/// A registered event handler. Implementations map one decoded event to
/// entity mutations; no direct external I/O is permitted.
pub trait EventHandler: Send + Sync {
    fn handle(
        &self,
        event: &DecodedEvent,
        ctx: &mut dyn EntityContext,
    ) -> Result<(), HandlerError>;
}

/// Routing key: contract address (lowercased) + event name.
fn key(address: &str, event: &str) -> (String, String) {
    (address.to_ascii_lowercase(), event.to_string())
}

/// Registry of event handlers, keyed by `(contract address, event name)`.
///
/// Exactly one handler per key: duplicate registration would make routing
/// ambiguous and is rejected up front, so dispatch can never hit a
/// conflicting route at runtime.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<(String, String), Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for events named `event` emitted by `address`.
    pub fn register(
        &mut self,
        address: &str,
        event: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), RegistryError> {
        let k = key(address, event);
        if self.handlers.contains_key(&k) {
            return Err(RegistryError::DuplicateHandler {
                address: address.to_string(),
                event: event.to_string(),
            });
        }
        self.handlers.insert(k, handler);
        Ok(())
    }

    /// Dispatch an event to its registered handler, synchronously, within
    /// the caller's transaction scope.
    ///
    /// Returns `Ok(true)` if a handler ran, `Ok(false)` if no handler is
    /// registered for the event (not an error — decoded events without a
    /// handler are simply not projected). A handler failure propagates to
    /// the caller, which aborts the current block's transaction.
    pub fn dispatch(
        &self,
        event: &DecodedEvent,
        ctx: &mut dyn EntityContext,
    ) -> Result<bool, HandlerError> {
        match self.handlers.get(&key(&event.address, &event.event)) {
            Some(handler) => {
                handler.handle(event, ctx)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
