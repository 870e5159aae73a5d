//! entindex-store — the versioned entity store.
//!
//! Handlers buffer mutations into a [`BlockContext`]; the orchestrator
//! commits the buffer atomically at each block boundary through a
//! [`Persistence`] backend, and can revert committed blocks back to a fork
//! point after a reorg.

pub mod buffer;
pub mod persist;
pub mod sqlite;
pub mod store;

pub use buffer::BlockContext;
pub use persist::{MemoryPersistence, Persistence, UndoEntry};
pub use sqlite::SqlitePersistence;
pub use store::EntityStore;
