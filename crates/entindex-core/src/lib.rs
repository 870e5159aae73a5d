//! entindex-core — foundation for the reorg-safe entity-projection indexer.
//!
//! # Architecture
//!
//! ```text
//! IndexerBuilder → Indexer (entindex-evm)
//!                      ├── ChainReader      (cursor, parent-hash verification)
//!                      ├── SchemaRegistry   (fingerprint → event schema)
//!                      ├── HandlerRegistry  (one handler per address + event)
//!                      ├── BlockTracker     (reorg window)
//!                      └── EntityStore      (entindex-store: buffer, commit, revert)
//! ```

pub mod checkpoint;
pub mod config;
pub mod cursor;
pub mod entity;
pub mod error;
pub mod event;
pub mod handler;
pub mod reorg;
pub mod schema;
pub mod tracker;
pub mod types;
pub mod value;

pub use checkpoint::Checkpoint;
pub use config::{HandlerFailurePolicy, IndexerConfig, IndexerState, MissingUpdate};
pub use cursor::Cursor;
pub use entity::{Entity, EntityRow, Mutation};
pub use error::{DecodeError, HandlerError, IndexerError, RegistryError, StoreError};
pub use event::DecodedEvent;
pub use handler::{EntityContext, EventHandler, HandlerRegistry};
pub use reorg::ReorgEvent;
pub use schema::{EventSchema, FieldDef, FieldKind, SchemaRegistry};
pub use tracker::BlockTracker;
pub use types::{BlockHeader, LogFilter, RawLog};
pub use value::FieldValue;
