//! SQLite persistence backend for EntIndex.
//!
//! Persists entity tables, the undo journal, block hashes, and checkpoints
//! to a single SQLite file. Uses `sqlx` with WAL mode for concurrent read
//! performance; every committed block is applied in one transaction.
//!
//! # Usage
//! ```rust,no_run
//! use entindex_store::sqlite::SqlitePersistence;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let backend = SqlitePersistence::open("./index.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let backend = SqlitePersistence::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use entindex_core::{Checkpoint, EntityRow, Mutation, StoreError};

use crate::persist::{Persistence, UndoEntry};

fn backend_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// SQLite-backed [`Persistence`].
pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./index.db"`) or a full
    /// SQLite URL (`"sqlite:./index.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(backend_err)?;

        let backend = Self { pool };
        backend.init_schema().await?;
        Ok(backend)
    }

    /// Open an in-memory SQLite database.
    ///
    /// All data is lost when the pool is dropped. Ideal for tests.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .map_err(backend_err)?;

        let backend = Self { pool };
        backend.init_schema().await?;
        Ok(backend)
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), StoreError> {
        // WAL mode — better concurrent read throughput
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;

        // Entity table: one row per (chain, entity kind, id)
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS entities (
                chain_id TEXT NOT NULL,
                entity   TEXT NOT NULL,
                id       TEXT NOT NULL,
                row_json TEXT NOT NULL,
                PRIMARY KEY (chain_id, entity, id)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;

        // Undo journal: `seq` preserves mutation order within a block
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS journal (
                chain_id     TEXT    NOT NULL,
                block_number INTEGER NOT NULL,
                seq          INTEGER NOT NULL,
                entity       TEXT    NOT NULL,
                entity_id    TEXT    NOT NULL,
                prev_json    TEXT,
                PRIMARY KEY (chain_id, block_number, seq)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;

        // Block-hash table (for reorg detection)
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS block_hashes (
                chain_id     TEXT    NOT NULL,
                block_number INTEGER NOT NULL,
                block_hash   TEXT    NOT NULL,
                PRIMARY KEY (chain_id, block_number)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;

        // Checkpoint table
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                chain_id     TEXT    NOT NULL,
                indexer_id   TEXT    NOT NULL,
                block_number INTEGER NOT NULL,
                block_hash   TEXT    NOT NULL,
                updated_at   INTEGER NOT NULL,
                PRIMARY KEY (chain_id, indexer_id)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;

        Ok(())
    }
}

#[async_trait]
impl Persistence for SqlitePersistence {
    async fn apply(
        &self,
        checkpoint: &Checkpoint,
        mutations: &[Mutation],
        undo: &[UndoEntry],
        prune_before: u64,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend_err)?;
        let chain = &checkpoint.chain_id;
        let block = checkpoint.block_number as i64;

        for m in mutations {
            match m {
                Mutation::Insert { entity, row } | Mutation::Update { entity, row } => {
                    let json = serde_json::to_string(row).map_err(backend_err)?;
                    sqlx::query(
                        "INSERT OR REPLACE INTO entities (chain_id, entity, id, row_json)
                         VALUES (?, ?, ?, ?)",
                    )
                    .bind(chain)
                    .bind(entity)
                    .bind(&row.id)
                    .bind(&json)
                    .execute(&mut *tx)
                    .await
                    .map_err(backend_err)?;
                }
                Mutation::Delete { entity, id } => {
                    sqlx::query(
                        "DELETE FROM entities WHERE chain_id = ? AND entity = ? AND id = ?",
                    )
                    .bind(chain)
                    .bind(entity)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .map_err(backend_err)?;
                }
            }
        }

        for (seq, entry) in undo.iter().enumerate() {
            let prev_json = match &entry.prev {
                Some(row) => Some(serde_json::to_string(row).map_err(backend_err)?),
                None => None,
            };
            sqlx::query(
                "INSERT INTO journal (chain_id, block_number, seq, entity, entity_id, prev_json)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(chain)
            .bind(block)
            .bind(seq as i64)
            .bind(&entry.entity)
            .bind(&entry.id)
            .bind(&prev_json)
            .execute(&mut *tx)
            .await
            .map_err(backend_err)?;
        }

        sqlx::query(
            "INSERT OR REPLACE INTO block_hashes (chain_id, block_number, block_hash)
             VALUES (?, ?, ?)",
        )
        .bind(chain)
        .bind(block)
        .bind(&checkpoint.block_hash)
        .execute(&mut *tx)
        .await
        .map_err(backend_err)?;

        sqlx::query("DELETE FROM journal WHERE chain_id = ? AND block_number < ?")
            .bind(chain)
            .bind(prune_before as i64)
            .execute(&mut *tx)
            .await
            .map_err(backend_err)?;
        sqlx::query("DELETE FROM block_hashes WHERE chain_id = ? AND block_number < ?")
            .bind(chain)
            .bind(prune_before as i64)
            .execute(&mut *tx)
            .await
            .map_err(backend_err)?;

        sqlx::query(
            "INSERT OR REPLACE INTO checkpoints
             (chain_id, indexer_id, block_number, block_hash, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(chain)
        .bind(&checkpoint.indexer_id)
        .bind(block)
        .bind(&checkpoint.block_hash)
        .bind(checkpoint.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(backend_err)?;

        tx.commit().await.map_err(backend_err)?;

        debug!(
            chain_id = %chain,
            block = checkpoint.block_number,
            mutations = mutations.len(),
            "block applied"
        );
        Ok(())
    }

    async fn revert_to(
        &self,
        chain_id: &str,
        indexer_id: &str,
        block_number: u64,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend_err)?;

        // Undo entries above the target, newest mutation first
        let rows = sqlx::query(
            "SELECT entity, entity_id, prev_json FROM journal
             WHERE chain_id = ? AND block_number > ?
             ORDER BY block_number DESC, seq DESC",
        )
        .bind(chain_id)
        .bind(block_number as i64)
        .fetch_all(&mut *tx)
        .await
        .map_err(backend_err)?;

        for row in &rows {
            let entity: String = row.get("entity");
            let id: String = row.get("entity_id");
            match row.get::<Option<String>, _>("prev_json") {
                Some(json) => {
                    sqlx::query(
                        "INSERT OR REPLACE INTO entities (chain_id, entity, id, row_json)
                         VALUES (?, ?, ?, ?)",
                    )
                    .bind(chain_id)
                    .bind(&entity)
                    .bind(&id)
                    .bind(&json)
                    .execute(&mut *tx)
                    .await
                    .map_err(backend_err)?;
                }
                None => {
                    sqlx::query(
                        "DELETE FROM entities WHERE chain_id = ? AND entity = ? AND id = ?",
                    )
                    .bind(chain_id)
                    .bind(&entity)
                    .bind(&id)
                    .execute(&mut *tx)
                    .await
                    .map_err(backend_err)?;
                }
            }
        }

        sqlx::query("DELETE FROM journal WHERE chain_id = ? AND block_number > ?")
            .bind(chain_id)
            .bind(block_number as i64)
            .execute(&mut *tx)
            .await
            .map_err(backend_err)?;
        sqlx::query("DELETE FROM block_hashes WHERE chain_id = ? AND block_number > ?")
            .bind(chain_id)
            .bind(block_number as i64)
            .execute(&mut *tx)
            .await
            .map_err(backend_err)?;

        // Rewind the checkpoint to the surviving block, or clear it when the
        // revert passed the oldest recorded block
        let surviving = sqlx::query(
            "SELECT block_hash FROM block_hashes WHERE chain_id = ? AND block_number = ?",
        )
        .bind(chain_id)
        .bind(block_number as i64)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend_err)?;

        match surviving {
            Some(row) => {
                let hash: String = row.get("block_hash");
                sqlx::query(
                    "INSERT OR REPLACE INTO checkpoints
                     (chain_id, indexer_id, block_number, block_hash, updated_at)
                     VALUES (?, ?, ?, ?, ?)",
                )
                .bind(chain_id)
                .bind(indexer_id)
                .bind(block_number as i64)
                .bind(&hash)
                .bind(chrono::Utc::now().timestamp())
                .execute(&mut *tx)
                .await
                .map_err(backend_err)?;
            }
            None => {
                sqlx::query(
                    "DELETE FROM checkpoints WHERE chain_id = ? AND indexer_id = ?",
                )
                .bind(chain_id)
                .bind(indexer_id)
                .execute(&mut *tx)
                .await
                .map_err(backend_err)?;
            }
        }

        tx.commit().await.map_err(backend_err)?;

        debug!(chain_id, block_number, reverted = rows.len(), "storage reverted");
        Ok(())
    }

    async fn load_entities(&self, chain_id: &str) -> Result<Vec<(String, EntityRow)>, StoreError> {
        let rows = sqlx::query(
            "SELECT entity, row_json FROM entities WHERE chain_id = ? ORDER BY entity, id",
        )
        .bind(chain_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_err)?;

        let mut entities = Vec::with_capacity(rows.len());
        for row in rows {
            let json: String = row.get("row_json");
            let parsed: EntityRow = serde_json::from_str(&json).map_err(backend_err)?;
            entities.push((row.get("entity"), parsed));
        }
        Ok(entities)
    }

    async fn load_checkpoint(
        &self,
        chain_id: &str,
        indexer_id: &str,
    ) -> Result<Option<Checkpoint>, StoreError> {
        let row = sqlx::query(
            "SELECT chain_id, indexer_id, block_number, block_hash, updated_at
             FROM checkpoints WHERE chain_id = ? AND indexer_id = ?",
        )
        .bind(chain_id)
        .bind(indexer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?;

        Ok(row.map(|r| Checkpoint {
            chain_id: r.get("chain_id"),
            indexer_id: r.get("indexer_id"),
            block_number: r.get::<i64, _>("block_number") as u64,
            block_hash: r.get("block_hash"),
            updated_at: r.get("updated_at"),
        }))
    }

    async fn block_hash(
        &self,
        chain_id: &str,
        block_number: u64,
    ) -> Result<Option<String>, StoreError> {
        let row = sqlx::query(
            "SELECT block_hash FROM block_hashes
             WHERE chain_id = ? AND block_number = ?",
        )
        .bind(chain_id)
        .bind(block_number as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?;

        Ok(row.map(|r| r.get::<String, _>("block_hash")))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
