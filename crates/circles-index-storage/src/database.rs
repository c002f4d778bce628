//! The persistence gateway trait.
//!
//! Everything above the storage crate talks to the database through this
//! trait: the sink writes event batches, the reorg handler deletes from a
//! height onwards, and the sync state machine reads back what was persisted.
//! Two implementations exist — Postgres for production, in-memory for tests.

use async_trait::async_trait;

use circles_index_core::{ColumnValue, IndexError, TableSchema};

use crate::query::Select;

/// One persisted block, as needed by reorg detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedBlock {
    pub block_number: i64,
    /// Lowercase `0x…` hash as stored.
    pub block_hash: String,
}

/// Result set of a [`Select`]: column names plus typed rows.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<ColumnValue>>,
}

#[async_trait]
pub trait Database: Send + Sync {
    /// Creates every table and index, idempotently.
    async fn migrate(&self) -> Result<(), IndexError>;

    /// Writes `rows` into `table` in one transaction. Rows whose primary key
    /// already exists are skipped, so redelivery after a crash or reorg
    /// repair is harmless.
    async fn write_batch(
        &self,
        table: &TableSchema,
        rows: &[Vec<ColumnValue>],
    ) -> Result<(), IndexError>;

    /// Deletes every row with `block_number >= block_number` from every
    /// table, block bookkeeping included, in a single transaction. Returns
    /// the number of rows removed.
    async fn delete_from_block_onwards(&self, block_number: i64) -> Result<u64, IndexError>;

    /// Highest persisted block number, if any block was imported yet.
    async fn latest_block(&self) -> Result<Option<i64>, IndexError>;

    /// First missing block number inside the persisted range, if the range
    /// has a hole.
    async fn first_gap(&self) -> Result<Option<i64>, IndexError>;

    /// The most recently persisted blocks, highest first, at most `count`.
    async fn last_persisted_blocks(&self, count: i64) -> Result<Vec<PersistedBlock>, IndexError>;

    /// Runs a typed select against one of the event tables.
    async fn select(&self, select: &Select) -> Result<QueryResult, IndexError>;
}
