//! Reorg repair.
//!
//! Deleting from a height onwards is the whole recovery story: after a
//! divergence the affected suffix of every table is dropped in one
//! transaction and the range is simply re-imported. The per-table scan ahead
//! of the delete is diagnostics only.

use std::sync::Arc;

use tracing::{info, warn};

use circles_index_core::{IndexError, TableSchema};
use circles_index_storage::{Comparison, Database, Filter, Select};

pub struct ReorgHandler {
    database: Arc<dyn Database>,
    tables: Vec<TableSchema>,
}

impl ReorgHandler {
    pub fn new(database: Arc<dyn Database>, tables: Vec<TableSchema>) -> Self {
        Self { database, tables }
    }

    /// Removes every row with `block_number >= height` from every table in a
    /// single transaction. Idempotent: a second call removes nothing.
    pub async fn reorg_at(&self, height: i64) -> Result<u64, IndexError> {
        for table in &self.tables {
            let affected = self
                .database
                .select(
                    &Select::new(&table.name, ["block_number"]).filter(Filter::compare(
                        "block_number",
                        Comparison::GreaterThanOrEqual,
                        height,
                    )),
                )
                .await?;
            if !affected.rows.is_empty() {
                warn!(
                    table = %table.name,
                    rows = affected.rows.len(),
                    height,
                    "rows will be dropped by reorg repair"
                );
            }
        }

        let removed = self.database.delete_from_block_onwards(height).await?;
        info!(height, removed, "reorg repair complete");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use circles_index_core::ColumnValue;
    use circles_index_storage::MemoryDatabase;

    fn block_row(number: i64) -> Vec<ColumnValue> {
        vec![
            ColumnValue::Int(number),
            ColumnValue::Int(number * 5),
            ColumnValue::Text(format!("0x{number:x}")),
        ]
    }

    #[tokio::test]
    async fn deletes_from_height_onwards_and_is_idempotent() {
        let tables = vec![TableSchema::block_table()];
        let database = Arc::new(MemoryDatabase::new(tables.clone()));
        let table = TableSchema::block_table();
        let rows: Vec<_> = (1..=10).map(block_row).collect();
        database.write_batch(&table, &rows).await.unwrap();

        let handler = ReorgHandler::new(Arc::clone(&database) as Arc<dyn Database>, tables);
        let removed = handler.reorg_at(7).await.unwrap();
        assert_eq!(removed, 4);
        assert_eq!(database.latest_block().await.unwrap(), Some(6));

        // Second call finds nothing left to delete.
        let removed_again = handler.reorg_at(7).await.unwrap();
        assert_eq!(removed_again, 0);
    }
}
