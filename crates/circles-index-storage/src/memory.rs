//! In-memory [`Database`] used by tests and examples.
//!
//! Mirrors the Postgres backend's observable behavior — primary-key
//! deduplication, block-onwards deletion, gap detection — over plain vectors,
//! so pipeline and state machine tests run without a database server.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use circles_index_core::{ColumnValue, IndexError, TableSchema};

use crate::database::{Database, PersistedBlock, QueryResult};
use crate::query::{Comparison, Filter, Select, SortDirection};

pub struct MemoryDatabase {
    tables: Vec<TableSchema>,
    rows: Mutex<HashMap<String, Vec<Vec<ColumnValue>>>>,
}

impl MemoryDatabase {
    /// A database over the given table set. `tables` must include the block
    /// bookkeeping table for the block-oriented queries to work.
    pub fn new(tables: Vec<TableSchema>) -> Self {
        let rows = tables
            .iter()
            .map(|t| (t.name.clone(), Vec::new()))
            .collect();
        Self {
            tables,
            rows: Mutex::new(rows),
        }
    }

    /// Direct row access for assertions.
    pub fn rows(&self, table: &str) -> Vec<Vec<ColumnValue>> {
        self.lock().get(table).cloned().unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.lock().get(table).map(Vec::len).unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Vec<ColumnValue>>>> {
        match self.rows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn schema(&self, table: &str) -> Result<&TableSchema, IndexError> {
        self.tables
            .iter()
            .find(|t| t.name == table)
            .ok_or_else(|| IndexError::Storage(format!("unknown table '{table}'")))
    }

    fn column_index(schema: &TableSchema, column: &str) -> Result<usize, IndexError> {
        schema
            .columns
            .iter()
            .position(|c| c.name == column)
            .ok_or_else(|| {
                IndexError::Storage(format!("unknown column '{}.{column}'", schema.name))
            })
    }

    fn block_number_index(schema: &TableSchema) -> Result<usize, IndexError> {
        Self::column_index(schema, "block_number")
    }
}

fn primary_key_of(schema: &TableSchema, row: &[ColumnValue]) -> String {
    schema
        .columns
        .iter()
        .enumerate()
        .filter(|(_, c)| c.primary_key)
        .map(|(i, _)| row[i].display())
        .collect::<Vec<_>>()
        .join("\u{1f}")
}

fn compare_values(a: &ColumnValue, b: &ColumnValue) -> Option<Ordering> {
    use ColumnValue::*;
    match (a, b) {
        (Int(x), Int(y)) => Some(x.cmp(y)),
        (BigInt(x), BigInt(y)) => Some(x.cmp(y)),
        (Int(x), BigInt(y)) => {
            if *x < 0 {
                Some(Ordering::Less)
            } else {
                Some(alloy_primitives::U256::from(*x as u64).cmp(y))
            }
        }
        (BigInt(_), Int(_)) => compare_values(b, a).map(Ordering::reverse),
        (Text(x), Text(y)) => Some(x.cmp(y)),
        (Address(x), Address(y)) => Some(x.cmp(y)),
        (Text(x), Address(y)) | (Address(y), Text(x)) => {
            Some(x.to_lowercase().cmp(&circles_index_core::address_to_hex(y)))
        }
        (Bool(x), Bool(y)) => Some(x.cmp(y)),
        (Bytes(x), Bytes(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn matches_like(candidate: &ColumnValue, pattern: &ColumnValue) -> bool {
    let (ColumnValue::Text(text), ColumnValue::Text(pattern)) = (candidate, pattern) else {
        return false;
    };
    let starts = pattern.starts_with('%');
    let ends = pattern.ends_with('%');
    let core = pattern.trim_matches('%');
    match (starts, ends) {
        (true, true) => text.contains(core),
        (true, false) => text.ends_with(core),
        (false, true) => text.starts_with(core),
        (false, false) => text == pattern,
    }
}

fn evaluate(
    filter: &Filter,
    schema: &TableSchema,
    row: &[ColumnValue],
) -> Result<bool, IndexError> {
    match filter {
        Filter::Compare {
            column,
            comparison,
            value,
        } => {
            let index = MemoryDatabase::column_index(schema, column)?;
            let cell = &row[index];
            Ok(match comparison {
                Comparison::Like => matches_like(cell, value),
                _ => match compare_values(cell, value) {
                    Some(ordering) => match comparison {
                        Comparison::Equals => ordering == Ordering::Equal,
                        Comparison::NotEquals => ordering != Ordering::Equal,
                        Comparison::GreaterThan => ordering == Ordering::Greater,
                        Comparison::GreaterThanOrEqual => ordering != Ordering::Less,
                        Comparison::LessThan => ordering == Ordering::Less,
                        Comparison::LessThanOrEqual => ordering != Ordering::Greater,
                        Comparison::Like => unreachable!(),
                    },
                    None => false,
                },
            })
        }
        Filter::In { column, values } => {
            let index = MemoryDatabase::column_index(schema, column)?;
            Ok(values
                .iter()
                .any(|v| compare_values(&row[index], v) == Some(Ordering::Equal)))
        }
        Filter::And(filters) => {
            for sub in filters {
                if !evaluate(sub, schema, row)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Filter::Or(filters) => {
            for sub in filters {
                if evaluate(sub, schema, row)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn migrate(&self) -> Result<(), IndexError> {
        let mut rows = self.lock();
        for table in &self.tables {
            rows.entry(table.name.clone()).or_default();
        }
        Ok(())
    }

    async fn write_batch(
        &self,
        table: &TableSchema,
        batch: &[Vec<ColumnValue>],
    ) -> Result<(), IndexError> {
        let schema = self.schema(&table.name)?;
        let mut rows = self.lock();
        let stored = rows.entry(table.name.clone()).or_default();
        let mut existing: HashSet<String> = stored
            .iter()
            .map(|row| primary_key_of(schema, row))
            .collect();
        for row in batch {
            if row.len() != schema.columns.len() {
                return Err(IndexError::Storage(format!(
                    "row width {} does not match table '{}' ({} columns)",
                    row.len(),
                    schema.name,
                    schema.columns.len()
                )));
            }
            let key = primary_key_of(schema, row);
            if existing.insert(key) {
                stored.push(row.clone());
            }
        }
        Ok(())
    }

    async fn delete_from_block_onwards(&self, block_number: i64) -> Result<u64, IndexError> {
        let mut removed = 0u64;
        let mut rows = self.lock();
        for table in &self.tables {
            let index = Self::block_number_index(table)?;
            if let Some(stored) = rows.get_mut(&table.name) {
                let before = stored.len();
                stored.retain(|row| !matches!(&row[index], ColumnValue::Int(n) if *n >= block_number));
                removed += (before - stored.len()) as u64;
            }
        }
        Ok(removed)
    }

    async fn latest_block(&self) -> Result<Option<i64>, IndexError> {
        let schema = self.schema("block")?;
        let index = Self::block_number_index(schema)?;
        Ok(self
            .lock()
            .get("block")
            .into_iter()
            .flatten()
            .filter_map(|row| match &row[index] {
                ColumnValue::Int(n) => Some(*n),
                _ => None,
            })
            .max())
    }

    async fn first_gap(&self) -> Result<Option<i64>, IndexError> {
        let schema = self.schema("block")?;
        let index = Self::block_number_index(schema)?;
        let mut numbers: Vec<i64> = self
            .lock()
            .get("block")
            .into_iter()
            .flatten()
            .filter_map(|row| match &row[index] {
                ColumnValue::Int(n) => Some(*n),
                _ => None,
            })
            .collect();
        numbers.sort_unstable();
        for window in numbers.windows(2) {
            if window[1] - window[0] > 1 {
                return Ok(Some(window[0] + 1));
            }
        }
        Ok(None)
    }

    async fn last_persisted_blocks(&self, count: i64) -> Result<Vec<PersistedBlock>, IndexError> {
        let schema = self.schema("block")?;
        let number_index = Self::block_number_index(schema)?;
        let hash_index = Self::column_index(schema, "block_hash")?;
        let mut blocks: Vec<PersistedBlock> = self
            .lock()
            .get("block")
            .into_iter()
            .flatten()
            .filter_map(|row| match (&row[number_index], &row[hash_index]) {
                (ColumnValue::Int(n), ColumnValue::Text(h)) => Some(PersistedBlock {
                    block_number: *n,
                    block_hash: h.clone(),
                }),
                _ => None,
            })
            .collect();
        blocks.sort_by_key(|b| std::cmp::Reverse(b.block_number));
        blocks.truncate(count.max(0) as usize);
        Ok(blocks)
    }

    async fn select(&self, select: &Select) -> Result<QueryResult, IndexError> {
        let schema = self.schema(&select.table)?;
        let projection: Vec<usize> = select
            .columns
            .iter()
            .map(|c| Self::column_index(schema, c))
            .collect::<Result<_, _>>()?;

        let mut matched: Vec<Vec<ColumnValue>> = Vec::new();
        for row in self.lock().get(&select.table).into_iter().flatten() {
            let keep = match &select.filter {
                Some(filter) => evaluate(filter, schema, row)?,
                None => true,
            };
            if keep {
                matched.push(row.clone());
            }
        }

        for order in select.order_by.iter().rev() {
            let index = Self::column_index(schema, &order.column)?;
            matched.sort_by(|a, b| {
                let ordering =
                    compare_values(&a[index], &b[index]).unwrap_or(Ordering::Equal);
                match order.direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            });
        }

        let mut rows: Vec<Vec<ColumnValue>> = matched
            .into_iter()
            .map(|row| projection.iter().map(|&i| row[i].clone()).collect())
            .collect();

        if select.distinct {
            let mut seen = HashSet::new();
            rows.retain(|row| {
                seen.insert(
                    row.iter()
                        .map(ColumnValue::display)
                        .collect::<Vec<_>>()
                        .join("\u{1f}"),
                )
            });
        }
        if let Some(limit) = select.limit {
            rows.truncate(limit.max(0) as usize);
        }

        Ok(QueryResult {
            columns: select.columns.clone(),
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::OrderBy;
    use circles_index_core::TableSchema;

    fn database() -> MemoryDatabase {
        MemoryDatabase::new(vec![TableSchema::block_table()])
    }

    fn block_row(number: i64, hash: &str) -> Vec<ColumnValue> {
        vec![
            ColumnValue::Int(number),
            ColumnValue::Int(number * 5),
            ColumnValue::Text(hash.into()),
        ]
    }

    #[tokio::test]
    async fn duplicate_primary_keys_are_skipped() {
        let db = database();
        let table = TableSchema::block_table();
        db.write_batch(&table, &[block_row(1, "0xa"), block_row(1, "0xa")])
            .await
            .unwrap();
        db.write_batch(&table, &[block_row(1, "0xa"), block_row(2, "0xb")])
            .await
            .unwrap();
        assert_eq!(db.row_count("block"), 2);
    }

    #[tokio::test]
    async fn delete_from_block_onwards_counts_rows() {
        let db = database();
        let table = TableSchema::block_table();
        let rows: Vec<_> = (1..=5).map(|n| block_row(n, "0x")).collect();
        db.write_batch(&table, &rows).await.unwrap();
        let removed = db.delete_from_block_onwards(3).await.unwrap();
        assert_eq!(removed, 3);
        assert_eq!(db.latest_block().await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn first_gap_finds_the_hole() {
        let db = database();
        let table = TableSchema::block_table();
        let rows: Vec<_> = [1i64, 2, 3, 7, 8]
            .iter()
            .map(|&n| block_row(n, "0x"))
            .collect();
        db.write_batch(&table, &rows).await.unwrap();
        assert_eq!(db.first_gap().await.unwrap(), Some(4));

        let db2 = database();
        db2.write_batch(&table, &[block_row(5, "0x"), block_row(6, "0x")])
            .await
            .unwrap();
        assert_eq!(db2.first_gap().await.unwrap(), None);
    }

    #[tokio::test]
    async fn last_persisted_blocks_is_descending() {
        let db = database();
        let table = TableSchema::block_table();
        let rows: Vec<_> = (1..=10).map(|n| block_row(n, &format!("0x{n:x}"))).collect();
        db.write_batch(&table, &rows).await.unwrap();
        let blocks = db.last_persisted_blocks(3).await.unwrap();
        assert_eq!(
            blocks.iter().map(|b| b.block_number).collect::<Vec<_>>(),
            vec![10, 9, 8]
        );
        assert_eq!(blocks[0].block_hash, "0xa");
    }

    #[tokio::test]
    async fn select_filters_and_orders() {
        let db = database();
        let table = TableSchema::block_table();
        let rows: Vec<_> = (1..=6).map(|n| block_row(n, "0x")).collect();
        db.write_batch(&table, &rows).await.unwrap();

        let result = db
            .select(
                &Select::new("block", ["block_number"])
                    .filter(Filter::compare(
                        "block_number",
                        Comparison::GreaterThanOrEqual,
                        3i64,
                    ))
                    .order_by(OrderBy::descending("block_number"))
                    .limit(2),
            )
            .await
            .unwrap();
        assert_eq!(
            result.rows,
            vec![vec![ColumnValue::Int(6)], vec![ColumnValue::Int(5)]]
        );
    }
}
