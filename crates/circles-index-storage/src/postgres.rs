//! PostgreSQL backend.
//!
//! One table per event kind plus the `block` bookkeeping table, created
//! idempotently from the derived [`TableSchema`]s. Batches are written in a
//! transaction with `ON CONFLICT DO NOTHING` on the positional primary key;
//! reorg repair deletes from a height onwards across every table in a single
//! transaction. `uint256` columns are NUMERIC, bound as decimal text.

use async_trait::async_trait;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};
use tracing::{debug, info};

use circles_index_core::{address_to_hex, ColumnValue, IndexError, TableSchema, ValueType};

use crate::database::{Database, PersistedBlock, QueryResult};
use crate::query::Select;

/// PostgreSQL-backed [`Database`]. Cheaply cloneable — wraps a pool.
#[derive(Clone)]
pub struct PgDatabase {
    pool: PgPool,
    tables: Vec<TableSchema>,
}

impl PgDatabase {
    /// Connects and remembers the table set; call [`Database::migrate`]
    /// before the first write.
    pub async fn connect(database_url: &str, tables: Vec<TableSchema>) -> Result<Self, IndexError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| IndexError::Storage(format!("postgres connect: {e}")))?;
        info!(tables = tables.len(), "connected to postgres");
        Ok(Self { pool, tables })
    }

    /// Wraps an existing pool (used by tests that manage their own pool).
    pub fn with_pool(pool: PgPool, tables: Vec<TableSchema>) -> Self {
        Self { pool, tables }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn schema(&self, table: &str) -> Result<&TableSchema, IndexError> {
        self.tables
            .iter()
            .find(|t| t.name == table)
            .ok_or_else(|| IndexError::Storage(format!("unknown table '{table}'")))
    }

    fn create_table_sql(table: &TableSchema) -> String {
        let mut columns: Vec<String> = table
            .columns
            .iter()
            .map(|c| format!("\"{}\" {} NOT NULL", c.name, sql_type(c.ty)))
            .collect();
        let primary_key = table.primary_key();
        if !primary_key.is_empty() {
            columns.push(format!(
                "PRIMARY KEY ({})",
                primary_key
                    .iter()
                    .map(|c| format!("\"{c}\""))
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" ({})",
            table.name,
            columns.join(", ")
        )
    }

    fn insert_sql(table: &TableSchema) -> String {
        let columns: Vec<String> = table
            .columns
            .iter()
            .map(|c| format!("\"{}\"", c.name))
            .collect();
        let placeholders: Vec<String> = table
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                if c.ty == ValueType::BigInt {
                    format!("${}::numeric", i + 1)
                } else {
                    format!("${}", i + 1)
                }
            })
            .collect();
        let conflict = if table.primary_key().is_empty() {
            String::new()
        } else {
            " ON CONFLICT DO NOTHING".to_string()
        };
        format!(
            "INSERT INTO \"{}\" ({}) VALUES ({}){}",
            table.name,
            columns.join(", "),
            placeholders.join(", "),
            conflict
        )
    }
}

fn sql_type(ty: ValueType) -> &'static str {
    match ty {
        ValueType::Int => "BIGINT",
        ValueType::BigInt => "NUMERIC",
        ValueType::String => "TEXT",
        ValueType::Address => "TEXT",
        ValueType::Boolean => "BOOLEAN",
        ValueType::Bytes => "BYTEA",
    }
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &'q ColumnValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        ColumnValue::Int(v) => query.bind(*v),
        ColumnValue::BigInt(v) => query.bind(v.to_string()),
        ColumnValue::Text(v) => query.bind(v.as_str()),
        ColumnValue::Address(v) => query.bind(address_to_hex(v)),
        ColumnValue::Bool(v) => query.bind(*v),
        ColumnValue::Bytes(v) => query.bind(v.as_slice()),
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn migrate(&self) -> Result<(), IndexError> {
        for table in &self.tables {
            sqlx::query(&Self::create_table_sql(table))
                .execute(&self.pool)
                .await
                .map_err(|e| IndexError::Storage(format!("create '{}': {e}", table.name)))?;

            for column in table.columns.iter().filter(|c| c.indexed) {
                let index_sql = format!(
                    "CREATE INDEX IF NOT EXISTS \"idx_{}_{}\" ON \"{}\" (\"{}\")",
                    table.name, column.name, table.name, column.name
                );
                sqlx::query(&index_sql)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| {
                        IndexError::Storage(format!(
                            "index '{}.{}': {e}",
                            table.name, column.name
                        ))
                    })?;
            }
        }
        debug!(tables = self.tables.len(), "schema migrated");
        Ok(())
    }

    async fn write_batch(
        &self,
        table: &TableSchema,
        rows: &[Vec<ColumnValue>],
    ) -> Result<(), IndexError> {
        if rows.is_empty() {
            return Ok(());
        }
        let insert = Self::insert_sql(table);
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| IndexError::Storage(e.to_string()))?;
        for row in rows {
            if row.len() != table.columns.len() {
                return Err(IndexError::Storage(format!(
                    "row width {} does not match table '{}' ({} columns)",
                    row.len(),
                    table.name,
                    table.columns.len()
                )));
            }
            let mut query = sqlx::query(&insert);
            for value in row {
                query = bind_value(query, value);
            }
            query
                .execute(&mut *tx)
                .await
                .map_err(|e| IndexError::Storage(format!("insert into '{}': {e}", table.name)))?;
        }
        tx.commit()
            .await
            .map_err(|e| IndexError::Storage(format!("commit batch: {e}")))?;
        debug!(table = %table.name, rows = rows.len(), "batch written");
        Ok(())
    }

    async fn delete_from_block_onwards(&self, block_number: i64) -> Result<u64, IndexError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| IndexError::Storage(e.to_string()))?;
        let mut removed = 0u64;
        for table in &self.tables {
            let sql = format!(
                "DELETE FROM \"{}\" WHERE \"block_number\" >= $1",
                table.name
            );
            let result = sqlx::query(&sql)
                .bind(block_number)
                .execute(&mut *tx)
                .await
                .map_err(|e| IndexError::Storage(format!("delete from '{}': {e}", table.name)))?;
            if result.rows_affected() > 0 {
                info!(
                    table = %table.name,
                    rows = result.rows_affected(),
                    from_block = block_number,
                    "removed rows during reorg repair"
                );
            }
            removed += result.rows_affected();
        }
        tx.commit()
            .await
            .map_err(|e| IndexError::Storage(format!("commit reorg delete: {e}")))?;
        Ok(removed)
    }

    async fn latest_block(&self) -> Result<Option<i64>, IndexError> {
        let row = sqlx::query("SELECT MAX(\"block_number\") AS latest FROM \"block\"")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| IndexError::Storage(e.to_string()))?;
        row.try_get::<Option<i64>, _>("latest")
            .map_err(|e| IndexError::Storage(e.to_string()))
    }

    async fn first_gap(&self) -> Result<Option<i64>, IndexError> {
        let row = sqlx::query(
            "SELECT \"block_number\" + 1 AS gap FROM (
                 SELECT \"block_number\",
                        LEAD(\"block_number\") OVER (ORDER BY \"block_number\") AS next_number
                 FROM \"block\"
             ) AS windowed
             WHERE next_number - \"block_number\" > 1
             ORDER BY \"block_number\"
             LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| IndexError::Storage(e.to_string()))?;
        match row {
            Some(row) => row
                .try_get::<i64, _>("gap")
                .map(Some)
                .map_err(|e| IndexError::Storage(e.to_string())),
            None => Ok(None),
        }
    }

    async fn last_persisted_blocks(&self, count: i64) -> Result<Vec<PersistedBlock>, IndexError> {
        let rows = sqlx::query(
            "SELECT \"block_number\", \"block_hash\" FROM \"block\"
             ORDER BY \"block_number\" DESC
             LIMIT $1",
        )
        .bind(count)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| IndexError::Storage(e.to_string()))?;
        rows.iter()
            .map(|row| {
                Ok(PersistedBlock {
                    block_number: row
                        .try_get("block_number")
                        .map_err(|e| IndexError::Storage(e.to_string()))?,
                    block_hash: row
                        .try_get("block_hash")
                        .map_err(|e| IndexError::Storage(e.to_string()))?,
                })
            })
            .collect()
    }

    async fn select(&self, select: &Select) -> Result<QueryResult, IndexError> {
        let schema = self.schema(&select.table)?;
        let rendered = select.to_sql_for(schema)?;

        let mut query = sqlx::query(&rendered.sql);
        for parameter in &rendered.parameters {
            query = bind_value(query, parameter);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| IndexError::Storage(format!("select from '{}': {e}", select.table)))?;

        let column_types: Vec<ValueType> = select
            .columns
            .iter()
            .map(|name| {
                schema
                    .columns
                    .iter()
                    .find(|c| c.name == *name)
                    .map(|c| c.ty)
                    .ok_or_else(|| {
                        IndexError::Storage(format!("unknown column '{}.{name}'", select.table))
                    })
            })
            .collect::<Result<_, _>>()?;

        let mut result_rows = Vec::with_capacity(rows.len());
        for row in rows {
            let mut values = Vec::with_capacity(column_types.len());
            for (i, ty) in column_types.iter().enumerate() {
                values.push(decode_column(&row, i, *ty)?);
            }
            result_rows.push(values);
        }
        Ok(QueryResult {
            columns: select.columns.clone(),
            rows: result_rows,
        })
    }
}

fn decode_column(
    row: &sqlx::postgres::PgRow,
    index: usize,
    ty: ValueType,
) -> Result<ColumnValue, IndexError> {
    let storage = |e: sqlx::Error| IndexError::Storage(e.to_string());
    Ok(match ty {
        ValueType::Int => ColumnValue::Int(row.try_get::<i64, _>(index).map_err(storage)?),
        ValueType::BigInt => {
            let text: String = row.try_get(index).map_err(storage)?;
            let value = alloy_primitives::U256::from_str_radix(&text, 10)
                .map_err(|e| IndexError::Storage(format!("numeric '{text}': {e}")))?;
            ColumnValue::BigInt(value)
        }
        ValueType::String | ValueType::Address => {
            ColumnValue::Text(row.try_get::<String, _>(index).map_err(storage)?)
        }
        ValueType::Boolean => ColumnValue::Bool(row.try_get::<bool, _>(index).map_err(storage)?),
        ValueType::Bytes => ColumnValue::Bytes(row.try_get::<Vec<u8>, _>(index).map_err(storage)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_table_sql_includes_primary_key() {
        let sql = PgDatabase::create_table_sql(&TableSchema::block_table());
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"block\""));
        assert!(sql.contains("\"block_number\" BIGINT NOT NULL"));
        assert!(sql.contains("\"block_hash\" TEXT NOT NULL"));
        assert!(sql.contains("PRIMARY KEY (\"block_number\")"));
    }

    #[test]
    fn insert_sql_casts_numeric_placeholders() {
        use circles_index_core::ColumnDef;
        let table = TableSchema {
            name: "erc20_transfer".into(),
            columns: vec![
                ColumnDef {
                    name: "block_number".into(),
                    ty: ValueType::Int,
                    indexed: false,
                    primary_key: true,
                },
                ColumnDef {
                    name: "amount".into(),
                    ty: ValueType::BigInt,
                    indexed: false,
                    primary_key: false,
                },
            ],
        };
        assert_eq!(
            PgDatabase::insert_sql(&table),
            "INSERT INTO \"erc20_transfer\" (\"block_number\", \"amount\") VALUES ($1, $2::numeric) ON CONFLICT DO NOTHING"
        );
    }

    // Integration coverage requires a running Postgres; point DATABASE_URL at
    // one and drop the ignore attribute.
    #[tokio::test]
    #[ignore]
    async fn round_trips_a_block_batch() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL not set");
        let db = PgDatabase::connect(&url, vec![TableSchema::block_table()])
            .await
            .unwrap();
        db.migrate().await.unwrap();
        db.delete_from_block_onwards(0).await.unwrap();

        let table = TableSchema::block_table();
        let rows: Vec<Vec<ColumnValue>> = (1i64..=3)
            .map(|n| {
                vec![
                    ColumnValue::Int(n),
                    ColumnValue::Int(n * 5),
                    ColumnValue::Text(format!("0x{n:064x}")),
                ]
            })
            .collect();
        db.write_batch(&table, &rows).await.unwrap();
        // Redelivery is a no-op.
        db.write_batch(&table, &rows).await.unwrap();

        assert_eq!(db.latest_block().await.unwrap(), Some(3));
        let blocks = db.last_persisted_blocks(10).await.unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].block_number, 3);

        let removed = db.delete_from_block_onwards(2).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(db.latest_block().await.unwrap(), Some(1));
    }
}
