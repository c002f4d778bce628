//! circles-index-storage — persistence gateway for the Circles indexer.
//!
//! ```text
//! Select / Filter  (typed query AST)
//!        │ to_sql
//! ParameterizedSql ($1..$n placeholders, validated identifiers)
//!        │
//! Database trait ──► PgDatabase      (sqlx, one table per event kind)
//!                └─► MemoryDatabase  (tests)
//! ```

pub mod database;
pub mod memory;
pub mod postgres;
pub mod query;

pub use database::{Database, PersistedBlock, QueryResult};
pub use memory::MemoryDatabase;
pub use postgres::PgDatabase;
pub use query::{
    quote_identifier, Comparison, Filter, OrderBy, ParameterizedSql, Select, SortDirection,
};
