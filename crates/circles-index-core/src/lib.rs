//! circles-index-core — event model and log decoding for the Circles indexer.
//!
//! # Architecture
//!
//! ```text
//! SchemaRegistry  (topic hashes + column layouts, built once)
//!       │
//!  LogParser impls (CrcV1 hub, CrcV2 hub, name registry)
//!       │
//!  IndexEvent      (closed sum type, one variant per table)
//!       │
//!  extract_row     (typed event → column values, schema order)
//! ```
//!
//! Everything chain- or database-facing lives in the sibling crates; this
//! crate is pure data and decoding, with no async surface.

pub mod buffer;
pub mod decode;
pub mod error;
pub mod event;
pub mod parsers;
pub mod schema;
pub mod tables;
pub mod types;
pub mod value;

pub use buffer::InsertBuffer;
pub use error::IndexError;
pub use event::{EventKind, EventMeta, IndexEvent};
pub use parsers::{name_registry::NameRegistryParser, v1::V1Parser, v2::V2Parser, LogParser};
pub use schema::{EventColumn, EventSchema, SchemaRegistry};
pub use tables::{all_tables, extract_row, ColumnDef, TableSchema};
pub use types::{
    address_to_hex, b256_to_hex, Block, BlockRange, BlockWithReceipts, ChainHead, LogEntry, Receipt,
};
pub use value::{ColumnValue, ValueType};
