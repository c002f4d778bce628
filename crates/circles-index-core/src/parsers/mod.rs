//! Log parsers — one per contract family.
//!
//! Each parser owns the event schemas for its contract, filters raw logs by
//! emitter address and topic, and decodes matches into [`IndexEvent`]s. The
//! three families together cover every kind in [`crate::event::EventKind`].

use alloy_primitives::B256;

use crate::error::IndexError;
use crate::event::{EventMeta, IndexEvent};
use crate::types::{b256_to_hex, Block, LogEntry, Receipt};

pub mod name_registry;
pub mod v1;
pub mod v2;

/// Decodes raw logs for one contract family.
pub trait LogParser: Send + Sync {
    /// Cheap pre-filter: could this log belong to this parser's contract?
    /// A `true` here does not guarantee `parse` yields events.
    fn is_candidate(&self, log: &LogEntry) -> bool;

    /// Decodes `log` into zero or more events. Returns an empty vec for
    /// candidate logs whose topic is not one of this parser's schemas.
    fn parse(
        &self,
        block: &Block,
        receipt: &Receipt,
        log: &LogEntry,
    ) -> Result<Vec<IndexEvent>, IndexError>;
}

/// Builds the positional metadata for an event decoded from `log`.
pub(crate) fn event_meta(block: &Block, receipt: &Receipt, log: &LogEntry) -> EventMeta {
    EventMeta {
        block_number: block.number,
        timestamp: block.timestamp,
        transaction_index: receipt.transaction_index,
        log_index: log.log_index,
        transaction_hash: b256_to_hex(&receipt.transaction_hash),
    }
}

pub(crate) fn topic_matches(log: &LogEntry, topic: &B256) -> bool {
    log.topic0() == Some(topic)
}

// ─── Shared test fixtures ────────────────────────────────────────────────────
