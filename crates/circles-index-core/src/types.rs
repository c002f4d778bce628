//! Chain-facing types consumed by the pipeline.

use alloy_primitives::{Address, B256};

// ─── Block / Receipt / LogEntry ──────────────────────────────────────────────

/// A block as the pipeline needs it — number, hash, timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Block number.
    pub number: i64,
    /// Block hash.
    pub hash: B256,
    /// Unix timestamp of the block (seconds since epoch).
    pub timestamp: i64,
}

/// A transaction receipt with its log entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Position of the transaction within its block.
    pub transaction_index: i32,
    /// Transaction hash.
    pub transaction_hash: B256,
    /// Log entries emitted by the transaction, in emission order.
    pub logs: Vec<LogEntry>,
}

/// A single raw log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Position of the log within its block.
    pub log_index: i32,
    /// Contract address that emitted the log.
    pub address: Address,
    /// Topic slots; `topics[0]` is the event discriminator.
    pub topics: Vec<B256>,
    /// ABI-encoded data payload (non-indexed arguments).
    pub data: Vec<u8>,
}

impl LogEntry {
    /// Returns the event discriminator topic, if the log has one.
    pub fn topic0(&self) -> Option<&B256> {
        self.topics.first()
    }
}

/// A block paired with all its receipts — the unit that flows through the
/// decode stage end-to-end.
#[derive(Debug, Clone)]
pub struct BlockWithReceipts {
    pub block: Block,
    pub receipts: Vec<Receipt>,
}

// ─── BlockRange ──────────────────────────────────────────────────────────────

/// Inclusive range of block numbers actually processed by a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub min: i64,
    pub max: i64,
}

impl BlockRange {
    /// Sentinel for "the input sequence was empty".
    pub const EMPTY: BlockRange = BlockRange {
        min: i64::MAX,
        max: i64::MIN,
    };

    /// Returns `true` if no block was processed.
    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    /// Extend the range to include `block_number`.
    pub fn extend(&mut self, block_number: i64) {
        self.min = self.min.min(block_number);
        self.max = self.max.max(block_number);
    }
}

/// The canonical chain head as reported by the chain source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainHead {
    pub number: i64,
    pub hash: B256,
}

/// Renders an address the way it is persisted: `0x` + lowercase hex.
pub fn address_to_hex(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_slice()))
}

/// Renders a 32-byte hash the way it is persisted: `0x` + lowercase hex.
pub fn b256_to_hex(hash: &B256) -> String {
    format!("0x{}", hex::encode(hash.as_slice()))
}
