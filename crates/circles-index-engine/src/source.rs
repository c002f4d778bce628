//! The chain-facing seam.
//!
//! The engine never speaks JSON-RPC itself; an embedder supplies a
//! [`ChainSource`] and pushes new-head notifications into the watch channel
//! the state machine listens on. Tests drive the engine with a mock source.

use async_trait::async_trait;

use circles_index_core::{Block, ChainHead, IndexError, Receipt};

#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Fetches the canonical block at `number`, or `None` past the head.
    async fn find_block(&self, number: i64) -> Result<Option<Block>, IndexError>;

    /// Fetches all receipts of `block`, in transaction order. Receipt log
    /// entries carry block-wide log indices.
    async fn receipts(&self, block: &Block) -> Result<Vec<Receipt>, IndexError>;

    /// The current canonical chain head.
    async fn head(&self) -> Result<ChainHead, IndexError>;
}
