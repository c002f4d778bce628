//! circles-index-engine — ingestion pipeline and sync orchestration.
//!
//! # Architecture
//!
//! ```text
//! ChainSource ──► ImportFlow ──► Sink ──► Database
//!      │         (fetch / receipts /      (buffered
//!      │          decode workers)          bulk writes)
//!      │
//!      └──► StateMachine ──► ReorgHandler
//!           (Initial / Syncing / WaitForNewBlock
//!            / Reorg / Error / End)
//! ```
//!
//! The embedder implements [`ChainSource`] for its node access, feeds new
//! head numbers into a `watch` channel, and calls [`StateMachine::run`].
//! Everything else, including crash recovery and reorg repair, happens
//! inside the machine.

pub mod config;
pub mod flow;
pub mod machine;
pub mod reorg;
pub mod sink;
pub mod source;

pub use config::EngineConfig;
pub use flow::ImportFlow;
pub use machine::{StateMachine, SyncState};
pub use reorg::ReorgHandler;
pub use sink::Sink;
pub use source::ChainSource;
