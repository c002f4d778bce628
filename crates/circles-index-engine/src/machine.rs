//! The sync state machine.
//!
//! Orchestrates the whole indexer lifecycle:
//!
//! ```text
//! Initial ──► Syncing ◄──► WaitForNewBlock
//!    ▲          │  ▲             │
//!    │          ▼  └── Reorg ◄───┘
//!    └─────── Error ──► End   (3 strikes)
//! ```
//!
//! All sync progress lives in the store; every entry into `Initial` re-derives
//! it and runs a mandatory reorg cleanup, which is also how a crash between
//! unsynchronized buffer flushes heals. New heads arrive on a `watch` channel:
//! single-slot, latest-wins, so a burst of notifications collapses into one
//! scan. The machine itself is single-threaded; each state handler runs to
//! completion before the next transition.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use circles_index_core::{
    all_tables, b256_to_hex, IndexError, LogParser, NameRegistryParser, SchemaRegistry, V1Parser,
    V2Parser,
};
use circles_index_storage::Database;

use crate::config::EngineConfig;
use crate::flow::ImportFlow;
use crate::reorg::ReorgHandler;
use crate::sink::Sink;
use crate::source::ChainSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Initial,
    Syncing,
    WaitForNewBlock,
    /// Carries the reorg point: the lowest diverged height.
    Reorg(i64),
    Error,
    End,
}

pub struct StateMachine {
    source: Arc<dyn ChainSource>,
    database: Arc<dyn Database>,
    flow: ImportFlow,
    reorg: ReorgHandler,
    sink: Arc<Sink>,
    config: EngineConfig,
    state: SyncState,
    last_index_height: i64,
    /// Errors since the last successful sync.
    errors: Vec<String>,
    new_heads: watch::Receiver<i64>,
    cancel: CancellationToken,
}

impl StateMachine {
    pub fn new(
        source: Arc<dyn ChainSource>,
        database: Arc<dyn Database>,
        registry: &SchemaRegistry,
        config: EngineConfig,
        new_heads: watch::Receiver<i64>,
        cancel: CancellationToken,
    ) -> Self {
        let parsers: Vec<Arc<dyn LogParser>> = vec![
            Arc::new(V1Parser::new(registry, config.v1_hub_address)),
            Arc::new(V2Parser::new(registry, config.v2_hub_address)),
            Arc::new(NameRegistryParser::new(registry, config.name_registry_address)),
        ];
        let sink = Arc::new(Sink::new(
            Arc::clone(&database),
            registry,
            config.event_buffer_size,
        ));
        let flow = ImportFlow::new(
            Arc::clone(&source),
            Arc::clone(&database),
            parsers,
            Arc::clone(&sink),
            config.clone(),
        );
        let reorg = ReorgHandler::new(Arc::clone(&database), all_tables(registry));
        Self {
            source,
            database,
            flow,
            reorg,
            sink,
            config,
            state: SyncState::Initial,
            last_index_height: 0,
            errors: Vec::new(),
            new_heads,
            cancel,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn last_index_height(&self) -> i64 {
        self.last_index_height
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn sink(&self) -> &Sink {
        &self.sink
    }

    /// Drives the machine until `End` (or cancellation).
    pub async fn run(&mut self) -> Result<(), IndexError> {
        loop {
            if self.cancel.is_cancelled() {
                self.transition(SyncState::End);
            }
            let next = match self.state {
                SyncState::Initial => self.enter_initial().await,
                SyncState::Syncing => self.enter_syncing().await,
                SyncState::WaitForNewBlock => self.enter_wait_for_new_block().await,
                SyncState::Reorg(point) => self.enter_reorg(point).await,
                SyncState::Error => self.enter_error(),
                SyncState::End => {
                    info!("state machine halted");
                    return Ok(());
                }
            };
            self.transition(next);
        }
    }

    // ─── State handlers ──────────────────────────────────────────────────────
    //
    // Public so scenario tests can drive single transitions; each returns the
    // next state instead of mutating it, `run` applies the transition.

    /// Migrate, re-derive the index height from the store, and run the
    /// mandatory cleanup pass for rows a prior unclean shutdown may have left.
    pub async fn enter_initial(&mut self) -> SyncState {
        match self.initialize().await {
            Ok(next) => next,
            Err(error) => self.record_error(error),
        }
    }

    async fn initialize(&mut self) -> Result<SyncState, IndexError> {
        self.database.migrate().await?;
        self.last_index_height = self.store_height().await?;
        let head = self.source.head().await?;

        let cleanup = self.last_index_height.min(head.number) + 1;
        self.reorg.reorg_at(cleanup).await?;
        self.last_index_height = self.store_height().await?;
        info!(
            height = self.last_index_height,
            head = head.number,
            "initialized from store"
        );

        Ok(if head.number != self.last_index_height {
            SyncState::Syncing
        } else {
            SyncState::WaitForNewBlock
        })
    }

    /// Import everything between the stored height and the chain head.
    pub async fn enter_syncing(&mut self) -> SyncState {
        match self.sync_once().await {
            Ok(()) => {
                self.errors.clear();
                SyncState::WaitForNewBlock
            }
            Err(error) => self.record_error(error),
        }
    }

    async fn sync_once(&mut self) -> Result<(), IndexError> {
        self.last_index_height = self.store_height().await?;
        let head = self.source.head().await?;
        let from = (self.last_index_height + 1).max(self.config.start_block.max(1));
        if head.number >= from {
            self.flow
                .run(from..=head.number, self.cancel.child_token())
                .await?;
        }
        self.last_index_height = self.store_height().await?;
        Ok(())
    }

    /// Park until the embedder announces a new head, then decide between
    /// plain catch-up and reorg repair.
    pub async fn enter_wait_for_new_block(&mut self) -> SyncState {
        let head = tokio::select! {
            _ = self.cancel.cancelled() => return SyncState::End,
            changed = self.new_heads.changed() => match changed {
                Ok(()) => *self.new_heads.borrow_and_update(),
                // The notification side is gone; nothing left to wait for.
                Err(_) => return SyncState::End,
            }
        };
        self.on_new_head(head).await
    }

    /// Reacts to one new-head notification.
    pub async fn on_new_head(&mut self, head: i64) -> SyncState {
        match self.find_reorg_point(head).await {
            Ok(0) => SyncState::Syncing,
            Ok(point) => SyncState::Reorg(point),
            Err(error) => self.record_error(error),
        }
    }

    /// Determines the reorg point for a new `head`, 0 meaning none.
    ///
    /// A head at or below the stored height means the chain went backwards:
    /// the head itself is the reorg point. Otherwise the last
    /// `reorg_scan_depth` persisted hashes are compared against the canonical
    /// chain, newest first; the scan stops at the first matching height and
    /// the lowest mismatch wins.
    async fn find_reorg_point(&mut self, head: i64) -> Result<i64, IndexError> {
        self.last_index_height = self.store_height().await?;
        if head <= self.last_index_height {
            warn!(head, height = self.last_index_height, "new head is behind the store");
            return Ok(head);
        }

        let persisted = self
            .database
            .last_persisted_blocks(self.config.reorg_scan_depth)
            .await?;
        let mut point = 0;
        for block in persisted {
            match self.source.find_block(block.block_number).await? {
                Some(canonical) if b256_to_hex(&canonical.hash) == block.block_hash => break,
                // Diverged, or fallen off the canonical chain entirely.
                _ => point = block.block_number,
            }
        }
        if point > 0 {
            warn!(point, head, "reorg detected");
        }
        Ok(point)
    }

    /// Drop the diverged suffix, then resync it.
    pub async fn enter_reorg(&mut self, point: i64) -> SyncState {
        match self.reorg.reorg_at(point).await {
            Ok(_) => SyncState::Syncing,
            Err(error) => self.record_error(error),
        }
    }

    /// Terminal after `max_errors` consecutive failures, retry via `Initial`
    /// otherwise.
    pub fn enter_error(&mut self) -> SyncState {
        if self.errors.len() >= self.config.max_errors {
            warn!(errors = self.errors.len(), "error budget exhausted, halting");
            SyncState::End
        } else {
            SyncState::Initial
        }
    }

    // ─── Internals ───────────────────────────────────────────────────────────

    /// The height everything below which is fully persisted: one before the
    /// first gap if the block table has a hole, else the highest stored
    /// block, else 0.
    async fn store_height(&self) -> Result<i64, IndexError> {
        if let Some(gap) = self.database.first_gap().await? {
            return Ok(gap - 1);
        }
        Ok(self.database.latest_block().await?.unwrap_or(0))
    }

    fn record_error(&mut self, error: IndexError) -> SyncState {
        warn!(%error, state = ?self.state, "state handler failed");
        self.errors.push(error.to_string());
        SyncState::Error
    }

    fn transition(&mut self, next: SyncState) {
        if self.state != next {
            info!(from = ?self.state, to = ?next, "state transition");
        }
        self.state = next;
    }
}
