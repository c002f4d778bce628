//! Event sink — insert buffering and bulk flushing.
//!
//! Decode workers push events concurrently; once the buffer reaches its
//! threshold the next `add_event` call flushes. A flush snapshots the buffer,
//! groups events by kind, and writes one batch per kind concurrently; every
//! batch is attempted even if one fails, and the first error is reported
//! afterwards. There is no transaction across kinds — a crash between batch
//! commits is repaired by the state machine's initial reorg pass.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use circles_index_core::{
    all_tables, extract_row, EventKind, IndexError, IndexEvent, InsertBuffer, SchemaRegistry,
    TableSchema,
};
use circles_index_storage::Database;

#[derive(Default)]
struct KindCounters {
    added: AtomicU64,
    imported: AtomicU64,
}

pub struct Sink {
    database: Arc<dyn Database>,
    tables: HashMap<EventKind, TableSchema>,
    buffer: InsertBuffer<IndexEvent>,
    capacity: usize,
    /// Serializes flushes; concurrent triggers collapse into one snapshot.
    flush_lock: Mutex<()>,
    counters: HashMap<EventKind, KindCounters>,
}

impl Sink {
    pub fn new(database: Arc<dyn Database>, registry: &SchemaRegistry, capacity: usize) -> Self {
        let tables = all_tables(registry)
            .into_iter()
            .filter_map(|table| {
                EventKind::ALL
                    .iter()
                    .find(|k| k.table() == table.name)
                    .map(|&kind| (kind, table))
            })
            .collect();
        let counters = EventKind::ALL
            .iter()
            .map(|&kind| (kind, KindCounters::default()))
            .collect();
        Self {
            database,
            tables,
            buffer: InsertBuffer::new(),
            capacity,
            flush_lock: Mutex::new(()),
            counters,
        }
    }

    /// Buffers one event; flushes if the buffer crossed its threshold.
    pub async fn add_event(&self, event: IndexEvent) -> Result<(), IndexError> {
        if let Some(counters) = self.counters.get(&event.kind()) {
            counters.added.fetch_add(1, Ordering::Relaxed);
        }
        self.buffer.push(event);
        if self.buffer.len() >= self.capacity {
            self.flush().await?;
        }
        Ok(())
    }

    /// Writes out everything buffered so far. Empty buffer is a no-op.
    pub async fn flush(&self) -> Result<(), IndexError> {
        let _guard = self.flush_lock.lock().await;
        let snapshot = self.buffer.take_snapshot();
        if snapshot.is_empty() {
            return Ok(());
        }
        debug!(events = snapshot.len(), "flushing event buffer");

        let mut groups: HashMap<EventKind, Vec<Vec<circles_index_core::ColumnValue>>> =
            HashMap::new();
        for event in &snapshot {
            groups.entry(event.kind()).or_default().push(extract_row(event));
        }

        let mut writes = Vec::with_capacity(groups.len());
        for (kind, rows) in groups {
            let table = match self.tables.get(&kind) {
                Some(table) => table.clone(),
                None => {
                    return Err(IndexError::Storage(format!(
                        "no table registered for {kind}"
                    )))
                }
            };
            let database = Arc::clone(&self.database);
            writes.push(async move {
                let count = rows.len() as u64;
                database
                    .write_batch(&table, &rows)
                    .await
                    .map(|_| (kind, count))
            });
        }

        let mut first_error = None;
        for result in futures::future::join_all(writes).await {
            match result {
                Ok((kind, count)) => {
                    if let Some(counters) = self.counters.get(&kind) {
                        counters.imported.fetch_add(count, Ordering::Relaxed);
                    }
                }
                Err(error) => {
                    warn!(%error, "batch write failed during flush");
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Events currently buffered, not yet flushed.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Events of `kind` accepted so far.
    pub fn added(&self, kind: EventKind) -> u64 {
        self.counters
            .get(&kind)
            .map(|c| c.added.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Events of `kind` confirmed written so far.
    pub fn imported(&self, kind: EventKind) -> u64 {
        self.counters
            .get(&kind)
            .map(|c| c.imported.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}
