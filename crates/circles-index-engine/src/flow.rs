//! The import pipeline.
//!
//! Four stages connected by bounded channels: fetch block → fetch receipts →
//! decode logs → sink. The first three are small worker pools; the sink is a
//! single consumer behind a deep queue. Backpressure is the blocking `send`
//! on a full channel. A block travels through the decode stage as one unit
//! owned by one worker, so within-block event order is preserved; cross-block
//! order is reconstructed later from the positional sort key. Any fetch or
//! decode failure aborts the whole run; batches that were already flushed
//! stay committed.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use circles_index_core::{
    b256_to_hex, Block, BlockRange, BlockWithReceipts, ColumnValue, IndexError, IndexEvent,
    InsertBuffer, LogParser, TableSchema,
};
use circles_index_storage::Database;

use crate::config::EngineConfig;
use crate::sink::Sink;
use crate::source::ChainSource;

pub struct ImportFlow {
    source: Arc<dyn ChainSource>,
    database: Arc<dyn Database>,
    parsers: Vec<Arc<dyn LogParser>>,
    sink: Arc<Sink>,
    block_table: TableSchema,
    block_buffer: Arc<InsertBuffer<Vec<ColumnValue>>>,
    config: EngineConfig,
}

impl ImportFlow {
    pub fn new(
        source: Arc<dyn ChainSource>,
        database: Arc<dyn Database>,
        parsers: Vec<Arc<dyn LogParser>>,
        sink: Arc<Sink>,
        config: EngineConfig,
    ) -> Self {
        Self {
            source,
            database,
            parsers,
            sink,
            block_table: TableSchema::block_table(),
            block_buffer: Arc::new(InsertBuffer::new()),
            config,
        }
    }

    /// Imports the given block numbers. Returns the inclusive range actually
    /// processed ([`BlockRange::EMPTY`] for no input); both the event and
    /// block buffers are force-flushed before returning successfully.
    pub async fn run(
        &self,
        blocks: impl IntoIterator<Item = i64>,
        cancel: CancellationToken,
    ) -> Result<BlockRange, IndexError> {
        let abort = cancel.child_token();
        let range = Arc::new(std::sync::Mutex::new(BlockRange::EMPTY));

        let (number_tx, number_rx) = mpsc::channel::<i64>(self.config.fetch_parallelism.max(1));
        let (block_tx, block_rx) = mpsc::channel::<Block>(self.config.receipt_parallelism.max(1));
        let (unit_tx, unit_rx) =
            mpsc::channel::<BlockWithReceipts>(self.config.decode_parallelism.max(1));
        // The sink stage is a single consumer behind a deep queue, so decode
        // workers rarely block on it.
        let (decoded_tx, decoded_rx) =
            mpsc::channel::<DecodedBlock>(self.config.event_buffer_size.max(1));
        let number_rx = Arc::new(Mutex::new(number_rx));
        let block_rx = Arc::new(Mutex::new(block_rx));
        let unit_rx = Arc::new(Mutex::new(unit_rx));
        let decoded_rx = Arc::new(Mutex::new(decoded_rx));

        let mut workers: JoinSet<Result<(), IndexError>> = JoinSet::new();

        for _ in 0..self.config.fetch_parallelism.max(1) {
            let source = Arc::clone(&self.source);
            let rx = Arc::clone(&number_rx);
            let tx = block_tx.clone();
            let abort = abort.clone();
            workers.spawn(async move {
                let result = async {
                    while let Some(number) = recv_or_abort(&rx, &abort).await? {
                        let block = source.find_block(number).await?.ok_or_else(|| {
                            IndexError::Pipeline(format!("block {number} not found on chain"))
                        })?;
                        if tx.send(block).await.is_err() {
                            break;
                        }
                    }
                    Ok(())
                }
                .await;
                // A failed worker must unblock the feeder and its peers.
                if result.is_err() {
                    abort.cancel();
                }
                result
            });
        }
        drop(block_tx);

        for _ in 0..self.config.receipt_parallelism.max(1) {
            let source = Arc::clone(&self.source);
            let rx = Arc::clone(&block_rx);
            let tx = unit_tx.clone();
            let abort = abort.clone();
            workers.spawn(async move {
                let result = async {
                    while let Some(block) = recv_or_abort(&rx, &abort).await? {
                        let receipts = source.receipts(&block).await?;
                        if tx.send(BlockWithReceipts { block, receipts }).await.is_err() {
                            break;
                        }
                    }
                    Ok(())
                }
                .await;
                if result.is_err() {
                    abort.cancel();
                }
                result
            });
        }
        drop(unit_tx);

        for _ in 0..self.config.decode_parallelism.max(1) {
            let rx = Arc::clone(&unit_rx);
            let tx = decoded_tx.clone();
            let abort = abort.clone();
            let parsers = self.parsers.clone();
            workers.spawn(async move {
                let result = async {
                    while let Some(unit) = recv_or_abort(&rx, &abort).await? {
                        let events = decode_unit(&unit, &parsers)?;
                        let decoded = DecodedBlock {
                            block: unit.block,
                            events,
                        };
                        if tx.send(decoded).await.is_err() {
                            break;
                        }
                    }
                    Ok(())
                }
                .await;
                if result.is_err() {
                    abort.cancel();
                }
                result
            });
        }
        drop(decoded_tx);

        // Stage 4: the single sink worker. Sole writer to the event and block
        // buffers during the run, so flush thresholds are checked race-free.
        {
            let rx = Arc::clone(&decoded_rx);
            let abort = abort.clone();
            let sink = Arc::clone(&self.sink);
            let database = Arc::clone(&self.database);
            let block_buffer = Arc::clone(&self.block_buffer);
            let block_table = self.block_table.clone();
            let block_buffer_size = self.config.block_buffer_size;
            let range = Arc::clone(&range);
            workers.spawn(async move {
                let result = async {
                    while let Some(decoded) = recv_or_abort(&rx, &abort).await? {
                        for event in decoded.events {
                            sink.add_event(event).await?;
                        }
                        block_buffer.push(vec![
                            ColumnValue::Int(decoded.block.number),
                            ColumnValue::Int(decoded.block.timestamp),
                            ColumnValue::Text(b256_to_hex(&decoded.block.hash)),
                        ]);
                        if block_buffer.len() >= block_buffer_size {
                            let rows = block_buffer.take_snapshot();
                            database.write_batch(&block_table, &rows).await?;
                        }
                        extend_range(&range, decoded.block.number);
                    }
                    Ok(())
                }
                .await;
                if result.is_err() {
                    abort.cancel();
                }
                result
            });
        }

        // Feed the stages; blocks here when the first channel is full.
        let mut fed = 0usize;
        let mut feed_error = None;
        for number in blocks {
            tokio::select! {
                _ = abort.cancelled() => {
                    feed_error = Some(IndexError::Aborted);
                    break;
                }
                sent = number_tx.send(number) => {
                    if sent.is_err() {
                        // A worker failed and the channel closed behind it;
                        // the join loop below surfaces the real error.
                        break;
                    }
                    fed += 1;
                }
            }
        }
        drop(number_tx);

        let mut first_error = feed_error;
        while let Some(joined) = workers.join_next().await {
            let result = joined
                .map_err(|e| IndexError::Pipeline(format!("pipeline worker panicked: {e}")))?;
            if let Err(error) = result {
                abort.cancel();
                // The underlying failure beats the Aborted errors it caused.
                let keep = matches!(first_error, None | Some(IndexError::Aborted))
                    && !matches!(error, IndexError::Aborted);
                if first_error.is_none() || keep {
                    first_error = Some(error);
                }
            }
        }
        if let Some(error) = first_error {
            return Err(error);
        }

        // Forced flush of whatever the run left buffered.
        self.sink.flush().await?;
        let rows = self.block_buffer.take_snapshot();
        self.database.write_batch(&self.block_table, &rows).await?;

        let range = *match range.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if range.is_empty() {
            debug!("pipeline run over empty input");
        } else {
            info!(
                from = range.min,
                to = range.max,
                blocks = fed,
                "pipeline run complete"
            );
        }
        Ok(range)
    }
}

async fn recv_or_abort<T>(
    rx: &Mutex<mpsc::Receiver<T>>,
    abort: &CancellationToken,
) -> Result<Option<T>, IndexError> {
    let mut rx = rx.lock().await;
    tokio::select! {
        _ = abort.cancelled() => Err(IndexError::Aborted),
        item = rx.recv() => Ok(item),
    }
}

/// A block's worth of decoded events, handed from stage 3 to the sink stage.
struct DecodedBlock {
    block: Block,
    events: Vec<IndexEvent>,
}

fn decode_unit(
    unit: &BlockWithReceipts,
    parsers: &[Arc<dyn LogParser>],
) -> Result<Vec<IndexEvent>, IndexError> {
    let mut events = Vec::new();
    for receipt in &unit.receipts {
        for log in &receipt.logs {
            for parser in parsers {
                if !parser.is_candidate(log) {
                    continue;
                }
                events.extend(parser.parse(&unit.block, receipt, log)?);
            }
        }
    }
    Ok(events)
}

fn extend_range(range: &std::sync::Mutex<BlockRange>, block_number: i64) {
    match range.lock() {
        Ok(mut guard) => guard.extend(block_number),
        Err(poisoned) => poisoned.into_inner().extend(block_number),
    }
}
