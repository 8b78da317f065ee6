//! Background batch writer for execution records.
//!
//! `submit()` never blocks the caller: records go into a bounded queue and
//! are dropped (and counted) when the queue is full. A single worker task
//! drains the queue and writes a batch whenever the buffer reaches the
//! threshold or the flush interval elapses, whichever comes first.

use crate::VectorStore;
use spanvec_core::{BatchConfig, ExecutionRecord, SpanvecError, SpanvecResult, StorageError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

enum Command {
    Record(Box<ExecutionRecord>),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    dropped: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
}

/// Batch writer statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchWriterStats {
    /// Records accepted into the queue
    pub submitted: u64,
    /// Records rejected because the queue was full or closed
    pub dropped: u64,
    /// Records persisted by the store
    pub written: u64,
    /// Records lost to store write failures
    pub failed: u64,
}

impl BatchWriterStats {
    /// Fraction of offered records that never reached the store.
    pub fn loss_rate(&self) -> f64 {
        let offered = self.submitted + self.dropped;
        if offered == 0 {
            0.0
        } else {
            (self.dropped + self.failed) as f64 / offered as f64
        }
    }
}

/// Non-blocking, batching record writer.
pub struct BatchWriter {
    sender: mpsc::Sender<Command>,
    capacity: usize,
    counters: Arc<Counters>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Floor for the flush interval; a zero period would panic the worker.
const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(1);

impl BatchWriter {
    /// Spawn the worker task on the current tokio runtime.
    ///
    /// # Arguments
    /// * `store` - Destination for flushed batches
    /// * `config` - Threshold, interval and queue capacity
    pub fn start(store: Arc<dyn VectorStore>, config: &BatchConfig) -> Self {
        let capacity = config.queue_capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let counters = Arc::new(Counters::default());

        let worker = tokio::spawn(run_worker(
            store,
            receiver,
            config.threshold.max(1),
            config.flush_interval.max(MIN_FLUSH_INTERVAL),
            Arc::clone(&counters),
        ));

        Self {
            sender,
            capacity,
            counters,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queue a record for writing. Never waits.
    ///
    /// # Errors
    /// * `StorageError::QueueFull` - The queue is at capacity; the record was dropped
    /// * `StorageError::WriterClosed` - The writer has been shut down
    pub fn submit(&self, record: ExecutionRecord) -> SpanvecResult<()> {
        match self.sender.try_send(Command::Record(Box::new(record))) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    capacity = self.capacity,
                    dropped_total = dropped,
                    "Execution record queue full, record dropped"
                );
                Err(SpanvecError::Storage(StorageError::QueueFull {
                    capacity: self.capacity,
                }))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                Err(SpanvecError::Storage(StorageError::WriterClosed))
            }
        }
    }

    /// Wait until every record submitted before this call has been written
    /// (or has failed to write).
    pub async fn flush(&self) -> SpanvecResult<()> {
        let (ack, done) = oneshot::channel();
        self.sender
            .send(Command::Flush(ack))
            .await
            .map_err(|_| SpanvecError::Storage(StorageError::WriterClosed))?;
        done.await
            .map_err(|_| SpanvecError::Storage(StorageError::WriterClosed))
    }

    /// Drain the queue, write the final batch and stop the worker.
    ///
    /// Submissions after shutdown fail with `WriterClosed`. Calling this
    /// twice is harmless.
    pub async fn shutdown(&self) -> SpanvecResult<()> {
        let (ack, done) = oneshot::channel();
        if self.sender.send(Command::Shutdown(ack)).await.is_ok() {
            let _ = done.await;
        }

        let handle = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => return Err(SpanvecError::Storage(StorageError::LockPoisoned)),
        };
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Batch writer worker terminated abnormally");
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> BatchWriterStats {
        BatchWriterStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            written: self.counters.written.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for BatchWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchWriter")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}

// ============================================================================
// WORKER
// ============================================================================

async fn run_worker(
    store: Arc<dyn VectorStore>,
    mut receiver: mpsc::Receiver<Command>,
    threshold: usize,
    flush_interval: Duration,
    counters: Arc<Counters>,
) {
    let mut buffer: Vec<ExecutionRecord> = Vec::with_capacity(threshold);
    let mut ticker = tokio::time::interval(flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            command = receiver.recv() => match command {
                Some(Command::Record(record)) => {
                    buffer.push(*record);
                    if buffer.len() >= threshold {
                        write_batch(store.as_ref(), &mut buffer, &counters).await;
                    }
                }
                Some(Command::Flush(ack)) => {
                    write_batch(store.as_ref(), &mut buffer, &counters).await;
                    let _ = ack.send(());
                }
                Some(Command::Shutdown(ack)) => {
                    receiver.close();
                    let mut acks = vec![ack];
                    while let Some(command) = receiver.recv().await {
                        match command {
                            Command::Record(record) => buffer.push(*record),
                            Command::Flush(ack) | Command::Shutdown(ack) => acks.push(ack),
                        }
                    }
                    write_batch(store.as_ref(), &mut buffer, &counters).await;
                    for ack in acks {
                        let _ = ack.send(());
                    }
                    break;
                }
                None => {
                    write_batch(store.as_ref(), &mut buffer, &counters).await;
                    break;
                }
            },
            _ = ticker.tick() => {
                write_batch(store.as_ref(), &mut buffer, &counters).await;
            }
        }
    }

    tracing::debug!("Batch writer worker stopped");
}

async fn write_batch(store: &dyn VectorStore, buffer: &mut Vec<ExecutionRecord>, counters: &Counters) {
    if buffer.is_empty() {
        return;
    }
    let batch = std::mem::take(buffer);
    let count = batch.len() as u64;
    match store.put_executions(&batch).await {
        Ok(()) => {
            counters.written.fetch_add(count, Ordering::Relaxed);
            tracing::debug!(records = count, "Execution batch written");
        }
        Err(e) => {
            counters.failed.fetch_add(count, Ordering::Relaxed);
            tracing::error!(error = %e, records = count, "Failed to write execution batch");
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
