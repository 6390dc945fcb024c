//! Batch persistence scheduler.
//!
//! Validated points are grouped into fixed-size batches. Every full batch is
//! spawned onto a `JoinSet` that holds at most `max_in_flight` tasks; each task
//! owns its batch and persists it with a single bulk insert. At end of stream
//! the trailing batch is flushed, then all tasks are drained under a deadline.
//!
//! Waiting for a free slot is bounded by the same deadline as the final drain
//! and wakes on shutdown, so one hung insert cannot stall the file forever.
//!
//! Batches complete in any order. Dropping the scheduler aborts whatever is
//! still running.

use crate::config::IngestConfig;
use ingest_core::{DataPoint, DataPointWriter, Error, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use telemetry::metrics;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, warn};

/// Scheduler settings derived from [`IngestConfig`].
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    pub batch_size: usize,
    pub max_in_flight: usize,
    pub drain_timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl From<&IngestConfig> for PersistenceConfig {
    fn from(config: &IngestConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            max_in_flight: config.max_in_flight,
            drain_timeout: config.drain_timeout(),
            max_retries: config.max_batch_retries,
            retry_backoff: config.batch_retry_backoff(),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self::from(&IngestConfig::default())
    }
}

/// Outcome of persisting one file's batches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistReport {
    pub batches: usize,
    pub rows: usize,
    pub failed_batches: usize,
    /// Batches cancelled because the drain deadline passed
    pub aborted_batches: usize,
}

/// Keeps the in-flight gauge accurate even when a task is aborted.
struct InFlightGuard;

impl InFlightGuard {
    fn new() -> Self {
        metrics().batches_in_flight.inc();
        Self
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        metrics().batches_in_flight.dec();
    }
}

/// Groups points into batches and persists them concurrently.
pub struct BatchScheduler {
    file_id: u64,
    writer: Arc<dyn DataPointWriter>,
    config: PersistenceConfig,
    buffer: Vec<DataPoint>,
    tasks: JoinSet<Result<usize>>,
    report: PersistReport,
    shutdown: Option<watch::Receiver<bool>>,
}

/// What ended one round of waiting for a free slot.
enum SlotWait {
    Joined(Option<std::result::Result<Result<usize>, JoinError>>),
    Shutdown,
    Expired,
}

impl BatchScheduler {
    pub fn new(file_id: u64, writer: Arc<dyn DataPointWriter>, config: PersistenceConfig) -> Self {
        let batch_size = config.batch_size.max(1);
        Self {
            file_id,
            writer,
            config: PersistenceConfig {
                batch_size,
                max_in_flight: config.max_in_flight.max(1),
                ..config
            },
            buffer: Vec::with_capacity(batch_size),
            tasks: JoinSet::new(),
            report: PersistReport::default(),
            shutdown: None,
        }
    }

    /// Stops waiting for a free slot once `shutdown` flips to true.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Adds a point; submits the batch once it is full.
    ///
    /// Waits for a free slot when `max_in_flight` batches are running. Fails
    /// with `Cancelled` if shutdown arrives while waiting, and with
    /// `PartialPersistence` if no slot frees up within the drain timeout.
    pub async fn push(&mut self, point: DataPoint) -> Result<()> {
        self.buffer.push(point);
        if self.buffer.len() >= self.config.batch_size {
            let batch = std::mem::replace(
                &mut self.buffer,
                Vec::with_capacity(self.config.batch_size),
            );
            self.submit(batch).await?;
        }
        Ok(())
    }

    /// Batches submitted so far.
    pub fn submitted(&self) -> usize {
        self.report.batches
    }

    async fn submit(&mut self, batch: Vec<DataPoint>) -> Result<()> {
        while let Some(result) = self.tasks.try_join_next() {
            self.record(result);
        }
        self.wait_for_slot().await?;

        let index = self.report.batches;
        self.report.batches += 1;

        let writer = self.writer.clone();
        let file_id = self.file_id;
        let max_retries = self.config.max_retries;
        let backoff = self.config.retry_backoff;
        let guard = InFlightGuard::new();

        self.tasks.spawn(async move {
            let _guard = guard;
            insert_with_retry(writer.as_ref(), &batch, max_retries, backoff, file_id, index).await
        });
        Ok(())
    }

    async fn wait_for_slot(&mut self) -> Result<()> {
        let deadline = tokio::time::Instant::now() + self.config.drain_timeout;
        let mut shutdown = self.shutdown.clone();

        while self.tasks.len() >= self.config.max_in_flight {
            if shutdown.as_ref().is_some_and(|rx| *rx.borrow()) {
                return Err(Error::Cancelled);
            }

            let waited = tokio::select! {
                biased;
                _ = shutdown_changed(&mut shutdown) => SlotWait::Shutdown,
                _ = tokio::time::sleep_until(deadline) => SlotWait::Expired,
                result = self.tasks.join_next() => SlotWait::Joined(result),
            };

            match waited {
                SlotWait::Joined(Some(result)) => self.record(result),
                SlotWait::Joined(None) => break,
                // Re-checked at the top of the loop.
                SlotWait::Shutdown => {}
                SlotWait::Expired => {
                    warn!(
                        file_id = self.file_id,
                        in_flight = self.tasks.len(),
                        timeout_ms = %self.config.drain_timeout.as_millis(),
                        "No batch slot freed before the deadline, cancelling in-flight batches"
                    );
                    self.abort_in_flight().await;
                    return Err(Error::PartialPersistence {
                        file_id: self.file_id,
                        failed_batches: self.report.failed_batches,
                        total_batches: self.report.batches,
                    });
                }
            }
        }
        Ok(())
    }

    async fn abort_in_flight(&mut self) {
        self.tasks.abort_all();
        while let Some(result) = self.tasks.join_next().await {
            self.record(result);
        }
    }

    fn record(&mut self, result: std::result::Result<Result<usize>, JoinError>) {
        match result {
            Ok(Ok(rows)) => self.report.rows += rows,
            // Already logged by the task.
            Ok(Err(_)) => self.report.failed_batches += 1,
            Err(e) if e.is_cancelled() => {
                self.report.failed_batches += 1;
                self.report.aborted_batches += 1;
                metrics().batches_aborted.inc();
            }
            Err(e) => {
                error!(file_id = self.file_id, error = %e, "Batch task panicked");
                self.report.failed_batches += 1;
            }
        }
    }

    async fn drain(&mut self) {
        let deadline = self.config.drain_timeout;
        let drained = tokio::time::timeout(deadline, async {
            loop {
                let Some(result) = self.tasks.join_next().await else {
                    break;
                };
                self.record(result);
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                file_id = self.file_id,
                pending = self.tasks.len(),
                timeout_ms = %deadline.as_millis(),
                "Batch drain timed out, cancelling in-flight batches"
            );
            self.abort_in_flight().await;
        }
    }

    /// Flushes the trailing batch and waits for every batch to settle.
    ///
    /// Fails with `PartialPersistence` if any batch failed or was cancelled.
    /// Fails with `Cancelled` if shutdown arrives while the trailing batch
    /// waits for a slot; running batches are still drained first.
    pub async fn finish(mut self) -> Result<PersistReport> {
        if !self.buffer.is_empty() {
            let batch = std::mem::take(&mut self.buffer);
            if let Err(e) = self.submit(batch).await {
                self.drain().await;
                return Err(e);
            }
        }

        self.drain().await;

        let report = std::mem::take(&mut self.report);
        debug!(
            file_id = self.file_id,
            batches = report.batches,
            rows = report.rows,
            failed = report.failed_batches,
            "Batch persistence drained"
        );

        if report.failed_batches > 0 {
            return Err(Error::PartialPersistence {
                file_id: self.file_id,
                failed_batches: report.failed_batches,
                total_batches: report.batches,
            });
        }
        Ok(report)
    }

    /// Drops the unsubmitted buffer and drains in-flight batches (shutdown).
    pub async fn abandon(mut self) -> PersistReport {
        self.buffer.clear();
        self.drain().await;
        std::mem::take(&mut self.report)
    }
}

/// Resolves when the value changes. A dropped sender can never signal
/// shutdown, so the receiver is discarded and this pends from then on.
async fn shutdown_changed(shutdown: &mut Option<watch::Receiver<bool>>) {
    let Some(rx) = shutdown.as_mut() else {
        return std::future::pending().await;
    };
    if rx.changed().await.is_err() {
        *shutdown = None;
        std::future::pending::<()>().await;
    }
}

async fn insert_with_retry(
    writer: &dyn DataPointWriter,
    batch: &[DataPoint],
    max_retries: u32,
    backoff: Duration,
    file_id: u64,
    index: usize,
) -> Result<usize> {
    let mut attempt = 0;

    loop {
        let start = Instant::now();
        match writer.insert_batch(batch).await {
            Ok(rows) => {
                metrics()
                    .batch_insert_latency_ms
                    .observe(start.elapsed().as_millis() as u64);
                metrics().batches_inserted.inc();
                metrics().rows_inserted.inc_by(rows as u64);
                return Ok(rows);
            }
            Err(e) => {
                metrics().batch_insert_errors.inc();
                if attempt >= max_retries {
                    error!(
                        file_id = file_id,
                        batch = index,
                        rows = batch.len(),
                        attempts = attempt + 1,
                        error = %e,
                        "Batch insert failed"
                    );
                    return Err(e);
                }

                attempt += 1;
                let delay = backoff * attempt;
                warn!(
                    file_id = file_id,
                    batch = index,
                    attempt = attempt,
                    backoff_ms = %delay.as_millis(),
                    error = %e,
                    "Retrying batch insert"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
