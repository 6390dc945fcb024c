//! Per-file ingestion: idempotency check, streaming parse, concurrent
//! persistence, and the final status transition.
//!
//! The only persisted states are `Pending` and `Completed`. A file is marked
//! completed after every batch is durable, and the caller acknowledges the
//! event only after that save returns. Any error leaves the record pending so a
//! redelivery starts over from the idempotency check.

use crate::aggregator::{OnlineAggregator, Summary};
use crate::config::IngestConfig;
use crate::parser::{LineParser, ParseStats, ValidationRules};
use crate::persistence::{BatchScheduler, PersistReport, PersistenceConfig};
use ingest_core::{DataPointWriter, Error, FileRecordStore, IngestionEvent, Result};
use std::sync::Arc;
use std::time::Instant;
use telemetry::metrics;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

/// Statistics for a file that reached `Completed`.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestSummary {
    pub file_id: u64,
    pub rows: usize,
    pub batches: usize,
    pub mean: f64,
    pub median: f64,
    pub parse: ParseStats,
}

/// How an event was settled. Every variant means "acknowledge".
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    Completed(IngestSummary),
    /// The file was completed by an earlier delivery.
    AlreadyCompleted,
    /// No file record with this id.
    RecordNotFound,
    /// The uploaded file is gone from its stored path.
    FileMissing,
    /// The broker record could not be decoded.
    InvalidEvent,
    /// Processing failed with an error that a redelivery cannot fix.
    Terminal { code: &'static str },
    /// Processing kept failing until the redelivery limit was reached.
    DeadLettered { code: &'static str },
}

impl Disposition {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::AlreadyCompleted => "already_completed",
            Self::RecordNotFound => "record_not_found",
            Self::FileMissing => "file_missing",
            Self::InvalidEvent => "invalid_event",
            Self::Terminal { .. } => "terminal",
            Self::DeadLettered { .. } => "dead_lettered",
        }
    }
}

/// Processes one ingestion event end to end.
pub struct IngestionWorker {
    files: Arc<dyn FileRecordStore>,
    writer: Arc<dyn DataPointWriter>,
    config: IngestConfig,
    shutdown: watch::Receiver<bool>,
}

impl IngestionWorker {
    pub fn new(
        files: Arc<dyn FileRecordStore>,
        writer: Arc<dyn DataPointWriter>,
        config: IngestConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            files,
            writer,
            config,
            shutdown,
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Handles one event. `Ok` means acknowledge; `Err` means withhold so the
    /// event is redelivered.
    #[instrument(skip(self, event), fields(file_id = event.file_id))]
    pub async fn handle(&self, event: &IngestionEvent) -> Result<Disposition> {
        let Some(mut record) = self.files.find_by_id(event.file_id).await? else {
            warn!(path = %event.path.display(), "No file record for event, skipping");
            metrics().files_skipped.inc();
            return Ok(Disposition::RecordNotFound);
        };

        if record.is_completed() {
            info!("File already completed, skipping redelivered event");
            metrics().files_skipped.inc();
            return Ok(Disposition::AlreadyCompleted);
        }

        match tokio::fs::metadata(&event.path).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    error = %Error::FileNotFound(event.path.clone()),
                    "Uploaded file is gone, acknowledging without processing"
                );
                metrics().files_skipped.inc();
                return Ok(Disposition::FileMissing);
            }
            Err(e) => return Err(e.into()),
        }

        let start = Instant::now();
        let outcome = self.ingest(event).await;
        metrics()
            .file_processing_latency_ms
            .observe(start.elapsed().as_millis() as u64);

        let (summary, report, parse) = match outcome {
            Ok(done) => done,
            Err(e) => {
                metrics().files_failed.inc();
                return Err(e);
            }
        };

        record.complete(summary.mean, summary.median)?;
        self.files.save(&record).await?;
        metrics().files_completed.inc();

        info!(
            rows = report.rows,
            batches = report.batches,
            skipped = parse.invalid(),
            mean = summary.mean,
            median = summary.median,
            latency_ms = %start.elapsed().as_millis(),
            "File ingestion completed"
        );

        Ok(Disposition::Completed(IngestSummary {
            file_id: event.file_id,
            rows: report.rows,
            batches: report.batches,
            mean: summary.mean,
            median: summary.median,
            parse,
        }))
    }

    /// Streams the file into the aggregator and the batch scheduler.
    async fn ingest(&self, event: &IngestionEvent) -> Result<(Summary, PersistReport, ParseStats)> {
        let file_id = event.file_id;

        // Mutations are expensive; a first attempt has nothing to purge.
        if self.config.purge_partial_on_retry && self.writer.has_rows(file_id).await? {
            info!("Purging rows left by an earlier attempt");
            self.writer.purge_file(file_id).await?;
        }

        let rules = ValidationRules::from(&self.config);
        let mut parser = LineParser::open(&event.path, file_id, rules).await?;
        let mut aggregator = OnlineAggregator::new();
        let mut scheduler = BatchScheduler::new(
            file_id,
            self.writer.clone(),
            PersistenceConfig::from(&self.config),
        )
        .with_shutdown(self.shutdown.clone());
        let mut shutdown = self.shutdown.clone();
        let mut shutdown_open = true;

        loop {
            if *shutdown.borrow() {
                return Err(self.cancel(scheduler).await);
            }

            tokio::select! {
                biased;
                changed = shutdown.changed(), if shutdown_open => {
                    // A dropped sender can never signal shutdown.
                    shutdown_open = changed.is_ok();
                }
                next = parser.next_point() => {
                    // An I/O error drops the scheduler, which aborts in-flight batches.
                    let Some(point) = next? else {
                        break;
                    };
                    aggregator.push(point.temperature);
                    match scheduler.push(point).await {
                        Ok(()) => {}
                        Err(Error::Cancelled) => return Err(self.cancel(scheduler).await),
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        let parse = parser.into_stats();
        metrics().rows_parsed.inc_by(parse.valid);
        metrics().rows_skipped.inc_by(parse.lines_read - parse.valid);

        let Some(summary) = aggregator.finish() else {
            warn!(
                lines_read = parse.lines_read,
                invalid = parse.invalid(),
                "No valid rows in file"
            );
            return Err(Error::EmptyDataset {
                file_id,
                lines_read: parse.lines_read,
            });
        };

        let report = scheduler.finish().await?;
        Ok((summary, report, parse))
    }

    async fn cancel(&self, scheduler: BatchScheduler) -> Error {
        let report = scheduler.abandon().await;
        warn!(
            batches = report.batches,
            rows = report.rows,
            aborted = report.aborted_batches,
            "Shutdown during ingestion, leaving file pending"
        );
        metrics().files_failed.inc();
        Error::Cancelled
    }
}
