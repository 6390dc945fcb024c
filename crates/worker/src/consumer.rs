//! Consumer worker: drives ingestion events from the broker through the
//! ingestion worker.
//!
//! Loop:
//! 1. Fetch events after the committed offset
//! 2. Handle each event in offset order
//! 3. Commit past an event only once its outcome is durable
//! 4. On a retryable failure, stop, rewind, back off, and redeliver
//! 5. Once an event has failed past `max_redeliveries`, dead-letter it:
//!    commit past it and leave its file pending

use crate::ingest::{Disposition, IngestionWorker};
use ingest_core::{Error, EventSource, Offset, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use telemetry::{health, metrics};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Consumer worker configuration.
#[derive(Debug, Clone)]
pub struct ConsumerWorkerConfig {
    /// Pause before redelivering a failed event
    pub retry_backoff: Duration,
    /// Pause after a fetch that returned nothing
    pub idle_backoff: Duration,
    /// Redeliveries of a failing event before it is dead-lettered
    pub max_redeliveries: u32,
}

impl Default for ConsumerWorkerConfig {
    fn default() -> Self {
        Self {
            retry_backoff: Duration::from_secs(1),
            idle_backoff: Duration::from_millis(100),
            max_redeliveries: 5,
        }
    }
}

/// Worker that consumes ingestion events one at a time.
pub struct ConsumerWorker {
    source: Arc<dyn EventSource>,
    ingest: IngestionWorker,
    config: ConsumerWorkerConfig,
    /// Offset of the event that last failed and how often it has failed.
    failures: Mutex<Option<(Offset, u32)>>,
}

impl ConsumerWorker {
    pub fn new(source: Arc<dyn EventSource>, ingest: IngestionWorker) -> Self {
        let config = ConsumerWorkerConfig {
            retry_backoff: ingest.config().retry_backoff(),
            max_redeliveries: ingest.config().max_redeliveries,
            ..Default::default()
        };
        Self::with_config(source, ingest, config)
    }

    pub fn with_config(
        source: Arc<dyn EventSource>,
        ingest: IngestionWorker,
        config: ConsumerWorkerConfig,
    ) -> Self {
        Self {
            source,
            ingest,
            config,
            failures: Mutex::new(None),
        }
    }

    /// Runs until `shutdown` flips to true.
    ///
    /// A file in progress observes the same signal, drains its batches, and
    /// stays pending; its event is not committed.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            retry_backoff_ms = %self.config.retry_backoff.as_millis(),
            max_redeliveries = self.config.max_redeliveries,
            "Consumer worker starting"
        );

        while !*shutdown.borrow() {
            let pause = match self.poll_once().await {
                Ok(0) => Some(self.config.idle_backoff),
                Ok(count) => {
                    debug!(count = count, "Settled events");
                    health().consumer.set_healthy();
                    None
                }
                Err(Error::Cancelled) => {
                    info!("Ingestion cancelled for shutdown, event left for redelivery");
                    self.source.rewind().await;
                    None
                }
                Err(e) => {
                    error!(
                        code = e.code(),
                        error = %e,
                        "Event processing failed, withholding acknowledgment"
                    );
                    health().consumer.set_unhealthy(e.to_string());
                    metrics().events_redelivered.inc();
                    self.source.rewind().await;
                    Some(self.config.retry_backoff)
                }
            };

            if let Some(pause) = pause {
                tokio::select! {
                    _ = tokio::time::sleep(pause) => {}
                    Ok(()) = shutdown.changed() => {}
                }
            }
        }

        info!("Consumer worker stopped");
        Ok(())
    }

    /// Fetches and settles one batch of events.
    ///
    /// Returns the number of committed events. Stops at the first retryable
    /// failure without committing it or anything after it, unless that event
    /// has already used up its redeliveries.
    pub async fn poll_once(&self) -> Result<usize> {
        let records = self.source.fetch().await?;
        let mut committed = 0;

        for record in records {
            let offset = record.offset;
            let disposition = match record.event {
                Ok(event) => match self.ingest.handle(&event).await {
                    Ok(disposition) => disposition,
                    Err(e) if !e.is_retryable() => {
                        warn!(
                            offset = offset.offset,
                            file_id = event.file_id,
                            code = e.code(),
                            error = %e,
                            "Terminal ingestion error, acknowledging"
                        );
                        Disposition::Terminal { code: e.code() }
                    }
                    Err(Error::Cancelled) => return Err(Error::Cancelled),
                    Err(e) => {
                        let failures = self.note_failure(offset);
                        if failures <= self.config.max_redeliveries {
                            return Err(e);
                        }
                        error!(
                            offset = offset.offset,
                            file_id = event.file_id,
                            failures = failures,
                            code = e.code(),
                            error = %e,
                            "Redelivery limit reached, dead-lettering event"
                        );
                        metrics().events_dead_lettered.inc();
                        Disposition::DeadLettered { code: e.code() }
                    }
                },
                Err(e) => {
                    warn!(offset = offset.offset, error = %e, "Acknowledging undecodable event");
                    Disposition::InvalidEvent
                }
            };

            self.source.commit(offset.next()).await?;
            self.clear_failures(offset);
            committed += 1;

            debug!(
                offset = offset.offset,
                disposition = disposition.label(),
                "Event acknowledged"
            );
        }

        Ok(committed)
    }

    /// Failures of the event at `offset`, counting this one.
    fn note_failure(&self, offset: Offset) -> u32 {
        let mut failures = self.failures.lock();
        let count = match *failures {
            Some((at, count)) if at == offset => count + 1,
            _ => 1,
        };
        *failures = Some((offset, count));
        count
    }

    fn clear_failures(&self, offset: Offset) {
        let mut failures = self.failures.lock();
        if matches!(*failures, Some((at, _)) if at == offset) {
            *failures = None;
        }
    }
}
