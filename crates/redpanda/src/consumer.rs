//! Redpanda consumer for ingestion events.
//!
//! Uses rskafka for Kafka-compatible message consumption with:
//! - Manual offset management: the position only advances on `commit`
//! - Bounded fetches with a configurable wait
//! - Key/value decoding into `IngestionEvent` records
//!
//! The committed position lives in memory. Across restarts, progress is
//! recovered by replaying from `StartOffset::Earliest`: events for files that
//! are already completed are acknowledged without reprocessing.

use crate::config::{RedpandaConfig, StartOffset};
use async_trait::async_trait;
use ingest_core::{ConsumedRecord, EventSource, IngestionEvent, Offset, Result};
use rskafka::client::{
    partition::{OffsetAt, PartitionClient, UnknownTopicHandling},
    ClientBuilder, Credentials, SaslConfig,
};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use telemetry::metrics;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Creates a TLS configuration for Redpanda Cloud.
fn create_tls_config() -> Arc<rustls::ClientConfig> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Arc::new(config)
}

/// Consumer for reading ingestion events from one topic partition.
pub struct Consumer {
    config: RedpandaConfig,
    partition_client: RwLock<Option<Arc<PartitionClient>>>,
    /// Committed position (next offset to read)
    current_offset: AtomicI64,
    initialized: AtomicBool,
}

impl Consumer {
    /// Creates a new consumer. The connection is opened lazily on first fetch.
    pub fn new(config: RedpandaConfig) -> Self {
        info!(
            group_id = %config.consumer.group_id,
            topic = %config.consumer.topic,
            partition = config.consumer.partition,
            start_offset = ?config.consumer.start_offset,
            "Creating Redpanda consumer"
        );

        Self {
            config,
            partition_client: RwLock::new(None),
            current_offset: AtomicI64::new(-1),
            initialized: AtomicBool::new(false),
        }
    }

    async fn ensure_connected(&self) -> Result<Arc<PartitionClient>> {
        {
            let client = self.partition_client.read().await;
            if let Some(ref c) = *client {
                return Ok(c.clone());
            }
        }

        let mut builder = ClientBuilder::new(self.config.brokers.clone());

        if let (Some(username), Some(password)) =
            (&self.config.sasl_username, &self.config.sasl_password)
        {
            builder = builder
                .tls_config(create_tls_config())
                .sasl_config(SaslConfig::ScramSha256(Credentials::new(
                    username.clone(),
                    password.clone(),
                )));
        }

        let client = builder.build().await.map_err(|e| {
            ingest_core::Error::broker(format!("Failed to connect to Redpanda: {}", e))
        })?;

        let consumer = &self.config.consumer;
        let partition_client = client
            .partition_client(
                consumer.topic.clone(),
                consumer.partition,
                UnknownTopicHandling::Retry,
            )
            .await
            .map_err(|e| {
                ingest_core::Error::broker(format!("Failed to get partition client: {}", e))
            })?;
        let partition_client = Arc::new(partition_client);

        if !self.initialized.load(Ordering::SeqCst) {
            let at = match consumer.start_offset {
                StartOffset::Earliest => OffsetAt::Earliest,
                StartOffset::Latest => OffsetAt::Latest,
            };
            let offset = partition_client
                .get_offset(at)
                .await
                .map_err(|e| ingest_core::Error::broker(format!("Failed to get offset: {}", e)))?;

            self.current_offset.store(offset, Ordering::SeqCst);
            self.initialized.store(true, Ordering::SeqCst);

            info!(
                topic = %consumer.topic,
                partition = consumer.partition,
                offset = offset,
                "Consumer initialized at offset"
            );
        }

        {
            let mut guard = self.partition_client.write().await;
            *guard = Some(partition_client.clone());
        }

        Ok(partition_client)
    }

    /// Returns the committed offset.
    pub fn current_offset(&self) -> i64 {
        self.current_offset.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &RedpandaConfig {
        &self.config
    }

    /// Drops the cached connection (for error recovery).
    pub async fn reset_connection(&self) {
        let mut client = self.partition_client.write().await;
        *client = None;
        info!("Consumer connection reset");
    }
}

#[async_trait]
impl EventSource for Consumer {
    async fn fetch(&self) -> Result<Vec<ConsumedRecord>> {
        let client = self.ensure_connected().await?;
        let consumer = &self.config.consumer;

        let start = std::time::Instant::now();
        let current = self.current_offset();
        let max_wait = Duration::from_millis(consumer.batch_timeout_ms);

        let (records, high_watermark) = client
            .fetch_records(
                current,
                1..consumer.max_fetch_bytes.max(2),
                max_wait.as_millis() as i32,
            )
            .await
            .map_err(|e| {
                error!("Fetch error: {}", e);
                ingest_core::Error::broker(format!("Failed to fetch records: {}", e))
            })?;

        let mut consumed = Vec::with_capacity(records.len().min(consumer.batch_size));
        let mut invalid = 0u64;

        // Compressed record batches can start before the requested offset.
        for record in records
            .into_iter()
            .filter(|r| r.offset >= current)
            .take(consumer.batch_size)
        {
            let event = IngestionEvent::from_record(
                record.record.key.as_deref(),
                record.record.value.as_deref(),
            );
            if let Err(ref e) = event {
                invalid += 1;
                warn!(offset = record.offset, error = %e, "Undecodable ingestion event");
            }

            consumed.push(ConsumedRecord {
                offset: Offset {
                    partition: consumer.partition,
                    offset: record.offset,
                },
                event,
            });
        }

        metrics().events_consumed.inc_by(consumed.len() as u64);
        if invalid > 0 {
            metrics().events_invalid.inc_by(invalid);
        }

        if !consumed.is_empty() {
            debug!(
                events = consumed.len(),
                offset_start = current,
                high_watermark = high_watermark,
                latency_ms = %start.elapsed().as_millis(),
                "Fetched ingestion events"
            );
        }

        Ok(consumed)
    }

    async fn commit(&self, offset: Offset) -> Result<()> {
        let prev = self.current_offset.swap(offset.offset, Ordering::SeqCst);
        metrics().offsets_committed.inc();

        debug!(
            partition = offset.partition,
            prev_offset = prev,
            new_offset = offset.offset,
            "Committed offset"
        );

        Ok(())
    }

    async fn rewind(&self) {
        // Fetches always start at the committed position, so dropping the
        // connection is enough to discard read-ahead.
        self.reset_connection().await;
    }
}
