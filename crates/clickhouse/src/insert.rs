//! Bulk insert helpers for ClickHouse.

use crate::client::{db_err, ClickHouseClient};
use crate::schema::{DATA_POINTS_TABLE, INTERNAL_METRICS_TABLE};
use async_trait::async_trait;
use clickhouse::Row;
use ingest_core::{DataPoint, DataPointWriter, Result};
use serde::{Deserialize, Serialize};
use telemetry::MetricsSnapshot;
use tracing::debug;

/// Row for the data_points table.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct DataPointRow {
    pub timestamp: i64, // DateTime64(3) as milliseconds
    pub temperature: f64,
    pub file_id: u64,
}

impl From<&DataPoint> for DataPointRow {
    fn from(point: &DataPoint) -> Self {
        Self {
            timestamp: point.timestamp.timestamp_millis(),
            temperature: point.temperature,
            file_id: point.file_id,
        }
    }
}

/// Writes validated data points with one `INSERT` per batch.
#[derive(Clone)]
pub struct ClickHouseDataPointWriter {
    client: ClickHouseClient,
}

impl ClickHouseDataPointWriter {
    pub fn new(client: ClickHouseClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataPointWriter for ClickHouseDataPointWriter {
    async fn insert_batch(&self, batch: &[DataPoint]) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let start = std::time::Instant::now();

        // Rows are buffered client-side and sent as a single INSERT on `end`,
        // which ClickHouse applies atomically.
        let mut insert = self
            .client
            .inner()
            .insert::<DataPointRow>(DATA_POINTS_TABLE)
            .map_err(db_err("Insert error"))?;

        for point in batch {
            insert
                .write(&DataPointRow::from(point))
                .await
                .map_err(db_err("Write error"))?;
        }

        insert.end().await.map_err(db_err("End error"))?;

        debug!(
            count = batch.len(),
            latency_ms = %start.elapsed().as_millis(),
            "Inserted data point batch"
        );

        Ok(batch.len())
    }

    async fn has_rows(&self, file_id: u64) -> Result<bool> {
        let found = self
            .client
            .inner()
            .query("SELECT 1 FROM data_points WHERE file_id = ? LIMIT 1")
            .bind(file_id)
            .fetch_optional::<u8>()
            .await
            .map_err(db_err("Query error"))?;
        Ok(found.is_some())
    }

    async fn purge_file(&self, file_id: u64) -> Result<()> {
        let mut client = self.client.inner().clone();
        if self.client.config().sync_mutations {
            client = client.with_option("mutations_sync", "1");
        }

        client
            .query("ALTER TABLE data_points DELETE WHERE file_id = ?")
            .bind(file_id)
            .execute()
            .await
            .map_err(db_err("Purge error"))?;

        debug!(file_id = file_id, "Purged data points from earlier attempt");
        Ok(())
    }
}

/// Internal metrics row for ClickHouse.
#[derive(Debug, Clone, Row, Serialize)]
pub struct MetricsRow {
    pub timestamp: i64,
    pub events_consumed: u64,
    pub events_invalid: u64,
    pub offsets_committed: u64,
    pub rows_parsed: u64,
    pub rows_skipped: u64,
    pub batches_inserted: u64,
    pub batch_insert_errors: u64,
    pub batches_aborted: u64,
    pub rows_inserted: u64,
    pub files_completed: u64,
    pub files_failed: u64,
    pub batch_insert_latency_mean_ms: f64,
    pub file_processing_latency_mean_ms: f64,
}

impl From<MetricsSnapshot> for MetricsRow {
    fn from(snapshot: MetricsSnapshot) -> Self {
        Self {
            timestamp: snapshot.timestamp.timestamp_millis(),
            events_consumed: snapshot.events_consumed,
            events_invalid: snapshot.events_invalid,
            offsets_committed: snapshot.offsets_committed,
            rows_parsed: snapshot.rows_parsed,
            rows_skipped: snapshot.rows_skipped,
            batches_inserted: snapshot.batches_inserted,
            batch_insert_errors: snapshot.batch_insert_errors,
            batches_aborted: snapshot.batches_aborted,
            rows_inserted: snapshot.rows_inserted,
            files_completed: snapshot.files_completed,
            files_failed: snapshot.files_failed,
            batch_insert_latency_mean_ms: snapshot.batch_insert_latency_mean_ms,
            file_processing_latency_mean_ms: snapshot.file_processing_latency_mean_ms,
        }
    }
}

/// Insert internal metrics snapshot.
pub async fn insert_metrics(client: &ClickHouseClient, snapshot: MetricsSnapshot) -> Result<()> {
    let row = MetricsRow::from(snapshot);

    let mut insert = client
        .inner()
        .insert::<MetricsRow>(INTERNAL_METRICS_TABLE)
        .map_err(db_err("Insert error"))?;

    insert.write(&row).await.map_err(db_err("Write error"))?;
    insert.end().await.map_err(db_err("End error"))?;

    Ok(())
}
