//! Read-back queries for verification (used in tests and admin).

use crate::client::{db_err, ClickHouseClient};
use clickhouse::Row;
use ingest_core::Result;
use serde::Deserialize;

/// Persisted data point as read back from ClickHouse.
#[derive(Debug, Clone, Row, Deserialize)]
pub struct StoredDataPoint {
    pub timestamp: i64,
    pub temperature: f64,
}

/// Count data points persisted for a file.
pub async fn count_data_points(client: &ClickHouseClient, file_id: u64) -> Result<u64> {
    let count: u64 = client
        .inner()
        .query("SELECT count() FROM data_points WHERE file_id = ?")
        .bind(file_id)
        .fetch_one()
        .await
        .map_err(db_err("Query error"))?;
    Ok(count)
}

/// Data points for a file in timestamp order.
///
/// Arrival order is not preserved by the worker, so readers sort explicitly.
pub async fn data_points_for_file(
    client: &ClickHouseClient,
    file_id: u64,
) -> Result<Vec<StoredDataPoint>> {
    client
        .inner()
        .query("SELECT ?fields FROM data_points WHERE file_id = ? ORDER BY timestamp")
        .bind(file_id)
        .fetch_all::<StoredDataPoint>()
        .await
        .map_err(db_err("Query error"))
}
