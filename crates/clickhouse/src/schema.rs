//! ClickHouse table schemas.
//!
//! - `files_table` is a ReplacingMergeTree keyed by id: every save appends a
//!   new version and `FINAL` reads see only the latest one.
//! - `data_points` is an append-only MergeTree; rows carry no order guarantee
//!   beyond the sort key.
//! - DateTime64(3) columns are written as milliseconds since epoch.

use crate::client::{db_err, ClickHouseClient};
use ingest_core::Result;
use tracing::debug;

pub const FILES_TABLE: &str = "files_table";
pub const DATA_POINTS_TABLE: &str = "data_points";
pub const INTERNAL_METRICS_TABLE: &str = "internal_metrics";

/// SQL for creating the file metadata table.
pub const CREATE_FILES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS files_table (
    id UInt64,
    name String,
    -- 0 = pending, 1 = completed
    status UInt8,
    created_at DateTime64(3, 'UTC'),
    mean Nullable(Float64),
    median Nullable(Float64),
    version UInt64
)
ENGINE = ReplacingMergeTree(version)
ORDER BY id
"#;

/// SQL for creating the validated observations table.
pub const CREATE_DATA_POINTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS data_points (
    timestamp DateTime64(3, 'UTC'),
    temperature Float64,
    file_id UInt64
)
ENGINE = MergeTree()
PARTITION BY intDiv(file_id, 1000)
ORDER BY (file_id, timestamp)
"#;

/// SQL for the worker's own metrics snapshots.
pub const CREATE_INTERNAL_METRICS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS internal_metrics (
    timestamp DateTime64(3, 'UTC'),
    events_consumed UInt64,
    events_invalid UInt64,
    offsets_committed UInt64,
    rows_parsed UInt64,
    rows_skipped UInt64,
    batches_inserted UInt64,
    batch_insert_errors UInt64,
    batches_aborted UInt64,
    rows_inserted UInt64,
    files_completed UInt64,
    files_failed UInt64,
    batch_insert_latency_mean_ms Float64,
    file_processing_latency_mean_ms Float64
)
ENGINE = MergeTree()
ORDER BY timestamp
TTL toDateTime(timestamp) + INTERVAL 30 DAY
"#;

/// All table DDL in creation order.
pub fn all_tables() -> Vec<&'static str> {
    vec![
        CREATE_FILES_TABLE,
        CREATE_DATA_POINTS_TABLE,
        CREATE_INTERNAL_METRICS_TABLE,
    ]
}

/// Creates the database and all tables if they do not exist.
pub async fn init_schema(client: &ClickHouseClient) -> Result<()> {
    let database = &client.config().database;
    client
        .server()
        .query(&format!("CREATE DATABASE IF NOT EXISTS `{}`", database))
        .execute()
        .await
        .map_err(db_err("Failed to create database"))?;

    for ddl in all_tables() {
        client
            .inner()
            .query(ddl)
            .execute()
            .await
            .map_err(db_err("Failed to execute DDL"))?;
    }

    debug!(database = %database, "ClickHouse schema initialized");
    Ok(())
}
