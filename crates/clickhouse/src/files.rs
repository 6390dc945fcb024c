//! File record store backed by `files_table`.

use crate::client::{db_err, ClickHouseClient};
use crate::schema::FILES_TABLE;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clickhouse::Row;
use ingest_core::{FileRecord, FileRecordStore, FileStatus, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Row for files_table.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct FileRow {
    pub id: u64,
    pub name: String,
    pub status: u8,
    pub created_at: i64,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    /// ReplacingMergeTree version; the highest value wins.
    pub version: u64,
}

impl FileRow {
    fn from_record(record: &FileRecord, version: u64) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            status: record.status.as_u8(),
            created_at: record.created_at.timestamp_millis(),
            mean: record.mean,
            median: record.median,
            version,
        }
    }

    fn into_record(self) -> Result<FileRecord> {
        let created_at = DateTime::<Utc>::from_timestamp_millis(self.created_at).ok_or_else(|| {
            ingest_core::Error::database(format!(
                "file {} has invalid created_at {}",
                self.id, self.created_at
            ))
        })?;

        Ok(FileRecord {
            id: self.id,
            name: self.name,
            status: FileStatus::from_u8(self.status)?,
            created_at,
            mean: self.mean,
            median: self.median,
        })
    }
}

/// `FileRecordStore` over ClickHouse.
#[derive(Clone)]
pub struct ClickHouseFileStore {
    client: ClickHouseClient,
}

impl ClickHouseFileStore {
    pub fn new(client: ClickHouseClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FileRecordStore for ClickHouseFileStore {
    async fn find_by_id(&self, id: u64) -> Result<Option<FileRecord>> {
        let row = self
            .client
            .inner()
            .query("SELECT ?fields FROM files_table FINAL WHERE id = ?")
            .bind(id)
            .fetch_optional::<FileRow>()
            .await
            .map_err(db_err("File lookup error"))?;

        row.map(FileRow::into_record).transpose()
    }

    async fn save(&self, record: &FileRecord) -> Result<FileRecord> {
        let version = Utc::now().timestamp_micros().max(0) as u64;
        let row = FileRow::from_record(record, version);

        let mut insert = self
            .client
            .inner()
            .insert::<FileRow>(FILES_TABLE)
            .map_err(db_err("Insert error"))?;
        insert.write(&row).await.map_err(db_err("Write error"))?;
        insert.end().await.map_err(db_err("End error"))?;

        debug!(
            file_id = record.id,
            status = ?record.status,
            version = version,
            "Saved file record"
        );

        Ok(record.clone())
    }
}
