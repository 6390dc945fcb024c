//! Storage and broker interfaces consumed by the worker.
//!
//! Implementations are passed explicitly into the worker at construction,
//! so tests can swap in in-memory doubles.

use crate::{ConsumedRecord, DataPoint, FileRecord, Offset, Result};
use async_trait::async_trait;

/// Load/save-by-id access to file records.
#[async_trait]
pub trait FileRecordStore: Send + Sync {
    async fn find_by_id(&self, id: u64) -> Result<Option<FileRecord>>;

    /// Upserts the record by id and returns the persisted value.
    async fn save(&self, record: &FileRecord) -> Result<FileRecord>;
}

/// Bulk writer for validated data points.
#[async_trait]
pub trait DataPointWriter: Send + Sync {
    /// Persists the whole batch as one multi-row insert.
    ///
    /// Returns the number of rows written. A batch is atomic: it is either
    /// fully written or not at all.
    async fn insert_batch(&self, batch: &[DataPoint]) -> Result<usize>;

    /// Whether any rows are stored for the file.
    async fn has_rows(&self, file_id: u64) -> Result<bool>;

    /// Removes rows left behind by an earlier failed attempt for a file.
    async fn purge_file(&self, file_id: u64) -> Result<()>;
}

/// At-least-once source of ingestion events.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Fetches the next records after the committed position.
    async fn fetch(&self) -> Result<Vec<ConsumedRecord>>;

    /// Advances the committed position. Called only after the record's
    /// effects are durable.
    async fn commit(&self, offset: Offset) -> Result<()>;

    /// Drops any read-ahead so the next fetch redelivers from the committed
    /// position.
    async fn rewind(&self);
}
