//! Unified error types for the ingestion worker.
//!
//! Error codes:
//! - INGEST_001-002: Attempt failures that are retried through redelivery
//! - INGEST_003-006: Terminal failures, acknowledged without reprocessing
//! - STORE_001-002: Storage and broker failures (retryable)
//! - SYS_001-003: Configuration, cancellation, and internal errors

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the ingestion worker.
#[derive(Debug, Error)]
pub enum Error {
    /// No row in the file passed validation.
    #[error("[INGEST_001] file {file_id} contains no valid rows ({lines_read} lines read)")]
    EmptyDataset { file_id: u64, lines_read: u64 },

    /// One or more batches could not be persisted.
    #[error(
        "[INGEST_002] {failed_batches} of {total_batches} batches failed to persist for file {file_id}"
    )]
    PartialPersistence {
        file_id: u64,
        failed_batches: usize,
        total_batches: usize,
    },

    #[error("[INGEST_003] file record {0} not found")]
    RecordNotFound(u64),

    #[error("[INGEST_004] backing file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("[INGEST_005] invalid ingestion event: {0}")]
    InvalidEvent(String),

    #[error("[INGEST_006] invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("[STORE_001] storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("[STORE_001] database error: {0}")]
    Database(String),

    #[error("[STORE_002] broker error: {0}")]
    Broker(String),

    #[error("[SYS_001] configuration error: {0}")]
    Config(String),

    #[error("[SYS_002] processing cancelled by shutdown")]
    Cancelled,

    #[error("[SYS_003] internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn broker(msg: impl Into<String>) -> Self {
        Self::Broker(msg.into())
    }

    pub fn invalid_event(msg: impl Into<String>) -> Self {
        Self::InvalidEvent(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the event that produced this error should be redelivered.
    ///
    /// Terminal errors are acknowledged so the partition is not blocked forever.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::RecordNotFound(_)
                | Self::FileNotFound(_)
                | Self::InvalidEvent(_)
                | Self::InvalidTransition(_)
                | Self::Config(_)
        )
    }

    /// Get the stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyDataset { .. } => "INGEST_001",
            Self::PartialPersistence { .. } => "INGEST_002",
            Self::RecordNotFound(_) => "INGEST_003",
            Self::FileNotFound(_) => "INGEST_004",
            Self::InvalidEvent(_) => "INGEST_005",
            Self::InvalidTransition(_) => "INGEST_006",
            Self::Io(_) | Self::Database(_) => "STORE_001",
            Self::Broker(_) => "STORE_002",
            Self::Config(_) => "SYS_001",
            Self::Cancelled => "SYS_002",
            Self::Internal(_) => "SYS_003",
        }
    }
}
