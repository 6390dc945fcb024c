//! Uploaded file metadata and its processing status.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Processing status of an uploaded file.
///
/// Stored as `0` (pending) and `1` (completed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Completed,
}

impl FileStatus {
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Completed => 1,
        }
    }

    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Pending),
            1 => Ok(Self::Completed),
            other => Err(Error::database(format!("unknown file status {}", other))),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Metadata record for one uploaded dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: u64,
    pub name: String,
    pub status: FileStatus,
    pub created_at: DateTime<Utc>,
    pub mean: Option<f64>,
    pub median: Option<f64>,
}

impl FileRecord {
    /// Creates a new pending record, as the upload gateway does.
    pub fn pending(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: FileStatus::Pending,
            created_at: Utc::now(),
            mean: None,
            median: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status.is_completed()
    }

    /// Moves the record to `Completed` with its final statistics.
    ///
    /// Status only ever advances; completing twice is rejected.
    pub fn complete(&mut self, mean: f64, median: f64) -> Result<()> {
        if self.is_completed() {
            return Err(Error::InvalidTransition(format!(
                "file {} is already completed",
                self.id
            )));
        }

        self.status = FileStatus::Completed;
        self.mean = Some(mean);
        self.median = Some(median);
        Ok(())
    }
}
