//! Ingestion events delivered by the broker.
//!
//! Wire format: the record key is the file id as decimal text, the record
//! value is the absolute path of the uploaded file (UTF-8).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Broker position of a consumed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offset {
    pub partition: i32,
    pub offset: i64,
}

impl Offset {
    /// Offset to commit once this record has been handled.
    pub fn next(&self) -> Self {
        Self {
            partition: self.partition,
            offset: self.offset + 1,
        }
    }
}

/// Signal that an uploaded file is ready for background processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionEvent {
    pub file_id: u64,
    pub path: PathBuf,
}

impl IngestionEvent {
    pub fn new(file_id: u64, path: impl Into<PathBuf>) -> Self {
        Self {
            file_id,
            path: path.into(),
        }
    }

    /// Decodes an event from a raw record key and value.
    pub fn from_record(key: Option<&[u8]>, value: Option<&[u8]>) -> Result<Self> {
        let key = key.ok_or_else(|| Error::invalid_event("missing record key"))?;
        let key = std::str::from_utf8(key)
            .map_err(|e| Error::invalid_event(format!("key is not UTF-8: {}", e)))?;
        let file_id = key
            .trim()
            .parse::<u64>()
            .map_err(|e| Error::invalid_event(format!("key {:?} is not a file id: {}", key, e)))?;

        let value = value.ok_or_else(|| Error::invalid_event("missing record value"))?;
        let path = std::str::from_utf8(value)
            .map_err(|e| Error::invalid_event(format!("path is not UTF-8: {}", e)))?
            .trim();
        if path.is_empty() {
            return Err(Error::invalid_event("empty file path"));
        }

        Ok(Self::new(file_id, path))
    }

    /// Encodes the event as a (key, value) record pair.
    pub fn to_record(&self) -> (Vec<u8>, Vec<u8>) {
        (
            self.file_id.to_string().into_bytes(),
            self.path.to_string_lossy().into_owned().into_bytes(),
        )
    }
}

/// A record read from the broker, decoded or not.
#[derive(Debug)]
pub struct ConsumedRecord {
    pub offset: Offset,
    pub event: Result<IngestionEvent>,
}
