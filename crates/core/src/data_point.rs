//! Validated time-series observations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One validated (timestamp, temperature) observation tied to a file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub file_id: u64,
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
}

impl DataPoint {
    pub fn new(file_id: u64, timestamp: DateTime<Utc>, temperature: f64) -> Self {
        Self {
            file_id,
            timestamp,
            temperature,
        }
    }
}
