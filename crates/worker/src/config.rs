//! Ingestion worker configuration.

use ingest_core::limits::{
    DEFAULT_BATCH_SIZE, DEFAULT_DRAIN_TIMEOUT_MS, DEFAULT_MAX_IN_FLIGHT, DEFAULT_MAX_TEMPERATURE,
    DEFAULT_MIN_TEMPERATURE, MAX_BATCH_SIZE, MAX_IN_FLIGHT, MIN_BATCH_SIZE,
};
use ingest_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for parsing, persisting, and retrying one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Rows per bulk insert
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Batches persisted concurrently
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// Time allowed to drain in-flight batches before they are cancelled
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
    /// Extra insert attempts per batch after a failure
    #[serde(default = "default_max_batch_retries")]
    pub max_batch_retries: u32,
    /// Linear backoff step between batch attempts
    #[serde(default = "default_batch_retry_backoff_ms")]
    pub batch_retry_backoff_ms: u64,
    #[serde(default = "default_min_temperature")]
    pub min_temperature: f64,
    #[serde(default = "default_max_temperature")]
    pub max_temperature: f64,
    /// Delete rows from an earlier failed attempt before reprocessing
    #[serde(default = "default_purge_partial_on_retry")]
    pub purge_partial_on_retry: bool,
    /// Pause after a failed event before it is redelivered
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Redeliveries of a failing event before it is dead-lettered
    #[serde(default = "default_max_redeliveries")]
    pub max_redeliveries: u32,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_max_in_flight() -> usize {
    DEFAULT_MAX_IN_FLIGHT
}

fn default_drain_timeout_ms() -> u64 {
    DEFAULT_DRAIN_TIMEOUT_MS
}

fn default_max_batch_retries() -> u32 {
    2
}

fn default_batch_retry_backoff_ms() -> u64 {
    200
}

fn default_min_temperature() -> f64 {
    DEFAULT_MIN_TEMPERATURE
}

fn default_max_temperature() -> f64 {
    DEFAULT_MAX_TEMPERATURE
}

fn default_purge_partial_on_retry() -> bool {
    true
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_max_redeliveries() -> u32 {
    5
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_in_flight: default_max_in_flight(),
            drain_timeout_ms: default_drain_timeout_ms(),
            max_batch_retries: default_max_batch_retries(),
            batch_retry_backoff_ms: default_batch_retry_backoff_ms(),
            min_temperature: default_min_temperature(),
            max_temperature: default_max_temperature(),
            purge_partial_on_retry: default_purge_partial_on_retry(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_redeliveries: default_max_redeliveries(),
        }
    }
}

impl IngestConfig {
    /// Rejects settings outside the supported ranges.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            return Err(Error::config(format!(
                "batch_size {} outside {}..={}",
                self.batch_size, MIN_BATCH_SIZE, MAX_BATCH_SIZE
            )));
        }
        if !(1..=MAX_IN_FLIGHT).contains(&self.max_in_flight) {
            return Err(Error::config(format!(
                "max_in_flight {} outside 1..={}",
                self.max_in_flight, MAX_IN_FLIGHT
            )));
        }
        if self.drain_timeout_ms == 0 {
            return Err(Error::config("drain_timeout_ms must be positive"));
        }
        if !(self.min_temperature.is_finite()
            && self.max_temperature.is_finite()
            && self.min_temperature <= self.max_temperature)
        {
            return Err(Error::config(format!(
                "invalid temperature range [{}, {}]",
                self.min_temperature, self.max_temperature
            )));
        }
        Ok(())
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn batch_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.batch_retry_backoff_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}
