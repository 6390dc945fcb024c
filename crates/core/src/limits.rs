//! Size and range limits for the ingestion worker.
//!
//! Batch limits bound the memory held per in-flight insert: at 5,000 rows of
//! (i64, f64, u64) a batch is roughly 120KB before encoding.

// === Batch Limits ===

/// Smallest accepted batch size.
pub const MIN_BATCH_SIZE: usize = 1_000;

/// Largest accepted batch size.
pub const MAX_BATCH_SIZE: usize = 10_000;

/// Default rows per bulk insert.
pub const DEFAULT_BATCH_SIZE: usize = 5_000;

/// Default number of batches persisted concurrently.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;

/// Upper bound on concurrent batch inserts.
pub const MAX_IN_FLIGHT: usize = 64;

// === Drain ===

/// Default time allowed for in-flight batches to finish at end of file (30s).
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 30_000;

// === Temperature Bounds ===

/// Lowest plausible temperature reading.
pub const DEFAULT_MIN_TEMPERATURE: f64 = -100.0;

/// Highest plausible temperature reading.
pub const DEFAULT_MAX_TEMPERATURE: f64 = 100.0;
