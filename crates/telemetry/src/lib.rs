//! Internal telemetry for the ingestion worker.
//!
//! Metrics are kept in-process and flushed periodically to ClickHouse
//! alongside the ingested data.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
