//! Ingestion worker: turns file-upload events into persisted data points and
//! per-file statistics.
//!
//! - Parser (streaming CSV validation)
//! - Aggregator (online mean and median)
//! - Persistence (bounded concurrent batch inserts)
//! - Ingest (idempotent per-file processing)
//! - Consumer (ack-after-durable event loop)

pub mod aggregator;
pub mod config;
pub mod consumer;
pub mod ingest;
pub mod parser;
pub mod persistence;
pub mod scheduler;

pub use aggregator::{OnlineAggregator, Summary};
pub use config::IngestConfig;
pub use consumer::*;
pub use ingest::{Disposition, IngestSummary, IngestionWorker};
pub use parser::{parse_line, LineOutcome, LineParser, ParseStats, SkipReason, ValidationRules};
pub use persistence::{BatchScheduler, PersistReport, PersistenceConfig};
pub use scheduler::*;
