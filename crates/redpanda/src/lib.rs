//! Redpanda consumer for file ingestion events.

pub mod config;
pub mod consumer;
pub mod health;

pub use config::*;
pub use consumer::*;
