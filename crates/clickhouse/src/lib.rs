//! ClickHouse storage for file records and data points.

pub mod client;
pub mod config;
pub mod files;
pub mod health;
pub mod insert;
pub mod query;
pub mod schema;

pub use client::*;
pub use config::*;
pub use files::ClickHouseFileStore;
pub use insert::ClickHouseDataPointWriter;
