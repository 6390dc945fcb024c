//! Core types, errors, and store interfaces for the time-series ingestion worker.

pub mod data_point;
pub mod error;
pub mod event;
pub mod file_record;
pub mod limits;
pub mod store;

pub use data_point::*;
pub use error::{Error, Result};
pub use event::*;
pub use file_record::*;
pub use store::*;
