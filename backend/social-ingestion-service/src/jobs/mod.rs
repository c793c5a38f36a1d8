//! Background jobs
//!
//! - `ingestion_runner`: fetch, filter, dedup and publish pass, run on a fixed interval

pub mod ingestion_runner;

pub use ingestion_runner::{start_ingestion_loop, IngestionRunner, PassReport, SourceReport};
