//! Chunked import of delimited files into a datastore sink.
//!
//! An [`ImportJob`] reads its resource a fixed-size chunk at a time, turns
//! the header row into a schema of sanitized column names and writes every
//! later record to the resource's [`queue_core::Sink`]. It stops cleanly at
//! a deadline and resumes from the persisted byte offset on the next run.

mod config;
mod factory;
mod fetcher;
pub mod header;
mod job;
mod memory_sink;
pub mod parser;
pub mod sniff;

pub use config::{
    BYTES_PER_CHUNK, IMPORT_LEASE_TIME_SECS, IMPORT_PASS_TIME_SECS, IMPORT_QUEUE, ImportConfig,
};
pub use factory::ImportJobFactory;
pub use fetcher::LocalFileFetcher;
pub use job::{ImportDeps, ImportJob, PostImport};
pub use memory_sink::{MemorySink, MemorySinks};
