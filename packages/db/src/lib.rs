//! SurrealDB persistence for the datastore import worker.
//!
//! This crate provides the database connection and the persistent
//! implementations of the core contracts:
//! - `DatabaseQueue`: reliable queue with cross-process atomic claims
//! - `JobStateRepository`: job state store keyed by job id
//! - `DatastoreTable`: per-resource row tables used as the import sink
//!
//! # Features
//!
//! - `memory` (default): Use in-memory storage for testing
//! - `rocksdb`: Use RocksDB for persistent file-based storage

mod connection;
mod schema;
pub mod repositories;

pub use connection::{Database, DbConfig, DbError, connect};
pub use repositories::{DatabaseQueue, DatastoreTable, DatastoreTables, JobStateRepository, TableSummary};
pub use schema::init_schema;

/// Connect with the given configuration and make sure the schema exists.
pub async fn init(config: &DbConfig) -> Result<Database, DbError> {
    let db = connect(config).await?;
    init_schema(&db).await?;
    Ok(db)
}
