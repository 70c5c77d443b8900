//! Repository implementations for database operations.

mod datastore_repo;
mod job_repo;
mod queue_repo;

pub use datastore_repo::{DatastoreTable, DatastoreTables, TableSummary};
pub use job_repo::JobStateRepository;
pub use queue_repo::DatabaseQueue;
