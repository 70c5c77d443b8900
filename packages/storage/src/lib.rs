//! Object storage for datastore resources.
//!
//! Resources live in S3-compatible storage in production, on disk for local
//! runs and in memory for tests. [`ResourceLocalizer`] copies them to a local
//! directory so the importer can seek within them.

mod config;
mod localizer;
mod store;

pub use config::{DEFAULT_LOCAL_DIR, ResourceSource, SourceConfig};
pub use localizer::ResourceLocalizer;
pub use store::Storage;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid storage config: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object_store error: {0}")]
    ObjectStore(#[from] object_store::Error),
}
