//! Import job configuration.

use queue_core::QueueSettings;

/// Bytes read per increment.
pub const BYTES_PER_CHUNK: usize = 8192;

/// Queue the import jobs are registered on.
pub const IMPORT_QUEUE: &str = "datastore_import";

/// Pass time for the import queue, in seconds.
pub const IMPORT_PASS_TIME_SECS: i64 = 180;

/// Lease granted to each import item, in seconds.
pub const IMPORT_LEASE_TIME_SECS: i64 = 10_800;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportConfig {
    /// Bytes read per increment.
    pub chunk_size: usize,
    /// Optional cap on one run, on top of the deadline the worker passes in.
    pub time_limit_secs: Option<i64>,
    /// Remove the localized copy of a resource once its item succeeded.
    pub delete_local_resource: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            chunk_size: BYTES_PER_CHUNK,
            time_limit_secs: None,
            delete_local_resource: false,
        }
    }
}

impl ImportConfig {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_time_limit(mut self, secs: i64) -> Self {
        self.time_limit_secs = Some(secs);
        self
    }

    pub fn with_delete_local_resource(mut self, delete: bool) -> Self {
        self.delete_local_resource = delete;
        self
    }

    /// Timing of the import queue.
    pub fn queue_settings() -> QueueSettings {
        QueueSettings::new(IMPORT_PASS_TIME_SECS, IMPORT_LEASE_TIME_SECS)
    }
}
