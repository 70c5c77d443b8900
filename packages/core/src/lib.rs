//! Core domain types for the datastore import worker.
//!
//! This crate contains the contracts shared by every other package:
//! - QueueItem and ReliableQueue for lease-based work queues
//! - JobState, JobStatus and Outcome for resumable jobs
//! - Sink and ResourceFetcher for the collaborators an import talks to
//! - Clock so leases and deadlines can be driven deterministically
//! - In-memory queue and job store for tests and single-process runs

mod clock;
mod context;
mod job;
mod memory;
mod queue;
mod resource;
mod sink;

pub use clock::{Clock, ManualClock, SystemClock};
pub use context::JobContext;
pub use job::{
    JobError, JobFactory, JobId, JobState, JobStatus, JobStore, Outcome, ResumableJob, StagedJob,
    StoreError,
};
pub use memory::{MemoryJobStore, MemoryQueue};
pub use queue::{
    DEFAULT_LEASE_TIME_SECS, DEFAULT_PASS_TIME_SECS, ItemId, QueueError, QueueItem, QueueSettings,
    ReliableQueue,
};
pub use resource::{FetchError, LocalResource, ResourceDescriptor, ResourceFetcher};
pub use sink::{FieldSpec, Sink, SinkError, SinkProvider, TableSchema};

/// Re-exported so implementors can name the boxed future type.
pub use futures_util::future::BoxFuture;
