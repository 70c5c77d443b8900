//! Queue orchestration for datastore imports.
//!
//! # Architecture
//!
//! - [`JobRegistry`] - Static map from queue name to its queue, job factory and settings
//! - [`Orchestrator`] - Claims items, runs their jobs and applies each outcome
//! - [`Scheduler`] - Ractor actor that triggers orchestrator passes on an interval
//! - [`FileJobStore`] - JSON-file backed job state
//!
//! # Usage
//!
//! ```ignore
//! use actors::{JobRegistry, Orchestrator, start_scheduler};
//!
//! let registry = JobRegistry::new().with(queue, factory, settings);
//! let orchestrator = Arc::new(Orchestrator::new(registry, clock));
//! let (scheduler, handle) = start_scheduler(orchestrator, Some(Duration::from_secs(60))).await?;
//! ```

mod messages;
mod persistence;
pub mod registry;
mod scheduler;
mod worker;

pub use messages::{ActorError, SchedulerMessage};
pub use persistence::{FileJobStore, PersistenceError};
pub use registry::{JobRegistry, QueueBinding};
pub use scheduler::{Scheduler, SchedulerArgs, SchedulerState, start_scheduler};
pub use worker::{ItemOutcome, Orchestrator, PassReport, lease_margin_secs};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort, concurrency};
