//! Message types for actor communication.

use queue_core::{ItemId, QueueError};
use ractor::RpcReplyPort;
use serde_json::Value;

use crate::worker::PassReport;

/// Messages for the [`Scheduler`](crate::Scheduler).
#[derive(Debug)]
pub enum SchedulerMessage {
    /// Run one pass now: over `queue` when given, otherwise over every queue.
    RunPass {
        queue: Option<String>,
        reply: RpcReplyPort<Result<Vec<PassReport>, String>>,
    },

    /// Add an item to a queue.
    Enqueue {
        queue: String,
        payload: Value,
        reply: RpcReplyPort<Result<ItemId, String>>,
    },

    /// Number of items per registered queue.
    Counts {
        reply: RpcReplyPort<Vec<(String, u64)>>,
    },

    /// Passes run so far, scheduled or requested.
    Passes {
        reply: RpcReplyPort<u64>,
    },

    /// Stop ticking and shut the actor down.
    Shutdown,

    /// Periodic trigger for a pass over every queue.
    Tick,
}

/// Error type for orchestration and scheduler operations.
#[derive(Debug, thiserror::Error)]
pub enum ActorError {
    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Actor error: {0}")]
    Actor(String),
}
