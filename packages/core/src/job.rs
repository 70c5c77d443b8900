//! Resumable job contract: status machine, persisted state and outcomes.

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::resource::FetchError;
use crate::sink::SinkError;

/// Stable identity of a job, derived from the resource it works on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Lowercase hex MD5 of the resource's unique identifier.
    pub fn for_resource(unique_identifier: &str) -> Self {
        Self(format!("{:x}", md5::compute(unique_identifier.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a resumable job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Waiting,
    InProgress,
    Stopped,
    Done,
    Error,
}

impl JobStatus {
    /// `Done` and `Error` end the job until its state is reset.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }

    /// Whether moving from `self` to `next` is allowed.
    ///
    /// Status only moves forward, except that a stopped job resumes into
    /// `InProgress`. Terminal states only allow themselves.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (a, b) if *a == b => true,
            (Waiting, InProgress | Stopped | Done | Error) => true,
            (InProgress, Stopped | Done | Error) => true,
            (Stopped, InProgress | Done | Error) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::InProgress => "in_progress",
            JobStatus::Stopped => "stopped",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything about a job that survives between invocations.
///
/// Only plain progress data lives here. Files, connections and services are
/// rebuilt from configuration each time the job is constructed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobState {
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub progress: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_limit_secs: Option<i64>,
}

/// What a job hands back to the orchestrator after one bounded run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Work is exhausted.
    Done,
    /// Deadline reached; the next run resumes.
    Stopped,
    /// Unrecoverable for this job identity.
    Error(String),
    /// Put a fresh item on the queue right away and carry on with the pass.
    Requeue,
    /// Hold the current item back for this many seconds.
    Delay(i64),
    /// Stop working this queue for the rest of the pass.
    Suspend,
}

impl Outcome {
    /// Map a persisted state onto the outcome it represents.
    ///
    /// A job must never return control while mid-state, so `Waiting` and
    /// `InProgress` are reported as errors.
    pub fn from_state(state: &JobState) -> Self {
        match state.status {
            JobStatus::Done => Outcome::Done,
            JobStatus::Stopped => Outcome::Stopped,
            JobStatus::Error => Outcome::Error(state.error.clone().unwrap_or_default()),
            other => Outcome::Error(format!("job returned control while {other}")),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Done => "done",
            Outcome::Stopped => "stopped",
            Outcome::Error(_) => "error",
            Outcome::Requeue => "requeue",
            Outcome::Delay(_) => "delay",
            Outcome::Suspend => "suspend",
        }
    }
}

/// Failures of the job-state store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Job store backend error: {0}")]
    Backend(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Infrastructure faults raised while running a job.
///
/// Validation problems are not errors at this level; they are persisted as
/// [`JobStatus::Error`] and reported as [`Outcome::Error`].
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job store error: {0}")]
    Store(#[from] StoreError),
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid payload: {0}")]
    Payload(String),
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Keyed persistence for job state, separate from any queue.
pub trait JobStore: Send + Sync {
    fn load<'a>(&'a self, id: &'a JobId) -> BoxFuture<'a, Result<Option<JobState>, StoreError>>;

    fn save<'a>(&'a self, id: &'a JobId, state: &'a JobState) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Forget a job entirely. Removing an unknown job is a no-op.
    fn remove<'a>(&'a self, id: &'a JobId) -> BoxFuture<'a, Result<(), StoreError>>;
}

/// A job executed in wall-clock-bounded increments.
pub trait ResumableJob: Send {
    /// Work until `deadline`, the work runs out, or an unrecoverable condition.
    ///
    /// Progress is persisted before this returns. A job that is already done
    /// returns its cached outcome without doing anything.
    fn run(&mut self, deadline: DateTime<Utc>) -> BoxFuture<'_, Result<Outcome, JobError>>;
}

/// One labelled job built for a queue item.
pub struct StagedJob {
    pub label: String,
    pub job: Box<dyn ResumableJob>,
}

impl StagedJob {
    pub fn new(label: impl Into<String>, job: impl ResumableJob + 'static) -> Self {
        Self {
            label: label.into(),
            job: Box::new(job),
        }
    }
}

/// Builds the jobs for a queue's items.
pub trait JobFactory: Send + Sync {
    /// Construct the stages for one item's payload, loading any persisted state.
    fn create<'a>(&'a self, payload: &'a Value) -> BoxFuture<'a, Result<Vec<StagedJob>, JobError>>;

    /// Idempotency guard; `true` means the work is already complete and must not run again.
    fn already_processed<'a>(&'a self, _payload: &'a Value) -> BoxFuture<'a, Result<bool, JobError>> {
        Box::pin(async { Ok(false) })
    }

    /// Called after an item finished without errors.
    fn after_success<'a>(&'a self, _payload: &'a Value) -> BoxFuture<'a, Result<(), JobError>> {
        Box::pin(async { Ok(()) })
    }

    /// Short human-readable identity of a payload, for log lines.
    fn describe(&self, payload: &Value) -> String {
        payload.to_string()
    }
}
