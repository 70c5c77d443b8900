//! The orchestrator: claims queue items, runs their jobs and acts on each outcome.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use queue_core::{Clock, ItemId, JobError, Outcome, QueueItem};
use serde::Serialize;
use serde_json::Value;

use crate::messages::ActorError;
use crate::registry::{JobRegistry, QueueBinding};

/// Tally of one pass over one queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub queue: String,
    pub claimed: u64,
    pub completed: u64,
    pub requeued: u64,
    pub errors: u64,
    pub skipped: u64,
    pub delayed: u64,
    /// A job suspended the queue for the rest of the pass.
    pub suspended: bool,
}

impl PassReport {
    fn new(queue: &str) -> Self {
        Self {
            queue: queue.to_string(),
            ..Self::default()
        }
    }
}

/// What became of one claimed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Already processed; deleted without running anything.
    Skipped,
    /// Every stage finished; deleted.
    Completed,
    /// Replaced by a fresh item carrying the same payload.
    Requeued(ItemId),
    /// A stage failed; the item keeps its lease and is retried once it expires.
    Failed(String),
    /// Lease pushed out by this many seconds, where the queue supports it.
    Delayed(i64),
    /// Left untouched; the rest of the queue waits for the next pass.
    Suspended,
}

/// Works registered queues one pass at a time.
///
/// Processing is at-least-once: an item is deleted only after its jobs have
/// persisted their outcome, and a failed item is picked up again when its
/// lease expires.
pub struct Orchestrator {
    registry: JobRegistry,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    pub fn new(registry: JobRegistry, clock: Arc<dyn Clock>) -> Self {
        Self { registry, clock }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    fn binding(&self, queue: &str) -> Result<&QueueBinding, ActorError> {
        self.registry
            .get(queue)
            .ok_or_else(|| ActorError::QueueNotFound(queue.to_string()))
    }

    /// Add an item to `queue`.
    pub async fn enqueue(&self, queue: &str, payload: Value) -> Result<ItemId, ActorError> {
        let binding = self.binding(queue)?;
        let id = binding.queue.create_item(payload).await?;
        tracing::debug!(queue, item = %id, "Item enqueued");
        Ok(id)
    }

    /// Item count of every registered queue.
    pub async fn counts(&self) -> Result<Vec<(String, u64)>, ActorError> {
        let mut counts = Vec::new();
        for binding in self.registry.bindings() {
            counts.push((binding.name().to_string(), binding.queue.number_of_items().await?));
        }
        Ok(counts)
    }

    /// One pass over every registered queue.
    ///
    /// A queue whose backend fails is logged and skipped so the others still
    /// get their pass.
    pub async fn run_all(&self) -> Vec<PassReport> {
        let mut reports = Vec::new();
        for queue in self.registry.queue_names() {
            match self.run_pass(queue).await {
                Ok(report) => reports.push(report),
                Err(e) => tracing::error!(queue, error = %e, "Queue pass failed"),
            }
        }
        reports
    }

    /// Claim and process items from `queue` until it is empty or its pass time is used up.
    pub async fn run_pass(&self, queue: &str) -> Result<PassReport, ActorError> {
        let binding = self.binding(queue)?;
        let settings = binding.settings;
        let end = self.clock.now() + Duration::seconds(settings.pass_time_secs);
        let mut report = PassReport::new(queue);

        while self.clock.now() < end {
            let Some(item) = binding.queue.claim_item(settings.lease_time_secs).await? else {
                break;
            };
            report.claimed += 1;

            match self.process(binding, &item).await? {
                ItemOutcome::Skipped => report.skipped += 1,
                ItemOutcome::Completed => report.completed += 1,
                ItemOutcome::Requeued(_) => report.requeued += 1,
                ItemOutcome::Failed(_) => report.errors += 1,
                ItemOutcome::Delayed(_) => report.delayed += 1,
                ItemOutcome::Suspended => {
                    report.suspended = true;
                    break;
                }
            }
        }

        if report.claimed > 0 {
            tracing::info!(
                queue,
                claimed = report.claimed,
                completed = report.completed,
                requeued = report.requeued,
                errors = report.errors,
                skipped = report.skipped,
                "Queue pass finished"
            );
        }
        Ok(report)
    }

    /// Process an item already claimed from `queue`.
    pub async fn process_item(&self, queue: &str, item: &QueueItem) -> Result<ItemOutcome, ActorError> {
        let binding = self.binding(queue)?;
        self.process(binding, item).await
    }

    async fn process(&self, binding: &QueueBinding, item: &QueueItem) -> Result<ItemOutcome, ActorError> {
        let factory = &binding.factory;
        let payload = &item.payload;
        let uid = factory.describe(payload);

        match factory.already_processed(payload).await {
            Ok(true) => {
                tracing::info!(
                    queue = binding.name(),
                    item = %item.id,
                    "{uid} already exists and will not be re-imported"
                );
                binding.queue.delete_item(item).await?;
                return Ok(ItemOutcome::Skipped);
            }
            Ok(false) => {}
            Err(e) => return Ok(fault(binding, item, &uid, e)),
        }

        let stages = match factory.create(payload).await {
            Ok(stages) => stages,
            Err(e) => return Ok(fault(binding, item, &uid, e)),
        };

        let deadline = self.deadline(item, binding.settings.lease_time_secs);
        let mut stopped = false;
        let mut requeue = false;
        let mut error: Option<String> = None;

        for mut stage in stages {
            let outcome = match stage.job.run(deadline).await {
                Ok(outcome) => outcome,
                Err(e) => return Ok(fault(binding, item, &uid, e)),
            };
            let label = stage.label;

            match outcome {
                Outcome::Done => {
                    tracing::info!(queue = binding.name(), item = %item.id, "{label} for {uid} completed.");
                }
                Outcome::Stopped => {
                    tracing::info!(queue = binding.name(), item = %item.id, "{label} for {uid} stopped at its deadline.");
                    stopped = true;
                }
                Outcome::Error(message) => {
                    tracing::error!(
                        queue = binding.name(),
                        item = %item.id,
                        "{label} for {uid} returned an error: {message}"
                    );
                    error.get_or_insert(message);
                }
                Outcome::Requeue => {
                    requeue = true;
                    break;
                }
                Outcome::Delay(secs) => return self.delay(binding, item, secs).await,
                Outcome::Suspend => {
                    tracing::debug!(
                        queue = binding.name(),
                        item = %item.id,
                        "{label} for {uid} suspended the queue until the next pass"
                    );
                    return Ok(ItemOutcome::Suspended);
                }
            }
        }

        if let Some(message) = error {
            return Ok(ItemOutcome::Failed(message));
        }

        if stopped || requeue {
            // One new item however many stages stopped.
            let id = binding.queue.create_item(payload.clone()).await?;
            binding.queue.delete_item(item).await?;
            tracing::info!(queue = binding.name(), item = %item.id, "{uid} is requeueing. (ID:{id}).");
            return Ok(ItemOutcome::Requeued(id));
        }

        binding.queue.delete_item(item).await?;
        if let Err(e) = factory.after_success(payload).await {
            tracing::warn!(queue = binding.name(), error = %e, "Cleanup after {uid} failed");
        }
        Ok(ItemOutcome::Completed)
    }

    async fn delay(&self, binding: &QueueBinding, item: &QueueItem, secs: i64) -> Result<ItemOutcome, ActorError> {
        if !binding.queue.supports_delay() {
            tracing::debug!(
                queue = binding.name(),
                item = %item.id,
                "Queue cannot delay items; the current lease stands"
            );
        } else if !binding.queue.delay_item(item, secs).await? {
            tracing::debug!(queue = binding.name(), item = %item.id, "Item vanished before it could be delayed");
        }
        Ok(ItemOutcome::Delayed(secs))
    }

    /// Jobs must finish before the lease they run under expires.
    ///
    /// The deadline sits [`lease_margin_secs`] ahead of the expiry so the last
    /// increment can persist and the item be requeued while the lease holds.
    fn deadline(&self, item: &QueueItem, lease_time_secs: i64) -> DateTime<Utc> {
        let expire = DateTime::from_timestamp(item.expire, 0)
            .filter(|_| item.expire > 0)
            .unwrap_or_else(|| self.clock.now() + Duration::seconds(lease_time_secs));
        expire - Duration::seconds(lease_margin_secs(lease_time_secs))
    }
}

/// Time kept back from a lease for wrapping up: a tenth of it, between one
/// second and five minutes, and never the whole lease.
pub fn lease_margin_secs(lease_time_secs: i64) -> i64 {
    (lease_time_secs / 10)
        .clamp(1, 300)
        .min(lease_time_secs - 1)
        .max(0)
}

fn fault(binding: &QueueBinding, item: &QueueItem, uid: &str, err: JobError) -> ItemOutcome {
    tracing::error!(
        queue = binding.name(),
        item = %item.id,
        "Import for {uid} returned an error: {err}"
    );
    ItemOutcome::Failed(err.to_string())
}
