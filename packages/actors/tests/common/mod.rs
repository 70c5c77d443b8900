#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use actors::{JobRegistry, Orchestrator};
use chrono::{DateTime, Duration, Utc};
use queue_core::{
    BoxFuture, Clock, ItemId, JobError, JobFactory, ManualClock, MemoryQueue, Outcome, QueueError,
    QueueItem, QueueSettings, ReliableQueue, ResumableJob, StagedJob,
};
use serde_json::Value;

pub const QUEUE: &str = "scripted";

/// What a scripted stage does when run.
#[derive(Debug, Clone)]
pub enum Step {
    Returns(Outcome),
    Fails(String),
    /// Takes this long, then returns the outcome.
    Sleeps(std::time::Duration, Outcome),
}

/// Job factory whose stages play back a fixed script.
#[derive(Default)]
pub struct ScriptedFactory {
    script: Mutex<Vec<Step>>,
    pub runs: Arc<AtomicUsize>,
    pub deadlines: Arc<Mutex<Vec<DateTime<Utc>>>>,
    pub cleanups: AtomicUsize,
    pub already_done: AtomicBool,
}

impl ScriptedFactory {
    pub fn new(script: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            ..Self::default()
        })
    }

    pub fn outcomes(outcomes: Vec<Outcome>) -> Arc<Self> {
        Self::new(outcomes.into_iter().map(Step::Returns).collect())
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn cleanups(&self) -> usize {
        self.cleanups.load(Ordering::SeqCst)
    }

    /// Deadlines handed to the stages, in run order.
    pub fn deadlines(&self) -> Vec<DateTime<Utc>> {
        self.deadlines.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

struct ScriptedJob {
    step: Step,
    runs: Arc<AtomicUsize>,
    deadlines: Arc<Mutex<Vec<DateTime<Utc>>>>,
}

impl ResumableJob for ScriptedJob {
    fn run(&mut self, deadline: DateTime<Utc>) -> BoxFuture<'_, Result<Outcome, JobError>> {
        Box::pin(async move {
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.deadlines
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(deadline);
            match &self.step {
                Step::Returns(outcome) => Ok(outcome.clone()),
                Step::Fails(message) => Err(JobError::Payload(message.clone())),
                Step::Sleeps(duration, outcome) => {
                    tokio::time::sleep(*duration).await;
                    Ok(outcome.clone())
                }
            }
        })
    }
}

impl JobFactory for ScriptedFactory {
    fn create<'a>(&'a self, _payload: &'a Value) -> BoxFuture<'a, Result<Vec<StagedJob>, JobError>> {
        Box::pin(async move {
            let script = self.script.lock().unwrap_or_else(PoisonError::into_inner).clone();
            Ok(script
                .into_iter()
                .enumerate()
                .map(|(i, step)| {
                    StagedJob::new(
                        format!("Stage {i}"),
                        ScriptedJob {
                            step,
                            runs: self.runs.clone(),
                            deadlines: self.deadlines.clone(),
                        },
                    )
                })
                .collect())
        })
    }

    fn already_processed<'a>(&'a self, _payload: &'a Value) -> BoxFuture<'a, Result<bool, JobError>> {
        Box::pin(async move { Ok(self.already_done.load(Ordering::SeqCst)) })
    }

    fn after_success<'a>(&'a self, _payload: &'a Value) -> BoxFuture<'a, Result<(), JobError>> {
        Box::pin(async move {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// Memory queue that refuses to delay items.
pub struct NoDelayQueue(pub MemoryQueue);

impl ReliableQueue for NoDelayQueue {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn create_item(&self, payload: Value) -> BoxFuture<'_, Result<ItemId, QueueError>> {
        self.0.create_item(payload)
    }

    fn claim_item(&self, lease_secs: i64) -> BoxFuture<'_, Result<Option<QueueItem>, QueueError>> {
        self.0.claim_item(lease_secs)
    }

    fn delete_item<'a>(&'a self, item: &'a QueueItem) -> BoxFuture<'a, Result<(), QueueError>> {
        self.0.delete_item(item)
    }

    fn release_item<'a>(&'a self, item: &'a QueueItem) -> BoxFuture<'a, Result<bool, QueueError>> {
        self.0.release_item(item)
    }

    fn delay_item<'a>(&'a self, _item: &'a QueueItem, _delta_secs: i64) -> BoxFuture<'a, Result<bool, QueueError>> {
        Box::pin(async { Ok(false) })
    }

    fn number_of_items(&self) -> BoxFuture<'_, Result<u64, QueueError>> {
        self.0.number_of_items()
    }
}

/// Clock frozen at a fixed instant.
pub fn frozen_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::at(1_700_000_000))
}

/// Clock moving one second per read, so passes run out of time.
pub fn ticking_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::at(1_700_000_000).with_auto_advance(Duration::seconds(1)))
}

/// Orchestrator over a single memory queue named [`QUEUE`].
pub fn orchestrator(
    factory: Arc<ScriptedFactory>,
    clock: Arc<dyn Clock>,
    settings: QueueSettings,
) -> (Orchestrator, Arc<MemoryQueue>) {
    let queue = Arc::new(MemoryQueue::new(QUEUE, clock.clone()));
    let registry = JobRegistry::new().with(queue.clone(), factory, settings);
    (Orchestrator::new(registry, clock), queue)
}
