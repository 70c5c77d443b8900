//! The scheduler actor: the periodic trigger that drives orchestrator passes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::task::JoinHandle;

use crate::messages::SchedulerMessage;
use crate::worker::Orchestrator;

/// Arguments for the scheduler actor.
pub struct SchedulerArgs {
    pub orchestrator: Arc<Orchestrator>,
    /// Tick interval; `None` runs passes only on request.
    pub interval: Option<Duration>,
}

/// State for the scheduler actor.
pub struct SchedulerState {
    orchestrator: Arc<Orchestrator>,
    ticker: Option<JoinHandle<()>>,
    /// Set while a tick is queued or its pass is running.
    tick_pending: Arc<AtomicBool>,
    passes: u64,
}

/// Scheduler actor that runs a pass over every queue on each tick.
///
/// Messages are handled one at a time, so passes never overlap within a
/// process.
pub struct Scheduler;

impl Actor for Scheduler {
    type Msg = SchedulerMessage;
    type State = SchedulerState;
    type Arguments = SchedulerArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(interval = ?args.interval, "Starting datastore scheduler");

        let tick_pending = Arc::new(AtomicBool::new(false));
        let ticker = args.interval.map(|period| {
            let myself = myself.clone();
            let pending = tick_pending.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    interval.tick().await;
                    // One tick at a time: skip while the previous pass is still queued or running.
                    if pending.swap(true, Ordering::AcqRel) {
                        tracing::trace!("Pass still running, tick skipped");
                        continue;
                    }
                    if myself.send_message(SchedulerMessage::Tick).is_err() {
                        break;
                    }
                }
            })
        });

        Ok(SchedulerState {
            orchestrator: args.orchestrator,
            ticker,
            tick_pending,
            passes: 0,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SchedulerMessage::Tick => {
                state.passes += 1;
                let reports = state.orchestrator.run_all().await;
                state.tick_pending.store(false, Ordering::Release);
                tracing::debug!(pass = state.passes, queues = reports.len(), "Scheduled pass finished");
            }

            SchedulerMessage::RunPass { queue, reply } => {
                state.passes += 1;
                let result = match queue {
                    Some(queue) => state
                        .orchestrator
                        .run_pass(&queue)
                        .await
                        .map(|report| vec![report])
                        .map_err(|e| e.to_string()),
                    None => Ok(state.orchestrator.run_all().await),
                };
                let _ = reply.send(result);
            }

            SchedulerMessage::Enqueue {
                queue,
                payload,
                reply,
            } => {
                let result = state
                    .orchestrator
                    .enqueue(&queue, payload)
                    .await
                    .map_err(|e| e.to_string());
                let _ = reply.send(result);
            }

            SchedulerMessage::Counts { reply } => {
                let counts = match state.orchestrator.counts().await {
                    Ok(counts) => counts,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to count queue items");
                        Vec::new()
                    }
                };
                let _ = reply.send(counts);
            }

            SchedulerMessage::Passes { reply } => {
                let _ = reply.send(state.passes);
            }

            SchedulerMessage::Shutdown => {
                tracing::info!(passes = state.passes, "Shutting down scheduler");
                myself.stop(None);
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if let Some(ticker) = state.ticker.take() {
            ticker.abort();
        }
        Ok(())
    }
}

/// Start the scheduler for `orchestrator`, ticking every `interval` if given.
pub async fn start_scheduler(
    orchestrator: Arc<Orchestrator>,
    interval: Option<Duration>,
) -> Result<(ActorRef<SchedulerMessage>, JoinHandle<()>), ractor::SpawnErr> {
    Actor::spawn(
        Some("datastore-scheduler".to_string()),
        Scheduler,
        SchedulerArgs {
            orchestrator,
            interval,
        },
    )
    .await
}
