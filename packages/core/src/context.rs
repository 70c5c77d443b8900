//! Persistent state handle shared by resumable job implementations.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::job::{JobError, JobId, JobState, JobStatus, JobStore};

/// Loads, mutates and persists the [`JobState`] of one job identity.
///
/// Mutations are local until [`JobContext::persist`] is called.
pub struct JobContext {
    id: JobId,
    store: Arc<dyn JobStore>,
    state: JobState,
}

impl JobContext {
    /// Load the stored state for `id`, or start from a fresh `Waiting` state.
    pub async fn load_or_init(id: JobId, store: Arc<dyn JobStore>) -> Result<Self, JobError> {
        let state = match store.load(&id).await? {
            Some(state) => state,
            None => {
                tracing::debug!(job_id = %id, "No stored state, starting fresh");
                JobState::default()
            }
        };
        Ok(Self { id, store, state })
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn status(&self) -> JobStatus {
        self.state.status
    }

    pub fn error(&self) -> Option<&str> {
        self.state.error.as_deref()
    }

    pub fn time_limit_secs(&self) -> Option<i64> {
        self.state.time_limit_secs
    }

    pub fn set_time_limit(&mut self, secs: Option<i64>) {
        self.state.time_limit_secs = secs.filter(|s| *s > 0);
    }

    /// Move to `next`, refusing transitions the status machine does not allow.
    pub fn set_status(&mut self, next: JobStatus) -> Result<(), JobError> {
        let current = self.state.status;
        if !current.can_transition_to(next) {
            return Err(JobError::InvalidTransition {
                from: current,
                to: next,
            });
        }
        self.state.status = next;
        Ok(())
    }

    /// Mark the job failed with `message`. A finished job cannot fail.
    pub fn set_error(&mut self, message: impl Into<String>) -> Result<(), JobError> {
        self.set_status(JobStatus::Error)?;
        self.state.error = Some(message.into());
        Ok(())
    }

    pub fn progress<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.state
            .progress
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn progress_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.progress(key).unwrap_or(default)
    }

    pub fn set_progress<T: Serialize>(&mut self, key: &str, value: T) -> Result<(), JobError> {
        self.state
            .progress
            .insert(key.to_string(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn clear_progress(&mut self, key: &str) -> Option<Value> {
        self.state.progress.remove(key)
    }

    /// Write the current state to the store.
    pub async fn persist(&self) -> Result<(), JobError> {
        self.store.save(&self.id, &self.state).await?;
        Ok(())
    }

    /// Forget all stored state and start over from `Waiting`.
    pub async fn reset(&mut self) -> Result<(), JobError> {
        self.store.remove(&self.id).await?;
        self.state = JobState::default();
        tracing::info!(job_id = %self.id, "Job state reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryJobStore;

    #[tokio::test]
    async fn persisted_progress_survives_reload() -> Result<(), JobError> {
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let id = JobId::for_resource("abc__1");

        let mut ctx = JobContext::load_or_init(id.clone(), store.clone()).await?;
        ctx.set_status(JobStatus::InProgress)?;
        ctx.set_progress("chunks_processed", 4_u64)?;
        ctx.persist().await?;

        let reloaded = JobContext::load_or_init(id, store).await?;
        assert_eq!(reloaded.status(), JobStatus::InProgress);
        assert_eq!(reloaded.progress_or("chunks_processed", 0_u64), 4);
        Ok(())
    }

    #[tokio::test]
    async fn error_is_terminal_until_reset() -> Result<(), JobError> {
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let id = JobId::for_resource("abc__1");

        let mut ctx = JobContext::load_or_init(id.clone(), store.clone()).await?;
        ctx.set_error("bad header")?;
        ctx.persist().await?;

        let mut ctx = JobContext::load_or_init(id.clone(), store.clone()).await?;
        assert!(matches!(
            ctx.set_status(JobStatus::InProgress),
            Err(JobError::InvalidTransition { .. })
        ));

        ctx.reset().await?;
        assert_eq!(ctx.status(), JobStatus::Waiting);
        assert!(store.load(&id).await?.is_none());
        ctx.set_status(JobStatus::InProgress)?;
        Ok(())
    }

    #[tokio::test]
    async fn done_jobs_refuse_to_fail() -> Result<(), JobError> {
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let mut ctx = JobContext::load_or_init(JobId::for_resource("abc__1"), store).await?;
        ctx.set_status(JobStatus::Done)?;

        assert!(matches!(
            ctx.set_error("late failure"),
            Err(JobError::InvalidTransition {
                from: JobStatus::Done,
                to: JobStatus::Error
            })
        ));
        assert_eq!(ctx.status(), JobStatus::Done);
        assert!(ctx.error().is_none());
        Ok(())
    }
}
