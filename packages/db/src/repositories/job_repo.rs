//! Job state repository, keyed by job id.

use queue_core::{BoxFuture, JobId, JobState, JobStatus, JobStore, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use surrealdb::sql::Thing;

use crate::{Database, DbError};

/// Internal record type for SurrealDB reads.
#[derive(Debug, Deserialize)]
struct JobStateRecord {
    #[allow(dead_code)]
    id: Option<Thing>,
    status: JobStatus,
    error: Option<String>,
    #[serde(default)]
    progress: Map<String, Value>,
    time_limit_secs: Option<i64>,
}

impl From<JobStateRecord> for JobState {
    fn from(record: JobStateRecord) -> Self {
        JobState {
            status: record.status,
            error: record.error,
            progress: record.progress,
            time_limit_secs: record.time_limit_secs,
        }
    }
}

/// Struct for writing job state; `updated_at` is stamped by the query.
#[derive(Debug, Clone, Serialize)]
struct JobStateWrite {
    status: JobStatus,
    error: Option<String>,
    progress: Map<String, Value>,
    time_limit_secs: Option<i64>,
}

/// Job state persisted in the `job_state` table.
#[derive(Clone)]
pub struct JobStateRepository {
    db: Database,
}

impl JobStateRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Get the state of a job, if any was stored.
    pub async fn get(&self, id: &JobId) -> Result<Option<JobState>, DbError> {
        let record: Option<JobStateRecord> = self.db.select(("job_state", id.as_str())).await?;
        Ok(record.map(JobState::from))
    }

    /// Insert or replace the state of a job.
    pub async fn put(&self, id: &JobId, state: &JobState) -> Result<(), DbError> {
        let data = JobStateWrite {
            status: state.status,
            error: state.error.clone(),
            progress: state.progress.clone(),
            time_limit_secs: state.time_limit_secs,
        };

        // Every field is assigned so cleared progress keys and errors do not linger.
        self.db
            .query(
                "UPSERT type::thing('job_state', $id) SET status = $data.status, error = $data.error, progress = $data.progress, time_limit_secs = $data.time_limit_secs, updated_at = time::now() RETURN NONE",
            )
            .bind(("id", id.to_string()))
            .bind(("data", data))
            .await?
            .check()?;

        Ok(())
    }

    /// Delete the state of a job.
    pub async fn delete(&self, id: &JobId) -> Result<(), DbError> {
        let _: Option<JobStateRecord> = self.db.delete(("job_state", id.as_str())).await?;
        Ok(())
    }

    /// List job ids currently in `status`.
    pub async fn list_by_status(&self, status: JobStatus) -> Result<Vec<JobId>, DbError> {
        let mut result = self
            .db
            .query("SELECT id FROM job_state WHERE status = $status")
            .bind(("status", status))
            .await?;

        #[derive(Deserialize)]
        struct IdOnly {
            id: Thing,
        }

        let ids: Vec<IdOnly> = result.take(0)?;
        Ok(ids.into_iter().map(|r| JobId(r.id.id.to_raw())).collect())
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl JobStore for JobStateRepository {
    fn load<'a>(&'a self, id: &'a JobId) -> BoxFuture<'a, Result<Option<JobState>, StoreError>> {
        Box::pin(async move { Ok(self.get(id).await?) })
    }

    fn save<'a>(&'a self, id: &'a JobId, state: &'a JobState) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move { Ok(self.put(id, state).await?) })
    }

    fn remove<'a>(&'a self, id: &'a JobId) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move { Ok(self.delete(id).await?) })
    }
}
