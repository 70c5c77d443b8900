//! File-based job state persistence.

use std::path::{Path, PathBuf};

use queue_core::{BoxFuture, JobId, JobState, JobStore, StoreError};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// [`JobStore`] keeping one JSON file per job.
///
/// Suitable for single-host deployments and local development. Writes go to
/// a temporary file that is renamed into place.
#[derive(Debug, Clone)]
pub struct FileJobStore {
    /// Base directory for state files.
    base_dir: PathBuf,
}

impl FileJobStore {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    /// Store rooted at the default data directory.
    pub fn default_dir() -> Self {
        Self::new("./data/jobs")
    }

    /// Ensure the base directory exists.
    pub async fn init(&self) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.base_dir).await?;
        Ok(())
    }

    fn path_for(&self, id: &JobId) -> PathBuf {
        self.base_dir.join(format!("{id}.json"))
    }

    pub async fn save(&self, id: &JobId, state: &JobState) -> Result<(), PersistenceError> {
        let path = self.path_for(id);
        let json = serde_json::to_string_pretty(state)?;

        let temp_path = self.base_dir.join(format!("{id}.json.tmp"));
        fs::create_dir_all(&self.base_dir).await?;
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
        fs::rename(&temp_path, &path).await?;

        tracing::debug!(job = %id, status = %state.status, "Saved job state");
        Ok(())
    }

    pub async fn load(&self, id: &JobId) -> Result<Option<JobState>, PersistenceError> {
        let json = match fs::read_to_string(self.path_for(id)).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&json)?))
    }

    pub async fn delete(&self, id: &JobId) -> Result<(), PersistenceError> {
        match fs::remove_file(self.path_for(id)).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => {
                tracing::debug!(job = %id, "Deleted job state");
                Ok(())
            }
        }
    }

    /// Ids of every stored job.
    pub async fn list(&self) -> Result<Vec<JobId>, PersistenceError> {
        let mut ids = Vec::new();
        let mut entries = match fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json")
                && let Some(stem) = path.file_stem()
            {
                ids.push(JobId(stem.to_string_lossy().to_string()));
            }
        }
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(ids)
    }
}

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<PersistenceError> for StoreError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::Json(e) => StoreError::Serialization(e),
            PersistenceError::Io(e) => StoreError::Backend(e.to_string()),
        }
    }
}

impl JobStore for FileJobStore {
    fn load<'a>(&'a self, id: &'a JobId) -> BoxFuture<'a, Result<Option<JobState>, StoreError>> {
        Box::pin(async move { Ok(FileJobStore::load(self, id).await?) })
    }

    fn save<'a>(&'a self, id: &'a JobId, state: &'a JobState) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move { Ok(FileJobStore::save(self, id, state).await?) })
    }

    fn remove<'a>(&'a self, id: &'a JobId) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move { Ok(self.delete(id).await?) })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use queue_core::JobStatus;

    use super::*;

    #[tokio::test]
    async fn state_survives_a_new_store() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let id = JobId::for_resource("abc__1");
        let mut state = JobState {
            status: JobStatus::Stopped,
            ..JobState::default()
        };
        state.progress.insert("bytes_processed".into(), 8192.into());

        FileJobStore::new(dir.path()).save(&id, &state).await?;

        let store = FileJobStore::new(dir.path());
        assert_eq!(store.load(&id).await?, Some(state));
        assert_eq!(store.list().await?, vec![id.clone()]);

        store.delete(&id).await?;
        assert_eq!(store.load(&id).await?, None);
        store.delete(&id).await?;
        Ok(())
    }

    #[tokio::test]
    async fn missing_directory_is_empty() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let store = FileJobStore::new(dir.path().join("nested"));
        assert!(store.list().await?.is_empty());
        assert_eq!(store.load(&JobId::for_resource("x__1")).await?, None);
        Ok(())
    }
}
