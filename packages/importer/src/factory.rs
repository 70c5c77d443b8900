//! Builds import jobs for queue items.

use queue_core::{BoxFuture, JobError, JobFactory, ResourceDescriptor, StagedJob};
use serde_json::Value;

use crate::config::ImportConfig;
use crate::job::{ImportDeps, ImportJob};

/// [`JobFactory`] for the import queue.
///
/// Payloads are [`ResourceDescriptor`]s; each item yields a single "Import"
/// stage.
#[derive(Clone)]
pub struct ImportJobFactory {
    deps: ImportDeps,
    config: ImportConfig,
}

impl ImportJobFactory {
    pub fn new(deps: ImportDeps, config: ImportConfig) -> Self {
        Self { deps, config }
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    /// Build the job for a resource directly, outside of any queue.
    pub async fn job(&self, resource: ResourceDescriptor) -> Result<ImportJob, JobError> {
        ImportJob::load(resource, &self.deps, &self.config).await
    }
}

fn resource(payload: &Value) -> Result<ResourceDescriptor, JobError> {
    ResourceDescriptor::from_payload(payload).map_err(|e| JobError::Payload(e.to_string()))
}

impl JobFactory for ImportJobFactory {
    fn create<'a>(&'a self, payload: &'a Value) -> BoxFuture<'a, Result<Vec<StagedJob>, JobError>> {
        Box::pin(async move {
            let job = self.job(resource(payload)?).await?;
            Ok(vec![StagedJob::new("Import", job)])
        })
    }

    fn already_processed<'a>(&'a self, payload: &'a Value) -> BoxFuture<'a, Result<bool, JobError>> {
        Box::pin(async move {
            let resource = resource(payload)?;
            Ok(self.deps.sinks.sink_for(&resource).has_been_imported().await?)
        })
    }

    fn after_success<'a>(&'a self, payload: &'a Value) -> BoxFuture<'a, Result<(), JobError>> {
        Box::pin(async move {
            if self.config.delete_local_resource {
                self.deps.fetcher.release(&resource(payload)?).await?;
            }
            Ok(())
        })
    }

    fn describe(&self, payload: &Value) -> String {
        match ResourceDescriptor::from_payload(payload) {
            Ok(resource) => resource.unique_identifier(),
            Err(_) => payload.to_string(),
        }
    }
}
