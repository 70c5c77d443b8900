//! The worker's services, wired from configuration.

use std::sync::Arc;
use std::time::Duration;

use actors::{ActorError, JobRegistry, Orchestrator, PassReport, SchedulerMessage, start_scheduler};
use db::{DatabaseQueue, DatastoreTables, DbConfig, DbError, JobStateRepository};
use importer::{IMPORT_QUEUE, ImportConfig, ImportDeps, ImportJobFactory, LocalFileFetcher};
use queue_core::{Clock, ItemId, JobError, ResourceDescriptor, ResourceFetcher, SystemClock};
use serde_json::{Value, json};
use storage::{ResourceLocalizer, StorageError};

use crate::cli::{ImportArgs, Source};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Actor(#[from] ActorError),

    #[error("{0}")]
    Job(#[from] JobError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

pub struct App {
    queue: DatabaseQueue,
    jobs: Arc<JobStateRepository>,
    tables: DatastoreTables,
    factory: Arc<ImportJobFactory>,
    orchestrator: Arc<Orchestrator>,
}

impl App {
    /// Connect to the database and register the import queue.
    pub async fn build(args: &ImportArgs) -> Result<Self, AppError> {
        let settings = ImportConfig::queue_settings();
        let lease = Duration::from_secs(settings.lease_time_secs.unsigned_abs());

        // Queries must be allowed to run as long as the lease they run under.
        let database = db::init(&DbConfig::from_env().with_query_timeout(lease)).await?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let fetcher: Arc<dyn ResourceFetcher> = match args.source {
            Source::Local => Arc::new(match &args.base_dir {
                Some(dir) => LocalFileFetcher::with_base_dir(dir),
                None => LocalFileFetcher::new(),
            }),
            Source::ObjectStore => Arc::new(ResourceLocalizer::from_env().await?),
        };

        let mut config = ImportConfig::default()
            .with_chunk_size(args.chunk_size)
            .with_delete_local_resource(args.delete_local_resource);
        if let Some(secs) = args.time_limit {
            config = config.with_time_limit(secs);
        }

        let jobs = Arc::new(JobStateRepository::new(database.clone()));
        let tables = DatastoreTables::new(database.clone());
        let deps = ImportDeps {
            store: jobs.clone(),
            sinks: Arc::new(tables.clone()),
            fetcher,
            clock: clock.clone(),
            post_import: None,
        };
        let factory = Arc::new(ImportJobFactory::new(deps, config));

        let queue = DatabaseQueue::new(database, IMPORT_QUEUE, clock.clone());
        let registry = JobRegistry::new().with(Arc::new(queue.clone()), factory.clone(), settings);
        let orchestrator = Arc::new(Orchestrator::new(registry, clock));

        Ok(Self {
            queue,
            jobs,
            tables,
            factory,
            orchestrator,
        })
    }

    pub async fn enqueue(&self, resource: &ResourceDescriptor) -> Result<ItemId, AppError> {
        let id = self.orchestrator.enqueue(IMPORT_QUEUE, resource.to_payload()).await?;
        tracing::info!(item = %id, resource = %resource.unique_identifier(), "Resource queued for import");
        Ok(id)
    }

    pub async fn run_pass(&self, queue: Option<&str>) -> Result<Vec<PassReport>, AppError> {
        self.collect_garbage().await;
        Ok(match queue {
            Some(queue) => vec![self.orchestrator.run_pass(queue).await?],
            None => self.orchestrator.run_all().await,
        })
    }

    /// Run scheduled passes until Ctrl-C.
    pub async fn serve(&self, interval: Duration) -> Result<(), AppError> {
        self.collect_garbage().await;
        let (scheduler, handle) = start_scheduler(self.orchestrator.clone(), Some(interval))
            .await
            .map_err(|e| AppError::Scheduler(e.to_string()))?;

        tokio::signal::ctrl_c().await?;
        tracing::info!("Interrupt received, stopping");
        scheduler
            .send_message(SchedulerMessage::Shutdown)
            .map_err(|e| AppError::Scheduler(e.to_string()))?;
        handle.await.map_err(|e| AppError::Scheduler(e.to_string()))?;
        Ok(())
    }

    /// Job state and table shape of a resource.
    pub async fn status(&self, resource: &ResourceDescriptor) -> Result<Value, AppError> {
        let job_id = resource.job_id();
        let state = self.jobs.get(&job_id).await?.unwrap_or_default();
        let summary = self.tables.table(resource).summary().await?;

        let mut progress = state.progress;
        progress.remove("pending");

        Ok(json!({
            "resource": resource.unique_identifier(),
            "job_id": job_id,
            "status": state.status,
            "error": state.error,
            "progress": progress,
            "table": summary,
        }))
    }

    pub async fn reset(&self, resource: &ResourceDescriptor) -> Result<(), AppError> {
        let mut job = self.factory.job(resource.clone()).await?;
        job.reset().await?;
        tracing::info!(resource = %resource.unique_identifier(), "Import reset");
        Ok(())
    }

    async fn collect_garbage(&self) {
        if let Err(e) = self.queue.garbage_collect().await {
            tracing::warn!(queue = IMPORT_QUEUE, error = %e, "Lease garbage collection failed");
        }
    }
}
