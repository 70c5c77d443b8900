//! The chunked import job.

use std::io::SeekFrom;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use queue_core::{
    BoxFuture, Clock, FetchError, FieldSpec, JobContext, JobError, JobStatus, JobStore, Outcome,
    ResourceDescriptor, ResourceFetcher, ResumableJob, Sink, SinkError, SinkProvider, TableSchema,
};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::config::ImportConfig;
use crate::header::{assert_unique, column_name, sanitize_description};
use crate::parser::ChunkParser;
use crate::sniff::{SNIFF_LEN, is_importable, sniff};

const BYTES_PROCESSED: &str = "bytes_processed";
const CHUNKS_PROCESSED: &str = "chunks_processed";
const RECORD_NUMBER: &str = "record_number";
const PENDING: &str = "pending";

/// Called once when an import reaches `Done`.
pub trait PostImport: Send + Sync {
    fn imported<'a>(&'a self, resource: &'a ResourceDescriptor) -> BoxFuture<'a, Result<(), JobError>>;
}

/// Collaborators an import job is rebuilt from on every invocation.
#[derive(Clone)]
pub struct ImportDeps {
    pub store: Arc<dyn JobStore>,
    pub sinks: Arc<dyn SinkProvider>,
    pub fetcher: Arc<dyn ResourceFetcher>,
    pub clock: Arc<dyn Clock>,
    pub post_import: Option<Arc<dyn PostImport>>,
}

/// Why an import attempt ended early.
enum Failure {
    /// Bad input; persisted as `Error` and not retried.
    Invalid(String),
    /// Infrastructure fault; surfaced to the caller.
    Fault(JobError),
}

impl From<JobError> for Failure {
    fn from(err: JobError) -> Self {
        Failure::Fault(err)
    }
}

impl From<std::io::Error> for Failure {
    fn from(err: std::io::Error) -> Self {
        Failure::Fault(err.into())
    }
}

impl From<SinkError> for Failure {
    fn from(err: SinkError) -> Self {
        match err {
            SinkError::ColumnMismatch { .. } => Failure::Invalid(err.to_string()),
            other => Failure::Fault(other.into()),
        }
    }
}

impl From<csv::Error> for Failure {
    fn from(err: csv::Error) -> Self {
        Failure::Invalid(format!("Parse error: {err}"))
    }
}

/// Streams a delimited file into a [`Sink`], one bounded run at a time.
///
/// The first record is the header and becomes the sink's schema; every later
/// record is stored as a row. Progress is the byte offset reached, the number
/// of records seen and the unterminated tail the parser holds, all persisted
/// after each chunk.
pub struct ImportJob {
    resource: ResourceDescriptor,
    ctx: JobContext,
    sink: Arc<dyn Sink>,
    fetcher: Arc<dyn ResourceFetcher>,
    clock: Arc<dyn Clock>,
    post_import: Option<Arc<dyn PostImport>>,
    chunk_size: usize,
}

impl ImportJob {
    /// Build the job for `resource`, picking up any stored state.
    pub async fn load(
        resource: ResourceDescriptor,
        deps: &ImportDeps,
        config: &ImportConfig,
    ) -> Result<Self, JobError> {
        let mut ctx = JobContext::load_or_init(resource.job_id(), deps.store.clone()).await?;
        if ctx.time_limit_secs().is_none() {
            ctx.set_time_limit(config.time_limit_secs);
        }

        Ok(Self {
            sink: deps.sinks.sink_for(&resource),
            fetcher: deps.fetcher.clone(),
            clock: deps.clock.clone(),
            post_import: deps.post_import.clone(),
            chunk_size: config.chunk_size.max(1),
            resource,
            ctx,
        })
    }

    pub fn resource(&self) -> &ResourceDescriptor {
        &self.resource
    }

    pub fn context(&self) -> &JobContext {
        &self.ctx
    }

    pub fn sink(&self) -> &Arc<dyn Sink> {
        &self.sink
    }

    pub fn bytes_processed(&self) -> u64 {
        self.ctx.progress_or(BYTES_PROCESSED, 0)
    }

    pub fn chunks_processed(&self) -> u64 {
        self.ctx.progress_or(CHUNKS_PROCESSED, 0)
    }

    /// Records parsed so far, header included.
    pub fn record_number(&self) -> u64 {
        self.ctx.progress_or(RECORD_NUMBER, 0)
    }

    /// Drop every stored row and forget all progress.
    pub async fn reset(&mut self) -> Result<(), JobError> {
        self.sink.drop_all().await?;
        self.ctx.reset().await?;
        Ok(())
    }

    async fn run_bounded(&mut self, deadline: DateTime<Utc>) -> Result<Outcome, JobError> {
        match self.ctx.status() {
            JobStatus::Done | JobStatus::Error => return Ok(Outcome::from_state(self.ctx.state())),
            _ => {}
        }

        let deadline = match self.ctx.time_limit_secs() {
            Some(limit) => deadline.min(self.clock.now() + Duration::seconds(limit)),
            None => deadline,
        };

        match self.import(deadline).await {
            Ok(outcome) => Ok(outcome),
            Err(Failure::Invalid(message)) => {
                tracing::warn!(
                    resource = %self.resource.unique_identifier(),
                    error = %message,
                    "Import failed"
                );
                self.ctx.set_error(message.clone())?;
                self.ctx.persist().await?;
                Ok(Outcome::Error(message))
            }
            Err(Failure::Fault(err)) => Err(err),
        }
    }

    async fn import(&mut self, deadline: DateTime<Utc>) -> Result<Outcome, Failure> {
        let size_error = || Failure::Invalid(format!("Can't get size from file {}", self.resource.path));
        let local = match self.fetcher.localize(&self.resource).await {
            Ok(local) => local,
            Err(FetchError::Backend(e)) => return Err(Failure::Fault(FetchError::Backend(e).into())),
            Err(e) => {
                tracing::debug!(error = %e, "Resource could not be localized");
                return Err(size_error());
            }
        };
        if local.size == 0 {
            return Err(size_error());
        }

        let mut file = File::open(&local.path).await?;
        let mut head = vec![0u8; SNIFF_LEN];
        let head_len = read_full(&mut file, &mut head).await?;
        let mime = sniff(&head[..head_len]);
        if !is_importable(&mime) {
            return Err(Failure::Invalid(format!("Invalid mime type: {mime}")));
        }

        self.ctx.set_status(JobStatus::InProgress)?;

        let mut offset: u64 = self.bytes_processed();
        let mut chunks: u64 = self.chunks_processed();
        let delimiter = delimiter_for(self.resource.mime_type.as_deref());
        let mut parser = if offset == 0 {
            ChunkParser::new(delimiter)
        } else {
            ChunkParser::resume(delimiter, self.ctx.progress_or(PENDING, Vec::new()))
        };

        file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; self.chunk_size];

        loop {
            if offset >= local.size {
                return self.complete(&mut parser).await;
            }
            if self.clock.now() >= deadline {
                self.ctx.set_status(JobStatus::Stopped)?;
                self.ctx.persist().await?;
                tracing::info!(
                    resource = %self.resource.unique_identifier(),
                    bytes_processed = offset,
                    size = local.size,
                    "Import stopped at deadline"
                );
                return Ok(Outcome::Stopped);
            }

            let read = read_full(&mut file, &mut buf).await?;
            if read == 0 {
                return self.complete(&mut parser).await;
            }

            let records = parser.feed(&buf[..read])?;
            self.store(records).await?;

            offset += read as u64;
            chunks += 1;
            self.ctx.set_progress(BYTES_PROCESSED, offset)?;
            self.ctx.set_progress(CHUNKS_PROCESSED, chunks)?;
            self.ctx.set_progress(PENDING, parser.pending())?;
            self.ctx.persist().await?;
        }
    }

    /// Flush the parser, mark the job done and notify.
    async fn complete(&mut self, parser: &mut ChunkParser) -> Result<Outcome, Failure> {
        let records = parser.finish()?;
        self.store(records).await?;
        self.ctx.clear_progress(PENDING);
        self.ctx.set_status(JobStatus::Done)?;
        self.ctx.persist().await?;
        self.sink.mark_imported().await?;

        tracing::info!(
            resource = %self.resource.unique_identifier(),
            records = self.record_number(),
            "Import complete"
        );

        if let Some(hook) = &self.post_import
            && let Err(e) = hook.imported(&self.resource).await
        {
            tracing::error!(
                resource = %self.resource.unique_identifier(),
                error = %e,
                "Post-import processing failed"
            );
        }

        Ok(Outcome::Done)
    }

    /// Turn the header into the schema and hand every later record to the sink.
    async fn store(&mut self, records: Vec<Vec<String>>) -> Result<(), Failure> {
        let mut record_number = self.record_number();
        let mut rows = Vec::with_capacity(records.len());

        for record in records {
            if record_number == 0 {
                self.set_schema(&record).await?;
            } else {
                rows.push(record);
            }
            record_number += 1;
        }

        if !rows.is_empty() {
            self.sink.store_multiple(rows).await?;
        }
        self.ctx.set_progress(RECORD_NUMBER, record_number)?;
        Ok(())
    }

    async fn set_schema(&self, header: &[String]) -> Result<(), Failure> {
        let names: Vec<String> = header.iter().map(|raw| column_name(raw)).collect();
        assert_unique(&names).map_err(Failure::Invalid)?;

        let schema = TableSchema {
            fields: names
                .into_iter()
                .zip(header)
                .map(|(name, raw)| FieldSpec::text(name, sanitize_description(raw)))
                .collect(),
        };
        self.sink.set_schema(&schema).await?;
        Ok(())
    }
}

impl ResumableJob for ImportJob {
    fn run(&mut self, deadline: DateTime<Utc>) -> BoxFuture<'_, Result<Outcome, JobError>> {
        Box::pin(self.run_bounded(deadline))
    }
}

/// Tab for tab-separated resources, comma otherwise.
fn delimiter_for(mime_type: Option<&str>) -> u8 {
    match mime_type {
        Some("text/tab-separated-values") => b'\t',
        _ => b',',
    }
}

/// Read until `buf` is full or the file ends.
async fn read_full(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
