#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;
use std::sync::Arc;

use common::{Harness, sample_csv};
use importer::header::MAX_COLUMN_LENGTH;
use importer::{ImportConfig, ImportJob, PostImport};
use queue_core::{
    BoxFuture, JobError, JobStatus, JobStore, Outcome, ResourceDescriptor, ResumableJob,
};
use tokio::sync::Mutex;

async fn import_once(
    harness: &Harness,
    resource: &ResourceDescriptor,
    config: &ImportConfig,
) -> Result<(Outcome, ImportJob), JobError> {
    let mut job = ImportJob::load(resource.clone(), &harness.deps(), config).await?;
    let outcome = job.run(harness.no_deadline()).await?;
    Ok((outcome, job))
}

#[tokio::test]
async fn stops_at_deadline_and_resumes_without_duplicates() -> Result<(), Box<dyn Error>> {
    let harness = Harness::new()?;
    let contents = sample_csv(40);
    let config = ImportConfig::default().with_chunk_size(32);

    let whole = harness.resource("whole.csv", &contents)?;
    let (outcome, _) = import_once(&harness, &whole, &config).await?;
    assert_eq!(outcome, Outcome::Done);
    let expected: Vec<Vec<String>> = harness.sinks.get(&whole).rows().into_iter().map(|(_, r)| r).collect();
    assert_eq!(expected.len(), 40);

    let resource = harness.resource("chunked.csv", &contents)?;
    let mut outcomes = Vec::new();
    for _ in 0..200 {
        // A fresh job per invocation, as the worker builds one per claim.
        let mut job = ImportJob::load(resource.clone(), &harness.deps(), &config).await?;
        let outcome = job.run(harness.deadline(4)).await?;
        outcomes.push(outcome.clone());
        if outcome != Outcome::Stopped {
            break;
        }
        assert_eq!(job.context().status(), JobStatus::Stopped);
        assert!(job.bytes_processed() > 0);
    }

    assert_eq!(outcomes.first(), Some(&Outcome::Stopped));
    assert_eq!(outcomes.last(), Some(&Outcome::Done));
    assert!(outcomes.len() > 2);

    let sink = harness.sinks.get(&resource);
    let rows = sink.rows();
    let numbers: Vec<u64> = rows.iter().map(|(n, _)| *n).collect();
    assert_eq!(numbers, (1..=40).collect::<Vec<u64>>());
    let got: Vec<Vec<String>> = rows.into_iter().map(|(_, r)| r).collect();
    assert_eq!(got, expected);
    assert_eq!(got[6], vec!["7", "row, 7", "line one\nline two"]);

    let job = ImportJob::load(resource.clone(), &harness.deps(), &config).await?;
    assert_eq!(job.record_number(), 41);
    assert_eq!(job.bytes_processed(), contents.len() as u64);
    Ok(())
}

#[tokio::test]
async fn header_becomes_the_schema() -> Result<(), Box<dyn Error>> {
    let harness = Harness::new()?;
    let long = "a really long column name that goes well past the sixty four characters a table allows";
    let csv = format!("Zip Code,\"Total\n  cost\",select,{long}\n1,2,3,4\n");
    let resource = harness.resource("schema.csv", csv.as_bytes())?;

    let (outcome, job) = import_once(&harness, &resource, &ImportConfig::default()).await?;
    assert_eq!(outcome, Outcome::Done);

    let schema = job.sink().schema().await?.ok_or("schema missing")?;
    let names = schema.column_names();
    assert_eq!(names[..3], ["zip_code", "total___cost", "_select"]);
    assert_eq!(names[3].len(), MAX_COLUMN_LENGTH);
    assert_eq!(schema.fields[1].description, "Total cost");
    assert_eq!(schema.fields[0].field_type, "text");
    assert_eq!(job.sink().count().await?, 1);
    Ok(())
}

#[tokio::test]
async fn duplicate_headers_are_an_error() -> Result<(), Box<dyn Error>> {
    let harness = Harness::new()?;
    let resource = harness.resource("dup.csv", b"a,b,A,c,b\n1,2,3,4,5\n")?;

    let (outcome, job) = import_once(&harness, &resource, &ImportConfig::default()).await?;
    assert_eq!(outcome, Outcome::Error("Duplicate headers error: a, b".into()));
    assert_eq!(job.context().status(), JobStatus::Error);
    assert_eq!(job.sink().count().await?, 0);

    let stored = harness.store.load(&resource.job_id()).await?.ok_or("state missing")?;
    assert_eq!(stored.error.as_deref(), Some("Duplicate headers error: a, b"));

    // Errors stick until the job is reset.
    let (again, _) = import_once(&harness, &resource, &ImportConfig::default()).await?;
    assert_eq!(again, outcome);
    Ok(())
}

#[tokio::test]
async fn binary_files_are_rejected() -> Result<(), Box<dyn Error>> {
    let harness = Harness::new()?;
    let resource = harness.resource("image.csv", b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR")?;

    let (outcome, _) = import_once(&harness, &resource, &ImportConfig::default()).await?;
    assert_eq!(outcome, Outcome::Error("Invalid mime type: image/png".into()));
    Ok(())
}

#[tokio::test]
async fn missing_and_empty_files_have_no_size() -> Result<(), Box<dyn Error>> {
    let harness = Harness::new()?;

    let empty = harness.resource("empty.csv", b"")?;
    let (outcome, _) = import_once(&harness, &empty, &ImportConfig::default()).await?;
    assert_eq!(outcome, Outcome::Error(format!("Can't get size from file {}", empty.path)));

    let missing = ResourceDescriptor::new("/no/such/file.csv", "missing", "1");
    let (outcome, job) = import_once(&harness, &missing, &ImportConfig::default()).await?;
    assert_eq!(outcome, Outcome::Error("Can't get size from file /no/such/file.csv".into()));
    assert_eq!(job.context().status(), JobStatus::Error);
    Ok(())
}

#[tokio::test]
async fn short_rows_fail_the_import() -> Result<(), Box<dyn Error>> {
    let harness = Harness::new()?;
    let resource = harness.resource("short.csv", b"a,b,c\n1,2\n")?;

    let (outcome, _) = import_once(&harness, &resource, &ImportConfig::default()).await?;
    assert!(matches!(outcome, Outcome::Error(ref m) if m.contains("3 columns")));
    Ok(())
}

#[tokio::test]
async fn tab_separated_resources_split_on_tabs() -> Result<(), Box<dyn Error>> {
    let harness = Harness::new()?;
    let resource = harness
        .resource("data.tsv", b"name\tcity\nann\tPorto, PT\n")?
        .with_mime_type("text/tab-separated-values");

    let (outcome, _) = import_once(&harness, &resource, &ImportConfig::default()).await?;
    assert_eq!(outcome, Outcome::Done);
    assert_eq!(
        harness.sinks.get(&resource).rows(),
        vec![(1, vec!["ann".to_string(), "Porto, PT".to_string()])]
    );
    Ok(())
}

#[tokio::test]
async fn done_jobs_do_not_run_again() -> Result<(), Box<dyn Error>> {
    let harness = Harness::new()?;
    let resource = harness.resource("done.csv", &sample_csv(5))?;

    let (outcome, _) = import_once(&harness, &resource, &ImportConfig::default()).await?;
    assert_eq!(outcome, Outcome::Done);

    std::fs::write(&resource.path, sample_csv(10))?;
    let (outcome, job) = import_once(&harness, &resource, &ImportConfig::default()).await?;
    assert_eq!(outcome, Outcome::Done);
    assert_eq!(job.sink().count().await?, 5);
    assert!(job.sink().has_been_imported().await?);
    Ok(())
}

#[tokio::test]
async fn reset_starts_over() -> Result<(), Box<dyn Error>> {
    let harness = Harness::new()?;
    let resource = harness.resource("reset.csv", b"a,a\n1,2\n")?;

    let (outcome, mut job) = import_once(&harness, &resource, &ImportConfig::default()).await?;
    assert!(matches!(outcome, Outcome::Error(_)));

    job.reset().await?;
    assert!(harness.store.load(&resource.job_id()).await?.is_none());

    std::fs::write(&resource.path, b"a,b\n1,2\n")?;
    let (outcome, _) = import_once(&harness, &resource, &ImportConfig::default()).await?;
    assert_eq!(outcome, Outcome::Done);
    Ok(())
}

#[tokio::test]
async fn time_limit_caps_a_run() -> Result<(), Box<dyn Error>> {
    let harness = Harness::new()?;
    let resource = harness.resource("limited.csv", &sample_csv(20))?;
    let config = ImportConfig::default().with_chunk_size(16).with_time_limit(2);

    let (outcome, job) = import_once(&harness, &resource, &config).await?;
    assert_eq!(outcome, Outcome::Stopped);
    assert_eq!(job.context().time_limit_secs(), Some(2));
    assert!(job.chunks_processed() <= 2);
    Ok(())
}

struct Recorder(Mutex<Vec<String>>);

impl PostImport for Recorder {
    fn imported<'a>(&'a self, resource: &'a ResourceDescriptor) -> BoxFuture<'a, Result<(), JobError>> {
        Box::pin(async move {
            self.0.lock().await.push(resource.unique_identifier());
            Ok(())
        })
    }
}

#[tokio::test]
async fn post_import_hook_runs_once_on_completion() -> Result<(), Box<dyn Error>> {
    let harness = Harness::new()?;
    let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
    let mut deps = harness.deps();
    deps.post_import = Some(recorder.clone());

    let resource = harness.resource("hook.csv", &sample_csv(3))?;
    let mut job = ImportJob::load(resource.clone(), &deps, &ImportConfig::default()).await?;
    assert_eq!(job.run(harness.no_deadline()).await?, Outcome::Done);
    assert_eq!(job.run(harness.no_deadline()).await?, Outcome::Done);

    assert_eq!(*recorder.0.lock().await, vec!["hook.csv__1".to_string()]);
    Ok(())
}
