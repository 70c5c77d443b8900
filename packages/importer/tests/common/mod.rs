#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use importer::{ImportDeps, LocalFileFetcher, MemorySinks};
use queue_core::{Clock, ManualClock, MemoryJobStore, ResourceDescriptor};
use tempfile::TempDir;

/// Scratch directory plus in-memory collaborators for one test.
pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<MemoryJobStore>,
    pub sinks: Arc<MemorySinks>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    /// Clock advancing one second on every read.
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
            store: Arc::new(MemoryJobStore::new()),
            sinks: Arc::new(MemorySinks::new()),
            clock: Arc::new(ManualClock::at(1_700_000_000).with_auto_advance(Duration::seconds(1))),
        })
    }

    pub fn deps(&self) -> ImportDeps {
        ImportDeps {
            store: self.store.clone(),
            sinks: self.sinks.clone(),
            fetcher: Arc::new(LocalFileFetcher::new()),
            clock: self.clock.clone(),
            post_import: None,
        }
    }

    pub fn write(&self, name: &str, contents: &[u8]) -> std::io::Result<PathBuf> {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Descriptor for a file written into the scratch directory.
    pub fn resource(&self, name: &str, contents: &[u8]) -> std::io::Result<ResourceDescriptor> {
        let path = self.write(name, contents)?;
        Ok(ResourceDescriptor::new(path.display().to_string(), name, "1"))
    }

    /// A deadline `secs` clock reads away.
    pub fn deadline(&self, secs: i64) -> DateTime<Utc> {
        self.clock.now() + Duration::seconds(secs)
    }

    /// A deadline far enough out for any test file.
    pub fn no_deadline(&self) -> DateTime<Utc> {
        self.deadline(1_000_000)
    }
}

/// `id,name,note` followed by `rows` records, one with an embedded newline.
pub fn sample_csv(rows: usize) -> Vec<u8> {
    let mut out = String::from("id,name,note\n");
    for i in 1..=rows {
        if i % 7 == 0 {
            out.push_str(&format!("{i},\"row, {i}\",\"line one\nline two\"\n"));
        } else {
            out.push_str(&format!("{i},row {i},plain\n"));
        }
    }
    out.into_bytes()
}
