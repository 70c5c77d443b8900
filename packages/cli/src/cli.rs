//! Command-line surface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use importer::BYTES_PER_CHUNK;
use queue_core::ResourceDescriptor;

#[derive(Debug, Parser)]
#[command(name = "datastore-worker", version, about = "Chunked, resumable datastore imports")]
pub struct Cli {
    #[command(flatten)]
    pub import: ImportArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Where resources are read from.
    #[arg(long, value_enum, env = "DATASTORE_SOURCE", default_value_t = Source::Local, global = true)]
    pub source: Source,

    /// Base directory for relative paths with the local source.
    #[arg(long, env = "DATASTORE_BASE_DIR", global = true)]
    pub base_dir: Option<PathBuf>,

    /// Bytes read per increment.
    #[arg(long, env = "DATASTORE_CHUNK_SIZE", default_value_t = BYTES_PER_CHUNK, global = true)]
    pub chunk_size: usize,

    /// Cap on a single job run, in seconds.
    #[arg(long, env = "DATASTORE_TIME_LIMIT", global = true)]
    pub time_limit: Option<i64>,

    /// Remove localized copies once their import item completed.
    #[arg(long, env = "DATASTORE_DELETE_LOCAL_RESOURCE", global = true)]
    pub delete_local_resource: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Source {
    /// Paths on the local filesystem.
    Local,
    /// Object keys, localized through the configured object store.
    ObjectStore,
}

#[derive(Debug, Args)]
pub struct ResourceArgs {
    #[arg(long)]
    pub identifier: String,

    #[arg(long)]
    pub version: String,
}

impl ResourceArgs {
    /// Descriptor good enough to address the job and its table.
    pub fn descriptor(&self) -> ResourceDescriptor {
        ResourceDescriptor::new("", &self.identifier, &self.version)
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Queue a resource for import.
    Enqueue {
        /// File path or object key.
        #[arg(long)]
        path: String,

        #[command(flatten)]
        resource: ResourceArgs,

        #[arg(long)]
        mime_type: Option<String>,
    },

    /// Run one pass and print what it did.
    RunPass {
        /// Limit the pass to this queue; every queue otherwise.
        #[arg(long)]
        queue: Option<String>,
    },

    /// Run passes on a fixed interval until interrupted.
    Serve {
        /// Seconds between passes.
        #[arg(long, default_value_t = 60)]
        interval: u64,
    },

    /// Show the import state of a resource.
    Status {
        #[command(flatten)]
        resource: ResourceArgs,
    },

    /// Drop a resource's rows and forget its import progress.
    Reset {
        #[command(flatten)]
        resource: ResourceArgs,
    },
}
