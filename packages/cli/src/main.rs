//! `datastore-worker`: queue resources for import and work the import queue.

mod app;
mod cli;

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use queue_core::ResourceDescriptor;
use tracing_subscriber::EnvFilter;

use crate::app::{App, AppError};
use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so stdout carries only command output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let app = App::build(&cli.import).await?;

    match cli.command {
        Command::Enqueue {
            path,
            resource,
            mime_type,
        } => {
            let mut descriptor = ResourceDescriptor::new(path, resource.identifier, resource.version);
            if let Some(mime_type) = mime_type {
                descriptor = descriptor.with_mime_type(mime_type);
            }
            println!("{}", app.enqueue(&descriptor).await?);
        }
        Command::RunPass { queue } => {
            let reports = app.run_pass(queue.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        Command::Serve { interval } => {
            app.serve(Duration::from_secs(interval.max(1))).await?;
        }
        Command::Status { resource } => {
            let status = app.status(&resource.descriptor()).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Reset { resource } => {
            app.reset(&resource.descriptor()).await?;
        }
    }

    Ok(())
}
