//! docqueue CLI tool

#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{ExportCommand, PopulateCommand, ServeCommand, Target};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "docqueue")]
#[command(version)]
#[command(about = "Dispatcher-free job queue over CouchDB", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the standard locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fill a collection with the sample sleep workload
    Populate {
        /// `CouchDB` server URL
        endpoint: String,
        /// Database name
        collection: String,
    },
    /// Run one worker loop until the run is drained
    Serve {
        /// `CouchDB` server URL
        endpoint: String,
        /// Database name
        collection: String,
        /// Run to serve
        #[arg(long, default_value = docqueue::jobs::examples::SLEEP_RUN)]
        run: String,
    },
    /// Copy a run's records into a `SQLite` file
    Export {
        /// `CouchDB` server URL
        endpoint: String,
        /// Database name
        collection: String,
        /// Destination `SQLite` file
        outfile: PathBuf,
        /// Run to export
        #[arg(long, default_value = docqueue::jobs::examples::SLEEP_RUN)]
        run: String,
        /// Stop schema inference after this many records
        #[arg(long)]
        scan_max: Option<usize>,
    },
}

async fn dispatch(cli: Cli) -> Result<()> {
    docqueue::observability::init()?;
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Populate {
            endpoint,
            collection,
        } => {
            PopulateCommand::new(Target::load(config, endpoint, collection)?)
                .execute()
                .await
        }
        Commands::Serve {
            endpoint,
            collection,
            run,
        } => {
            ServeCommand::new(Target::load(config, endpoint, collection)?, run)
                .execute()
                .await
        }
        Commands::Export {
            endpoint,
            collection,
            outfile,
            run,
            scan_max,
        } => {
            ExportCommand::new(Target::load(config, endpoint, collection)?, outfile, run, scan_max)
                .execute()
                .await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            commands::print_error(&e);
            ExitCode::FAILURE
        }
    }
}
