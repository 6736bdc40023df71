use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

mod commands;
mod logging;

#[derive(Parser)]
#[command(name = "rangeload-cmd")]
#[command(about = "Bulk import of CSV files into a local range-partitioned store")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Inputs shared by `import` and `plan`.
#[derive(Args)]
pub struct JobArgs {
    /// Path to the JSON table schema
    #[arg(long)]
    schema: PathBuf,

    /// Path to the JSON import configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory or URL, overriding `output_root` of the configuration
    #[arg(short, long)]
    output: Option<String>,

    /// Directory of the local range store
    #[arg(long)]
    store: PathBuf,

    /// CSV file(s) to import, one split per file (can be specified multiple times)
    #[arg(short, long, required = true)]
    file: Vec<PathBuf>,

    /// The CSV files have no header line
    #[arg(long)]
    no_headers: bool,

    /// CSV field delimiter
    #[arg(long, default_value_t = ',')]
    delimiter: char,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample, split, sort and load the CSV files into the store
    Import {
        #[command(flatten)]
        job: JobArgs,

        /// Transaction id of the import (random when not specified)
        #[arg(long)]
        txn: Option<u64>,

        /// Use the partitions that already exist in the store
        #[arg(long)]
        skip_sampling: bool,
    },

    /// Sample the CSV files and print the cut points of every target
    Plan {
        #[command(flatten)]
        job: JobArgs,
    },

    /// Print the footer and the records of a segment file
    InspectSegment {
        /// Increase verbosity (-v prints the records)
        #[arg(short, long, action = clap::ArgAction::Count)]
        verbose: u8,

        /// Segment file path
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    logging::init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Import {
            job,
            txn,
            skip_sampling,
        } => commands::import::run(job, txn, skip_sampling),
        Commands::Plan { job } => commands::plan::run(job),
        Commands::InspectSegment { verbose, path } => commands::inspect::run(verbose, path),
    }
}
