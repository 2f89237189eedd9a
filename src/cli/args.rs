//! CLI argument structures

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Run map/reduce loops chunk by chunk on isolated worker processes
#[derive(Parser, Debug)]
#[command(name = "chunkloop")]
#[command(about = "chunkloop - chunked loop dispatch to isolated workers", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a loop file and print its result as JSON
    Run(RunArgs),

    /// Validate a loop file and show what its workers would receive
    Check(CheckArgs),

    /// Evaluate one task payload from stdin and write the reply to stdout
    #[command(hide = true)]
    Worker,
}

#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// Path to configuration file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Iterations per chunk
    #[arg(long, value_name = "N")]
    pub chunk_size: Option<usize>,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Loop file to run
    pub loop_file: PathBuf,

    #[command(flatten)]
    pub config: ConfigArgs,

    /// Maximum number of chunks in flight
    #[arg(short = 'j', long, value_name = "N")]
    pub parallel: Option<usize>,

    /// Retries per chunk for crashed or timed out workers
    #[arg(long, value_name = "N")]
    pub retries: Option<u32>,

    /// Evaluate chunks inside this process
    #[arg(long)]
    pub in_process: bool,

    /// Never show a progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Pretty-print the result
    #[arg(long)]
    pub pretty: bool,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Loop file to check
    pub loop_file: PathBuf,

    #[command(flatten)]
    pub config: ConfigArgs,
}
