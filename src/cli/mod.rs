//! Command-line interface
//!
//! - Argument parsing structures
//! - Command implementations
//! - Logging setup and exit codes

pub mod args;
pub mod commands;
pub mod router;

pub use args::{Cli, Commands};
pub use router::execute_command;

use tracing_subscriber::EnvFilter;

use crate::error::ChunkloopError;

/// Log filter for a verbosity count, falling back to the configured level
pub fn get_log_level(verbose: u8, configured: &str) -> &str {
    match verbose {
        0 => configured,
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. Logs always go to stderr, stdout is
/// reserved for results and worker replies. `RUST_LOG` wins when set.
pub fn init_logging(verbose: u8, configured: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(get_log_level(verbose, configured)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose >= 2)
        .with_line_number(verbose >= 3)
        .try_init();
}

/// Exit status for an error that reached the top level
pub fn exit_code(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<ChunkloopError>()
        .map_or(1, ChunkloopError::exit_code)
}
