//! Command routing and execution

use tracing::{debug, trace};

use super::args::{Cli, Commands};
use super::commands::{load_config, run_check, run_loop, run_worker, CommandResult};
use super::init_logging;
use crate::config::VALID_LOG_LEVELS;

/// Execute the parsed command line, returning the process exit status
pub async fn execute_command(cli: Cli) -> CommandResult {
    match cli.command {
        Commands::Run(args) => {
            let config = load_config(&args.config)?;
            init_logging(cli.verbose, &config.log_level);
            trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());
            run_loop(args, config).await
        }
        Commands::Check(args) => {
            let config = load_config(&args.config)?;
            init_logging(cli.verbose, &config.log_level);
            run_check(args, config)
        }
        Commands::Worker => {
            let level = std::env::var("CHUNKLOOP_LOG_LEVEL")
                .ok()
                .filter(|l| VALID_LOG_LEVELS.contains(&l.as_str()))
                .unwrap_or_else(|| "warn".to_string());
            init_logging(cli.verbose, &level);
            debug!(pid = std::process::id(), "worker started");
            run_worker()
        }
    }
}
