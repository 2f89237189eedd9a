use clap::Parser;
use tracing::error;

use chunkloop::cli::{execute_command, exit_code, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let status = match execute_command(cli).await {
        Ok(status) => status,
        Err(e) => {
            error!("Fatal error: {:#}", e);
            eprintln!("Error: {e:#}");
            exit_code(&e)
        }
    };
    std::process::exit(status);
}
