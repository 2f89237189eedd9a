use anyhow::Context;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use super::{registry, CommandResult};
use crate::backend::{register, Backend};
use crate::cli::args::RunArgs;
use crate::config::{ChunkloopConfig, LoopFile};
use crate::dispatch::{ProcessWorker, WorkerMode};
use crate::error::ChunkloopError;
use crate::subprocess::SubprocessManager;

/// Run a loop file and print the result as JSON on stdout
pub async fn run_loop(args: RunArgs, mut config: ChunkloopConfig) -> CommandResult {
    if let Some(parallel) = args.parallel {
        config.max_parallel = parallel;
    }
    if let Some(retries) = args.retries {
        config.max_retries = retries;
    }
    if args.in_process {
        config.worker_mode = WorkerMode::InProcess;
    }
    config.validate()?;

    let file = LoopFile::load(&args.loop_file)
        .with_context(|| format!("Failed to load loop file {}", args.loop_file.display()))?;
    let registry = registry();
    let caller = file.caller_scope(&registry)?;

    register(config.backend_options())?;
    let progress = !args.no_progress && std::io::stderr().is_terminal();
    let backend = Backend::from_registration()?
        .with_registry(Arc::clone(&registry))
        .with_dispatch(config.dispatch_options(progress));
    let backend = match config.worker_mode {
        WorkerMode::InProcess => backend.in_process(),
        WorkerMode::Process => backend.with_launcher(Arc::new(process_worker(&config)?)),
    };

    let value = backend.evaluate(&file.spec, &caller).await?;
    let json = value.to_data()?;
    let output = if args.pretty {
        serde_json::to_string_pretty(&json)?
    } else {
        serde_json::to_string(&json)?
    };
    println!("{}", output);
    Ok(0)
}

fn process_worker(config: &ChunkloopConfig) -> crate::Result<ProcessWorker> {
    let program = match &config.worker_program {
        Some(program) => program.clone(),
        None => current_exe()?,
    };
    debug!(program = %program.display(), "using worker program");
    Ok(ProcessWorker::new(SubprocessManager::production(), program.to_string_lossy())
        .with_timeout(config.worker_timeout)
        .with_env("CHUNKLOOP_LOG_LEVEL", config.log_level.as_str()))
}

fn current_exe() -> crate::Result<PathBuf> {
    std::env::current_exe()
        .map_err(|e| ChunkloopError::config("cannot locate the worker executable").with_source(e))
}
