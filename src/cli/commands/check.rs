use anyhow::Context;

use super::{registry, CommandResult};
use crate::backend::Backend;
use crate::cli::args::CheckArgs;
use crate::config::{ChunkloopConfig, LoopFile};
use crate::plan::{chunk_count, iteration_count};

/// Validate a loop file and capture its scope without dispatching anything
pub fn run_check(args: CheckArgs, config: ChunkloopConfig) -> CommandResult {
    let file = LoopFile::load(&args.loop_file)
        .with_context(|| format!("Failed to load loop file {}", args.loop_file.display()))?;

    let registry = registry();
    let caller = file.caller_scope(&registry)?;
    let backend = Backend::register(config.backend_options())?.with_registry(registry);
    let (prepared, scope) = backend.capture(&file.spec, &caller)?;
    let iterations = iteration_count(&prepared.spec.iterators)?;

    println!("iterations: {}", iterations);
    println!(
        "chunks: {} (chunk size {})",
        chunk_count(iterations, backend.chunk_size()),
        backend.chunk_size()
    );
    println!("loop variables: {}", prepared.loop_variables.join(", "));
    println!("captured: {}", scope.names().join(", "));
    println!("packages: {}", scope.packages().join(", "));
    Ok(0)
}
