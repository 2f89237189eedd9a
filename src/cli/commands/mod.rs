//! Subcommand implementations

pub mod check;
pub mod run;
pub mod worker;

pub use check::run_check;
pub use run::run_loop;
pub use worker::run_worker;

use anyhow::Result;
use std::sync::Arc;

use super::args::ConfigArgs;
use crate::config::ChunkloopConfig;
use crate::packages::PackageRegistry;

/// Load configuration and apply command-line overrides
pub fn load_config(args: &ConfigArgs) -> crate::Result<ChunkloopConfig> {
    let mut config = ChunkloopConfig::load(args.config.as_deref())?;
    if let Some(chunk_size) = args.chunk_size {
        config.chunk_size = chunk_size;
    }
    config.validate()?;
    Ok(config)
}

pub fn registry() -> Arc<PackageRegistry> {
    Arc::new(PackageRegistry::standard())
}

pub type CommandResult = Result<i32>;
