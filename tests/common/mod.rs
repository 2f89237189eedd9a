//! Common test utilities and helpers

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use chunkloop::capture::ScopeDefinition;
use chunkloop::dispatch::{DispatchOptions, ProcessWorker};
use chunkloop::packages::PackageRegistry;
use chunkloop::subprocess::SubprocessManager;
use chunkloop::{Backend, BackendOptions, CallerScope};

/// The chunkloop binary built for this test run, used as the worker
pub fn worker_program() -> &'static str {
    env!("CARGO_BIN_EXE_chunkloop")
}

/// A backend whose chunks run in real worker processes
pub fn process_backend(chunk_size: usize) -> Backend {
    process_backend_with(chunk_size, DispatchOptions::default(), None)
}

pub fn process_backend_with(chunk_size: usize, dispatch: DispatchOptions, timeout: Option<Duration>) -> Backend {
    let launcher = ProcessWorker::new(SubprocessManager::production(), worker_program()).with_timeout(timeout);
    Backend::register(BackendOptions { chunk_size })
        .expect("valid chunk size")
        .with_launcher(Arc::new(launcher))
        .with_dispatch(dispatch)
}

/// Caller scope from `(name, source)` definitions
pub fn caller(definitions: &[(&str, &str)]) -> CallerScope {
    let definitions: Vec<_> = definitions
        .iter()
        .map(|(name, value)| ScopeDefinition {
            name: name.to_string(),
            value: value.to_string(),
        })
        .collect();
    CallerScope::from_definitions(&definitions, &PackageRegistry::standard()).expect("valid definitions")
}

/// Temporary directory holding files for one test
pub struct TestFiles {
    dir: TempDir,
}

impl TestFiles {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("temp dir"),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, content).expect("write test file");
        path
    }

    /// An empty configuration file, so the user's own config is never read
    pub fn config(&self) -> PathBuf {
        self.write("config.yml", "{}\n")
    }
}
