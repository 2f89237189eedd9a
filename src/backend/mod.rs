//! The loop backend: capture, plan, dispatch and fold one loop.

pub mod registration;

pub use registration::{register, registered, unregister};

use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::accumulate::Accumulator;
use crate::capture::{CallerScope, CapturedScope, ScopeCapture};
use crate::dispatch::{DispatchOptions, Dispatcher, InProcessWorker, ProcessWorker, WorkerLauncher};
use crate::error::{common, ChunkloopError, Result};
use crate::expr::Value;
use crate::loop_spec::{LoopSpec, PreparedLoop};
use crate::packages::PackageRegistry;
use crate::plan::enumerate_bindings;
use crate::subprocess::SubprocessManager;
use crate::task::TaskBuilder;

/// Options fixed at registration time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendOptions {
    /// Iterations per chunk
    pub chunk_size: usize,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self { chunk_size: 1 }
    }
}

impl BackendOptions {
    pub fn chunk_size(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.chunk_size).ok_or_else(|| common::invalid_chunk_size(self.chunk_size))
    }
}

/// Runs loops chunk by chunk on isolated workers
pub struct Backend {
    chunk_size: NonZeroUsize,
    registry: Arc<PackageRegistry>,
    launcher: Arc<dyn WorkerLauncher>,
    dispatch: DispatchOptions,
}

impl Backend {
    /// A backend whose workers are processes of the current executable
    pub fn register(options: BackendOptions) -> Result<Self> {
        let chunk_size = options.chunk_size()?;
        let program = std::env::current_exe().map_err(|e| {
            ChunkloopError::config("cannot locate the worker executable").with_source(e)
        })?;
        let registry = Arc::new(PackageRegistry::standard());
        let launcher = ProcessWorker::new(SubprocessManager::production(), program.to_string_lossy());
        Ok(Self {
            chunk_size,
            registry,
            launcher: Arc::new(launcher),
            dispatch: DispatchOptions::default(),
        })
    }

    /// A backend for the process-wide registration, or the defaults
    pub fn from_registration() -> Result<Self> {
        Self::register(registered().unwrap_or_default())
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn WorkerLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Evaluate chunks inside this process instead of spawning workers
    pub fn in_process(self) -> Self {
        let launcher = Arc::new(InProcessWorker::new(Arc::clone(&self.registry)));
        self.with_launcher(launcher)
    }

    pub fn with_dispatch(mut self, dispatch: DispatchOptions) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn with_registry(mut self, registry: Arc<PackageRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn chunk_size(&self) -> NonZeroUsize {
        self.chunk_size
    }

    /// Validate `spec` and capture its scope without running anything
    pub fn capture(&self, spec: &LoopSpec, caller: &CallerScope) -> Result<(PreparedLoop, CapturedScope)> {
        let prepared = spec.prepare()?;
        let scope = ScopeCapture::for_loop(caller, &self.registry, &prepared).capture(&prepared.expression)?;
        debug!(
            names = ?scope.names(),
            packages = ?scope.packages(),
            "captured loop scope"
        );
        Ok((prepared, scope))
    }

    /// Run the loop and return its combined result.
    ///
    /// Every pre-dispatch check happens before the first worker starts: a
    /// loop that fails validation or capture never launches anything.
    pub async fn evaluate(&self, spec: &LoopSpec, caller: &CallerScope) -> Result<Value> {
        let started = Instant::now();
        let (prepared, scope) = self.capture(spec, caller)?;
        let bindings = enumerate_bindings(&prepared.spec.iterators)?;
        let iterations = bindings.len();

        let mut accumulator = Accumulator::new(iterations, &prepared, Arc::clone(&self.registry))?;
        let builder = TaskBuilder::new(prepared.expression.clone(), scope, bindings, self.chunk_size);
        info!(
            iterations,
            chunks = builder.chunk_count(),
            chunk_size = self.chunk_size.get(),
            "starting loop"
        );

        let dispatcher = Dispatcher::new(Arc::clone(&self.launcher), self.dispatch.clone());
        dispatcher.run(builder.tasks(), &mut accumulator).await?;
        let value = accumulator.result()?;

        info!(iterations, elapsed = ?started.elapsed(), "loop finished");
        Ok(value)
    }
}
