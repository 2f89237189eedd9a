//! Task closures: the self-contained unit of work shipped to a worker.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, trace};

use crate::capture::CapturedScope;
use crate::error::{ChunkloopError, ErrorCode, Result};
use crate::expr::{Expr, Interpreter};
use crate::packages::PackageRegistry;
use crate::plan::{chunk_count, plan_chunks, BindingSet, ChunkRange};

pub mod payload;
pub mod worker;

/// Everything a worker needs to evaluate one chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskClosure {
    pub chunk: ChunkRange,
    pub expression: Expr,
    pub scope: CapturedScope,
    /// One binding set per iteration of the chunk, in global order
    pub bindings: Vec<BindingSet>,
}

impl TaskClosure {
    pub fn new(chunk: ChunkRange, expression: Expr, scope: CapturedScope, bindings: Vec<BindingSet>) -> Self {
        Self {
            chunk,
            expression,
            scope,
            bindings,
        }
    }

    /// Run the chunk and package the outcome as a reply
    pub fn run(&self, registry: &PackageRegistry) -> WorkerReply {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.evaluate(registry)))
            .unwrap_or_else(|cause| Err(panic_error(cause.as_ref())));
        match outcome {
            Ok(results) => WorkerReply::Completed {
                chunk: self.chunk.index,
                results,
            },
            Err(e) => {
                debug!(chunk = self.chunk.index, error = %e, "chunk failed");
                WorkerReply::Failed {
                    chunk: Some(self.chunk.index),
                    failure: WorkerFailure::from_error(&e),
                }
            }
        }
    }

    /// Evaluate every iteration of the chunk in order.
    ///
    /// Returns one JSON document per iteration. Loop variables are bound
    /// directly in the captured root frame, so captured helper functions see
    /// them too.
    pub fn evaluate(&self, registry: &PackageRegistry) -> Result<Vec<String>> {
        let mut arena = self.scope.arena().clone();
        let root = self.scope.root();

        let packages = registry.attach(&mut arena, self.scope.packages())?;
        let parent = match self.scope.parent_namespace() {
            Some(namespace) => registry.namespace_frame(&mut arena, namespace, packages)?,
            None => packages,
        };
        arena.set_parent(root, Some(parent));

        let mark = arena.len();
        let mut results = Vec::with_capacity(self.bindings.len());
        for (offset, set) in self.bindings.iter().enumerate() {
            let iteration = self.chunk.start + offset;
            for (name, value) in &set.bindings {
                arena.define(root, name.clone(), value.clone());
            }

            let value = Interpreter::new(&mut arena, registry)
                .eval(&self.expression, root)
                .and_then(|v| v.to_data())
                .map_err(|e| e.with_iteration(iteration))?;
            let serialized = serde_json::to_string(&value).map_err(|e| {
                ChunkloopError::payload_with_code(
                    ErrorCode::PAYLOAD_ENCODE_FAILED,
                    format!("failed to serialize result of iteration {}", iteration),
                )
                .with_source(e)
            })?;
            trace!(iteration, bytes = serialized.len(), "iteration done");
            results.push(serialized);

            arena.truncate(mark);
        }
        Ok(results)
    }
}

/// Builds one task closure per planned chunk.
///
/// Every task carries its own copy of the captured scope, so tasks are
/// produced lazily as the dispatcher submits them.
#[derive(Debug, Clone)]
pub struct TaskBuilder {
    expression: Expr,
    scope: CapturedScope,
    bindings: Vec<BindingSet>,
    chunk_size: NonZeroUsize,
}

impl TaskBuilder {
    pub fn new(expression: Expr, scope: CapturedScope, bindings: Vec<BindingSet>, chunk_size: NonZeroUsize) -> Self {
        Self {
            expression,
            scope,
            bindings,
            chunk_size,
        }
    }

    pub fn iterations(&self) -> usize {
        self.bindings.len()
    }

    pub fn chunk_count(&self) -> usize {
        chunk_count(self.bindings.len(), self.chunk_size)
    }

    pub fn tasks(&self) -> impl ExactSizeIterator<Item = TaskClosure> + '_ {
        plan_chunks(self.bindings.len(), self.chunk_size).map(move |chunk| {
            TaskClosure::new(
                chunk,
                self.expression.clone(),
                self.scope.clone(),
                self.bindings[chunk.indices()].to_vec(),
            )
        })
    }
}

/// What the worker sends back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerReply {
    Completed {
        chunk: usize,
        /// One JSON document per iteration, in chunk order
        results: Vec<String>,
    },
    Failed {
        /// Absent when the task itself could not be decoded
        chunk: Option<usize>,
        failure: WorkerFailure,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Package,
    Evaluation,
    Payload,
    Worker,
}

/// A failure that happened inside the worker, in transportable form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerFailure {
    pub kind: FailureKind,
    pub code: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<usize>,
}

impl WorkerFailure {
    pub fn from_error(error: &ChunkloopError) -> Self {
        let (kind, package, iteration) = match error {
            ChunkloopError::Package { package, .. } => (FailureKind::Package, Some(package.clone()), None),
            ChunkloopError::Evaluation { iteration, .. } => (FailureKind::Evaluation, None, *iteration),
            ChunkloopError::Payload { .. } => (FailureKind::Payload, None, None),
            _ => (FailureKind::Worker, None, None),
        };
        Self {
            kind,
            code: error.code(),
            message: error.message().to_string(),
            package,
            iteration,
        }
    }

    /// Rebuild the dispatcher-side error for a failure in chunk `chunk`
    pub fn into_error(self, chunk: usize) -> ChunkloopError {
        match self.kind {
            FailureKind::Package => ChunkloopError::package_with_code(
                self.code,
                self.package.unwrap_or_default(),
                self.message,
            ),
            FailureKind::Evaluation => {
                let error = ChunkloopError::evaluation_with_code(self.code, self.message);
                match self.iteration {
                    Some(iteration) => error.with_iteration(iteration),
                    None => error,
                }
            }
            FailureKind::Payload => ChunkloopError::payload_with_code(self.code, self.message),
            FailureKind::Worker => ChunkloopError::worker_with_code(self.code, self.message).with_chunk(chunk),
        }
    }
}

/// A panic inside an evaluation is that chunk's evaluation failure
fn panic_error(cause: &(dyn Any + Send)) -> ChunkloopError {
    let detail = cause
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| cause.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause");
    ChunkloopError::evaluation_with_code(ErrorCode::EVAL_PANICKED, format!("evaluation panicked: {}", detail))
}
