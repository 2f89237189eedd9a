//! Chunk dispatch: ship task closures to workers and fold what comes back.
//!
//! With `max_parallel = 1` chunks run strictly one after another, each one
//! folded before the next is submitted. Larger values keep a bounded window
//! of chunks in flight and fold them as they complete; the accumulator's
//! reorder buffer restores global order where the combine policy needs it.

pub mod launcher;

pub use launcher::{InProcessWorker, ProcessWorker, WorkerLauncher, WORKER_SUBCOMMAND};

use futures::stream::{FuturesUnordered, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::accumulate::Accumulator;
use crate::error::{common, ChunkloopError, ErrorCode, Result};
use crate::expr::Value;
use crate::plan::ChunkRange;
use crate::task::{payload, TaskClosure, WorkerReply};

/// Upper bound for the delay between retries of one chunk
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Where chunks are evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerMode {
    /// A fresh worker process per chunk
    #[default]
    Process,
    /// Inside the dispatcher, after a payload round trip
    InProcess,
}

#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub max_parallel: usize,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub progress: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            max_parallel: 1,
            max_retries: 0,
            retry_backoff: Duration::from_millis(100),
            progress: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    max_retries: u32,
    backoff: Duration,
}

impl RetryPolicy {
    /// Pure: Delay before retry number `attempt + 1`
    fn delay(&self, attempt: u32) -> Duration {
        self.backoff
            .saturating_mul(1u32 << attempt.min(16))
            .min(MAX_RETRY_BACKOFF)
    }
}

type ChunkOutcome = (ChunkRange, Result<Vec<Value>>);

pub struct Dispatcher {
    launcher: Arc<dyn WorkerLauncher>,
    options: DispatchOptions,
}

impl Dispatcher {
    pub fn new(launcher: Arc<dyn WorkerLauncher>, options: DispatchOptions) -> Self {
        Self { launcher, options }
    }

    /// Run every task and fold its results into `accumulator`.
    ///
    /// The first failure aborts the loop. Chunks still in flight are
    /// cancelled, which kills their worker processes.
    pub async fn run<I>(&self, tasks: I, accumulator: &mut Accumulator) -> Result<()>
    where
        I: ExactSizeIterator<Item = TaskClosure>,
    {
        let chunks = tasks.len();
        info!(
            chunks,
            iterations = accumulator.total(),
            max_parallel = self.options.max_parallel,
            "dispatching chunks"
        );
        let progress = self.progress_bar(chunks);

        let result = if self.options.max_parallel <= 1 {
            self.run_serial(tasks, accumulator, &progress).await
        } else {
            self.run_windowed(tasks, accumulator, &progress).await
        };

        match &result {
            Ok(()) => progress.finish_and_clear(),
            Err(e) => {
                progress.abandon();
                error!(error = %e, "loop aborted");
            }
        }
        result
    }

    async fn run_serial<I>(&self, tasks: I, accumulator: &mut Accumulator, progress: &ProgressBar) -> Result<()>
    where
        I: Iterator<Item = TaskClosure>,
    {
        for task in tasks {
            let chunk = task.chunk;
            let bytes = encode_task(&task)?;
            let values = run_chunk(Arc::clone(&self.launcher), self.retry_policy(), chunk, bytes).await?;
            accumulator.fold(chunk, values)?;
            progress.inc(1);
        }
        Ok(())
    }

    async fn run_windowed<I>(&self, tasks: I, accumulator: &mut Accumulator, progress: &ProgressBar) -> Result<()>
    where
        I: Iterator<Item = TaskClosure>,
    {
        let mut tasks = tasks;
        let mut in_flight: FuturesUnordered<JoinHandle<ChunkOutcome>> = FuturesUnordered::new();

        let result = self.drive(&mut tasks, &mut in_flight, accumulator, progress).await;
        if result.is_err() && !in_flight.is_empty() {
            warn!(outstanding = in_flight.len(), "cancelling chunks still in flight");
            for handle in in_flight.iter() {
                handle.abort();
            }
        }
        result
    }

    async fn drive<I>(
        &self,
        tasks: &mut I,
        in_flight: &mut FuturesUnordered<JoinHandle<ChunkOutcome>>,
        accumulator: &mut Accumulator,
        progress: &ProgressBar,
    ) -> Result<()>
    where
        I: Iterator<Item = TaskClosure>,
    {
        loop {
            while in_flight.len() < self.options.max_parallel {
                let Some(task) = tasks.next() else { break };
                let chunk = task.chunk;
                let bytes = encode_task(&task)?;
                let launcher = Arc::clone(&self.launcher);
                let retry = self.retry_policy();
                debug!(chunk = chunk.index, in_flight = in_flight.len() + 1, "submitting chunk");
                in_flight.push(tokio::spawn(async move {
                    (chunk, run_chunk(launcher, retry, chunk, bytes).await)
                }));
            }

            let Some(joined) = in_flight.next().await else {
                return Ok(());
            };
            let (chunk, outcome) = joined.map_err(|e| {
                let code = if e.is_cancelled() {
                    ErrorCode::WORKER_CANCELLED
                } else {
                    ErrorCode::WORKER_PANICKED
                };
                ChunkloopError::worker_with_code(code, format!("chunk task ended abnormally: {}", e))
            })?;
            accumulator.fold(chunk, outcome?)?;
            progress.inc(1);
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.options.max_retries,
            backoff: self.options.retry_backoff,
        }
    }

    fn progress_bar(&self, chunks: usize) -> ProgressBar {
        if !self.options.progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(chunks as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({eta})")
        {
            bar.set_style(style.progress_chars("█▓▒░ "));
        }
        bar
    }
}

fn encode_task(task: &TaskClosure) -> Result<Vec<u8>> {
    let bytes = payload::encode(task)?;
    trace!(chunk = task.chunk.index, bytes = bytes.len(), "encoded task");
    Ok(bytes)
}

/// Run one chunk, re-submitting the same payload on transient failures
async fn run_chunk(
    launcher: Arc<dyn WorkerLauncher>,
    retry: RetryPolicy,
    chunk: ChunkRange,
    bytes: Vec<u8>,
) -> Result<Vec<Value>> {
    let mut attempt = 0;
    loop {
        let outcome = launcher
            .launch(chunk, bytes.clone())
            .await
            .and_then(|reply| unpack_reply(chunk, reply));
        match outcome {
            Ok(values) => return Ok(values),
            Err(e) if e.is_transient() && attempt < retry.max_retries => {
                let delay = retry.delay(attempt);
                attempt += 1;
                warn!(
                    chunk = chunk.index,
                    attempt,
                    max_retries = retry.max_retries,
                    delay = ?delay,
                    error = %e,
                    "retrying chunk"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Pure: Turn a worker reply into the chunk's values, in chunk order
fn unpack_reply(chunk: ChunkRange, reply: WorkerReply) -> Result<Vec<Value>> {
    match reply {
        WorkerReply::Completed { chunk: index, results } => {
            if index != chunk.index {
                return Err(ChunkloopError::payload_with_code(
                    ErrorCode::PAYLOAD_GENERIC,
                    format!("reply for chunk {} arrived for chunk {}", index, chunk.index),
                ));
            }
            if results.len() != chunk.len() {
                return Err(common::result_count(chunk.index, chunk.len(), results.len()));
            }
            results
                .iter()
                .enumerate()
                .map(|(offset, raw)| {
                    let json: serde_json::Value = serde_json::from_str(raw).map_err(|e| {
                        ChunkloopError::payload_with_code(
                            ErrorCode::PAYLOAD_DECODE_FAILED,
                            format!("result of iteration {} is not valid JSON", chunk.start + offset),
                        )
                        .with_source(e)
                    })?;
                    Value::from_json(&json)
                })
                .collect()
        }
        WorkerReply::Failed { failure, .. } => Err(failure.into_error(chunk.index)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CallerScope, ScopeCapture};
    use crate::loop_spec::{CombinePolicy, IteratorSpec, LoopSpec};
    use crate::packages::PackageRegistry;
    use crate::plan::enumerate_bindings;
    use crate::task::{TaskBuilder, WorkerFailure};
    use async_trait::async_trait;
    use serde_json::json;
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        builder: TaskBuilder,
        accumulator: Accumulator,
    }

    fn fixture(spec: LoopSpec, chunk_size: usize) -> Fixture {
        let registry = Arc::new(PackageRegistry::standard());
        let prepared = spec.prepare().unwrap();
        let caller = CallerScope::new(&registry).unwrap();
        let scope = ScopeCapture::for_loop(&caller, &registry, &prepared)
            .capture(&prepared.expression)
            .unwrap();
        let bindings = enumerate_bindings(&prepared.spec.iterators).unwrap();
        let accumulator = Accumulator::new(bindings.len(), &prepared, Arc::clone(&registry)).unwrap();
        Fixture {
            builder: TaskBuilder::new(
                prepared.expression.clone(),
                scope,
                bindings,
                NonZeroUsize::new(chunk_size).unwrap(),
            ),
            accumulator,
        }
    }

    fn in_process() -> Arc<dyn WorkerLauncher> {
        Arc::new(InProcessWorker::new(Arc::new(PackageRegistry::standard())))
    }

    fn options(max_parallel: usize, max_retries: u32) -> DispatchOptions {
        DispatchOptions {
            max_parallel,
            max_retries,
            retry_backoff: Duration::from_millis(1),
            progress: false,
        }
    }

    /// Later chunks finish first, and the window size is observed
    struct Staggered {
        inner: Arc<dyn WorkerLauncher>,
        chunks: usize,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl WorkerLauncher for Staggered {
        async fn launch(&self, chunk: ChunkRange, bytes: Vec<u8>) -> Result<WorkerReply> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let delay = (self.chunks - chunk.index) as u64 * 5;
            tokio::time::sleep(Duration::from_millis(delay)).await;
            let reply = self.inner.launch(chunk, bytes).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            reply
        }
    }

    /// Fails the first `failures` launches with the given error code
    struct Flaky {
        inner: Arc<dyn WorkerLauncher>,
        failures: usize,
        code: u16,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl WorkerLauncher for Flaky {
        async fn launch(&self, chunk: ChunkRange, bytes: Vec<u8>) -> Result<WorkerReply> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(ChunkloopError::worker_with_code(self.code, "worker went away").with_chunk(chunk.index));
            }
            self.inner.launch(chunk, bytes).await
        }
    }

    #[tokio::test]
    async fn test_serial_dispatch_collects_in_order() {
        let mut f = fixture(LoopSpec::new(vec![IteratorSpec::range("i", 0, 5)], "i * i"), 2);
        let dispatcher = Dispatcher::new(in_process(), options(1, 0));
        dispatcher.run(f.builder.tasks(), &mut f.accumulator).await.unwrap();
        assert_eq!(
            f.accumulator.result().unwrap(),
            Value::List([0, 1, 4, 9, 16].into_iter().map(Value::Int).collect())
        );
    }

    #[tokio::test]
    async fn test_window_preserves_order_of_non_commutative_combine() {
        let spec = LoopSpec::new(vec![IteratorSpec::range("i", 0, 6)], "str(i)")
            .with_combine(CombinePolicy::Function("fn(acc, x) { acc + x }".to_string()))
            .with_init(json!(""));
        let mut f = fixture(spec, 1);
        let launcher = Arc::new(Staggered {
            inner: in_process(),
            chunks: 6,
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let dispatcher = Dispatcher::new(launcher.clone(), options(3, 0));
        dispatcher.run(f.builder.tasks(), &mut f.accumulator).await.unwrap();

        assert_eq!(f.accumulator.result().unwrap(), Value::Str("012345".to_string()));
        let peak = launcher.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "at most 3 chunks in flight, saw {}", peak);
        assert!(peak > 1, "chunks should overlap, saw {}", peak);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let mut f = fixture(LoopSpec::new(vec![IteratorSpec::range("i", 0, 2)], "i + 1"), 2);
        let launcher = Arc::new(Flaky {
            inner: in_process(),
            failures: 2,
            code: ErrorCode::WORKER_SIGNAL,
            calls: AtomicUsize::new(0),
        });
        let dispatcher = Dispatcher::new(launcher.clone(), options(1, 2));
        dispatcher.run(f.builder.tasks(), &mut f.accumulator).await.unwrap();

        assert_eq!(launcher.calls.load(Ordering::SeqCst), 3);
        assert_eq!(f.accumulator.result().unwrap(), Value::List(vec![Value::Int(1), Value::Int(2)]));
    }

    #[tokio::test]
    async fn test_retry_budget_is_bounded() {
        let mut f = fixture(LoopSpec::new(vec![IteratorSpec::range("i", 0, 2)], "i"), 2);
        let launcher = Arc::new(Flaky {
            inner: in_process(),
            failures: 10,
            code: ErrorCode::WORKER_TIMEOUT,
            calls: AtomicUsize::new(0),
        });
        let dispatcher = Dispatcher::new(launcher.clone(), options(1, 1));
        let err = dispatcher.run(f.builder.tasks(), &mut f.accumulator).await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::WORKER_TIMEOUT);
        assert_eq!(launcher.calls.load(Ordering::SeqCst), 2);
        assert!(!f.accumulator.is_complete());
    }

    #[tokio::test]
    async fn test_evaluation_failures_are_not_retried() {
        let spec = LoopSpec::new(vec![IteratorSpec::range("i", 0, 4)], "if i == 3 { fail(\"no\") } else { i }");
        let mut f = fixture(spec, 2);
        let launcher = Arc::new(Flaky {
            inner: in_process(),
            failures: 0,
            code: ErrorCode::WORKER_EXIT,
            calls: AtomicUsize::new(0),
        });
        let dispatcher = Dispatcher::new(launcher.clone(), options(2, 5));
        let err = dispatcher.run(f.builder.tasks(), &mut f.accumulator).await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::EVAL_USER_FAILURE);
        assert!(matches!(err, ChunkloopError::Evaluation { iteration: Some(3), .. }));
        assert_eq!(launcher.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unpack_reply_checks_shape() {
        let chunk = ChunkRange {
            index: 1,
            start: 2,
            end: 4,
        };
        let values = unpack_reply(
            chunk,
            WorkerReply::Completed {
                chunk: 1,
                results: vec!["[1, \"a\"]".to_string(), "null".to_string()],
            },
        )
        .unwrap();
        assert_eq!(
            values,
            vec![Value::List(vec![Value::Int(1), Value::Str("a".to_string())]), Value::Null]
        );

        let wrong_chunk = WorkerReply::Completed {
            chunk: 0,
            results: vec!["1".to_string(), "2".to_string()],
        };
        assert!(unpack_reply(chunk, wrong_chunk).is_err());

        let short = WorkerReply::Completed {
            chunk: 1,
            results: vec!["1".to_string()],
        };
        assert_eq!(
            unpack_reply(chunk, short).unwrap_err().code(),
            ErrorCode::PAYLOAD_RESULT_COUNT
        );

        let failed = WorkerReply::Failed {
            chunk: Some(1),
            failure: WorkerFailure::from_error(&ChunkloopError::package_not_found("stats")),
        };
        let err = unpack_reply(chunk, failed).unwrap_err();
        assert_eq!(err.code(), ErrorCode::PACKAGE_NOT_FOUND);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let retry = RetryPolicy {
            max_retries: 10,
            backoff: Duration::from_millis(100),
        };
        assert_eq!(retry.delay(0), Duration::from_millis(100));
        assert_eq!(retry.delay(2), Duration::from_millis(400));
        assert_eq!(retry.delay(9), MAX_RETRY_BACKOFF);
        assert_eq!(retry.delay(40), MAX_RETRY_BACKOFF);
    }
}
