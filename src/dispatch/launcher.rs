//! Ways of getting a task payload evaluated by an isolated worker.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{ChunkloopError, ErrorCode, Result};
use crate::packages::PackageRegistry;
use crate::plan::ChunkRange;
use crate::subprocess::{ExitStatus, ProcessCommandBuilder, SubprocessManager};
use crate::task::{payload, worker, WorkerReply};

/// Subcommand the worker program is invoked with
pub const WORKER_SUBCOMMAND: &str = "worker";

/// Runs one encoded task closure and hands back the worker's reply
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn launch(&self, chunk: ChunkRange, bytes: Vec<u8>) -> Result<WorkerReply>;
}

/// Runs each chunk in a fresh `<program> worker` process
pub struct ProcessWorker {
    subprocess: SubprocessManager,
    program: String,
    timeout: Option<Duration>,
    env: HashMap<String, String>,
}

impl ProcessWorker {
    pub fn new(subprocess: SubprocessManager, program: impl Into<String>) -> Self {
        Self {
            subprocess,
            program: program.into(),
            timeout: None,
            env: HashMap::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Extra environment for worker processes, e.g. `RUST_LOG`
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

}

#[async_trait]
impl WorkerLauncher for ProcessWorker {
    async fn launch(&self, chunk: ChunkRange, bytes: Vec<u8>) -> Result<WorkerReply> {
        let command = ProcessCommandBuilder::new(&self.program)
            .arg(WORKER_SUBCOMMAND)
            .envs(&self.env)
            .timeout(self.timeout)
            .stdin(bytes)
            .build();

        let output = self
            .subprocess
            .runner()
            .run(command)
            .await
            .map_err(|e| ChunkloopError::from(e).with_chunk(chunk.index))?;
        trace!(
            chunk = chunk.index,
            bytes = output.stdout.len(),
            duration = ?output.duration,
            "worker exited"
        );

        // A failing worker still writes a reply explaining the failure
        match payload::decode::<WorkerReply>(&output.stdout) {
            Ok(reply) => Ok(reply),
            Err(decode_error) => {
                let stderr = last_line(&output.stderr);
                let error = match output.status {
                    ExitStatus::Success => {
                        return Err(decode_error.with_context(format!("reply of chunk {}", chunk.index)))
                    }
                    ExitStatus::Error(code) => ChunkloopError::worker_with_code(
                        ErrorCode::WORKER_EXIT,
                        format!("worker exited with status {} without a reply{}", code, stderr),
                    )
                    .with_exit_code(code),
                    ExitStatus::Signal(signal) => ChunkloopError::worker_with_code(
                        ErrorCode::WORKER_SIGNAL,
                        format!("worker killed by signal {}{}", signal, stderr),
                    )
                    .with_exit_code(signal),
                };
                Err(error.with_chunk(chunk.index))
            }
        }
    }
}

/// The stderr line that best explains a worker dying without a reply:
/// a panic message if there is one, else the last line that is not a `note:`
fn last_line(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    lines
        .iter()
        .rev()
        .find(|l| l.contains("panicked"))
        .or_else(|| lines.iter().rev().find(|l| !l.starts_with("note:")))
        .map(|l| format!(": {}", l))
        .unwrap_or_default()
}

/// Runs chunks inside the dispatcher's own process.
///
/// The payload still makes the full encode/decode round trip, so the
/// boundary contract is the same as for [`ProcessWorker`].
pub struct InProcessWorker {
    registry: Arc<PackageRegistry>,
}

impl InProcessWorker {
    pub fn new(registry: Arc<PackageRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl WorkerLauncher for InProcessWorker {
    async fn launch(&self, chunk: ChunkRange, bytes: Vec<u8>) -> Result<WorkerReply> {
        let registry = Arc::clone(&self.registry);
        let encoded = tokio::task::spawn_blocking(move || {
            let reply = worker::handle_payload(&bytes, &registry);
            payload::encode(&reply)
        })
        .await
        .map_err(|e| {
            ChunkloopError::worker_with_code(ErrorCode::WORKER_PANICKED, format!("in-process worker failed: {}", e))
                .with_chunk(chunk.index)
        })??;
        debug!(chunk = chunk.index, bytes = encoded.len(), "in-process chunk finished");
        payload::decode(&encoded)
    }
}
