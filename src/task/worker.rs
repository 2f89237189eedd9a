//! The worker side of the boundary: payload in, reply out.

use std::io::{Read, Write};
use tracing::{info, warn};

use super::payload;
use super::{TaskClosure, WorkerFailure, WorkerReply};
use crate::error::{ChunkloopError, Result};
use crate::packages::{worker_token, PackageRegistry};

/// Decode a task payload, run it, and return the reply.
///
/// Never fails: an undecodable payload becomes a `Failed` reply so the
/// dispatcher learns what went wrong.
pub fn handle_payload(bytes: &[u8], registry: &PackageRegistry) -> WorkerReply {
    match payload::decode::<TaskClosure>(bytes) {
        Ok(task) => {
            info!(
                chunk = task.chunk.index,
                start = task.chunk.start,
                end = task.chunk.end,
                worker = worker_token(),
                "running chunk"
            );
            task.run(registry)
        }
        Err(e) => {
            warn!(error = %e, "rejected task payload");
            WorkerReply::Failed {
                chunk: None,
                failure: WorkerFailure::from_error(&e),
            }
        }
    }
}

/// Serve one task from `input`, writing the encoded reply to `output`.
///
/// Returns the reply so the caller can pick an exit status.
pub fn serve<R: Read, W: Write>(mut input: R, mut output: W, registry: &PackageRegistry) -> Result<WorkerReply> {
    let mut bytes = Vec::new();
    input.read_to_end(&mut bytes)?;

    let reply = handle_payload(&bytes, registry);
    let encoded = payload::encode(&reply)?;
    output.write_all(&encoded)?;
    output.flush()?;
    Ok(reply)
}

/// Exit status for a reply: 0 when the chunk completed, otherwise the exit
/// code of the error the dispatcher will raise
pub fn exit_status(reply: &WorkerReply) -> i32 {
    match reply {
        WorkerReply::Completed { .. } => 0,
        WorkerReply::Failed { chunk, failure } => {
            let error: ChunkloopError = failure.clone().into_error(chunk.unwrap_or_default());
            error.exit_code()
        }
    }
}

/// Serve a single task over the process's stdin and stdout
pub fn serve_stdio(registry: &PackageRegistry) -> Result<i32> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let reply = serve(stdin.lock(), stdout.lock(), registry)?;
    Ok(exit_status(&reply))
}
