use crate::error::{ChunkloopError, ErrorCode};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Failed to spawn {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process timed out after {0:?}")]
    Timeout(Duration),

    #[error("Process terminated by signal {0}")]
    Signal(i32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Mock expectation not met: {0}")]
    MockExpectationNotMet(String),
}

/// Convert ProcessError to ChunkloopError
impl From<ProcessError> for ChunkloopError {
    fn from(err: ProcessError) -> Self {
        let (code, exit_code) = match &err {
            ProcessError::CommandNotFound(_) | ProcessError::SpawnFailed { .. } => {
                (ErrorCode::WORKER_SPAWN_FAILED, None)
            }
            ProcessError::Timeout(_) => (ErrorCode::WORKER_TIMEOUT, None),
            ProcessError::Signal(sig) => (ErrorCode::WORKER_SIGNAL, Some(*sig)),
            ProcessError::Io(_) => (ErrorCode::WORKER_IO, None),
            ProcessError::MockExpectationNotMet(_) => (ErrorCode::WORKER_GENERIC, None),
        };

        let mut error = ChunkloopError::worker_with_code(code, err.to_string());
        if let Some(exit_code) = exit_code {
            error = error.with_exit_code(exit_code);
        }
        error.with_source(err)
    }
}
