use std::fmt::Display;
use thiserror::Error;

pub mod codes;
pub mod helpers;

pub use codes::{describe_error_code, ErrorCode};
pub use helpers::{common, ErrorExt};

/// The unified error type for chunkloop
#[derive(Error, Debug)]
pub enum ChunkloopError {
    #[error("[E{code:04}] Configuration error: {message}")]
    Config {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Invalid input: {message}")]
    InvalidInput {
        code: u16,
        message: String,
        field: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Scope capture failed: {message}")]
    Capture {
        code: u16,
        message: String,
        symbol: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Package error: {message}")]
    Package {
        code: u16,
        message: String,
        package: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Worker error: {message}")]
    Worker {
        code: u16,
        message: String,
        chunk: Option<usize>,
        exit_code: Option<i32>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Evaluation error: {message}")]
    Evaluation {
        code: u16,
        message: String,
        iteration: Option<usize>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Payload error: {message}")]
    Payload {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Accumulator error: {message}")]
    State {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] {message}")]
    Other {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ChunkloopError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::config_with_code(ErrorCode::CONFIG_GENERIC, message)
    }

    pub fn config_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Config {
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::invalid_input_with_code(ErrorCode::INPUT_GENERIC, message, None)
    }

    /// Create an invalid-input error naming the offending field
    pub fn invalid_input_with_code(
        code: u16,
        message: impl Into<String>,
        field: Option<String>,
    ) -> Self {
        Self::InvalidInput {
            code,
            message: message.into(),
            field,
            source: None,
        }
    }

    /// An explicitly exported name could not be found in the caller's scope
    pub fn unresolved_export(symbol: impl Into<String>) -> Self {
        let symbol = symbol.into();
        Self::Capture {
            code: ErrorCode::CAPTURE_UNRESOLVED_EXPORT,
            message: format!("export '{}' not found in caller scope", symbol),
            symbol: Some(symbol),
            source: None,
        }
    }

    /// A free variable of the expression could not be found in the caller's scope
    pub fn unresolved_variable(symbol: impl Into<String>) -> Self {
        let symbol = symbol.into();
        Self::Capture {
            code: ErrorCode::CAPTURE_UNRESOLVED_VARIABLE,
            message: format!("variable '{}' not found in caller scope", symbol),
            symbol: Some(symbol),
            source: None,
        }
    }

    pub fn package_with_code(code: u16, package: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Package {
            code,
            message: message.into(),
            package: package.into(),
            source: None,
        }
    }

    pub fn package_not_found(package: impl Into<String>) -> Self {
        let package = package.into();
        Self::package_with_code(
            ErrorCode::PACKAGE_NOT_FOUND,
            package.clone(),
            format!("package '{}' is not available", package),
        )
    }

    pub fn worker(message: impl Into<String>) -> Self {
        Self::worker_with_code(ErrorCode::WORKER_GENERIC, message)
    }

    pub fn worker_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Worker {
            code,
            message: message.into(),
            chunk: None,
            exit_code: None,
            source: None,
        }
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::evaluation_with_code(ErrorCode::EVAL_GENERIC, message)
    }

    pub fn evaluation_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Evaluation {
            code,
            message: message.into(),
            iteration: None,
            source: None,
        }
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::evaluation_with_code(ErrorCode::EVAL_TYPE_MISMATCH, message)
    }

    pub fn payload_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Payload {
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn state_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::State {
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            code: ErrorCode::OTHER_GENERIC,
            message: message.into(),
            source: None,
        }
    }

    /// Add a source error to this error
    pub fn with_source(
        mut self,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        match &mut self {
            Self::Config { source: src, .. }
            | Self::InvalidInput { source: src, .. }
            | Self::Capture { source: src, .. }
            | Self::Package { source: src, .. }
            | Self::Worker { source: src, .. }
            | Self::Evaluation { source: src, .. }
            | Self::Payload { source: src, .. }
            | Self::State { source: src, .. }
            | Self::Other { source: src, .. } => {
                *src = Some(source.into());
            }
        }
        self
    }

    /// Add context to the error message
    pub fn with_context(mut self, context: impl Display) -> Self {
        match &mut self {
            Self::Config { message, .. }
            | Self::InvalidInput { message, .. }
            | Self::Capture { message, .. }
            | Self::Package { message, .. }
            | Self::Worker { message, .. }
            | Self::Evaluation { message, .. }
            | Self::Payload { message, .. }
            | Self::State { message, .. }
            | Self::Other { message, .. } => {
                *message = format!("{}: {}", message, context);
            }
        }
        self
    }

    /// Attribute a worker error to the chunk it was running
    pub fn with_chunk(mut self, index: usize) -> Self {
        if let Self::Worker { chunk, .. } = &mut self {
            *chunk = Some(index);
        }
        self
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        if let Self::Worker { exit_code, .. } = &mut self {
            *exit_code = Some(code);
        }
        self
    }

    /// Attribute an evaluation error to a global iteration index
    pub fn with_iteration(mut self, index: usize) -> Self {
        if let Self::Evaluation { iteration, .. } = &mut self {
            *iteration = Some(index);
        }
        self
    }

    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => 2,
            Self::InvalidInput { .. } => 3,
            Self::Capture { .. } => 4,
            Self::Package { .. } => 5,
            Self::Worker { .. } => 6,
            Self::Evaluation { .. } => 7,
            Self::Payload { .. } => 8,
            Self::State { .. } => 9,
            Self::Other { .. } => 1,
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            Self::Config { code, .. }
            | Self::InvalidInput { code, .. }
            | Self::Capture { code, .. }
            | Self::Package { code, .. }
            | Self::Worker { code, .. }
            | Self::Evaluation { code, .. }
            | Self::Payload { code, .. }
            | Self::State { code, .. }
            | Self::Other { code, .. } => *code,
        }
    }

    /// The message without the code prefix
    pub fn message(&self) -> &str {
        match self {
            Self::Config { message, .. }
            | Self::InvalidInput { message, .. }
            | Self::Capture { message, .. }
            | Self::Package { message, .. }
            | Self::Worker { message, .. }
            | Self::Evaluation { message, .. }
            | Self::Payload { message, .. }
            | Self::State { message, .. }
            | Self::Other { message, .. } => message,
        }
    }

    /// The symbol a capture error is about, if any
    pub fn symbol(&self) -> Option<&str> {
        match self {
            Self::Capture { symbol, .. } => symbol.as_deref(),
            _ => None,
        }
    }

    /// Whether re-submitting the same task to a fresh worker could succeed.
    ///
    /// Crashes, signals, timeouts and garbled replies are transient. Package
    /// and evaluation failures are deterministic and never retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Worker { code, .. } => matches!(
                *code,
                ErrorCode::WORKER_EXIT
                    | ErrorCode::WORKER_SIGNAL
                    | ErrorCode::WORKER_TIMEOUT
                    | ErrorCode::WORKER_IO
            ),
            Self::Payload { code, .. } => matches!(
                *code,
                ErrorCode::PAYLOAD_BAD_MAGIC
                    | ErrorCode::PAYLOAD_DIGEST_MISMATCH
                    | ErrorCode::PAYLOAD_DECODE_FAILED
            ),
            _ => false,
        }
    }

}

/// Type alias for Results using ChunkloopError
pub type Result<T> = std::result::Result<T, ChunkloopError>;

impl From<std::io::Error> for ChunkloopError {
    fn from(err: std::io::Error) -> Self {
        ChunkloopError::worker_with_code(ErrorCode::WORKER_IO, "I/O operation failed")
            .with_source(err)
    }
}

impl From<serde_json::Error> for ChunkloopError {
    fn from(err: serde_json::Error) -> Self {
        ChunkloopError::invalid_input_with_code(
            ErrorCode::INPUT_INVALID_JSON,
            format!("invalid JSON: {}", err),
            None,
        )
        .with_source(err)
    }
}

impl From<serde_yaml::Error> for ChunkloopError {
    fn from(err: serde_yaml::Error) -> Self {
        ChunkloopError::invalid_input_with_code(
            ErrorCode::INPUT_INVALID_YAML,
            format!("invalid YAML: {}", err),
            None,
        )
        .with_source(err)
    }
}
