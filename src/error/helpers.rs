use super::{ChunkloopError, ErrorCode};

/// Extension trait for convenient error conversion
pub trait ErrorExt<T> {
    fn to_config_error(self, message: impl Into<String>) -> Result<T, ChunkloopError>;
    fn to_worker_error(self, message: impl Into<String>) -> Result<T, ChunkloopError>;
    fn to_payload_error(self, code: u16, message: impl Into<String>) -> Result<T, ChunkloopError>;
}

impl<T, E> ErrorExt<T> for Result<T, E>
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    fn to_config_error(self, message: impl Into<String>) -> Result<T, ChunkloopError> {
        self.map_err(|e| ChunkloopError::config(message).with_source(e))
    }

    fn to_worker_error(self, message: impl Into<String>) -> Result<T, ChunkloopError> {
        self.map_err(|e| ChunkloopError::worker(message).with_source(e))
    }

    fn to_payload_error(self, code: u16, message: impl Into<String>) -> Result<T, ChunkloopError> {
        self.map_err(|e| ChunkloopError::payload_with_code(code, message).with_source(e))
    }
}

/// Helper functions for common error scenarios
pub mod common {
    use super::*;

    pub fn config_not_found(path: impl AsRef<std::path::Path>) -> ChunkloopError {
        ChunkloopError::config_with_code(
            ErrorCode::CONFIG_NOT_FOUND,
            format!("Configuration file not found: {}", path.as_ref().display()),
        )
    }

    pub fn invalid_chunk_size(value: impl std::fmt::Display) -> ChunkloopError {
        ChunkloopError::config_with_code(
            ErrorCode::CONFIG_INVALID_CHUNK_SIZE,
            format!("chunk_size must be a positive integer, got {}", value),
        )
    }

    pub fn arity(name: &str, expected: usize, actual: usize) -> ChunkloopError {
        ChunkloopError::evaluation_with_code(
            ErrorCode::EVAL_ARITY,
            format!("{} expects {} argument(s), got {}", name, expected, actual),
        )
    }

    pub fn unbound(name: &str) -> ChunkloopError {
        ChunkloopError::evaluation_with_code(
            ErrorCode::EVAL_UNBOUND_VARIABLE,
            format!("unbound variable '{}'", name),
        )
    }

    pub fn result_count(chunk: usize, expected: usize, actual: usize) -> ChunkloopError {
        ChunkloopError::payload_with_code(
            ErrorCode::PAYLOAD_RESULT_COUNT,
            format!(
                "chunk {} returned {} result(s) for {} iteration(s)",
                chunk, actual, expected
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_ext_wraps_source() {
        let result: Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk on fire",
        ));
        let err = result.to_config_error("could not read config").unwrap_err();
        assert_eq!(err.code(), ErrorCode::CONFIG_GENERIC);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_common_helpers() {
        assert_eq!(
            common::invalid_chunk_size(0).code(),
            ErrorCode::CONFIG_INVALID_CHUNK_SIZE
        );
        assert_eq!(common::arity("sqrt", 1, 2).code(), ErrorCode::EVAL_ARITY);
        assert!(common::unbound("x").to_string().contains("'x'"));
    }
}
