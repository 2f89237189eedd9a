//! Runtime configuration for chunkloop.
//!
//! Values come from a YAML file (by default in the platform config
//! directory), then `CHUNKLOOP_*` environment variables, then command-line
//! flags, each layer overriding the previous one.

pub mod loop_file;

pub use loop_file::LoopFile;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::backend::BackendOptions;
use crate::dispatch::{DispatchOptions, WorkerMode};
use crate::error::{common, ChunkloopError, ErrorCode, Result};

/// Valid log levels for configuration validation.
pub const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

pub const CONFIG_FILE_NAME: &str = "config.yml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkloopConfig {
    pub chunk_size: usize,
    pub max_parallel: usize,
    pub max_retries: u32,
    #[serde(with = "humantime_serde")]
    pub retry_backoff: Duration,
    #[serde(with = "humantime_serde")]
    pub worker_timeout: Option<Duration>,
    /// Worker executable, the current one when unset
    pub worker_program: Option<PathBuf>,
    pub worker_mode: WorkerMode,
    pub log_level: String,
}

impl Default for ChunkloopConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1,
            max_parallel: 1,
            max_retries: 0,
            retry_backoff: Duration::from_millis(100),
            worker_timeout: None,
            worker_program: None,
            worker_mode: WorkerMode::Process,
            log_level: "warn".to_string(),
        }
    }
}

/// Default location of the configuration file
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("dev", "chunkloop", "chunkloop").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

impl ChunkloopConfig {
    /// Parse a configuration document
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| {
            ChunkloopError::config_with_code(ErrorCode::CONFIG_INVALID_YAML, format!("invalid configuration: {}", e))
                .with_source(e)
        })
    }

    /// Load the file at `path`, which must exist
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(common::config_not_found(path));
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| ChunkloopError::config(format!("cannot read {}", path.display())).with_source(e))?;
        Self::from_yaml(&content).map_err(|e| e.with_context(path.display()))
    }

    /// Load the explicit file, or the default file when present, or the defaults;
    /// then apply environment overrides and validate
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => {
                    debug!(path = %path.display(), "loading default configuration");
                    Self::from_file(&path)?
                }
                None => Self::default(),
            },
        };
        config.merge_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    pub fn merge_env_vars(&mut self) -> Result<()> {
        self.merge_env_from(|key| std::env::var(key).ok())
    }

    /// Apply `CHUNKLOOP_*` overrides looked up through `lookup`
    pub fn merge_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("CHUNKLOOP_CHUNK_SIZE") {
            self.chunk_size = parse_env("CHUNKLOOP_CHUNK_SIZE", &value)?;
        }
        if let Some(value) = lookup("CHUNKLOOP_MAX_PARALLEL") {
            self.max_parallel = parse_env("CHUNKLOOP_MAX_PARALLEL", &value)?;
        }
        if let Some(value) = lookup("CHUNKLOOP_MAX_RETRIES") {
            self.max_retries = parse_env("CHUNKLOOP_MAX_RETRIES", &value)?;
        }
        if let Some(value) = lookup("CHUNKLOOP_WORKER") {
            self.worker_program = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup("CHUNKLOOP_LOG_LEVEL") {
            self.log_level = value;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(common::invalid_chunk_size(self.chunk_size));
        }
        if self.max_parallel == 0 {
            return Err(ChunkloopError::config_with_code(
                ErrorCode::CONFIG_INVALID_VALUE,
                "max_parallel must be at least 1",
            ));
        }
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ChunkloopError::config_with_code(
                ErrorCode::CONFIG_INVALID_VALUE,
                format!(
                    "log_level must be one of {}, got '{}'",
                    VALID_LOG_LEVELS.join(", "),
                    self.log_level
                ),
            ));
        }
        if self.worker_timeout == Some(Duration::ZERO) {
            return Err(ChunkloopError::config_with_code(
                ErrorCode::CONFIG_INVALID_VALUE,
                "worker_timeout must be positive",
            ));
        }
        Ok(())
    }

    pub fn backend_options(&self) -> BackendOptions {
        BackendOptions {
            chunk_size: self.chunk_size,
        }
    }

    pub fn dispatch_options(&self, progress: bool) -> DispatchOptions {
        DispatchOptions {
            max_parallel: self.max_parallel,
            max_retries: self.max_retries,
            retry_backoff: self.retry_backoff,
            progress,
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        ChunkloopError::config_with_code(
            ErrorCode::CONFIG_INVALID_VALUE,
            format!("{} must be a non-negative integer, got '{}'", key, value),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = ChunkloopConfig::default();
        config.validate().unwrap();
        assert_eq!(config.backend_options(), BackendOptions { chunk_size: 1 });
    }

    #[test]
    fn test_parse_yaml_with_durations() {
        let config = ChunkloopConfig::from_yaml(
            r#"
chunk_size: 4
max_parallel: 8
retry_backoff: 250ms
worker_timeout: 30s
worker_mode: in_process
"#,
        )
        .unwrap();
        assert_eq!(config.chunk_size, 4);
        assert_eq!(config.retry_backoff, Duration::from_millis(250));
        assert_eq!(config.worker_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.worker_mode, WorkerMode::InProcess);
        assert_eq!(config.max_retries, 0);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("CHUNKLOOP_CHUNK_SIZE", "16"),
            ("CHUNKLOOP_WORKER", "/opt/bin/chunkloop"),
            ("CHUNKLOOP_LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();
        let mut config = ChunkloopConfig::default();
        config.merge_env_from(|k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.chunk_size, 16);
        assert_eq!(config.worker_program, Some(PathBuf::from("/opt/bin/chunkloop")));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.max_parallel, 1);
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = ChunkloopConfig::default();
        let err = config
            .merge_env_from(|k| (k == "CHUNKLOOP_MAX_PARALLEL").then(|| "lots".to_string()))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::CONFIG_INVALID_VALUE);
    }

    #[test]
    fn test_validation() {
        let config = ChunkloopConfig {
            chunk_size: 0,
            ..ChunkloopConfig::default()
        };
        assert_eq!(config.validate().unwrap_err().code(), ErrorCode::CONFIG_INVALID_CHUNK_SIZE);

        let config = ChunkloopConfig {
            log_level: "loud".to_string(),
            ..ChunkloopConfig::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("loud"));
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = TempDir::new().unwrap();
        let err = ChunkloopConfig::load(Some(&dir.path().join("nope.yml"))).unwrap_err();
        assert_eq!(err.code(), ErrorCode::CONFIG_NOT_FOUND);
    }

    #[test]
    fn test_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "chunk_size: 3\nmax_retries: 2\n").unwrap();
        let config = ChunkloopConfig::from_file(&path).unwrap();
        assert_eq!(config.chunk_size, 3);
        assert_eq!(config.max_retries, 2);
    }
}
