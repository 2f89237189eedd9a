//! # chunkloop
//!
//! Chunked map/reduce loop dispatch. A loop specification is validated,
//! the minimal closure scope of its work expression is captured once, the
//! iterations are split into chunks, and each chunk travels as a
//! self-contained task payload to an isolated worker process. Results are
//! folded into the final value in global iteration order.
//!
//! ## Usage
//!
//! ```bash
//! chunkloop run loop.yml [--chunk-size N] [-j N] [--retries N] [--in-process]
//! chunkloop check loop.yml
//! ```
//!
//! ## Modules
//!
//! - `expr` - Work expression language: parser, scopes, values, interpreter
//! - `packages` - Builtin function packages attached on both sides of the boundary
//! - `loop_spec` - Declarative loop specification and validation
//! - `plan` - Binding enumeration and chunk planning
//! - `capture` - Caller scopes and minimal closure-scope capture
//! - `task` - Task closures, the payload codec, and the worker entry point
//! - `subprocess` - Process spawning behind a mockable trait
//! - `dispatch` - Serial and windowed chunk dispatch with retries
//! - `accumulate` - Ordered incremental reduction of chunk results
//! - `backend` - Registration and the end-to-end loop evaluation
//! - `config` - Configuration and loop files
pub mod accumulate;
pub mod backend;
pub mod capture;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod expr;
pub mod loop_spec;
pub mod packages;
pub mod plan;
pub mod subprocess;
pub mod task;

pub use backend::{Backend, BackendOptions};
pub use capture::{CallerScope, CapturedScope, ScopeCapture};
pub use error::{ChunkloopError, ErrorCode, Result};
pub use expr::Value;
pub use loop_spec::LoopSpec;

#[cfg(test)]
mod property_tests;
