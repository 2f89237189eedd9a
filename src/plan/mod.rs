//! Iteration planning: binding enumeration and chunking.

pub mod bindings;
pub mod chunks;

pub use bindings::{enumerate_bindings, iteration_count, BindingSet};
pub use chunks::{chunk_count, plan_chunks, ChunkPlan, ChunkRange};
