//! Incremental reduction of chunk results into the loop's final value.
//!
//! Chunks may arrive in any order. Results are always attributed to their
//! global iteration indices, and order-sensitive policies see them in
//! global order through a reorder buffer keyed by chunk start.

pub mod combine;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::error::{ChunkloopError, ErrorCode, Result};
use crate::expr::{Expr, Interpreter, ScopeArena, ScopeId, Value};
use crate::loop_spec::{BuiltinCombine, Combine, PreparedLoop};
use crate::packages::PackageRegistry;
use crate::plan::ChunkRange;

/// Resolved combine policy
enum Policy {
    Collect,
    Builtin(BuiltinCombine),
    Function(Value),
}

enum State {
    /// One slot per global iteration
    Collect(Vec<Option<Value>>),
    Reduce {
        acc: Option<Value>,
        /// First global index not yet applied
        next: usize,
        /// Chunks waiting for their predecessors, keyed by start index
        pending: BTreeMap<usize, Vec<Value>>,
    },
}

pub struct Accumulator {
    total: usize,
    in_order: bool,
    policy: Policy,
    finalize: Option<Value>,
    state: State,
    /// Folded ranges, start -> end
    received: BTreeMap<usize, usize>,
    folded: usize,
    arena: ScopeArena,
    registry: Arc<PackageRegistry>,
}

impl fmt::Debug for Accumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let policy = match &self.policy {
            Policy::Collect => "collect",
            Policy::Builtin(b) => b.name(),
            Policy::Function(_) => "function",
        };
        f.debug_struct("Accumulator")
            .field("total", &self.total)
            .field("folded", &self.folded)
            .field("in_order", &self.in_order)
            .field("policy", &policy)
            .finish()
    }
}

impl Accumulator {
    /// Build the accumulator for a loop of `total` iterations.
    ///
    /// User combine and finalize functions are evaluated here, once, in a
    /// fresh scope with every registered package attached.
    pub fn new(total: usize, prepared: &PreparedLoop, registry: Arc<PackageRegistry>) -> Result<Self> {
        let mut arena = ScopeArena::new();
        let all: Vec<String> = registry.names().map(str::to_string).collect();
        let packages = registry.attach(&mut arena, &all)?;
        let frame = arena.push_frame(Some(packages));

        let policy = match &prepared.combine {
            Combine::Collect => Policy::Collect,
            Combine::Builtin(b) => Policy::Builtin(*b),
            Combine::Function(expr) => {
                Policy::Function(callable(&mut arena, &registry, frame, expr, "combine")?)
            }
        };
        let finalize = prepared
            .finalize
            .as_ref()
            .map(|expr| callable(&mut arena, &registry, frame, expr, "finalize"))
            .transpose()?;

        let state = match policy {
            Policy::Collect => State::Collect(vec![None; total]),
            _ => State::Reduce {
                acc: prepared.init.clone(),
                next: 0,
                pending: BTreeMap::new(),
            },
        };

        Ok(Self {
            total,
            in_order: prepared.spec.in_order,
            policy,
            finalize,
            state,
            received: BTreeMap::new(),
            folded: 0,
            arena,
            registry,
        })
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of iterations folded so far
    pub fn folded(&self) -> usize {
        self.folded
    }

    pub fn is_complete(&self) -> bool {
        self.folded == self.total
    }

    /// Fold one chunk's results, `values[k]` being iteration `range.start + k`
    pub fn fold(&mut self, range: ChunkRange, values: Vec<Value>) -> Result<()> {
        self.check_range(&range, values.len())?;
        if range.is_empty() {
            return Ok(());
        }
        self.received.insert(range.start, range.end);
        self.folded += range.len();
        debug!(chunk = range.index, start = range.start, end = range.end, "folding chunk");

        let in_order = self.in_order;
        match &mut self.state {
            State::Collect(slots) => {
                for (slot, value) in slots[range.indices()].iter_mut().zip(values) {
                    *slot = Some(value);
                }
                Ok(())
            }
            State::Reduce { pending, next, .. } if in_order => {
                pending.insert(range.start, values);
                let mut ready = Vec::new();
                while let Some(values) = pending.remove(&*next) {
                    ready.push((*next, values));
                    *next += ready.last().map_or(0, |(_, v)| v.len());
                }
                if ready.is_empty() {
                    trace!(start = range.start, "chunk buffered until predecessors arrive");
                }
                for (start, values) in ready {
                    self.absorb(start, values)?;
                }
                Ok(())
            }
            State::Reduce { .. } => self.absorb(range.start, values),
        }
    }

    /// The final value. Fails unless every iteration has been folded.
    pub fn result(mut self) -> Result<Value> {
        if !self.is_complete() {
            return Err(ChunkloopError::state_with_code(
                ErrorCode::STATE_INCOMPLETE,
                format!(
                    "result requested after {} of {} iteration(s) were folded",
                    self.folded, self.total
                ),
            ));
        }

        let value = match std::mem::replace(&mut self.state, State::Collect(Vec::new())) {
            State::Collect(slots) => slots
                .into_iter()
                .collect::<Option<Vec<_>>>()
                .map(Value::List)
                .ok_or_else(|| {
                    ChunkloopError::state_with_code(ErrorCode::STATE_INCOMPLETE, "missing collected value")
                })?,
            State::Reduce { acc, .. } => acc.unwrap_or(Value::Null),
        };

        match self.finalize.take() {
            Some(f) => call(&mut self.arena, &self.registry, &f, vec![value])
                .map_err(|e| e.with_context("while applying finalize")),
            None => Ok(value),
        }
    }

    fn check_range(&self, range: &ChunkRange, count: usize) -> Result<()> {
        if range.start > range.end || range.len() != count {
            return Err(ChunkloopError::state_with_code(
                ErrorCode::STATE_LENGTH_MISMATCH,
                format!("{} carries {} value(s)", range, count),
            ));
        }
        if range.end > self.total {
            return Err(ChunkloopError::state_with_code(
                ErrorCode::STATE_OUT_OF_BOUNDS,
                format!("{} reaches beyond {} iteration(s)", range, self.total),
            ));
        }
        if let Some((&start, &end)) = self.received.range(..range.end).next_back() {
            if end > range.start && !range.is_empty() {
                return Err(ChunkloopError::state_with_code(
                    ErrorCode::STATE_OVERLAPPING_RANGE,
                    format!("{} overlaps already folded [{}, {})", range, start, end),
                ));
            }
        }
        Ok(())
    }

    /// Apply consecutive values starting at global index `start`
    fn absorb(&mut self, start: usize, values: Vec<Value>) -> Result<()> {
        let State::Reduce { acc, .. } = &mut self.state else {
            return Ok(());
        };
        for (offset, value) in values.into_iter().enumerate() {
            let iteration = start + offset;
            let next = match (acc.take(), &self.policy) {
                (None, Policy::Builtin(b)) => combine::seed(*b, value),
                (None, _) => value,
                (Some(current), Policy::Builtin(b)) => combine::combine(*b, current, value)?,
                (Some(current), Policy::Function(f)) => {
                    call(&mut self.arena, &self.registry, f, vec![current, value])?
                }
                (Some(current), Policy::Collect) => current,
            };
            trace!(iteration, "combined");
            *acc = Some(next);
        }
        Ok(())
    }
}

/// Evaluate `expr` and insist on a callable value
fn callable(arena: &mut ScopeArena, registry: &PackageRegistry, frame: ScopeId, expr: &Expr, what: &str) -> Result<Value> {
    let value = Interpreter::new(arena, registry)
        .eval(expr, frame)
        .map_err(|e| e.with_context(format!("while evaluating {}", what)))?;
    if !value.is_callable() {
        return Err(ChunkloopError::type_mismatch(format!(
            "{} must be a function, got {}",
            what,
            value.type_name()
        )));
    }
    Ok(value)
}

/// Call `f`, keeping only the data it returns
fn call(arena: &mut ScopeArena, registry: &PackageRegistry, f: &Value, args: Vec<Value>) -> Result<Value> {
    let mark = arena.len();
    let result = Interpreter::new(arena, registry)
        .apply(f, args)
        .and_then(|v| v.to_data())
        .and_then(|json| Value::from_json(&json));
    arena.truncate(mark);
    result
}
