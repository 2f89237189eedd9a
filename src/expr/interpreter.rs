//! Tree-walking evaluator.
//!
//! Every call and every `let` pushes a frame into the [`ScopeArena`]. Nothing
//! is popped during evaluation; callers that evaluate many independent
//! expressions (the worker, the accumulator) record `arena.len()` first and
//! truncate back to it once the result has been converted to data.

use tracing::trace;

use super::ast::{BinaryOp, Expr, Literal, UnaryOp};
use super::scope::{ScopeArena, ScopeId};
use super::value::{arithmetic, BuiltinRef, Closure, Value};
use crate::error::{common, ChunkloopError, ErrorCode, Result};
use crate::packages::PackageRegistry;

/// Maximum nesting of closure calls
pub const MAX_CALL_DEPTH: usize = 128;

pub struct Interpreter<'a> {
    arena: &'a mut ScopeArena,
    packages: &'a PackageRegistry,
    depth: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(arena: &'a mut ScopeArena, packages: &'a PackageRegistry) -> Self {
        Self {
            arena,
            packages,
            depth: 0,
        }
    }

    pub fn arena(&self) -> &ScopeArena {
        self.arena
    }

    pub fn packages(&self) -> &PackageRegistry {
        self.packages
    }

    pub fn eval(&mut self, expr: &Expr, scope: ScopeId) -> Result<Value> {
        match expr {
            Expr::Literal(literal) => Ok(literal_value(literal)),
            Expr::List(items) => items
                .iter()
                .map(|item| self.eval(item, scope))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            Expr::Ident(name) => self
                .arena
                .lookup(scope, name)
                .cloned()
                .ok_or_else(|| common::unbound(name)),
            Expr::Qualified { package, name } => self.qualified(package, name),
            Expr::Unary { op, operand } => {
                let value = self.eval(operand, scope)?;
                unary(*op, value)
            }
            Expr::Binary { op, left, right } => self.binary(*op, left, right, scope),
            Expr::Call { callee, args } => {
                let callee = self.eval(callee, scope)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg, scope))
                    .collect::<Result<Vec<_>>>()?;
                self.apply(&callee, args)
            }
            Expr::Index { target, index } => {
                let target = self.eval(target, scope)?;
                let index = self.eval(index, scope)?;
                index_value(&target, &index)
            }
            Expr::Lambda(lambda) => Ok(Value::Closure(Closure {
                params: lambda.params.clone(),
                body: lambda.body.clone(),
                scope,
            })),
            Expr::Let { name, value, body } => {
                let frame = self.arena.push_frame(Some(scope));
                let bound = self.eval(value, frame)?;
                self.arena.define(frame, name.clone(), bound);
                self.eval(body, frame)
            }
            Expr::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval(condition, scope)?.as_bool()? {
                    self.eval(then_branch, scope)
                } else if let Some(else_branch) = else_branch {
                    self.eval(else_branch, scope)
                } else {
                    Ok(Value::Null)
                }
            }
        }
    }

    /// Call a closure or builtin with already-evaluated arguments
    pub fn apply(&mut self, callee: &Value, args: Vec<Value>) -> Result<Value> {
        match callee {
            Value::Closure(closure) => {
                if closure.params.len() != args.len() {
                    return Err(common::arity(
                        &format!("fn({})", closure.params.join(", ")),
                        closure.params.len(),
                        args.len(),
                    ));
                }
                if self.depth >= MAX_CALL_DEPTH {
                    return Err(ChunkloopError::evaluation_with_code(
                        ErrorCode::EVAL_RECURSION_LIMIT,
                        format!("call depth exceeded {}", MAX_CALL_DEPTH),
                    ));
                }
                let frame = self.arena.push_frame(Some(closure.scope));
                for (param, arg) in closure.params.iter().zip(args) {
                    self.arena.define(frame, param.clone(), arg);
                }
                self.depth += 1;
                let result = self.eval(&closure.body, frame);
                self.depth -= 1;
                result
            }
            Value::Builtin(builtin) => {
                let function = self.packages.function(&builtin.package, &builtin.name)?;
                trace!(function = %builtin, args = args.len(), "calling builtin");
                function(self, args)
            }
            other => Err(ChunkloopError::type_mismatch(format!(
                "cannot call a value of type {}",
                other.type_name()
            ))),
        }
    }

    fn qualified(&self, package: &str, name: &str) -> Result<Value> {
        self.packages.function(package, name)?;
        Ok(Value::Builtin(BuiltinRef {
            package: package.to_string(),
            name: name.to_string(),
        }))
    }

    fn binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr, scope: ScopeId) -> Result<Value> {
        match op {
            BinaryOp::And => {
                if !self.eval(left, scope)?.as_bool()? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval(right, scope)?.as_bool()?))
            }
            BinaryOp::Or => {
                if self.eval(left, scope)?.as_bool()? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval(right, scope)?.as_bool()?))
            }
            _ => {
                let l = self.eval(left, scope)?;
                let r = self.eval(right, scope)?;
                match op {
                    BinaryOp::Eq => Ok(Value::Bool(l.loose_eq(&r))),
                    BinaryOp::Ne => Ok(Value::Bool(!l.loose_eq(&r))),
                    BinaryOp::Lt => Ok(Value::Bool(l.compare(&r)?.is_lt())),
                    BinaryOp::Le => Ok(Value::Bool(l.compare(&r)?.is_le())),
                    BinaryOp::Gt => Ok(Value::Bool(l.compare(&r)?.is_gt())),
                    BinaryOp::Ge => Ok(Value::Bool(l.compare(&r)?.is_ge())),
                    _ => arithmetic(op, &l, &r),
                }
            }
        }
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::Float(f) => Value::Float(*f),
        Literal::Str(s) => Value::Str(s.clone()),
    }
}

fn unary(op: UnaryOp, value: Value) -> Result<Value> {
    match (op, value) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.as_bool()?)),
        (UnaryOp::Neg, Value::Int(i)) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| ChunkloopError::evaluation("integer overflow in negation")),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Neg, other) => Err(ChunkloopError::type_mismatch(format!(
            "cannot negate {}",
            other.type_name()
        ))),
    }
}

fn index_value(target: &Value, index: &Value) -> Result<Value> {
    let i = index.as_int()?;
    let out_of_range = |len: usize| {
        ChunkloopError::evaluation_with_code(
            ErrorCode::EVAL_INDEX_OUT_OF_RANGE,
            format!("index {} out of range for length {}", i, len),
        )
    };
    match target {
        Value::List(items) => usize::try_from(i)
            .ok()
            .and_then(|i| items.get(i))
            .cloned()
            .ok_or_else(|| out_of_range(items.len())),
        Value::Str(s) => usize::try_from(i)
            .ok()
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::Str(c.to_string()))
            .ok_or_else(|| out_of_range(s.chars().count())),
        other => Err(ChunkloopError::type_mismatch(format!(
            "cannot index into {}",
            other.type_name()
        ))),
    }
}
