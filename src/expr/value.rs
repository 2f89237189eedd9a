//! Runtime values of the expression language.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use super::ast::{BinaryOp, Expr};
use super::scope::ScopeId;
use crate::error::{ChunkloopError, ErrorCode, Result};

/// A closure is code plus the id of the frame it closes over
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Closure {
    pub params: Vec<String>,
    pub body: Box<Expr>,
    pub scope: ScopeId,
}

/// Reference to a function exported by a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltinRef {
    pub package: String,
    pub name: String,
}

impl fmt::Display for BuiltinRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.package, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Closure(Closure),
    Builtin(BuiltinRef),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Closure(_) => "closure",
            Value::Builtin(_) => "builtin",
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Closure(_) | Value::Builtin(_))
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(ChunkloopError::type_mismatch(format!(
                "expected bool, got {}",
                other.type_name()
            ))),
        }
    }

    pub fn as_int(&self) -> Result<i64> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(ChunkloopError::type_mismatch(format!(
                "expected int, got {}",
                other.type_name()
            ))),
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Value::Int(i) => Ok(*i as f64),
            Value::Float(f) => Ok(*f),
            other => Err(ChunkloopError::type_mismatch(format!(
                "expected number, got {}",
                other.type_name()
            ))),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(ChunkloopError::type_mismatch(format!(
                "expected string, got {}",
                other.type_name()
            ))),
        }
    }

    pub fn as_list(&self) -> Result<&[Value]> {
        match self {
            Value::List(items) => Ok(items),
            other => Err(ChunkloopError::type_mismatch(format!(
                "expected list, got {}",
                other.type_name()
            ))),
        }
    }

    pub fn into_list(self) -> Result<Vec<Value>> {
        match self {
            Value::List(items) => Ok(items),
            other => Err(ChunkloopError::type_mismatch(format!(
                "expected list, got {}",
                other.type_name()
            ))),
        }
    }

    /// Convert plain JSON data into a value. Objects have no counterpart.
    pub fn from_json(json: &serde_json::Value) -> Result<Value> {
        Ok(match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => Value::List(
                items
                    .iter()
                    .map(Value::from_json)
                    .collect::<Result<Vec<_>>>()?,
            ),
            serde_json::Value::Object(_) => {
                return Err(ChunkloopError::type_mismatch(
                    "objects are not supported as loop values",
                ))
            }
        })
    }

    /// Convert to plain JSON data.
    ///
    /// Fails for closures and builtins: they only make sense next to the
    /// scope arena they came from and cannot be returned across the boundary.
    pub fn to_data(&self) -> Result<serde_json::Value> {
        Ok(match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or_else(|| {
                    ChunkloopError::evaluation_with_code(
                        ErrorCode::EVAL_NON_DATA_RESULT,
                        format!("non-finite float {} cannot be returned", f),
                    )
                })?,
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(
                items.iter().map(Value::to_data).collect::<Result<Vec<_>>>()?,
            ),
            Value::Closure(_) | Value::Builtin(_) => {
                return Err(ChunkloopError::evaluation_with_code(
                    ErrorCode::EVAL_NON_DATA_RESULT,
                    format!("a {} cannot be returned as a result", self.type_name()),
                ))
            }
        })
    }

    /// Structural equality with int/float promotion
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            (a, b) => a == b,
        }
    }

    /// Ordering for numbers and strings
    pub fn compare(&self, other: &Value) -> Result<Ordering> {
        let ordering = match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (a, b) if is_number(a) && is_number(b) => a.as_f64()?.partial_cmp(&b.as_f64()?),
            _ => None,
        };
        ordering.ok_or_else(|| {
            ChunkloopError::type_mismatch(format!(
                "cannot compare {} with {}",
                self.type_name(),
                other.type_name()
            ))
        })
    }
}

fn is_number(value: &Value) -> bool {
    matches!(value, Value::Int(_) | Value::Float(_))
}

/// Arithmetic shared by the interpreter and the builtin combine policies.
/// Comparison and logical operators are handled by the interpreter.
pub fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    use BinaryOp::*;

    match (op, left, right) {
        (Add, Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
        (Add, Value::List(a), Value::List(b)) => {
            Ok(Value::List(a.iter().chain(b.iter()).cloned().collect()))
        }
        (Div | Rem, Value::Int(_), Value::Int(0)) => Err(ChunkloopError::evaluation_with_code(
            ErrorCode::EVAL_DIVIDE_BY_ZERO,
            "integer division by zero",
        )),
        (_, Value::Int(a), Value::Int(b)) => {
            let result = match op {
                Add => a.checked_add(*b),
                Sub => a.checked_sub(*b),
                Mul => a.checked_mul(*b),
                Div => a.checked_div(*b),
                Rem => a.checked_rem(*b),
                _ => return Err(unsupported(op, left, right)),
            };
            result.map(Value::Int).ok_or_else(|| {
                ChunkloopError::evaluation(format!("integer overflow in {} {} {}", a, op, b))
            })
        }
        (_, l, r) if is_number(l) && is_number(r) => {
            let (a, b) = (l.as_f64()?, r.as_f64()?);
            let result = match op {
                Add => a + b,
                Sub => a - b,
                Mul => a * b,
                Div => a / b,
                Rem => a % b,
                _ => return Err(unsupported(op, left, right)),
            };
            Ok(Value::Float(result))
        }
        _ => Err(unsupported(op, left, right)),
    }
}

fn unsupported(op: BinaryOp, left: &Value, right: &Value) -> ChunkloopError {
    ChunkloopError::type_mismatch(format!(
        "operator {} is not defined for {} and {}",
        op,
        left.type_name(),
        right.type_name()
    ))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Closure(c) => write!(f, "<fn({})>", c.params.join(", ")),
            Value::Builtin(b) => write!(f, "<builtin {}>", b),
        }
    }
}
