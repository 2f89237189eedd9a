//! Pure pairwise combine functions for the builtin policies

use std::cmp::Ordering;

use crate::error::{ChunkloopError, Result};
use crate::expr::{arithmetic, BinaryOp, Value};
use crate::loop_spec::BuiltinCombine;

/// Pure: Starting accumulator when no `init` is given and `first` is the
/// first value of the loop
pub fn seed(policy: BuiltinCombine, first: Value) -> Value {
    match policy {
        BuiltinCombine::Append => Value::List(vec![first]),
        BuiltinCombine::Concat => match first {
            Value::List(items) => Value::List(items),
            other => Value::List(vec![other]),
        },
        _ => first,
    }
}

/// Pure: Fold one value into the accumulator
pub fn combine(policy: BuiltinCombine, acc: Value, value: Value) -> Result<Value> {
    match policy {
        BuiltinCombine::Sum => arithmetic(BinaryOp::Add, &acc, &value),
        BuiltinCombine::Product => arithmetic(BinaryOp::Mul, &acc, &value),
        BuiltinCombine::Append => {
            let mut items = list_accumulator(policy, acc)?;
            items.push(value);
            Ok(Value::List(items))
        }
        BuiltinCombine::Concat => {
            let mut items = list_accumulator(policy, acc)?;
            match value {
                Value::List(more) => items.extend(more),
                other => items.push(other),
            }
            Ok(Value::List(items))
        }
        BuiltinCombine::Min => keep(acc, value, Ordering::Less),
        BuiltinCombine::Max => keep(acc, value, Ordering::Greater),
    }
}

fn list_accumulator(policy: BuiltinCombine, acc: Value) -> Result<Vec<Value>> {
    match acc {
        Value::List(items) => Ok(items),
        other => Err(ChunkloopError::type_mismatch(format!(
            "{} needs a list accumulator, got {}",
            policy.name(),
            other.type_name()
        ))),
    }
}

/// Keep `value` only when it is strictly better, so ties keep the earlier one
fn keep(acc: Value, value: Value, wanted: Ordering) -> Result<Value> {
    Ok(if value.compare(&acc)? == wanted { value } else { acc })
}
