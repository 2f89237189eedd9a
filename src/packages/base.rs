use super::{check_built_len, expect_args, pair, single, Package};
use crate::error::{common, ChunkloopError, Result};
use crate::expr::{arithmetic, BinaryOp, Interpreter, Value};

pub(super) fn package() -> Package {
    Package::new(super::BASE_PACKAGE)
        .with("length", length)
        .with("range", range)
        .with("sum", sum)
        .with("append", append)
        .with("str", to_str)
        .with("type_of", type_of)
        .with("is_null", is_null)
        .with("map", map)
        .with("reduce", reduce)
}

fn length(_: &mut Interpreter<'_>, args: Vec<Value>) -> Result<Value> {
    match single("length", args)? {
        Value::List(items) => Ok(Value::Int(items.len() as i64)),
        Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
        other => Err(ChunkloopError::type_mismatch(format!(
            "length expects a list or string, got {}",
            other.type_name()
        ))),
    }
}

/// `range(n)` is `[0, n)`, `range(a, b)` is `[a, b)`
fn range(_: &mut Interpreter<'_>, args: Vec<Value>) -> Result<Value> {
    let (from, to) = match args.as_slice() {
        [to] => (0, to.as_int()?),
        [from, to] => (from.as_int()?, to.as_int()?),
        _ => return Err(common::arity("range", 2, args.len())),
    };
    let len = if to <= from {
        Some(0)
    } else {
        to.checked_sub(from).and_then(|n| usize::try_from(n).ok())
    };
    check_built_len("range", len)?;
    Ok(Value::List((from..to).map(Value::Int).collect()))
}

fn sum(_: &mut Interpreter<'_>, args: Vec<Value>) -> Result<Value> {
    let items = single("sum", args)?.into_list()?;
    items
        .iter()
        .try_fold(Value::Int(0), |acc, x| arithmetic(BinaryOp::Add, &acc, x))
}

fn append(_: &mut Interpreter<'_>, args: Vec<Value>) -> Result<Value> {
    let (list, item) = pair("append", args)?;
    let mut items = list.into_list()?;
    items.push(item);
    Ok(Value::List(items))
}

fn to_str(_: &mut Interpreter<'_>, args: Vec<Value>) -> Result<Value> {
    Ok(Value::Str(single("str", args)?.to_string()))
}

fn type_of(_: &mut Interpreter<'_>, args: Vec<Value>) -> Result<Value> {
    Ok(Value::Str(single("type_of", args)?.type_name().to_string()))
}

fn is_null(_: &mut Interpreter<'_>, args: Vec<Value>) -> Result<Value> {
    Ok(Value::Bool(matches!(single("is_null", args)?, Value::Null)))
}

fn map(interp: &mut Interpreter<'_>, args: Vec<Value>) -> Result<Value> {
    let (list, f) = pair("map", args)?;
    list.into_list()?
        .into_iter()
        .map(|item| interp.apply(&f, vec![item]))
        .collect::<Result<Vec<_>>>()
        .map(Value::List)
}

/// `reduce(list, init, fn(acc, x) {...})`
fn reduce(interp: &mut Interpreter<'_>, args: Vec<Value>) -> Result<Value> {
    expect_args("reduce", &args, 3)?;
    let mut args = args.into_iter();
    let list = args.next().unwrap_or(Value::Null).into_list()?;
    let init = args.next().unwrap_or(Value::Null);
    let f = args.next().unwrap_or(Value::Null);
    list.into_iter()
        .try_fold(init, |acc, item| interp.apply(&f, vec![acc, item]))
}
