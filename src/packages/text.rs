use super::{check_built_len, pair, single, Package};
use crate::error::{ChunkloopError, Result};
use crate::expr::{Interpreter, Value};

pub(super) fn package() -> Package {
    Package::new("text")
        .with("upper", upper)
        .with("lower", lower)
        .with("trim", trim)
        .with("concat", concat)
        .with("split", split)
        .with("join", join)
        .with("repeat", repeat)
}

fn upper(_: &mut Interpreter<'_>, args: Vec<Value>) -> Result<Value> {
    Ok(Value::Str(single("upper", args)?.as_str()?.to_uppercase()))
}

fn lower(_: &mut Interpreter<'_>, args: Vec<Value>) -> Result<Value> {
    Ok(Value::Str(single("lower", args)?.as_str()?.to_lowercase()))
}

fn trim(_: &mut Interpreter<'_>, args: Vec<Value>) -> Result<Value> {
    Ok(Value::Str(single("trim", args)?.as_str()?.trim().to_string()))
}

/// Concatenate the display form of every argument
fn concat(_: &mut Interpreter<'_>, args: Vec<Value>) -> Result<Value> {
    Ok(Value::Str(args.iter().map(Value::to_string).collect()))
}

fn split(_: &mut Interpreter<'_>, args: Vec<Value>) -> Result<Value> {
    let (s, sep) = pair("split", args)?;
    let (s, sep) = (s.as_str()?, sep.as_str()?);
    if sep.is_empty() {
        return Err(ChunkloopError::evaluation("split separator must not be empty"));
    }
    Ok(Value::List(
        s.split(sep).map(|part| Value::Str(part.to_string())).collect(),
    ))
}

fn join(_: &mut Interpreter<'_>, args: Vec<Value>) -> Result<Value> {
    let (list, sep) = pair("join", args)?;
    let sep = sep.as_str()?;
    let parts: Vec<String> = list.as_list()?.iter().map(Value::to_string).collect();
    Ok(Value::Str(parts.join(sep)))
}

fn repeat(_: &mut Interpreter<'_>, args: Vec<Value>) -> Result<Value> {
    let (s, n) = pair("repeat", args)?;
    let n = usize::try_from(n.as_int()?)
        .map_err(|_| ChunkloopError::evaluation("repeat count must not be negative"))?;
    let s = s.as_str()?;
    check_built_len("repeat", s.len().checked_mul(n))?;
    Ok(Value::Str(s.repeat(n)))
}
