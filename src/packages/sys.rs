use once_cell::sync::Lazy;
use std::time::Duration;

use super::{expect_args, single, Package};
use crate::error::{ChunkloopError, ErrorCode, Result};
use crate::expr::{Interpreter, Value};

static WORKER_TOKEN: Lazy<String> = Lazy::new(|| uuid::Uuid::new_v4().to_string());

/// Token identifying the current process, stable for its lifetime
pub fn worker_token() -> &'static str {
    &WORKER_TOKEN
}

pub(super) fn package() -> Package {
    Package::new("sys")
        .with("worker_token", token)
        .with("pid", pid)
        .with("sleep_ms", sleep_ms)
        .with("fail", fail)
}

fn token(_: &mut Interpreter<'_>, args: Vec<Value>) -> Result<Value> {
    expect_args("worker_token", &args, 0)?;
    Ok(Value::Str(worker_token().to_string()))
}

fn pid(_: &mut Interpreter<'_>, args: Vec<Value>) -> Result<Value> {
    expect_args("pid", &args, 0)?;
    Ok(Value::Int(i64::from(std::process::id())))
}

fn sleep_ms(_: &mut Interpreter<'_>, args: Vec<Value>) -> Result<Value> {
    let ms = single("sleep_ms", args)?.as_int()?;
    let ms = u64::try_from(ms)
        .map_err(|_| ChunkloopError::evaluation("sleep_ms expects a non-negative duration"))?;
    std::thread::sleep(Duration::from_millis(ms));
    Ok(Value::Null)
}

/// Raise an evaluation failure carrying the given message
fn fail(_: &mut Interpreter<'_>, args: Vec<Value>) -> Result<Value> {
    let message = single("fail", args)?;
    Err(ChunkloopError::evaluation_with_code(
        ErrorCode::EVAL_USER_FAILURE,
        message.to_string(),
    ))
}
