use std::cmp::Ordering;

use super::{pair, single, Package};
use crate::error::{common, ChunkloopError, Result};
use crate::expr::{Interpreter, Value};

pub(super) fn package() -> Package {
    Package::new("math")
        .with("sqrt", sqrt)
        .with("pow", pow)
        .with("abs", abs)
        .with("floor", floor)
        .with("ceil", ceil)
        .with("round", round)
        .with("max", max)
        .with("min", min)
}

fn sqrt(_: &mut Interpreter<'_>, args: Vec<Value>) -> Result<Value> {
    let x = single("sqrt", args)?.as_f64()?;
    if x < 0.0 {
        return Err(ChunkloopError::evaluation(format!(
            "sqrt of negative number {}",
            x
        )));
    }
    Ok(Value::Float(x.sqrt()))
}

fn pow(_: &mut Interpreter<'_>, args: Vec<Value>) -> Result<Value> {
    match pair("pow", args)? {
        (Value::Int(base), Value::Int(exp)) if exp >= 0 => u32::try_from(exp)
            .ok()
            .and_then(|exp| base.checked_pow(exp))
            .map(Value::Int)
            .ok_or_else(|| ChunkloopError::evaluation("integer overflow in pow")),
        (base, exp) => Ok(Value::Float(base.as_f64()?.powf(exp.as_f64()?))),
    }
}

fn abs(_: &mut Interpreter<'_>, args: Vec<Value>) -> Result<Value> {
    match single("abs", args)? {
        Value::Int(i) => i
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| ChunkloopError::evaluation("integer overflow in abs")),
        other => Ok(Value::Float(other.as_f64()?.abs())),
    }
}

fn to_int(name: &str, x: f64) -> Result<Value> {
    if !x.is_finite() || x < i64::MIN as f64 || x > i64::MAX as f64 {
        return Err(ChunkloopError::evaluation(format!(
            "{} result {} does not fit in an int",
            name, x
        )));
    }
    Ok(Value::Int(x as i64))
}

fn floor(_: &mut Interpreter<'_>, args: Vec<Value>) -> Result<Value> {
    match single("floor", args)? {
        Value::Int(i) => Ok(Value::Int(i)),
        other => to_int("floor", other.as_f64()?.floor()),
    }
}

fn ceil(_: &mut Interpreter<'_>, args: Vec<Value>) -> Result<Value> {
    match single("ceil", args)? {
        Value::Int(i) => Ok(Value::Int(i)),
        other => to_int("ceil", other.as_f64()?.ceil()),
    }
}

fn round(_: &mut Interpreter<'_>, args: Vec<Value>) -> Result<Value> {
    match single("round", args)? {
        Value::Int(i) => Ok(Value::Int(i)),
        other => to_int("round", other.as_f64()?.round()),
    }
}

fn extreme(name: &str, args: Vec<Value>, keep: Ordering) -> Result<Value> {
    // A single list argument is treated as the candidates themselves
    let candidates = match args.as_slice() {
        [Value::List(_)] => args.into_iter().next().unwrap_or(Value::Null).into_list()?,
        _ => args,
    };
    let mut iter = candidates.into_iter();
    let first = iter.next().ok_or_else(|| common::arity(name, 1, 0))?;
    iter.try_fold(first, |best, x| {
        Ok(if x.compare(&best)? == keep { x } else { best })
    })
}

fn max(_: &mut Interpreter<'_>, args: Vec<Value>) -> Result<Value> {
    extreme("max", args, Ordering::Greater)
}

fn min(_: &mut Interpreter<'_>, args: Vec<Value>) -> Result<Value> {
    extreme("min", args, Ordering::Less)
}

#[cfg(test)]
mod tests {
    use crate::error::Result;
    use crate::expr::{parse_expression, Interpreter, ScopeArena, Value};
    use crate::packages::PackageRegistry;

    fn eval(source: &str) -> Result<Value> {
        let registry = PackageRegistry::standard();
        let mut arena = ScopeArena::new();
        let frame = registry.attach(&mut arena, &["math".to_string()])?;
        let expr = parse_expression(source)?;
        Interpreter::new(&mut arena, &registry).eval(&expr, frame)
    }

    #[test]
    fn test_pow_keeps_ints() {
        assert_eq!(eval("pow(2, 10)").unwrap(), Value::Int(1024));
        assert_eq!(eval("pow(4, 0.5)").unwrap(), Value::Float(2.0));
        assert!(eval("pow(10, 40)").is_err());
    }

    #[test]
    fn test_rounding() {
        assert_eq!(eval("floor(2.7)").unwrap(), Value::Int(2));
        assert_eq!(eval("ceil(2.1)").unwrap(), Value::Int(3));
        assert_eq!(eval("round(-2.5)").unwrap(), Value::Int(-3));
        assert_eq!(eval("abs(-4)").unwrap(), Value::Int(4));
    }

    #[test]
    fn test_extremes() {
        assert_eq!(eval("max(3, 9, 4)").unwrap(), Value::Int(9));
        assert_eq!(eval("min([3, 1.5, 4])").unwrap(), Value::Float(1.5));
        assert!(eval("max()").is_err());
    }

    #[test]
    fn test_sqrt_domain() {
        assert_eq!(eval("sqrt(9)").unwrap(), Value::Float(3.0));
        assert!(eval("sqrt(-1)").is_err());
    }
}
