use std::cmp::Ordering;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::Zero;

use crate::ast::{FnArity, Value};
use crate::builtins::{arity, def_builtin, err};
use crate::env::Env;
use crate::error::VncError;
use crate::number;

fn fold(
    args: &[Value],
    identity: Value,
    op: fn(&Value, &Value) -> Result<Value, VncError>,
) -> Result<Value, VncError> {
    match args {
        [] => Ok(identity),
        [only] => op(&identity, only),
        [first, rest @ ..] => rest.iter().try_fold(first.clone(), |acc, v| op(&acc, v)),
    }
}

/// Ordering for `<` and friends: numbers across types, otherwise values of
/// the same kind (strings, chars, keywords).
fn ordering(a: &Value, b: &Value, op: &str) -> Result<Option<Ordering>, VncError> {
    if a.is_number() && b.is_number() {
        return number::compare(a, b);
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => Ok(Some(x.cmp(y))),
        (Value::Char(x), Value::Char(y)) => Ok(Some(x.cmp(y))),
        (Value::Keyword(x), Value::Keyword(y)) => Ok(Some(x.cmp(y))),
        _ => Err(VncError::illegal_argument(format!(
            "'{}' cannot compare {} with {}",
            op,
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn compare_chain(
    args: &[Value],
    op: &str,
    accept: fn(Ordering) -> bool,
) -> Result<Value, VncError> {
    for pair in args.windows(2) {
        match ordering(&pair[0], &pair[1], op)? {
            Some(ord) if accept(ord) => {}
            _ => return Ok(Value::Bool(false)),
        }
    }
    Ok(Value::Bool(true))
}

fn extreme(args: &[Value], op: &str, keep: Ordering) -> Result<Value, VncError> {
    let mut best = args[0].clone();
    for candidate in &args[1..] {
        if matches!(&best, Value::Double(d) if d.is_nan()) {
            break;
        }
        match ordering(candidate, &best, op)? {
            Some(ord) if ord == keep => best = candidate.clone(),
            None => best = Value::Double(f64::NAN),
            _ => {}
        }
    }
    Ok(best)
}

fn is_even(value: &Value) -> Result<bool, VncError> {
    match value {
        Value::Long(n) => Ok(n % 2 == 0),
        Value::BigInt(n) => Ok((n % BigInt::from(2)).is_zero()),
        other => Err(VncError::type_mismatch("integer", other.type_name())),
    }
}

pub(crate) fn install(env: &mut Env) {
    // --- Arithmetic ---
    def_builtin!(env, "+", FnArity::at_least(0), |args| fold(args, Value::Long(0), number::add));
    def_builtin!(env, "*", FnArity::at_least(0), |args| fold(args, Value::Long(1), number::mul));
    def_builtin!(env, "-", FnArity::at_least(1), |args| {
        match args {
            [only] => number::negate(only),
            _ => fold(args, Value::Long(0), number::sub),
        }
    });
    def_builtin!(env, "/", FnArity::at_least(1), |args| fold(args, Value::Long(1), number::div));
    def_builtin!(env, "inc", FnArity::exact(1), |args| number::add(&args[0], &Value::Long(1)));
    def_builtin!(env, "dec", FnArity::exact(1), |args| number::sub(&args[0], &Value::Long(1)));
    def_builtin!(env, "mod", FnArity::exact(2), |args| number::modulo(&args[0], &args[1]));
    def_builtin!(env, "rem", FnArity::exact(2), |args| number::rem(&args[0], &args[1]));
    def_builtin!(env, "abs", FnArity::exact(1), |args| number::abs(&args[0]));
    def_builtin!(env, "negate", FnArity::exact(1), |args| number::negate(&args[0]));
    def_builtin!(env, "max", FnArity::at_least(1), |args| extreme(args, "max", Ordering::Greater));
    def_builtin!(env, "min", FnArity::at_least(1), |args| extreme(args, "min", Ordering::Less));

    // --- Comparison ---
    def_builtin!(env, "==", FnArity::at_least(1), |args| {
        for pair in args.windows(2) {
            let same = if pair[0].is_number() && pair[1].is_number() {
                number::numeric_eq(&pair[0], &pair[1])?
            } else {
                pair[0] == pair[1]
            };
            if !same {
                return Ok(Value::Bool(false));
            }
        }
        Ok(Value::Bool(true))
    });
    def_builtin!(env, "<", FnArity::at_least(1), |args| {
        compare_chain(args, "<", |o| o == Ordering::Less)
    });
    def_builtin!(env, ">", FnArity::at_least(1), |args| {
        compare_chain(args, ">", |o| o == Ordering::Greater)
    });
    def_builtin!(env, "<=", FnArity::at_least(1), |args| {
        compare_chain(args, "<=", |o| o != Ordering::Greater)
    });
    def_builtin!(env, ">=", FnArity::at_least(1), |args| {
        compare_chain(args, ">=", |o| o != Ordering::Less)
    });

    // --- Predicates ---
    def_builtin!(env, "zero?", FnArity::exact(1), |args| Ok(Value::Bool(number::is_zero(&args[0])?)));
    def_builtin!(env, "neg?", FnArity::exact(1), |args| {
        Ok(Value::Bool(number::is_negative(&args[0])?))
    });
    def_builtin!(env, "pos?", FnArity::exact(1), |args| {
        let v = &args[0];
        if matches!(v, Value::Double(d) if d.is_nan()) {
            return Ok(Value::Bool(false));
        }
        Ok(Value::Bool(!number::is_negative(v)? && !number::is_zero(v)?))
    });
    def_builtin!(env, "even?", FnArity::exact(1), |args| Ok(Value::Bool(is_even(&args[0])?)));
    def_builtin!(env, "odd?", FnArity::exact(1), |args| Ok(Value::Bool(!is_even(&args[0])?)));

    // --- Coercions ---
    def_builtin!(env, "long", FnArity::exact(1), |args| {
        Ok(Value::Long(number::to_long(&args[0])?))
    });
    def_builtin!(env, "double", FnArity::exact(1), |args| {
        match &args[0] {
            Value::String(s) => s.trim().parse::<f64>().map(Value::Double).map_err(|_| {
                VncError::host("NumberFormatException", format!("For input string: \"{}\"", s))
            }),
            other => Ok(Value::Double(number::to_f64(other)?)),
        }
    });
    def_builtin!(env, "decimal", arity(1, 2), |args| {
        let value = number::to_decimal(&args[0])?;
        match args.get(1) {
            None => Ok(Value::Decimal(value)),
            Some(Value::Long(scale)) => Ok(Value::Decimal(value.round(*scale))),
            Some(other) => Err(VncError::type_mismatch("long scale", other.type_name())),
        }
    });
    def_builtin!(env, "bigint", FnArity::exact(1), |args| {
        Ok(Value::BigInt(number::to_bigint(&args[0])?))
    });
    def_builtin!(env, "parse-number", FnArity::exact(1), |args| {
        let text = match &args[0] {
            Value::String(s) => s.trim().to_string(),
            other => return Err(VncError::type_mismatch("string", other.type_name())),
        };
        if let Some(value) = number::parse_literal(&text) {
            return Ok(value);
        }
        match BigDecimal::from_str(&text) {
            Ok(d) => Ok(Value::Decimal(d)),
            Err(_) => err(format!("'{}' is not a number", text)),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_with_identity() {
        assert_eq!(fold(&[], Value::Long(0), number::add).unwrap(), Value::Long(0));
        let args = [Value::Long(1), Value::Long(2), Value::Long(3)];
        assert_eq!(fold(&args, Value::Long(0), number::add).unwrap(), Value::Long(6));
        assert_eq!(
            fold(&[Value::Long(4)], Value::Long(1), number::div).unwrap(),
            Value::Long(0)
        );
    }

    #[test]
    fn extremes_keep_first_on_ties() {
        let args = [Value::Long(3), Value::Double(7.5), Value::Long(-2)];
        assert_eq!(extreme(&args, "max", Ordering::Greater).unwrap(), Value::Double(7.5));
        assert_eq!(extreme(&args, "min", Ordering::Less).unwrap(), Value::Long(-2));
    }
}
