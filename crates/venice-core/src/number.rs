//! Numeric tower: long, bigint, double and decimal. Mixed operands widen to
//! the higher rank in that order.

use std::cmp::Ordering;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::{FromPrimitive, Signed, ToPrimitive, Zero};

use crate::ast::Value;
use crate::error::VncError;

#[derive(Clone, Debug)]
enum Num {
    Long(i64),
    BigInt(BigInt),
    Double(f64),
    Decimal(BigDecimal),
}

impl Num {
    fn of(value: &Value, op: &str) -> Result<Num, VncError> {
        match value {
            Value::Long(n) => Ok(Num::Long(*n)),
            Value::BigInt(n) => Ok(Num::BigInt(n.clone())),
            Value::Double(d) => Ok(Num::Double(*d)),
            Value::Decimal(d) => Ok(Num::Decimal(d.clone())),
            other => Err(VncError::type_mismatch(
                format!("number for '{}'", op),
                other.type_name(),
            )),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Num::Long(_) => 0,
            Num::BigInt(_) => 1,
            Num::Double(_) => 2,
            Num::Decimal(_) => 3,
        }
    }

    fn widen(self, rank: u8) -> Result<Num, VncError> {
        Ok(match (self, rank) {
            (n, r) if n.rank() == r => n,
            (Num::Long(n), 1) => Num::BigInt(BigInt::from(n)),
            (Num::Long(n), 2) => Num::Double(n as f64),
            (Num::Long(n), _) => Num::Decimal(BigDecimal::from(n)),
            (Num::BigInt(n), 2) => Num::Double(n.to_f64().unwrap_or(f64::NAN)),
            (Num::BigInt(n), _) => Num::Decimal(BigDecimal::new(n, 0)),
            (Num::Double(d), _) => Num::Decimal(BigDecimal::from_f64(d).ok_or_else(|| {
                VncError::arithmetic(format!("cannot convert {} to decimal", d))
            })?),
            (n, _) => n,
        })
    }
}

fn promote(a: &Value, b: &Value, op: &str) -> Result<(Num, Num), VncError> {
    let a = Num::of(a, op)?;
    let b = Num::of(b, op)?;
    let rank = a.rank().max(b.rank());
    Ok((a.widen(rank)?, b.widen(rank)?))
}

fn overflow(op: &str) -> VncError {
    VncError::arithmetic(format!("long overflow in '{}'", op))
}

pub fn add(a: &Value, b: &Value) -> Result<Value, VncError> {
    Ok(match promote(a, b, "+")? {
        (Num::Long(x), Num::Long(y)) => Value::Long(x.checked_add(y).ok_or_else(|| overflow("+"))?),
        (Num::BigInt(x), Num::BigInt(y)) => Value::BigInt(x + y),
        (Num::Double(x), Num::Double(y)) => Value::Double(x + y),
        (Num::Decimal(x), Num::Decimal(y)) => Value::Decimal(x + y),
        _ => unreachable!("operands promoted to the same rank"),
    })
}

pub fn sub(a: &Value, b: &Value) -> Result<Value, VncError> {
    Ok(match promote(a, b, "-")? {
        (Num::Long(x), Num::Long(y)) => Value::Long(x.checked_sub(y).ok_or_else(|| overflow("-"))?),
        (Num::BigInt(x), Num::BigInt(y)) => Value::BigInt(x - y),
        (Num::Double(x), Num::Double(y)) => Value::Double(x - y),
        (Num::Decimal(x), Num::Decimal(y)) => Value::Decimal(x - y),
        _ => unreachable!("operands promoted to the same rank"),
    })
}

pub fn mul(a: &Value, b: &Value) -> Result<Value, VncError> {
    Ok(match promote(a, b, "*")? {
        (Num::Long(x), Num::Long(y)) => Value::Long(x.checked_mul(y).ok_or_else(|| overflow("*"))?),
        (Num::BigInt(x), Num::BigInt(y)) => Value::BigInt(x * y),
        (Num::Double(x), Num::Double(y)) => Value::Double(x * y),
        (Num::Decimal(x), Num::Decimal(y)) => Value::Decimal(x * y),
        _ => unreachable!("operands promoted to the same rank"),
    })
}

const DECIMAL_DIVISION_SCALE: i64 = 16;

/// Integer division truncates; division of exact numbers by zero fails,
/// doubles follow IEEE.
pub fn div(a: &Value, b: &Value) -> Result<Value, VncError> {
    Ok(match promote(a, b, "/")? {
        (Num::Long(_), Num::Long(0)) => return Err(divide_by_zero()),
        (Num::Long(x), Num::Long(y)) => Value::Long(x.checked_div(y).ok_or_else(|| overflow("/"))?),
        (Num::BigInt(x), Num::BigInt(y)) => {
            if y.is_zero() {
                return Err(divide_by_zero());
            }
            Value::BigInt(x / y)
        }
        (Num::Double(x), Num::Double(y)) => Value::Double(x / y),
        (Num::Decimal(x), Num::Decimal(y)) => {
            if y.is_zero() {
                return Err(divide_by_zero());
            }
            let quotient = x / y;
            if quotient.as_bigint_and_exponent().1 > DECIMAL_DIVISION_SCALE {
                Value::Decimal(quotient.round(DECIMAL_DIVISION_SCALE))
            } else {
                Value::Decimal(quotient)
            }
        }
        _ => unreachable!("operands promoted to the same rank"),
    })
}

fn divide_by_zero() -> VncError {
    VncError::arithmetic("/ by zero")
}

/// Remainder with the sign of the dividend (`rem`).
pub fn rem(a: &Value, b: &Value) -> Result<Value, VncError> {
    Ok(match promote(a, b, "rem")? {
        (Num::Long(_), Num::Long(0)) => return Err(divide_by_zero()),
        (Num::Long(x), Num::Long(y)) => Value::Long(x.wrapping_rem(y)),
        (Num::BigInt(x), Num::BigInt(y)) => {
            if y.is_zero() {
                return Err(divide_by_zero());
            }
            Value::BigInt(x % y)
        }
        (Num::Double(x), Num::Double(y)) => Value::Double(x % y),
        (Num::Decimal(x), Num::Decimal(y)) => {
            if y.is_zero() {
                return Err(divide_by_zero());
            }
            Value::Decimal(x % y)
        }
        _ => unreachable!("operands promoted to the same rank"),
    })
}

/// Modulus with the sign of the divisor (`mod`).
pub fn modulo(a: &Value, b: &Value) -> Result<Value, VncError> {
    let r = rem(a, b)?;
    let adjust = !is_zero(&r)? && (is_negative(&r)? != is_negative(b)?);
    if adjust {
        add(&r, b)
    } else {
        Ok(r)
    }
}

pub fn negate(a: &Value) -> Result<Value, VncError> {
    sub(&Value::Long(0), a).or_else(|_| match a {
        Value::Long(n) => Ok(Value::BigInt(-BigInt::from(*n))),
        other => Err(VncError::type_mismatch("number", other.type_name())),
    })
}

pub fn abs(a: &Value) -> Result<Value, VncError> {
    Ok(match a {
        Value::Long(n) => Value::Long(n.checked_abs().ok_or_else(|| overflow("abs"))?),
        Value::BigInt(n) => Value::BigInt(n.abs()),
        Value::Double(d) => Value::Double(d.abs()),
        Value::Decimal(d) => Value::Decimal(d.abs()),
        other => return Err(VncError::type_mismatch("number", other.type_name())),
    })
}

pub fn is_zero(a: &Value) -> Result<bool, VncError> {
    Ok(match a {
        Value::Long(n) => *n == 0,
        Value::BigInt(n) => n.is_zero(),
        Value::Double(d) => *d == 0.0,
        Value::Decimal(d) => d.is_zero(),
        other => return Err(VncError::type_mismatch("number", other.type_name())),
    })
}

pub fn is_negative(a: &Value) -> Result<bool, VncError> {
    Ok(match a {
        Value::Long(n) => *n < 0,
        Value::BigInt(n) => n.is_negative(),
        Value::Double(d) => *d < 0.0,
        Value::Decimal(d) => d.is_negative(),
        other => return Err(VncError::type_mismatch("number", other.type_name())),
    })
}

/// Numeric comparison across types; `None` when a NaN is involved.
pub fn compare(a: &Value, b: &Value) -> Result<Option<Ordering>, VncError> {
    Ok(match promote(a, b, "compare")? {
        (Num::Long(x), Num::Long(y)) => Some(x.cmp(&y)),
        (Num::BigInt(x), Num::BigInt(y)) => Some(x.cmp(&y)),
        (Num::Double(x), Num::Double(y)) => x.partial_cmp(&y),
        (Num::Decimal(x), Num::Decimal(y)) => Some(x.cmp(&y)),
        _ => None,
    })
}

/// `==`: equality by numeric value regardless of representation.
pub fn numeric_eq(a: &Value, b: &Value) -> Result<bool, VncError> {
    Ok(compare(a, b)? == Some(Ordering::Equal))
}

/// Total order used by sorted collections; NaN sorts last.
pub(crate) fn total_cmp(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Double(x), Value::Double(y)) => x.total_cmp(y),
        _ => match compare(a, b) {
            Ok(Some(ord)) => ord,
            _ => {
                let a_nan = matches!(a, Value::Double(d) if d.is_nan());
                let b_nan = matches!(b, Value::Double(d) if d.is_nan());
                a_nan.cmp(&b_nan)
            }
        },
    }
}

/// Parses a numeric literal as written in source: `42`, `-7`, `0xFF`,
/// `1.5`, `1e3`, `1.5M`, `10N`.
pub fn parse_literal(token: &str) -> Option<Value> {
    if let Some(digits) = token.strip_suffix('N') {
        return BigInt::from_str(digits).ok().map(Value::BigInt);
    }
    if let Some(digits) = token.strip_suffix('M') {
        return BigDecimal::from_str(digits).ok().map(Value::Decimal);
    }
    let (negative, body) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token.strip_prefix('+').unwrap_or(token)),
    };
    if let Some(hex) = body
        .strip_prefix("0x")
        .or_else(|| body.strip_prefix("0X"))
    {
        let n = i64::from_str_radix(hex, 16).ok()?;
        return Some(Value::Long(if negative { -n } else { n }));
    }
    if body.contains(['.', 'e', 'E']) {
        if body.starts_with(['.', 'e', 'E']) || body.ends_with(['e', 'E']) {
            return None;
        }
        return token.parse::<f64>().ok().map(Value::Double);
    }
    token.parse::<i64>().ok().map(Value::Long)
}

pub fn to_f64(value: &Value) -> Result<f64, VncError> {
    match value {
        Value::Long(n) => Ok(*n as f64),
        Value::Double(d) => Ok(*d),
        Value::BigInt(n) => Ok(n.to_f64().unwrap_or(f64::NAN)),
        Value::Decimal(d) => Ok(d.to_f64().unwrap_or(f64::NAN)),
        other => Err(VncError::type_mismatch("number", other.type_name())),
    }
}

pub fn to_long(value: &Value) -> Result<i64, VncError> {
    match value {
        Value::Long(n) => Ok(*n),
        Value::Double(d) => Ok(*d as i64),
        Value::BigInt(n) => n
            .to_i64()
            .ok_or_else(|| VncError::arithmetic("bigint out of long range")),
        Value::Decimal(d) => d
            .to_i64()
            .ok_or_else(|| VncError::arithmetic("decimal out of long range")),
        Value::Char(c) => Ok(*c as i64),
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| {
            VncError::host("NumberFormatException", format!("For input string: \"{}\"", s))
        }),
        other => Err(VncError::type_mismatch("number", other.type_name())),
    }
}

pub fn to_decimal(value: &Value) -> Result<BigDecimal, VncError> {
    match value {
        Value::String(s) => BigDecimal::from_str(s.trim()).map_err(|_| {
            VncError::host("NumberFormatException", format!("For input string: \"{}\"", s))
        }),
        other => match Num::of(other, "decimal")?.widen(3)? {
            Num::Decimal(d) => Ok(d),
            _ => Err(VncError::type_mismatch("decimal", other.type_name())),
        },
    }
}

pub fn to_bigint(value: &Value) -> Result<BigInt, VncError> {
    match value {
        Value::Long(n) => Ok(BigInt::from(*n)),
        Value::BigInt(n) => Ok(n.clone()),
        Value::Double(d) => BigInt::from_f64(*d)
            .ok_or_else(|| VncError::arithmetic(format!("cannot convert {} to bigint", d))),
        Value::Decimal(d) => Ok(d.with_scale(0).as_bigint_and_exponent().0),
        Value::String(s) => BigInt::from_str(s.trim()).map_err(|_| {
            VncError::host("NumberFormatException", format!("For input string: \"{}\"", s))
        }),
        other => Err(VncError::type_mismatch("number", other.type_name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Value {
        Value::Decimal(BigDecimal::from_str(s).unwrap())
    }

    #[test]
    fn widening_follows_the_tower() {
        assert_eq!(add(&Value::Long(1), &Value::Long(2)).unwrap(), Value::Long(3));
        assert_eq!(add(&Value::Long(1), &Value::Double(0.5)).unwrap(), Value::Double(1.5));
        assert_eq!(add(&Value::Long(1), &dec("1.5")).unwrap(), dec("2.5"));
        assert_eq!(add(&Value::Double(1.0), &dec("1.5")).unwrap(), dec("2.5"));
        assert_eq!(
            mul(&Value::BigInt(BigInt::from(2)), &Value::Long(3)).unwrap(),
            Value::BigInt(BigInt::from(6))
        );
    }

    #[test]
    fn long_overflow_and_division_by_zero_fail() {
        assert!(add(&Value::Long(i64::MAX), &Value::Long(1)).is_err());
        let err = div(&Value::Long(1), &Value::Long(0)).unwrap_err();
        assert!(err.is_instance_of("ArithmeticException"));
        assert_eq!(div(&Value::Long(7), &Value::Long(2)).unwrap(), Value::Long(3));
        match div(&Value::Double(1.0), &Value::Long(0)).unwrap() {
            Value::Double(d) => assert!(d.is_infinite()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn mod_and_rem_differ_on_sign() {
        assert_eq!(rem(&Value::Long(-7), &Value::Long(3)).unwrap(), Value::Long(-1));
        assert_eq!(modulo(&Value::Long(-7), &Value::Long(3)).unwrap(), Value::Long(2));
    }

    #[test]
    fn numeric_equality_ignores_representation() {
        assert!(numeric_eq(&Value::Long(1), &Value::Double(1.0)).unwrap());
        assert!(numeric_eq(&Value::Long(1), &dec("1.00")).unwrap());
        assert!(!numeric_eq(&Value::Long(1), &Value::Long(2)).unwrap());
    }

    #[test]
    fn parses_literals() {
        assert_eq!(parse_literal("42"), Some(Value::Long(42)));
        assert_eq!(parse_literal("-0x10"), Some(Value::Long(-16)));
        assert_eq!(parse_literal("1e3"), Some(Value::Double(1000.0)));
        assert_eq!(parse_literal("1.5M"), Some(dec("1.5")));
        assert_eq!(parse_literal("10N"), Some(Value::BigInt(BigInt::from(10))));
        assert_eq!(parse_literal("12abc"), None);
        assert_eq!(parse_literal("99999999999999999999"), None);
    }
}
