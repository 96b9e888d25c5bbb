//! Assignment and compound-arithmetic semantics.
//!
//! The value-category table here is the most load-bearing contract in
//! the evaluator. For compound addition/subtraction the permitted
//! (type, literal-flag) pairings deliberately reject combinations that
//! would lose an author's unit intent: a literal RTIME added to an
//! INTEGER is an error even though the same value through a variable is
//! accepted as seconds.

use chrono::Duration;

use crate::value::Value;
use crate::RuntimeError;

fn mismatch(op: &str, left: &Value, right: &Value) -> RuntimeError {
    let lty = left.ty().map(|t| t.to_string()).unwrap_or_else(|| "NULL".into());
    let rty = right.ty().map(|t| t.to_string()).unwrap_or_else(|| "NULL".into());
    let lit = if right.is_literal() { " literal" } else { "" };
    RuntimeError::TypeMismatch(format!("operator {op} cannot apply {rty}{lit} to {lty}"))
}

/// Apply a `set` operator to the current left value.
pub fn apply(operator: &str, left: &mut Value, right: Value) -> Result<(), RuntimeError> {
    match operator {
        "=" => assign(left, right),
        "+=" => addition(left, &right),
        "-=" => subtraction(left, &right),
        "*=" => multiplication(left, &right),
        "/=" => division(left, &right),
        "%=" => remainder(left, &right),
        "|=" => bitwise(operator, left, &right, |a, b| a | b),
        "&=" => bitwise(operator, left, &right, |a, b| a & b),
        "^=" => bitwise(operator, left, &right, |a, b| a ^ b),
        "<<=" => bitwise(operator, left, &right, |a, b| a.wrapping_shl(b as u32)),
        ">>=" => bitwise(operator, left, &right, |a, b| a.wrapping_shr(b as u32)),
        "rol=" => bitwise(operator, left, &right, |a, b| {
            (a as u64).rotate_left(b as u32) as i64
        }),
        "ror=" => bitwise(operator, left, &right, |a, b| {
            (a as u64).rotate_right(b as u32) as i64
        }),
        "&&=" => logical(operator, left, &right, |a, b| a && b),
        "||=" => logical(operator, left, &right, |a, b| a || b),
        _ => Err(RuntimeError::Evaluation(format!(
            "unknown assignment operator {operator}"
        ))),
    }
}

/// Identity assignment (`=`).
///
/// Preserves the right value's literal flag. The STRING left-hand side
/// is looser: any string-coercible value is accepted in its canonical
/// form. FLOAT widens from the numeric family; IP accepts a parseable
/// string; the opaque types require an exact match.
pub fn assign(left: &mut Value, right: Value) -> Result<(), RuntimeError> {
    let literal = right.is_literal();
    match (&mut *left, &right) {
        (Value::Integer { value, literal: l }, Value::Integer { value: rv, .. }) => {
            *value = *rv;
            *l = literal;
        }
        (Value::Float { value, literal: l }, Value::Float { value: rv, .. }) => {
            *value = *rv;
            *l = literal;
        }
        (Value::Float { value, literal: l }, Value::Integer { value: rv, .. }) => {
            *value = *rv as f64;
            *l = literal;
        }
        (Value::Float { value, literal: l }, Value::RTime { ms, .. }) => {
            *value = *ms as f64 / 1000.0;
            *l = literal;
        }
        (Value::Float { value, literal: l }, Value::Time { value: rv, .. }) => {
            *value = rv.timestamp() as f64;
            *l = literal;
        }
        (Value::String { value, literal: l }, _) => {
            *value = right.to_canonical_string()?;
            *l = literal;
        }
        (Value::Bool { value, literal: l }, Value::Bool { value: rv, .. }) => {
            *value = *rv;
            *l = literal;
        }
        (Value::RTime { ms, literal: l }, Value::RTime { ms: rv, .. }) => {
            *ms = *rv;
            *l = literal;
        }
        (Value::Time { value, literal: l }, Value::Time { value: rv, .. }) => {
            *value = *rv;
            *l = literal;
        }
        (Value::Ip { value, literal: l }, Value::Ip { value: rv, .. }) => {
            *value = *rv;
            *l = literal;
        }
        (Value::Ip { value, literal: l }, Value::String { value: rv, .. }) => {
            *value = rv
                .parse()
                .map_err(|_| RuntimeError::Evaluation(format!("invalid IP address {rv}")))?;
            *l = literal;
        }
        (Value::Backend { name, literal: l }, Value::Backend { name: rv, .. }) => {
            *name = rv.clone();
            *l = literal;
        }
        (Value::Acl { name, literal: l }, Value::Acl { name: rv, .. }) => {
            *name = rv.clone();
            *l = literal;
        }
        // Typed IDs are loose on purpose: they hold whatever name the
        // right side renders to.
        (Value::Ident { name, literal: l }, _) => {
            *name = right.to_canonical_string()?;
            *l = literal;
        }
        _ => return Err(mismatch("=", left, &right)),
    }
    Ok(())
}

/// Compound addition (`+=`).
pub fn addition(left: &mut Value, right: &Value) -> Result<(), RuntimeError> {
    combine(left, right, "+=", false)
}

/// Compound subtraction (`-=`); same table as addition, negated.
pub fn subtraction(left: &mut Value, right: &Value) -> Result<(), RuntimeError> {
    combine(left, right, "-=", true)
}

/// The shared addition/subtraction table.
fn combine(
    left: &mut Value,
    right: &Value,
    op: &str,
    negate: bool,
) -> Result<(), RuntimeError> {
    let sign = if negate { -1i64 } else { 1i64 };
    let fsign = sign as f64;
    match (&mut *left, right) {
        (Value::Integer { value, literal }, Value::Integer { value: rv, .. }) => {
            *value += sign * rv;
            *literal = false;
        }
        (Value::Integer { value, literal }, Value::Float { value: rv, literal: false }) => {
            *value += sign * (*rv as i64);
            *literal = false;
        }
        (Value::Integer { value, literal }, Value::RTime { ms, literal: false }) => {
            *value += sign * (ms / 1000);
            *literal = false;
        }
        (Value::Integer { value, literal }, Value::Time { value: rv, .. }) => {
            *value += sign * rv.timestamp();
            *literal = false;
        }
        (Value::Float { value, literal }, Value::Integer { value: rv, .. }) => {
            *value += fsign * (*rv as f64);
            *literal = false;
        }
        (Value::Float { value, literal }, Value::Float { value: rv, .. }) => {
            *value += fsign * rv;
            *literal = false;
        }
        (Value::Float { value, literal }, Value::RTime { ms, literal: false }) => {
            *value += fsign * (*ms as f64 / 1000.0);
            *literal = false;
        }
        (Value::Float { value, literal }, Value::Time { value: rv, .. }) => {
            *value += fsign * (rv.timestamp() as f64);
            *literal = false;
        }
        (Value::RTime { ms, literal }, Value::Integer { value: rv, literal: false }) => {
            *ms += sign * rv * 1000;
            *literal = false;
        }
        (Value::RTime { ms, literal }, Value::Float { value: rv, literal: false }) => {
            *ms += sign * ((rv * 1000.0) as i64);
            *literal = false;
        }
        (Value::RTime { ms, literal }, Value::RTime { ms: rv, .. }) => {
            *ms += sign * rv;
            *literal = false;
        }
        (Value::RTime { ms, literal }, Value::Time { value: rv, .. }) => {
            *ms += sign * rv.timestamp() * 1000;
            *literal = false;
        }
        (Value::Time { value, literal }, Value::Integer { value: rv, literal: false }) => {
            *value += Duration::seconds(sign * rv);
            *literal = false;
        }
        (Value::Time { value, literal }, Value::Float { value: rv, literal: false }) => {
            *value += Duration::seconds(sign * (*rv as i64));
            *literal = false;
        }
        (Value::Time { value, literal }, Value::RTime { ms, .. }) => {
            *value += Duration::milliseconds(sign * ms);
            *literal = false;
        }
        _ => return Err(mismatch(op, left, right)),
    }
    Ok(())
}

/// Compound multiplication (`*=`): numeric, with the literal FLOAT and
/// RTIME restrictions of the addition table.
pub fn multiplication(left: &mut Value, right: &Value) -> Result<(), RuntimeError> {
    scale(left, right, "*=", false)
}

/// Compound division (`/=`). Division by zero is an evaluation error.
pub fn division(left: &mut Value, right: &Value) -> Result<(), RuntimeError> {
    scale(left, right, "/=", true)
}

fn scale(left: &mut Value, right: &Value, op: &str, divide: bool) -> Result<(), RuntimeError> {
    fn factor(right: &Value) -> Option<(f64, bool)> {
        match right {
            Value::Integer { value, .. } => Some((*value as f64, true)),
            Value::Float {
                value,
                literal: false,
            } => Some((*value, false)),
            _ => None,
        }
    }

    match &mut *left {
        Value::Integer { value, literal } => {
            let Some((factor, integral)) = factor(right) else {
                return Err(mismatch(op, left, right));
            };
            if divide {
                if factor == 0.0 {
                    return Err(RuntimeError::Evaluation("division by zero".to_string()));
                }
                *value = if integral {
                    *value / (factor as i64)
                } else {
                    (*value as f64 / factor) as i64
                };
            } else {
                *value = (*value as f64 * factor) as i64;
            }
            *literal = false;
        }
        Value::Float { value, literal } => {
            let (factor, _) = match right {
                Value::Integer { value, .. } => (*value as f64, true),
                Value::Float { value, .. } => (*value, false),
                _ => return Err(mismatch(op, left, right)),
            };
            if divide {
                if factor == 0.0 {
                    return Err(RuntimeError::Evaluation("division by zero".to_string()));
                }
                *value /= factor;
            } else {
                *value *= factor;
            }
            *literal = false;
        }
        Value::RTime { ms, literal } => {
            let Some((factor, _)) = factor(right) else {
                return Err(mismatch(op, left, right));
            };
            if divide {
                if factor == 0.0 {
                    return Err(RuntimeError::Evaluation("division by zero".to_string()));
                }
                *ms = (*ms as f64 / factor) as i64;
            } else {
                *ms = (*ms as f64 * factor) as i64;
            }
            *literal = false;
        }
        _ => return Err(mismatch(op, left, right)),
    }
    Ok(())
}

/// Compound remainder (`%=`): INTEGER only.
pub fn remainder(left: &mut Value, right: &Value) -> Result<(), RuntimeError> {
    match (&mut *left, right) {
        (Value::Integer { value, literal }, Value::Integer { value: rv, .. }) => {
            if *rv == 0 {
                return Err(RuntimeError::Evaluation("remainder by zero".to_string()));
            }
            *value %= rv;
            *literal = false;
            Ok(())
        }
        _ => Err(mismatch("%=", left, right)),
    }
}

/// Bitwise family (`|= &= ^= <<= >>= rol= ror=`): INTEGER only.
fn bitwise(
    op: &str,
    left: &mut Value,
    right: &Value,
    apply: fn(i64, i64) -> i64,
) -> Result<(), RuntimeError> {
    match (&mut *left, right) {
        (Value::Integer { value, literal }, Value::Integer { value: rv, .. }) => {
            *value = apply(*value, *rv);
            *literal = false;
            Ok(())
        }
        _ => Err(mismatch(op, left, right)),
    }
}

/// Logical family (`&&= ||=`): BOOL only.
fn logical(
    op: &str,
    left: &mut Value,
    right: &Value,
    apply: fn(bool, bool) -> bool,
) -> Result<(), RuntimeError> {
    match (&mut *left, right) {
        (Value::Bool { value, literal }, Value::Bool { value: rv, .. }) => {
            *value = apply(*value, *rv);
            *literal = false;
            Ok(())
        }
        _ => Err(mismatch(op, left, right)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::net::IpAddr;

    fn int(value: i64, literal: bool) -> Value {
        Value::Integer { value, literal }
    }

    fn float(value: f64, literal: bool) -> Value {
        Value::Float { value, literal }
    }

    fn rtime_s(seconds: i64, literal: bool) -> Value {
        Value::RTime {
            ms: seconds * 1000,
            literal,
        }
    }

    fn time(timestamp: i64) -> Value {
        Value::Time {
            value: Utc.timestamp_opt(timestamp, 0).single().unwrap(),
            literal: false,
        }
    }

    #[test]
    fn test_addition_integer_table() {
        let cases: Vec<(Value, Option<i64>)> = vec![
            (int(100, false), Some(110)),
            (int(100, true), Some(110)),
            (float(50.0, false), Some(60)),
            (float(50.0, true), None),
            (Value::string("example"), None),
            (rtime_s(100, false), Some(110)),
            (rtime_s(100, true), None),
            (time(1_000), Some(1_010)),
            (Value::bool(true), None),
            (
                Value::Ip {
                    value: "127.0.0.1".parse::<IpAddr>().unwrap(),
                    literal: false,
                },
                None,
            ),
            (
                Value::Backend {
                    name: "origin".into(),
                    literal: false,
                },
                None,
            ),
        ];

        for (i, (right, expect)) in cases.into_iter().enumerate() {
            let mut left = int(10, false);
            let result = addition(&mut left, &right);
            match expect {
                Some(value) => {
                    assert!(result.is_ok(), "case {i} should succeed");
                    assert_eq!(left, int(value, false), "case {i}");
                }
                None => assert!(result.is_err(), "case {i} should fail"),
            }
        }
    }

    #[test]
    fn test_addition_float_accepts_literal_float() {
        let mut left = float(10.0, false);
        addition(&mut left, &float(50.0, true)).unwrap();
        assert_eq!(left, float(60.0, false));
    }

    #[test]
    fn test_addition_string_rejects_everything() {
        for right in [
            int(1, false),
            int(1, true),
            Value::string("x"),
            rtime_s(1, false),
            time(0),
        ] {
            let mut left = Value::string("left");
            assert!(addition(&mut left, &right).is_err());
        }
    }

    #[test]
    fn test_addition_rtime_table() {
        let mut left = rtime_s(1, false);
        addition(&mut left, &int(100, false)).unwrap();
        assert_eq!(left, rtime_s(101, false));

        let mut left = rtime_s(1, false);
        assert!(addition(&mut left, &int(100, true)).is_err());

        let mut left = rtime_s(1, false);
        addition(&mut left, &rtime_s(100, true)).unwrap();
        assert_eq!(left, rtime_s(101, false));
    }

    #[test]
    fn test_addition_time_table() {
        let mut left = time(1_000);
        addition(&mut left, &rtime_s(100, true)).unwrap();
        assert_eq!(left, time(1_100));

        let mut left = time(1_000);
        assert!(addition(&mut left, &time(2_000)).is_err());

        let mut left = time(1_000);
        assert!(addition(&mut left, &int(100, true)).is_err());
        addition(&mut left, &int(100, false)).unwrap();
        assert_eq!(left, time(1_100));
    }

    #[test]
    fn test_subtraction_mirrors_addition() {
        let mut left = int(10, false);
        subtraction(&mut left, &rtime_s(3, false)).unwrap();
        assert_eq!(left, int(7, false));

        let mut left = int(10, false);
        assert!(subtraction(&mut left, &rtime_s(3, true)).is_err());
    }

    #[test]
    fn test_identity_preserves_literal_flag() {
        let mut left = int(0, false);
        assign(&mut left, int(7, true)).unwrap();
        assert_eq!(left, int(7, true));

        assign(&mut left, int(9, false)).unwrap();
        assert_eq!(left, int(9, false));
    }

    #[test]
    fn test_identity_string_coercion() {
        let mut left = Value::string("");
        assign(&mut left, int(42, true)).unwrap();
        assert_eq!(left.to_canonical_string().unwrap(), "42");

        let mut left = Value::string("");
        let backend = Value::Backend {
            name: "origin".into(),
            literal: false,
        };
        assert!(assign(&mut left, backend).is_err());
    }

    #[test]
    fn test_identity_ip_from_string() {
        let mut left = Value::zero_of(vex_sem::ValueType::Ip);
        assign(&mut left, Value::string("192.0.2.1")).unwrap();
        let Value::Ip { value, .. } = left else { panic!() };
        assert_eq!(value.to_string(), "192.0.2.1");
    }

    #[test]
    fn test_bitwise_and_rotate() {
        let mut left = int(0b1010, false);
        apply("&=", &mut left, int(0b0110, false)).unwrap();
        assert_eq!(left, int(0b0010, false));

        let mut left = int(1, false);
        apply("rol=", &mut left, int(1, false)).unwrap();
        assert_eq!(left, int(2, false));

        let mut left = int(1, false);
        apply("ror=", &mut left, int(1, false)).unwrap();
        assert_eq!(left, int(i64::MIN, false));
    }

    #[test]
    fn test_logical_assign() {
        let mut left = Value::bool(true);
        apply("&&=", &mut left, Value::bool(false)).unwrap();
        assert_eq!(left, Value::bool(false));

        let mut left = Value::bool(false);
        apply("||=", &mut left, Value::bool(true)).unwrap();
        assert_eq!(left, Value::bool(true));

        let mut left = Value::bool(false);
        assert!(apply("&&=", &mut left, int(1, false)).is_err());
    }

    #[test]
    fn test_division_by_zero() {
        let mut left = int(10, false);
        assert!(division(&mut left, &int(0, false)).is_err());
    }

    #[test]
    fn test_arithmetic_clears_literal_flag() {
        let mut left = int(1, true);
        addition(&mut left, &int(1, true)).unwrap();
        assert!(!left.is_literal());
    }

    mod matrix {
        //! Property test: the addition outcome for every (left type,
        //! right type, literal flag) triple matches the declared table.

        use super::*;
        use proptest::prelude::*;
        use vex_sem::ValueType;

        fn sample(ty: ValueType, literal: bool) -> Value {
            match ty {
                ValueType::Integer => Value::Integer { value: 7, literal },
                ValueType::Float => Value::Float {
                    value: 7.0,
                    literal,
                },
                ValueType::String => Value::String {
                    value: "seven".into(),
                    literal,
                },
                ValueType::Bool => Value::Bool {
                    value: true,
                    literal,
                },
                ValueType::RTime => Value::RTime {
                    ms: 7_000,
                    literal,
                },
                ValueType::Time => Value::Time {
                    value: Utc.timestamp_opt(7, 0).single().unwrap(),
                    literal,
                },
                ValueType::Ip => Value::Ip {
                    value: "127.0.0.1".parse().unwrap(),
                    literal,
                },
                ValueType::Backend => Value::Backend {
                    name: "origin".into(),
                    literal,
                },
                ValueType::Acl => Value::Acl {
                    name: "internal".into(),
                    literal,
                },
                ValueType::Id => Value::Ident {
                    name: "t".into(),
                    literal,
                },
            }
        }

        /// The declared addition table.
        fn table_allows(left: ValueType, right: ValueType, right_literal: bool) -> bool {
            use ValueType::{Float, Integer, RTime, Time};
            match left {
                Integer => match right {
                    Integer => true,
                    Float | RTime => !right_literal,
                    Time => true,
                    _ => false,
                },
                Float => match right {
                    Integer | Float => true,
                    RTime => !right_literal,
                    Time => true,
                    _ => false,
                },
                RTime => match right {
                    Integer | Float => !right_literal,
                    RTime | Time => true,
                    _ => false,
                },
                Time => match right {
                    Integer | Float => !right_literal,
                    RTime => true,
                    _ => false,
                },
                _ => false,
            }
        }

        const TYPES: &[ValueType] = &[
            ValueType::Integer,
            ValueType::Float,
            ValueType::String,
            ValueType::Bool,
            ValueType::RTime,
            ValueType::Time,
            ValueType::Ip,
            ValueType::Backend,
            ValueType::Acl,
            ValueType::Id,
        ];

        proptest! {
            #[test]
            fn addition_matches_table(
                left_idx in 0..TYPES.len(),
                right_idx in 0..TYPES.len(),
                left_literal: bool,
                right_literal: bool,
            ) {
                let left_ty = TYPES[left_idx];
                let right_ty = TYPES[right_idx];
                let mut left = sample(left_ty, left_literal);
                let right = sample(right_ty, right_literal);

                let outcome = addition(&mut left, &right);
                let expected = table_allows(left_ty, right_ty, right_literal);
                prop_assert_eq!(
                    outcome.is_ok(),
                    expected,
                    "{} += {} (literal={})",
                    left_ty,
                    right_ty,
                    right_literal
                );
                if expected {
                    // Arithmetic always clears the literal flag.
                    prop_assert!(!left.is_literal());
                }
            }
        }
    }
}
