//! Runtime values.
//!
//! Every carrying variant records its payload together with the literal
//! flag: true when the value came straight from a source literal, false
//! once it has been read back from a variable or produced by any
//! computation. The flag is load-bearing: the assignment kernel and
//! builtin dispatch reject certain literal/non-literal combinations.

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, TimeZone, Utc};
use vex_sem::ValueType;

use crate::RuntimeError;

/// A runtime value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Integer { value: i64, literal: bool },
    Float { value: f64, literal: bool },
    String { value: String, literal: bool },
    Bool { value: bool, literal: bool },
    /// Signed duration in milliseconds (sub-millisecond parts floor).
    RTime { ms: i64, literal: bool },
    /// Absolute time, second precision.
    Time { value: DateTime<Utc>, literal: bool },
    Ip { value: IpAddr, literal: bool },
    Backend { name: String, literal: bool },
    Acl { name: String, literal: bool },
    /// Reference to a declared object passed by name.
    Ident { name: String, literal: bool },
    /// Returned by partially-implemented builtins and missing lookups.
    Null,
}

impl Value {
    /// Non-literal integer.
    pub fn integer(value: i64) -> Value {
        Value::Integer {
            value,
            literal: false,
        }
    }

    /// Non-literal string.
    pub fn string(value: impl Into<std::string::String>) -> Value {
        Value::String {
            value: value.into(),
            literal: false,
        }
    }

    /// Non-literal boolean.
    pub fn bool(value: bool) -> Value {
        Value::Bool {
            value,
            literal: false,
        }
    }

    /// Non-literal float.
    pub fn float(value: f64) -> Value {
        Value::Float {
            value,
            literal: false,
        }
    }

    /// Non-literal duration from milliseconds.
    pub fn rtime_ms(ms: i64) -> Value {
        Value::RTime { ms, literal: false }
    }

    /// The static type, or `None` for NULL.
    pub fn ty(&self) -> Option<ValueType> {
        let ty = match self {
            Value::Integer { .. } => ValueType::Integer,
            Value::Float { .. } => ValueType::Float,
            Value::String { .. } => ValueType::String,
            Value::Bool { .. } => ValueType::Bool,
            Value::RTime { .. } => ValueType::RTime,
            Value::Time { .. } => ValueType::Time,
            Value::Ip { .. } => ValueType::Ip,
            Value::Backend { .. } => ValueType::Backend,
            Value::Acl { .. } => ValueType::Acl,
            Value::Ident { .. } => ValueType::Id,
            Value::Null => return None,
        };
        Some(ty)
    }

    /// Whether the value originated from a source literal.
    pub fn is_literal(&self) -> bool {
        match self {
            Value::Integer { literal, .. }
            | Value::Float { literal, .. }
            | Value::String { literal, .. }
            | Value::Bool { literal, .. }
            | Value::RTime { literal, .. }
            | Value::Time { literal, .. }
            | Value::Ip { literal, .. }
            | Value::Backend { literal, .. }
            | Value::Acl { literal, .. }
            | Value::Ident { literal, .. } => *literal,
            Value::Null => false,
        }
    }

    /// A copy with the literal flag cleared, as a variable read returns.
    pub fn deliteralized(mut self) -> Value {
        match &mut self {
            Value::Integer { literal, .. }
            | Value::Float { literal, .. }
            | Value::String { literal, .. }
            | Value::Bool { literal, .. }
            | Value::RTime { literal, .. }
            | Value::Time { literal, .. }
            | Value::Ip { literal, .. }
            | Value::Backend { literal, .. }
            | Value::Acl { literal, .. }
            | Value::Ident { literal, .. } => *literal = false,
            Value::Null => {}
        }
        self
    }

    /// The zero value of a declared type.
    pub fn zero_of(ty: ValueType) -> Value {
        match ty {
            ValueType::Integer => Value::integer(0),
            ValueType::Float => Value::float(0.0),
            ValueType::String => Value::string(""),
            ValueType::Bool => Value::bool(false),
            ValueType::RTime => Value::rtime_ms(0),
            ValueType::Time => Value::Time {
                value: Utc.timestamp_opt(0, 0).single().unwrap_or_default(),
                literal: false,
            },
            ValueType::Ip => Value::Ip {
                value: IpAddr::from([0, 0, 0, 0]),
                literal: false,
            },
            ValueType::Backend => Value::Backend {
                name: String::new(),
                literal: false,
            },
            ValueType::Acl => Value::Acl {
                name: String::new(),
                literal: false,
            },
            ValueType::Id => Value::Ident {
                name: String::new(),
                literal: false,
            },
        }
    }

    /// Canonical string coercion.
    ///
    /// Every type has one except the opaque `ACL` and `BACKEND` objects.
    /// Booleans print `1`/`0`; durations print seconds with millisecond
    /// precision; times print as HTTP dates.
    pub fn to_canonical_string(&self) -> Result<std::string::String, RuntimeError> {
        let rendered = match self {
            Value::Integer { value, .. } => value.to_string(),
            Value::Float { value, .. } => format!("{value:.3}"),
            Value::String { value, .. } => value.clone(),
            Value::Bool { value, .. } => if *value { "1" } else { "0" }.to_string(),
            Value::RTime { ms, .. } => format!("{}.{:03}", ms / 1000, (ms % 1000).abs()),
            Value::Time { value, .. } => format_http_date(*value),
            Value::Ip { value, .. } => value.to_string(),
            Value::Ident { name, .. } => name.clone(),
            Value::Null => std::string::String::new(),
            Value::Backend { .. } => {
                return Err(RuntimeError::TypeMismatch(
                    "BACKEND cannot be used as a string".to_string(),
                ))
            }
            Value::Acl { .. } => {
                return Err(RuntimeError::TypeMismatch(
                    "ACL cannot be used as a string".to_string(),
                ))
            }
        };
        Ok(rendered)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_canonical_string() {
            Ok(rendered) => f.write_str(&rendered),
            Err(_) => match self {
                Value::Backend { name, .. } => write!(f, "backend:{name}"),
                Value::Acl { name, .. } => write!(f, "acl:{name}"),
                _ => Ok(()),
            },
        }
    }
}

/// `Mon, 02 Jan 2006 15:04:05 GMT`
pub fn format_http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parse an RTIME lexeme (`10s`, `1.5h`, `250ms`) into milliseconds.
///
/// Sub-millisecond fractions floor.
pub fn parse_rtime(lexeme: &str) -> Option<i64> {
    let (multiplier_ms, digits) = if let Some(d) = lexeme.strip_suffix("ms") {
        (1.0, d)
    } else if let Some(d) = lexeme.strip_suffix('s') {
        (1_000.0, d)
    } else if let Some(d) = lexeme.strip_suffix('m') {
        (60_000.0, d)
    } else if let Some(d) = lexeme.strip_suffix('h') {
        (3_600_000.0, d)
    } else if let Some(d) = lexeme.strip_suffix('d') {
        (86_400_000.0, d)
    } else if let Some(d) = lexeme.strip_suffix('y') {
        (31_536_000_000.0, d)
    } else {
        return None;
    };
    let number: f64 = digits.parse().ok()?;
    Some((number * multiplier_ms).floor() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rtime_units() {
        assert_eq!(parse_rtime("250ms"), Some(250));
        assert_eq!(parse_rtime("10s"), Some(10_000));
        assert_eq!(parse_rtime("1.5h"), Some(5_400_000));
        assert_eq!(parse_rtime("1d"), Some(86_400_000));
        assert_eq!(parse_rtime("1y"), Some(31_536_000_000));
        assert_eq!(parse_rtime("10"), None);
        assert_eq!(parse_rtime("10q"), None);
    }

    #[test]
    fn test_rtime_floor() {
        // 0.0005s floors to 0ms.
        assert_eq!(parse_rtime("0.0005s"), Some(0));
        assert_eq!(parse_rtime("0.0015s"), Some(1));
    }

    #[test]
    fn test_canonical_strings() {
        assert_eq!(Value::integer(42).to_canonical_string().unwrap(), "42");
        assert_eq!(Value::float(1.5).to_canonical_string().unwrap(), "1.500");
        assert_eq!(Value::bool(true).to_canonical_string().unwrap(), "1");
        assert_eq!(Value::bool(false).to_canonical_string().unwrap(), "0");
        assert_eq!(
            Value::rtime_ms(10_000).to_canonical_string().unwrap(),
            "10.000"
        );
        assert_eq!(Value::Null.to_canonical_string().unwrap(), "");
    }

    #[test]
    fn test_http_date_format() {
        let time = Utc.timestamp_opt(1_136_214_245, 0).single().unwrap();
        assert_eq!(format_http_date(time), "Mon, 02 Jan 2006 15:04:05 GMT");
    }

    #[test]
    fn test_opaque_types_reject_string_coercion() {
        let backend = Value::Backend {
            name: "origin".into(),
            literal: false,
        };
        assert!(backend.to_canonical_string().is_err());
    }

    #[test]
    fn test_deliteralized() {
        let lit = Value::Integer {
            value: 1,
            literal: true,
        };
        assert!(lit.is_literal());
        assert!(!lit.deliteralized().is_literal());
    }
}
