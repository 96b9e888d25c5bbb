//! The runtime builtin registry.
//!
//! Bodies attach to the signature table declared in `vex-sem`; dispatch
//! picks the first signature whose arity and argument types match the
//! provided values. The registry is process-wide and immutable after
//! first use. Entries flagged unimplemented return [`Value::Null`]
//! together with a not-implemented error.

use std::sync::OnceLock;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::format::{Item, StrftimeItems};
use chrono::Duration;
use indexmap::IndexMap;
use vex_sem::builtin::{BuiltinSpec, CATALOG};
use vex_sem::ValueType;

use crate::context::Context;
use crate::value::Value;
use crate::RuntimeError;

/// A builtin body: evaluation context plus argument values in, one value
/// out.
pub type BuiltinFn = fn(&mut Context, &[Value]) -> Result<Value, RuntimeError>;

/// One registered builtin.
pub struct Builtin {
    pub spec: &'static BuiltinSpec,
    pub body: BuiltinFn,
}

/// Name-indexed builtin dictionary.
pub struct Registry {
    entries: IndexMap<&'static str, Builtin>,
}

impl Registry {
    fn build() -> Registry {
        let mut entries = IndexMap::new();
        for spec in CATALOG {
            let body = body_for(spec.name);
            entries.insert(spec.name, Builtin { spec, body });
        }
        Registry { entries }
    }

    /// Look up a builtin by name.
    pub fn get(&self, name: &str) -> Option<&Builtin> {
        self.entries.get(name)
    }

    /// Dispatch a call: match a signature, then run the body.
    pub fn call(
        &self,
        ctx: &mut Context,
        name: &str,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        let builtin = self
            .get(name)
            .ok_or_else(|| RuntimeError::UndefinedFunction(name.to_string()))?;

        let arg_types: Vec<Option<ValueType>> = args.iter().map(Value::ty).collect();
        if !builtin
            .spec
            .signatures
            .iter()
            .any(|signature| signature.matches(&arg_types))
        {
            return Err(RuntimeError::ArityMismatch(name.to_string()));
        }
        (builtin.body)(ctx, args).map_err(|err| match err {
            // Stub bodies cannot name themselves; fill it in here.
            RuntimeError::NotImplemented(msg) if msg.is_empty() => {
                RuntimeError::NotImplemented(name.to_string())
            }
            other => other,
        })
    }
}

/// The process-wide registry, built once.
pub fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(Registry::build)
}

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

fn string_arg(args: &[Value], index: usize) -> Result<String, RuntimeError> {
    args.get(index)
        .ok_or_else(|| RuntimeError::ArityMismatch(format!("missing argument {index}")))?
        .to_canonical_string()
}

fn integer_arg(args: &[Value], index: usize) -> Result<i64, RuntimeError> {
    match args.get(index) {
        Some(Value::Integer { value, .. }) => Ok(*value),
        _ => Err(RuntimeError::TypeMismatch(format!(
            "argument {index} must be INTEGER"
        ))),
    }
}

fn float_arg(args: &[Value], index: usize) -> Result<f64, RuntimeError> {
    match args.get(index) {
        Some(Value::Float { value, .. }) => Ok(*value),
        Some(Value::Integer { value, .. }) => Ok(*value as f64),
        _ => Err(RuntimeError::TypeMismatch(format!(
            "argument {index} must be FLOAT"
        ))),
    }
}

fn ident_arg(args: &[Value], index: usize) -> Result<String, RuntimeError> {
    match args.get(index) {
        Some(Value::Ident { name, .. }) => Ok(name.clone()),
        Some(Value::Backend { name, .. }) | Some(Value::Acl { name, .. }) => Ok(name.clone()),
        _ => Err(RuntimeError::TypeMismatch(format!(
            "argument {index} must be an identifier"
        ))),
    }
}

fn time_arg(args: &[Value], index: usize) -> Result<chrono::DateTime<chrono::Utc>, RuntimeError> {
    match args.get(index) {
        Some(Value::Time { value, .. }) => Ok(*value),
        _ => Err(RuntimeError::TypeMismatch(format!(
            "argument {index} must be TIME"
        ))),
    }
}

fn rtime_arg(args: &[Value], index: usize) -> Result<i64, RuntimeError> {
    match args.get(index) {
        Some(Value::RTime { ms, .. }) => Ok(*ms),
        _ => Err(RuntimeError::TypeMismatch(format!(
            "argument {index} must be RTIME"
        ))),
    }
}

/// Translate VCL backreferences (`\1`) to the regex crate's `${1}`.
fn translate_replacement(replacement: &str) -> String {
    let mut out = String::with_capacity(replacement.len());
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some(d) if d.is_ascii_digit() => {
                    let d = *d;
                    chars.next();
                    out.push_str(&format!("${{{d}}}"));
                    continue;
                }
                Some('\\') => {
                    chars.next();
                    out.push('\\');
                    continue;
                }
                _ => {}
            }
        }
        if c == '$' {
            // Literal dollar must not start a capture reference.
            out.push_str("$$");
            continue;
        }
        out.push(c);
    }
    out
}

// ---------------------------------------------------------------------------
// Bodies
// ---------------------------------------------------------------------------

fn body_for(name: &str) -> BuiltinFn {
    match name {
        "std.tolower" => |_, args| Ok(Value::string(string_arg(args, 0)?.to_lowercase())),
        "std.toupper" => |_, args| Ok(Value::string(string_arg(args, 0)?.to_uppercase())),
        "std.strlen" => |_, args| Ok(Value::integer(string_arg(args, 0)?.len() as i64)),
        "std.prefixof" => {
            |_, args| Ok(Value::bool(string_arg(args, 0)?.starts_with(&string_arg(args, 1)?)))
        }
        "std.suffixof" => {
            |_, args| Ok(Value::bool(string_arg(args, 0)?.ends_with(&string_arg(args, 1)?)))
        }
        "std.strstr" => |_, args| {
            let haystack = string_arg(args, 0)?;
            let needle = string_arg(args, 1)?;
            Ok(match haystack.find(&needle) {
                Some(pos) => Value::string(haystack[pos..].to_string()),
                None => Value::string(""),
            })
        },
        "std.replace" => |_, args| {
            let input = string_arg(args, 0)?;
            let target = string_arg(args, 1)?;
            let replacement = string_arg(args, 2)?;
            Ok(Value::string(input.replacen(&target, &replacement, 1)))
        },
        "std.itoa" => |_, args| {
            let value = integer_arg(args, 0)?;
            let base = if args.len() > 1 { integer_arg(args, 1)? } else { 10 };
            if !(2..=36).contains(&base) {
                return Err(RuntimeError::Evaluation(format!("invalid radix {base}")));
            }
            Ok(Value::string(format_radix(value, base as u32)))
        },
        "std.atoi" => |_, args| {
            Ok(Value::integer(
                string_arg(args, 0)?.trim().parse::<i64>().unwrap_or(0),
            ))
        },
        "std.atof" => |_, args| {
            Ok(Value::float(
                string_arg(args, 0)?.trim().parse::<f64>().unwrap_or(0.0),
            ))
        },
        "std.strtol" => |_, args| {
            let input = string_arg(args, 0)?;
            let base = integer_arg(args, 1)?;
            if !(2..=36).contains(&base) {
                return Err(RuntimeError::Evaluation(format!("invalid radix {base}")));
            }
            Ok(Value::integer(
                i64::from_str_radix(input.trim(), base as u32).unwrap_or(0),
            ))
        },
        "std.ip" => |_, args| {
            let input = string_arg(args, 0)?;
            let fallback = string_arg(args, 1)?;
            let parsed = input
                .parse()
                .or_else(|_| fallback.parse())
                .map_err(|_| RuntimeError::Evaluation(format!("invalid IP address {input}")))?;
            Ok(Value::Ip {
                value: parsed,
                literal: false,
            })
        },
        "substr" => |_, args| {
            let input = string_arg(args, 0)?;
            let offset = integer_arg(args, 1)?;
            let chars: Vec<char> = input.chars().collect();
            let len = chars.len() as i64;
            let start = if offset < 0 {
                (len + offset).max(0)
            } else {
                offset.min(len)
            } as usize;
            let take = if args.len() > 2 {
                integer_arg(args, 2)?.max(0) as usize
            } else {
                chars.len()
            };
            Ok(Value::string(
                chars[start..].iter().take(take).collect::<String>(),
            ))
        },
        "regsub" => |_, args| regsub_impl(args, false),
        "regsuball" => |_, args| regsub_impl(args, true),
        "if" => |_, args| {
            let Some(Value::Bool { value, .. }) = args.first() else {
                return Err(RuntimeError::TypeMismatch(
                    "if condition must be BOOL".to_string(),
                ));
            };
            let index = if *value { 1 } else { 2 };
            Ok(Value::string(string_arg(args, index)?))
        },
        "time.add" => |_, args| {
            Ok(Value::Time {
                value: time_arg(args, 0)? + Duration::milliseconds(rtime_arg(args, 1)?),
                literal: false,
            })
        },
        "time.sub" => |_, args| {
            Ok(Value::Time {
                value: time_arg(args, 0)? - Duration::milliseconds(rtime_arg(args, 1)?),
                literal: false,
            })
        },
        "time.is_after" => {
            |_, args| Ok(Value::bool(time_arg(args, 0)? > time_arg(args, 1)?))
        }
        "strftime" => |_, args| {
            let format = string_arg(args, 0)?;
            let time = time_arg(args, 1)?;
            if StrftimeItems::new(&format).any(|item| matches!(item, Item::Error)) {
                return Err(RuntimeError::Evaluation(format!(
                    "invalid strftime format {format}"
                )));
            }
            Ok(Value::string(time.format(&format).to_string()))
        },
        "querystring.get" => |_, args| {
            let url = string_arg(args, 0)?;
            let name = string_arg(args, 1)?;
            let query = url.split_once('?').map(|(_, q)| q).unwrap_or("");
            for pair in query.split('&') {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                if key == name {
                    return Ok(Value::string(value.to_string()));
                }
            }
            Ok(Value::Null)
        },
        "querystring.remove" => |_, args| {
            let url = string_arg(args, 0)?;
            Ok(Value::string(
                url.split_once('?').map(|(path, _)| path).unwrap_or(&url).to_string(),
            ))
        },
        "table.lookup" => |ctx, args| {
            let table = ident_arg(args, 0)?;
            let key = string_arg(args, 1)?;
            let entries = ctx
                .tables
                .get(&table)
                .ok_or_else(|| RuntimeError::UndefinedVariable(table.clone()))?;
            match entries.get(&key) {
                Some(value) => Ok(Value::string(value.clone())),
                None if args.len() > 2 => Ok(Value::string(string_arg(args, 2)?)),
                None => Ok(Value::Null),
            }
        },
        "table.contains" => |ctx, args| {
            let table = ident_arg(args, 0)?;
            let key = string_arg(args, 1)?;
            let entries = ctx
                .tables
                .get(&table)
                .ok_or_else(|| RuntimeError::UndefinedVariable(table.clone()))?;
            Ok(Value::bool(entries.contains_key(&key)))
        },
        "header.get" => |ctx, args| {
            let object = ident_arg(args, 0)?;
            let header = string_arg(args, 1)?;
            ctx.get_var(&format!("{object}.http.{header}"))
        },
        "header.set" => |ctx, args| {
            let object = ident_arg(args, 0)?;
            let header = string_arg(args, 1)?;
            let value = string_arg(args, 2)?;
            ctx.set_var(&format!("{object}.http.{header}"), Value::string(value))?;
            Ok(Value::Null)
        },
        "header.unset" => |ctx, args| {
            let object = ident_arg(args, 0)?;
            let header = string_arg(args, 1)?;
            ctx.unset_var(&format!("{object}.http.{header}"))?;
            Ok(Value::Null)
        },
        "math.floor" => |_, args| Ok(Value::float(float_arg(args, 0)?.floor())),
        "math.ceil" => |_, args| Ok(Value::float(float_arg(args, 0)?.ceil())),
        "math.pow" => |_, args| Ok(Value::float(float_arg(args, 0)?.powf(float_arg(args, 1)?))),
        "math.is_normal" => |_, args| Ok(Value::bool(float_arg(args, 0)?.is_normal())),
        "digest.base64" => |_, args| Ok(Value::string(STANDARD.encode(string_arg(args, 0)?))),
        "digest.base64_decode" => |_, args| {
            let decoded = STANDARD
                .decode(string_arg(args, 0)?)
                .map_err(|err| RuntimeError::Evaluation(format!("invalid base64: {err}")))?;
            Ok(Value::string(String::from_utf8_lossy(&decoded).into_owned()))
        },
        "digest.base64url_nopad_decode" => |_, args| {
            let decoded = URL_SAFE_NO_PAD
                .decode(string_arg(args, 0)?)
                .map_err(|err| RuntimeError::Evaluation(format!("invalid base64: {err}")))?;
            Ok(Value::string(String::from_utf8_lossy(&decoded).into_owned()))
        },
        "randombool" => |ctx, args| {
            let numerator = integer_arg(args, 0)?;
            let denominator = integer_arg(args, 1)?;
            if denominator <= 0 {
                return Err(RuntimeError::Evaluation(
                    "randombool denominator must be positive".to_string(),
                ));
            }
            let roll = (ctx.next_random() % denominator as u64) as i64;
            Ok(Value::bool(roll < numerator))
        },
        "uuid.version4" => |ctx, args| {
            let _ = args;
            let hi = ctx.next_random();
            let lo = ctx.next_random();
            Ok(Value::string(format!(
                "{:08x}-{:04x}-4{:03x}-{:04x}-{:012x}",
                (hi >> 32) as u32,
                (hi >> 16) as u16,
                (hi & 0xFFF) as u16,
                ((lo >> 48) as u16 & 0x3FFF) | 0x8000,
                lo & 0xFFFF_FFFF_FFFF
            )))
        },
        // Everything else is a stub: NULL plus a not-implemented error.
        _ => |_, _| Err(RuntimeError::NotImplemented(String::new())),
    }
}

fn regsub_impl(args: &[Value], all: bool) -> Result<Value, RuntimeError> {
    let input = string_arg(args, 0)?;
    let pattern = string_arg(args, 1)?;
    let replacement = translate_replacement(&string_arg(args, 2)?);
    let re = regex::Regex::new(&pattern)
        .map_err(|err| RuntimeError::Evaluation(format!("invalid regex: {err}")))?;
    let output = if all {
        re.replace_all(&input, replacement.as_str()).into_owned()
    } else {
        re.replace(&input, replacement.as_str()).into_owned()
    };
    Ok(Value::string(output))
}

fn format_radix(value: i64, radix: u32) -> String {
    if value == 0 {
        return "0".to_string();
    }
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let negative = value < 0;
    let mut magnitude = value.unsigned_abs();
    let mut out = Vec::new();
    while magnitude > 0 {
        out.push(DIGITS[(magnitude % radix as u64) as usize]);
        magnitude /= radix as u64;
    }
    if negative {
        out.push(b'-');
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::fixed_time;
    use crate::http::HttpRequest;

    fn ctx() -> Context {
        Context::new(HttpRequest::get("/"), fixed_time(1_700_000_000), 7)
    }

    fn call(name: &str, args: &[Value]) -> Result<Value, RuntimeError> {
        registry().call(&mut ctx(), name, args)
    }

    fn lit(s: &str) -> Value {
        Value::String {
            value: s.to_string(),
            literal: true,
        }
    }

    #[test]
    fn test_string_builtins() {
        assert_eq!(call("std.tolower", &[lit("MiXeD")]).unwrap(), Value::string("mixed"));
        assert_eq!(call("std.strlen", &[lit("four")]).unwrap(), Value::integer(4));
        assert_eq!(
            call("std.prefixof", &[lit("greenhouse"), lit("green")]).unwrap(),
            Value::bool(true)
        );
        assert_eq!(
            call("std.prefixof", &[lit("greanhouse"), lit("green")]).unwrap(),
            Value::bool(false)
        );
        assert_eq!(
            call("std.strstr", &[lit("a=b;c=d"), lit("c=")]).unwrap(),
            Value::string("c=d")
        );
    }

    #[test]
    fn test_itoa_radix() {
        assert_eq!(call("std.itoa", &[Value::integer(255)]).unwrap(), Value::string("255"));
        assert_eq!(
            call("std.itoa", &[Value::integer(255), Value::integer(16)]).unwrap(),
            Value::string("ff")
        );
        assert_eq!(
            call("std.itoa", &[Value::integer(-8), Value::integer(2)]).unwrap(),
            Value::string("-1000")
        );
    }

    #[test]
    fn test_substr_negative_offset() {
        assert_eq!(
            call("substr", &[lit("abcdef"), Value::integer(2)]).unwrap(),
            Value::string("cdef")
        );
        assert_eq!(
            call("substr", &[lit("abcdef"), Value::integer(-2)]).unwrap(),
            Value::string("ef")
        );
        assert_eq!(
            call("substr", &[lit("abcdef"), Value::integer(1), Value::integer(3)]).unwrap(),
            Value::string("bcd")
        );
    }

    #[test]
    fn test_regsub_backreference() {
        assert_eq!(
            call(
                "regsub",
                &[lit("hello world"), lit("(w\\w+)"), lit("<\\1>")]
            )
            .unwrap(),
            Value::string("hello <world>")
        );
        assert_eq!(
            call("regsuball", &[lit("a.b.c"), lit("\\."), lit("-")]).unwrap(),
            Value::string("a-b-c")
        );
    }

    #[test]
    fn test_if_builtin() {
        assert_eq!(
            call("if", &[Value::bool(true), lit("yes"), lit("no")]).unwrap(),
            Value::string("yes")
        );
    }

    #[test]
    fn test_time_builtins() {
        let now = Value::Time {
            value: fixed_time(1_000),
            literal: false,
        };
        let hour = Value::RTime {
            ms: 3_600_000,
            literal: true,
        };
        let later = call("time.add", &[now.clone(), hour]).unwrap();
        let Value::Time { value, .. } = later else { panic!() };
        assert_eq!(value.timestamp(), 4_600);

        assert_eq!(
            call("time.is_after", &[Value::Time { value, literal: false }, now]).unwrap(),
            Value::bool(true)
        );
    }

    #[test]
    fn test_strftime_rejects_bad_format() {
        let now = Value::Time {
            value: fixed_time(0),
            literal: false,
        };
        assert!(call("strftime", &[lit("%Y-%m-%d"), now.clone()]).is_ok());
        assert!(call("strftime", &[lit("%Q"), now]).is_err());
    }

    #[test]
    fn test_querystring_get() {
        assert_eq!(
            call("querystring.get", &[lit("/p?a=1&b=2"), lit("b")]).unwrap(),
            Value::string("2")
        );
        assert_eq!(
            call("querystring.get", &[lit("/p?a=1"), lit("c")]).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_table_lookup() {
        let mut ctx = ctx();
        let mut entries = rustc_hash::FxHashMap::default();
        entries.insert("/old".to_string(), "/new".to_string());
        ctx.tables.insert("redirects".to_string(), entries);

        let table = Value::Ident {
            name: "redirects".to_string(),
            literal: false,
        };
        assert_eq!(
            registry()
                .call(&mut ctx, "table.lookup", &[table.clone(), lit("/old")])
                .unwrap(),
            Value::string("/new")
        );
        assert_eq!(
            registry()
                .call(&mut ctx, "table.lookup", &[table.clone(), lit("/x"), lit("/d")])
                .unwrap(),
            Value::string("/d")
        );
        assert_eq!(
            registry()
                .call(&mut ctx, "table.contains", &[table, lit("/old")])
                .unwrap(),
            Value::bool(true)
        );
    }

    #[test]
    fn test_header_builtins() {
        let mut ctx = ctx();
        let req = Value::Ident {
            name: "req".to_string(),
            literal: false,
        };
        registry()
            .call(&mut ctx, "header.set", &[req.clone(), lit("X-A"), lit("1")])
            .unwrap();
        assert_eq!(
            registry()
                .call(&mut ctx, "header.get", &[req.clone(), lit("X-A")])
                .unwrap(),
            Value::string("1")
        );
        registry()
            .call(&mut ctx, "header.unset", &[req.clone(), lit("X-A")])
            .unwrap();
        assert_eq!(
            registry()
                .call(&mut ctx, "header.get", &[req, lit("X-A")])
                .unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_base64_round_trip() {
        assert_eq!(call("digest.base64", &[lit("abc")]).unwrap(), Value::string("YWJj"));
        assert_eq!(
            call("digest.base64_decode", &[lit("YWJj")]).unwrap(),
            Value::string("abc")
        );
        assert_eq!(
            call("digest.base64url_nopad_decode", &[lit("YWJj")]).unwrap(),
            Value::string("abc")
        );
    }

    #[test]
    fn test_randombool_deterministic() {
        let mut a = ctx();
        let mut b = ctx();
        let args = [Value::integer(1), Value::integer(2)];
        assert_eq!(
            registry().call(&mut a, "randombool", &args).unwrap(),
            registry().call(&mut b, "randombool", &args).unwrap()
        );
    }

    #[test]
    fn test_uuid_shape() {
        let uuid = call("uuid.version4", &[]).unwrap();
        let rendered = uuid.to_canonical_string().unwrap();
        assert_eq!(rendered.len(), 36);
        assert_eq!(rendered.as_bytes()[14], b'4');
    }

    #[test]
    fn test_unimplemented_stub() {
        let err = call("digest.hash_md5", &[lit("x")]).unwrap_err();
        assert!(matches!(err, RuntimeError::NotImplemented(_)));
    }

    #[test]
    fn test_dispatch_rejects_bad_arity() {
        let err = call("std.tolower", &[]).unwrap_err();
        assert!(matches!(err, RuntimeError::ArityMismatch(_)));
    }

    #[test]
    fn test_math_builtins() {
        assert_eq!(call("math.floor", &[Value::float(1.9)]).unwrap(), Value::float(1.0));
        assert_eq!(call("math.is_normal", &[Value::float(1.0)]).unwrap(), Value::bool(true));
        assert_eq!(
            call("math.is_normal", &[Value::float(f64::NAN)]).unwrap(),
            Value::bool(false)
        );
    }
}
