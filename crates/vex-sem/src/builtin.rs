//! Builtin function signature table.
//!
//! Each function maps to one or more signatures; dispatch picks the first
//! whose arity and argument types match. The table is the shared shape
//! between the linter (static call checking) and the runtime registry,
//! which attaches bodies to the same names. `implemented: false` marks
//! entries whose runtime body is a stub returning NULL; the linter
//! reports calls to those at warning level so analysis still completes.

use crate::types::ValueType;

use ValueType::{Acl, Backend, Bool, Float, Id, Integer, Ip, RTime, String as Str, Time};

/// One callable signature.
#[derive(Clone, Copy, Debug)]
pub struct Signature {
    /// Positional argument types.
    pub args: &'static [ValueType],
    /// Whether the final argument type repeats.
    pub variadic: bool,
    /// Return type.
    pub ret: ValueType,
}

/// Catalog entry for one builtin function.
#[derive(Clone, Copy, Debug)]
pub struct BuiltinSpec {
    pub name: &'static str,
    pub signatures: &'static [Signature],
    /// False when the runtime body is a not-implemented stub.
    pub implemented: bool,
}

const fn sig(args: &'static [ValueType], ret: ValueType) -> Signature {
    Signature {
        args,
        variadic: false,
        ret,
    }
}

/// The builtin catalog.
///
/// A representative subset of the production surface; the full catalog
/// is pluggable by appending entries here and bodies in the runtime.
pub const CATALOG: &[BuiltinSpec] = &[
    // Strings
    BuiltinSpec {
        name: "std.tolower",
        signatures: &[sig(&[Str], Str)],
        implemented: true,
    },
    BuiltinSpec {
        name: "std.toupper",
        signatures: &[sig(&[Str], Str)],
        implemented: true,
    },
    BuiltinSpec {
        name: "std.strlen",
        signatures: &[sig(&[Str], Integer)],
        implemented: true,
    },
    BuiltinSpec {
        name: "std.prefixof",
        signatures: &[sig(&[Str, Str], Bool)],
        implemented: true,
    },
    BuiltinSpec {
        name: "std.suffixof",
        signatures: &[sig(&[Str, Str], Bool)],
        implemented: true,
    },
    BuiltinSpec {
        name: "std.strstr",
        signatures: &[sig(&[Str, Str], Str)],
        implemented: true,
    },
    BuiltinSpec {
        name: "std.replace",
        signatures: &[sig(&[Str, Str, Str], Str)],
        implemented: true,
    },
    BuiltinSpec {
        name: "std.itoa",
        signatures: &[sig(&[Integer], Str), sig(&[Integer, Integer], Str)],
        implemented: true,
    },
    BuiltinSpec {
        name: "std.atoi",
        signatures: &[sig(&[Str], Integer)],
        implemented: true,
    },
    BuiltinSpec {
        name: "std.atof",
        signatures: &[sig(&[Str], Float)],
        implemented: true,
    },
    BuiltinSpec {
        name: "std.strtol",
        signatures: &[sig(&[Str, Integer], Integer)],
        implemented: true,
    },
    BuiltinSpec {
        name: "std.ip",
        signatures: &[sig(&[Str, Str], Ip)],
        implemented: true,
    },
    BuiltinSpec {
        name: "substr",
        signatures: &[sig(&[Str, Integer], Str), sig(&[Str, Integer, Integer], Str)],
        implemented: true,
    },
    BuiltinSpec {
        name: "regsub",
        signatures: &[sig(&[Str, Str, Str], Str)],
        implemented: true,
    },
    BuiltinSpec {
        name: "regsuball",
        signatures: &[sig(&[Str, Str, Str], Str)],
        implemented: true,
    },
    BuiltinSpec {
        name: "if",
        signatures: &[sig(&[Bool, Str, Str], Str)],
        implemented: true,
    },
    // Time
    BuiltinSpec {
        name: "time.add",
        signatures: &[sig(&[Time, RTime], Time)],
        implemented: true,
    },
    BuiltinSpec {
        name: "time.sub",
        signatures: &[sig(&[Time, RTime], Time)],
        implemented: true,
    },
    BuiltinSpec {
        name: "time.is_after",
        signatures: &[sig(&[Time, Time], Bool)],
        implemented: true,
    },
    BuiltinSpec {
        name: "strftime",
        signatures: &[sig(&[Str, Time], Str)],
        implemented: true,
    },
    // Query strings
    BuiltinSpec {
        name: "querystring.get",
        signatures: &[sig(&[Str, Str], Str)],
        implemented: true,
    },
    BuiltinSpec {
        name: "querystring.remove",
        signatures: &[sig(&[Str], Str)],
        implemented: true,
    },
    // Tables
    BuiltinSpec {
        name: "table.lookup",
        signatures: &[sig(&[Id, Str], Str), sig(&[Id, Str, Str], Str)],
        implemented: true,
    },
    BuiltinSpec {
        name: "table.contains",
        signatures: &[sig(&[Id, Str], Bool)],
        implemented: true,
    },
    // Headers
    BuiltinSpec {
        name: "header.get",
        signatures: &[sig(&[Id, Str], Str)],
        implemented: true,
    },
    BuiltinSpec {
        name: "header.set",
        signatures: &[sig(&[Id, Str, Str], Str)],
        implemented: true,
    },
    BuiltinSpec {
        name: "header.unset",
        signatures: &[sig(&[Id, Str], Str)],
        implemented: true,
    },
    BuiltinSpec {
        name: "header.filter",
        signatures: &[Signature {
            args: &[Id, Str],
            variadic: true,
            ret: Str,
        }],
        implemented: false,
    },
    // Math
    BuiltinSpec {
        name: "math.floor",
        signatures: &[sig(&[Float], Float)],
        implemented: true,
    },
    BuiltinSpec {
        name: "math.ceil",
        signatures: &[sig(&[Float], Float)],
        implemented: true,
    },
    BuiltinSpec {
        name: "math.pow",
        signatures: &[sig(&[Float, Float], Float)],
        implemented: true,
    },
    BuiltinSpec {
        name: "math.is_normal",
        signatures: &[sig(&[Float], Bool)],
        implemented: true,
    },
    // Digests and encodings
    BuiltinSpec {
        name: "digest.base64",
        signatures: &[sig(&[Str], Str)],
        implemented: true,
    },
    BuiltinSpec {
        name: "digest.base64_decode",
        signatures: &[sig(&[Str], Str)],
        implemented: true,
    },
    BuiltinSpec {
        name: "digest.base64url_nopad_decode",
        signatures: &[sig(&[Str], Str)],
        implemented: true,
    },
    BuiltinSpec {
        name: "digest.hash_sha256",
        signatures: &[sig(&[Str], Str)],
        implemented: false,
    },
    BuiltinSpec {
        name: "digest.hash_md5",
        signatures: &[sig(&[Str], Str)],
        implemented: false,
    },
    BuiltinSpec {
        name: "digest.hmac_sha1",
        signatures: &[sig(&[Str, Str], Str)],
        implemented: false,
    },
    BuiltinSpec {
        name: "digest.rsa_verify",
        signatures: &[sig(&[Id, Str, Str, Str], Bool)],
        implemented: false,
    },
    // Content negotiation
    BuiltinSpec {
        name: "accept.charset_lookup",
        signatures: &[sig(&[Str, Str, Str], Str)],
        implemented: false,
    },
    BuiltinSpec {
        name: "accept.language_lookup",
        signatures: &[sig(&[Str, Str, Str], Str)],
        implemented: false,
    },
    // Cookies
    BuiltinSpec {
        name: "setcookie.get_value_by_name",
        signatures: &[sig(&[Id, Str], Str)],
        implemented: false,
    },
    // Randomness
    BuiltinSpec {
        name: "randombool",
        signatures: &[sig(&[Integer, Integer], Bool)],
        implemented: true,
    },
    BuiltinSpec {
        name: "uuid.version4",
        signatures: &[sig(&[], Str)],
        implemented: true,
    },
];

/// Look up a builtin by name.
pub fn lookup(name: &str) -> Option<&'static BuiltinSpec> {
    CATALOG.iter().find(|spec| spec.name == name)
}

impl Signature {
    /// Whether `arg_types` satisfies this signature.
    ///
    /// `None` entries are arguments whose type could not be inferred;
    /// they match any parameter so one error does not cascade.
    pub fn matches(&self, arg_types: &[Option<ValueType>]) -> bool {
        if self.variadic {
            if arg_types.len() < self.args.len() {
                return false;
            }
        } else if arg_types.len() != self.args.len() {
            return false;
        }

        for (i, arg) in arg_types.iter().enumerate() {
            let expected = if i < self.args.len() {
                self.args[i]
            } else {
                // Variadic tail repeats the final parameter type.
                match self.args.last() {
                    Some(last) => *last,
                    None => return false,
                }
            };
            let Some(found) = arg else { continue };
            if !type_satisfies(expected, *found) {
                return false;
            }
        }
        true
    }
}

/// Parameter compatibility: exact match, the `Id` escape hatch for
/// object references, and string parameters accepting any coercible type.
fn type_satisfies(expected: ValueType, found: ValueType) -> bool {
    if expected == found {
        return true;
    }
    match expected {
        Str => found.is_string_coercible(),
        Id => matches!(found, Backend | Acl | Id),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert!(lookup("std.tolower").is_some());
        assert!(lookup("std.nonexistent").is_none());
    }

    #[test]
    fn test_signature_match_exact() {
        let spec = lookup("std.prefixof").unwrap();
        assert!(spec.signatures[0].matches(&[Some(Str), Some(Str)]));
        assert!(!spec.signatures[0].matches(&[Some(Str)]));
        assert!(!spec.signatures[0].matches(&[Some(Acl), Some(Str)]));
    }

    #[test]
    fn test_overload_by_arity() {
        let spec = lookup("substr").unwrap();
        let two = &spec.signatures[0];
        let three = &spec.signatures[1];
        assert!(two.matches(&[Some(Str), Some(Integer)]));
        assert!(!two.matches(&[Some(Str), Some(Integer), Some(Integer)]));
        assert!(three.matches(&[Some(Str), Some(Integer), Some(Integer)]));
    }

    #[test]
    fn test_string_parameter_accepts_coercible() {
        let spec = lookup("std.tolower").unwrap();
        assert!(spec.signatures[0].matches(&[Some(Integer)]));
        assert!(!spec.signatures[0].matches(&[Some(Backend)]));
    }

    #[test]
    fn test_variadic_tail() {
        let spec = lookup("header.filter").unwrap();
        let signature = &spec.signatures[0];
        assert!(signature.matches(&[Some(Id), Some(Str)]));
        assert!(signature.matches(&[Some(Id), Some(Str), Some(Str), Some(Str)]));
        assert!(!signature.matches(&[Some(Id)]));
    }

    #[test]
    fn test_unknown_argument_type_matches() {
        let spec = lookup("std.prefixof").unwrap();
        assert!(spec.signatures[0].matches(&[None, Some(Str)]));
    }

    #[test]
    fn test_stub_flagging() {
        assert!(!lookup("digest.hash_md5").unwrap().implemented);
        assert!(lookup("digest.base64").unwrap().implemented);
    }
}
