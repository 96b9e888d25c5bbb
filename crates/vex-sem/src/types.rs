//! The VCL value type lattice.

use std::fmt;

/// The static type of a VCL value.
///
/// Seven primitives plus three opaque object types. `Id` covers
/// references to declared objects passed by name (tables, penaltyboxes,
/// ratecounters, and the header-function targets).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    Integer,
    Float,
    String,
    Bool,
    RTime,
    Time,
    Ip,
    Backend,
    Acl,
    Id,
}

impl ValueType {
    /// Parse the type name as spelled in `declare local` statements and
    /// subroutine return types.
    pub fn from_name(name: &str) -> Option<ValueType> {
        let ty = match name {
            "INTEGER" => ValueType::Integer,
            "FLOAT" => ValueType::Float,
            "STRING" => ValueType::String,
            "BOOL" => ValueType::Bool,
            "RTIME" => ValueType::RTime,
            "TIME" => ValueType::Time,
            "IP" => ValueType::Ip,
            "BACKEND" => ValueType::Backend,
            "ACL" => ValueType::Acl,
            "ID" => ValueType::Id,
            _ => return None,
        };
        Some(ty)
    }

    /// Whether a value of this type coerces to its canonical string form.
    ///
    /// Everything does except the opaque `ACL` and `BACKEND` objects.
    pub fn is_string_coercible(&self) -> bool {
        !matches!(self, ValueType::Acl | ValueType::Backend)
    }

    /// Whether the type participates in numeric arithmetic.
    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueType::Integer | ValueType::Float)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Integer => "INTEGER",
            ValueType::Float => "FLOAT",
            ValueType::String => "STRING",
            ValueType::Bool => "BOOL",
            ValueType::RTime => "RTIME",
            ValueType::Time => "TIME",
            ValueType::Ip => "IP",
            ValueType::Backend => "BACKEND",
            ValueType::Acl => "ACL",
            ValueType::Id => "ID",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_round_trip() {
        for name in [
            "INTEGER", "FLOAT", "STRING", "BOOL", "RTIME", "TIME", "IP", "BACKEND", "ACL", "ID",
        ] {
            let ty = ValueType::from_name(name).unwrap();
            assert_eq!(ty.to_string(), name);
        }
        assert_eq!(ValueType::from_name("integer"), None);
    }

    #[test]
    fn test_string_coercion() {
        assert!(ValueType::Time.is_string_coercible());
        assert!(!ValueType::Acl.is_string_coercible());
        assert!(!ValueType::Backend.is_string_coercible());
    }
}
