//! The predefined variable catalog.
//!
//! Dotted runtime names map to a type plus readable and writable scope
//! sets. HTTP header namespaces are wildcard entries (`req.http.*`)
//! matched by prefix. The catalog is the shared contract between the
//! linter (static scope checks) and the interpreter's variable store.

use crate::scope::{Scope, ScopeSet};
use crate::types::ValueType;

/// Catalog entry for one variable or wildcard namespace.
#[derive(Clone, Copy, Debug)]
pub struct VariableSpec {
    /// Variable name, or a `prefix.*` wildcard.
    pub name: &'static str,
    pub ty: ValueType,
    /// Scopes the variable may be read in.
    pub read: ScopeSet,
    /// Scopes the variable may be written in.
    pub write: ScopeSet,
}

use Scope::{Deliver, Error, Fetch, Hash, Hit, Init, Log, Miss, Pass, Recv};

const CLIENT_SIDE: ScopeSet = ScopeSet::of(&[Recv, Hash, Hit, Miss, Pass, Fetch, Error, Deliver, Log]);
const BACKEND_SIDE: ScopeSet = ScopeSet::of(&[Miss, Pass, Fetch]);
const DELIVERY: ScopeSet = ScopeSet::of(&[Deliver, Log]);

/// The predefined catalog.
///
/// A representative slice of the standard runtime surface; entries are
/// ordered by namespace. Longest-prefix wildcard matching picks the most
/// specific entry.
pub const CATALOG: &[VariableSpec] = &[
    // Client connection
    VariableSpec {
        name: "client.ip",
        ty: ValueType::Ip,
        read: CLIENT_SIDE,
        write: ScopeSet::NONE,
    },
    VariableSpec {
        name: "client.identity",
        ty: ValueType::String,
        read: CLIENT_SIDE,
        write: ScopeSet::of(&[Recv, Hash]),
    },
    VariableSpec {
        name: "client.port",
        ty: ValueType::Integer,
        read: CLIENT_SIDE,
        write: ScopeSet::NONE,
    },
    VariableSpec {
        name: "server.hostname",
        ty: ValueType::String,
        read: CLIENT_SIDE,
        write: ScopeSet::NONE,
    },
    VariableSpec {
        name: "server.region",
        ty: ValueType::String,
        read: CLIENT_SIDE,
        write: ScopeSet::NONE,
    },
    // Client request
    VariableSpec {
        name: "req.url",
        ty: ValueType::String,
        read: CLIENT_SIDE,
        write: ScopeSet::of(&[Recv, Hash, Miss, Pass, Fetch]),
    },
    VariableSpec {
        name: "req.method",
        ty: ValueType::String,
        read: CLIENT_SIDE,
        write: ScopeSet::of(&[Recv]),
    },
    VariableSpec {
        name: "req.proto",
        ty: ValueType::String,
        read: CLIENT_SIDE,
        write: ScopeSet::NONE,
    },
    VariableSpec {
        name: "req.backend",
        ty: ValueType::Backend,
        read: CLIENT_SIDE,
        write: ScopeSet::of(&[Recv]),
    },
    VariableSpec {
        name: "req.restarts",
        ty: ValueType::Integer,
        read: CLIENT_SIDE,
        write: ScopeSet::NONE,
    },
    VariableSpec {
        name: "req.hash",
        ty: ValueType::String,
        read: ScopeSet::of(&[Hash]),
        write: ScopeSet::of(&[Hash]),
    },
    VariableSpec {
        name: "req.http.*",
        ty: ValueType::String,
        read: CLIENT_SIDE,
        write: CLIENT_SIDE,
    },
    // Backend request
    VariableSpec {
        name: "bereq.url",
        ty: ValueType::String,
        read: BACKEND_SIDE,
        write: ScopeSet::of(&[Miss, Pass]),
    },
    VariableSpec {
        name: "bereq.method",
        ty: ValueType::String,
        read: BACKEND_SIDE,
        write: ScopeSet::of(&[Miss, Pass]),
    },
    VariableSpec {
        name: "bereq.http.*",
        ty: ValueType::String,
        read: BACKEND_SIDE,
        write: ScopeSet::of(&[Miss, Pass]),
    },
    // Backend response
    VariableSpec {
        name: "beresp.status",
        ty: ValueType::Integer,
        read: ScopeSet::of(&[Fetch]),
        write: ScopeSet::of(&[Fetch]),
    },
    VariableSpec {
        name: "beresp.response",
        ty: ValueType::String,
        read: ScopeSet::of(&[Fetch]),
        write: ScopeSet::of(&[Fetch]),
    },
    VariableSpec {
        name: "beresp.ttl",
        ty: ValueType::RTime,
        read: ScopeSet::of(&[Fetch]),
        write: ScopeSet::of(&[Fetch]),
    },
    VariableSpec {
        name: "beresp.grace",
        ty: ValueType::RTime,
        read: ScopeSet::of(&[Fetch]),
        write: ScopeSet::of(&[Fetch]),
    },
    VariableSpec {
        name: "beresp.http.*",
        ty: ValueType::String,
        read: ScopeSet::of(&[Fetch]),
        write: ScopeSet::of(&[Fetch]),
    },
    // Cache object
    VariableSpec {
        name: "obj.status",
        ty: ValueType::Integer,
        read: ScopeSet::of(&[Hit, Error]),
        write: ScopeSet::of(&[Error]),
    },
    VariableSpec {
        name: "obj.response",
        ty: ValueType::String,
        read: ScopeSet::of(&[Hit, Error]),
        write: ScopeSet::of(&[Error]),
    },
    VariableSpec {
        name: "obj.hits",
        ty: ValueType::Integer,
        read: ScopeSet::of(&[Hit, Deliver, Log]),
        write: ScopeSet::NONE,
    },
    VariableSpec {
        name: "obj.ttl",
        ty: ValueType::RTime,
        read: ScopeSet::of(&[Hit]),
        write: ScopeSet::NONE,
    },
    VariableSpec {
        name: "obj.http.*",
        ty: ValueType::String,
        read: ScopeSet::of(&[Hit, Error]),
        write: ScopeSet::of(&[Error]),
    },
    // Client response
    VariableSpec {
        name: "resp.status",
        ty: ValueType::Integer,
        read: DELIVERY,
        write: ScopeSet::of(&[Deliver]),
    },
    VariableSpec {
        name: "resp.response",
        ty: ValueType::String,
        read: DELIVERY,
        write: ScopeSet::of(&[Deliver]),
    },
    VariableSpec {
        name: "resp.http.*",
        ty: ValueType::String,
        read: DELIVERY,
        write: ScopeSet::of(&[Deliver]),
    },
    // Regex capture groups of the most recent match
    VariableSpec {
        name: "re.group.*",
        ty: ValueType::String,
        read: ScopeSet::ALL,
        write: ScopeSet::NONE,
    },
    // Clock
    VariableSpec {
        name: "now",
        ty: ValueType::Time,
        read: ScopeSet::ALL,
        write: ScopeSet::NONE,
    },
    VariableSpec {
        name: "now.sec",
        ty: ValueType::String,
        read: ScopeSet::ALL,
        write: ScopeSet::NONE,
    },
    // Geo lookups (subset)
    VariableSpec {
        name: "client.geo.country_code",
        ty: ValueType::String,
        read: CLIENT_SIDE,
        write: ScopeSet::NONE,
    },
    VariableSpec {
        name: "client.geo.city",
        ty: ValueType::String,
        read: CLIENT_SIDE,
        write: ScopeSet::NONE,
    },
];

/// Look up a dotted variable name, resolving wildcards by longest prefix.
pub fn lookup(name: &str) -> Option<&'static VariableSpec> {
    let mut best: Option<&'static VariableSpec> = None;
    for spec in CATALOG {
        if let Some(prefix) = spec.name.strip_suffix(".*") {
            let matches = name
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('.') && rest.len() > 1);
            if matches && best.map_or(true, |b| b.name.len() < spec.name.len()) {
                best = Some(spec);
            }
        } else if spec.name == name {
            return Some(spec);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_lookup() {
        let spec = lookup("req.url").unwrap();
        assert_eq!(spec.ty, ValueType::String);
        assert!(spec.write.contains(Scope::Recv));
        assert!(!spec.write.contains(Scope::Deliver));
    }

    #[test]
    fn test_wildcard_lookup() {
        let spec = lookup("req.http.X-Forwarded-For").unwrap();
        assert_eq!(spec.name, "req.http.*");
        assert_eq!(spec.ty, ValueType::String);
    }

    #[test]
    fn test_wildcard_requires_suffix() {
        // The bare namespace is not itself a variable.
        assert!(lookup("req.http").is_none());
        assert!(lookup("req.http.").is_none());
    }

    #[test]
    fn test_unknown_name() {
        assert!(lookup("req.nonexistent").is_none());
        assert!(lookup("wholly.unknown").is_none());
    }

    #[test]
    fn test_read_only_variables() {
        assert!(lookup("client.ip").unwrap().write.is_empty());
        assert!(lookup("now").unwrap().read.contains(Scope::Init));
    }
}
