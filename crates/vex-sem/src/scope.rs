//! Execution scopes and the hook/action vocabulary.
//!
//! Every predefined variable names the scopes it may be read and written
//! in; every state-machine hook subroutine runs in exactly one scope and
//! may finish with a bounded set of return actions.

use std::fmt;

/// One execution scope of the edge state machine.
///
/// `Init` is active while declarations (backend properties, table
/// entries) are evaluated, before any request arrives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    Recv,
    Hash,
    Hit,
    Miss,
    Pass,
    Fetch,
    Error,
    Deliver,
    Log,
    Init,
}

impl Scope {
    const fn bit(self) -> u16 {
        1 << (self as u16)
    }

    /// The hook subroutine name owning this scope, if any.
    pub fn hook_subroutine(&self) -> Option<&'static str> {
        let name = match self {
            Scope::Recv => "vcl_recv",
            Scope::Hash => "vcl_hash",
            Scope::Hit => "vcl_hit",
            Scope::Miss => "vcl_miss",
            Scope::Pass => "vcl_pass",
            Scope::Fetch => "vcl_fetch",
            Scope::Error => "vcl_error",
            Scope::Deliver => "vcl_deliver",
            Scope::Log => "vcl_log",
            Scope::Init => return None,
        };
        Some(name)
    }

    /// Map a hook subroutine name to its scope.
    pub fn from_hook_subroutine(name: &str) -> Option<Scope> {
        let scope = match name {
            "vcl_recv" => Scope::Recv,
            "vcl_hash" => Scope::Hash,
            "vcl_hit" => Scope::Hit,
            "vcl_miss" => Scope::Miss,
            "vcl_pass" => Scope::Pass,
            "vcl_fetch" => Scope::Fetch,
            "vcl_error" => Scope::Error,
            "vcl_deliver" => Scope::Deliver,
            "vcl_log" => Scope::Log,
            _ => return None,
        };
        Some(scope)
    }

    /// The `#FASTLY` boilerplate marker phase for this hook.
    pub fn marker(&self) -> Option<&'static str> {
        let marker = match self {
            Scope::Recv => "recv",
            Scope::Hash => "hash",
            Scope::Hit => "hit",
            Scope::Miss => "miss",
            Scope::Pass => "pass",
            Scope::Fetch => "fetch",
            Scope::Error => "error",
            Scope::Deliver => "deliver",
            Scope::Log => "log",
            Scope::Init => return None,
        };
        Some(marker)
    }

    /// Return actions a hook in this scope may finish with.
    pub fn allowed_actions(&self) -> &'static [&'static str] {
        match self {
            Scope::Recv => &["lookup", "pass", "error", "restart"],
            Scope::Hash => &["hash"],
            Scope::Hit => &["deliver", "pass", "error", "restart"],
            Scope::Miss => &["fetch", "deliver_stale", "pass", "error"],
            Scope::Pass => &["pass", "error"],
            Scope::Fetch => &["deliver", "deliver_stale", "pass", "error", "restart", "hit_for_pass"],
            Scope::Error => &["deliver", "deliver_stale", "restart"],
            Scope::Deliver => &["deliver", "restart"],
            Scope::Log => &["deliver"],
            Scope::Init => &[],
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scope::Recv => "RECV",
            Scope::Hash => "HASH",
            Scope::Hit => "HIT",
            Scope::Miss => "MISS",
            Scope::Pass => "PASS",
            Scope::Fetch => "FETCH",
            Scope::Error => "ERROR",
            Scope::Deliver => "DELIVER",
            Scope::Log => "LOG",
            Scope::Init => "INIT",
        };
        f.write_str(name)
    }
}

/// A set of scopes, stored as a bitmask.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScopeSet(u16);

impl ScopeSet {
    /// The empty set.
    pub const NONE: ScopeSet = ScopeSet(0);

    /// Every request-phase scope plus `INIT`.
    pub const ALL: ScopeSet = ScopeSet(0x3FF);

    /// Build a set from individual scopes.
    pub const fn of(scopes: &[Scope]) -> ScopeSet {
        let mut bits = 0u16;
        let mut i = 0;
        while i < scopes.len() {
            bits |= scopes[i].bit();
            i += 1;
        }
        ScopeSet(bits)
    }

    /// Whether the set contains `scope`.
    pub const fn contains(&self, scope: Scope) -> bool {
        self.0 & scope.bit() != 0
    }

    /// Union of two sets.
    pub const fn union(self, other: ScopeSet) -> ScopeSet {
        ScopeSet(self.0 | other.0)
    }

    /// Whether the set is empty.
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_set_membership() {
        let set = ScopeSet::of(&[Scope::Recv, Scope::Fetch]);
        assert!(set.contains(Scope::Recv));
        assert!(set.contains(Scope::Fetch));
        assert!(!set.contains(Scope::Deliver));
    }

    #[test]
    fn test_all_contains_every_scope() {
        for scope in [
            Scope::Recv,
            Scope::Hash,
            Scope::Hit,
            Scope::Miss,
            Scope::Pass,
            Scope::Fetch,
            Scope::Error,
            Scope::Deliver,
            Scope::Log,
            Scope::Init,
        ] {
            assert!(ScopeSet::ALL.contains(scope));
        }
    }

    #[test]
    fn test_hook_round_trip() {
        assert_eq!(Scope::from_hook_subroutine("vcl_recv"), Some(Scope::Recv));
        assert_eq!(Scope::Recv.hook_subroutine(), Some("vcl_recv"));
        assert_eq!(Scope::from_hook_subroutine("normalize"), None);
    }

    #[test]
    fn test_allowed_actions() {
        assert!(Scope::Recv.allowed_actions().contains(&"lookup"));
        assert!(!Scope::Recv.allowed_actions().contains(&"deliver"));
        assert_eq!(Scope::Hash.allowed_actions(), &["hash"]);
    }
}
