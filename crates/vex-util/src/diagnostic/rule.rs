//! Stable lint rule identifiers.
//!
//! Every diagnostic carries a [`Rule`]. The kebab-case string form is the
//! external contract: it is what `falco-ignore` pragma comments name and
//! what tooling matches on, so variants may be added but existing spellings
//! never change.

use std::fmt;

/// Machine-readable identifier for a diagnostic rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Rule {
    /// Lexical or syntactic error recovered by the parser.
    Syntax,
    /// Reference to an undeclared acl/backend/director/table/subroutine.
    UndefinedReference,
    /// Reference to a variable not in the catalog and not declared locally.
    UndefinedVariable,
    /// Call of a function absent from the builtin registry.
    UndefinedFunction,
    /// Expression operand types are incompatible.
    TypeMismatch,
    /// Assignment operator not permitted for the left-hand type.
    OperatorAssignment,
    /// Variable read or written outside its declared scope set.
    RestrictedScope,
    /// Hook subroutine returns an action its entry point does not accept.
    ReturnAction,
    /// Typed subroutine has a control path that does not return its type.
    ReturnType,
    /// Function call matches no registered signature arity.
    ArityMismatch,
    /// Call of a builtin whose body is a stub.
    UnimplementedBuiltin,
    /// Same name declared more than once.
    DuplicateDeclaration,
    /// Declared object is never referenced.
    UnusedDeclaration,
    /// State-machine hook subroutine lacks its `#FASTLY` marker comment.
    BoilerplateComment,
    /// Right-hand side of `~`/`!~` is not a valid regular expression.
    RegexSyntax,
    /// `import` names an unknown module provider.
    InvalidImport,
}

impl Rule {
    /// The stable kebab-case spelling of this rule.
    pub fn as_str(&self) -> &'static str {
        match self {
            Rule::Syntax => "syntax",
            Rule::UndefinedReference => "undefined-reference",
            Rule::UndefinedVariable => "undefined-variable",
            Rule::UndefinedFunction => "undefined-function",
            Rule::TypeMismatch => "type-mismatch",
            Rule::OperatorAssignment => "operator-assignment",
            Rule::RestrictedScope => "restricted-scope",
            Rule::ReturnAction => "return-action",
            Rule::ReturnType => "return-type",
            Rule::ArityMismatch => "arity-mismatch",
            Rule::UnimplementedBuiltin => "unimplemented-builtin",
            Rule::DuplicateDeclaration => "duplicate-declaration",
            Rule::UnusedDeclaration => "unused-declaration",
            Rule::BoilerplateComment => "boilerplate-comment",
            Rule::RegexSyntax => "regex-syntax",
            Rule::InvalidImport => "invalid-import",
        }
    }

    /// Whether a single comment suppresses this rule.
    ///
    /// A comment of the form `falco-ignore <rule-id> [<rule-id>…]`
    /// suppresses the named rules at the statement it is attached to; a
    /// bare `falco-ignore` suppresses every rule there.
    ///
    /// # Examples
    ///
    /// ```
    /// use vex_util::Rule;
    ///
    /// assert!(Rule::TypeMismatch.suppressed_by(" falco-ignore type-mismatch"));
    /// assert!(Rule::TypeMismatch.suppressed_by("falco-ignore"));
    /// assert!(!Rule::TypeMismatch.suppressed_by("falco-ignore return-action"));
    /// ```
    pub fn suppressed_by(&self, comment: &str) -> bool {
        let Some(rest) = comment.trim_start().strip_prefix("falco-ignore") else {
            return false;
        };
        let mut names = rest.split([' ', '\t', ',']).filter(|s| !s.is_empty());
        match names.next() {
            None => true,
            Some(first) => {
                first == self.as_str() || names.any(|name| name == self.as_str())
            }
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_spelling() {
        assert_eq!(Rule::OperatorAssignment.as_str(), "operator-assignment");
        assert_eq!(Rule::Syntax.to_string(), "syntax");
    }

    #[test]
    fn test_suppressed_by_named() {
        assert!(Rule::ReturnAction.suppressed_by("falco-ignore return-action"));
        assert!(Rule::ReturnAction.suppressed_by("falco-ignore syntax, return-action"));
        assert!(!Rule::ReturnAction.suppressed_by("falco-ignore syntax"));
    }

    #[test]
    fn test_suppressed_by_bare() {
        assert!(Rule::RegexSyntax.suppressed_by("  falco-ignore  "));
    }

    #[test]
    fn test_not_a_pragma() {
        assert!(!Rule::RegexSyntax.suppressed_by("plain comment"));
    }
}
