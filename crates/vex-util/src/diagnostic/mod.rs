//! Diagnostic module - Error, warning, and info reporting infrastructure.
//!
//! Every phase of the toolchain reports through a [`Handler`]: the parser
//! for recovered syntax errors, the linter for semantic findings, the
//! driver for the final tally. Diagnostics carry a [`Level`], a stable
//! [`Rule`] identifier, a message, and a source [`Span`].
//!
//! # Examples
//!
//! ```
//! use vex_util::{Diagnostic, Handler, Rule, Span};
//!
//! let handler = Handler::new();
//! handler.report(Diagnostic::error(
//!     Rule::UndefinedVariable,
//!     "variable req.http.Host is not defined",
//!     Span::DUMMY,
//! ));
//! assert_eq!(handler.error_count(), 1);
//! ```

mod rule;

pub use rule::Rule;

use std::cell::RefCell;
use std::fmt;

use crate::Span;

/// Diagnostic severity level.
///
/// # Examples
///
/// ```
/// use vex_util::Level;
///
/// assert_eq!(format!("{}", Level::Error), "error");
/// assert_eq!(format!("{}", Level::Info), "info");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// A semantic violation; the configuration is rejected.
    Error,
    /// A style or compatibility concern.
    Warning,
    /// A suggestion.
    Info,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Error => write!(f, "error"),
            Level::Warning => write!(f, "warning"),
            Level::Info => write!(f, "info"),
        }
    }
}

/// A single diagnostic finding.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    /// Severity level
    pub level: Level,
    /// Stable rule identifier
    pub rule: Rule,
    /// Main diagnostic message
    pub message: String,
    /// Source location
    pub span: Span,
    /// Additional notes for context
    pub notes: Vec<String>,
}

impl Diagnostic {
    /// Create a new diagnostic.
    pub fn new(level: Level, rule: Rule, message: impl Into<String>, span: Span) -> Self {
        Self {
            level,
            rule,
            message: message.into(),
            span,
            notes: Vec::new(),
        }
    }

    /// Create an error diagnostic.
    pub fn error(rule: Rule, message: impl Into<String>, span: Span) -> Self {
        Self::new(Level::Error, rule, message, span)
    }

    /// Create a warning diagnostic.
    pub fn warning(rule: Rule, message: impl Into<String>, span: Span) -> Self {
        Self::new(Level::Warning, rule, message, span)
    }

    /// Create an info diagnostic.
    pub fn info(rule: Rule, message: impl Into<String>, span: Span) -> Self {
        Self::new(Level::Info, rule, message, span)
    }

    /// Add a note to the diagnostic.
    ///
    /// # Examples
    ///
    /// ```
    /// use vex_util::{Diagnostic, Rule, Span};
    ///
    /// let diag = Diagnostic::error(Rule::TypeMismatch, "type mismatch", Span::DUMMY)
    ///     .with_note("expected INTEGER")
    ///     .with_note("found STRING");
    /// assert_eq!(diag.notes.len(), 2);
    /// ```
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

/// Handler for collecting and reporting diagnostics.
///
/// The handler collects diagnostics across all phases and provides counts
/// per level. It never aborts; callers decide what a nonzero error count
/// means for them.
///
/// # Examples
///
/// ```
/// use vex_util::{Diagnostic, Handler, Rule, Span};
///
/// let handler = Handler::new();
/// handler.report(Diagnostic::warning(Rule::UnusedDeclaration, "unused acl", Span::DUMMY));
/// assert!(!handler.has_errors());
/// assert_eq!(handler.warning_count(), 1);
/// ```
#[derive(Default)]
pub struct Handler {
    /// Collected diagnostics
    diagnostics: RefCell<Vec<Diagnostic>>,
}

impl Handler {
    /// Create a new handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a diagnostic.
    pub fn report(&self, diagnostic: Diagnostic) {
        self.diagnostics.borrow_mut().push(diagnostic);
    }

    /// Report a diagnostic unless a pragma in the given leading-comment
    /// trivia suppresses its rule.
    ///
    /// # Examples
    ///
    /// ```
    /// use vex_util::{Diagnostic, Handler, Rule, Span};
    ///
    /// let handler = Handler::new();
    /// let diag = Diagnostic::error(Rule::TypeMismatch, "mismatch", Span::DUMMY);
    /// handler.report_unless_suppressed(diag, [" falco-ignore type-mismatch"]);
    /// assert_eq!(handler.error_count(), 0);
    /// ```
    pub fn report_unless_suppressed<'a>(
        &self,
        diagnostic: Diagnostic,
        trivia: impl IntoIterator<Item = &'a str>,
    ) {
        let rule = diagnostic.rule;
        if trivia.into_iter().any(|comment| rule.suppressed_by(comment)) {
            return;
        }
        self.report(diagnostic);
    }

    /// Check if any errors have been reported.
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .borrow()
            .iter()
            .any(|d| d.level == Level::Error)
    }

    fn count(&self, level: Level) -> usize {
        self.diagnostics
            .borrow()
            .iter()
            .filter(|d| d.level == level)
            .count()
    }

    /// Get the number of errors.
    pub fn error_count(&self) -> usize {
        self.count(Level::Error)
    }

    /// Get the number of warnings.
    pub fn warning_count(&self) -> usize {
        self.count(Level::Warning)
    }

    /// Get the number of infos.
    pub fn info_count(&self) -> usize {
        self.count(Level::Info)
    }

    /// Get a snapshot of all diagnostics.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.borrow().clone()
    }

    /// Clear all diagnostics.
    pub fn clear(&self) {
        self.diagnostics.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_display() {
        assert_eq!(format!("{}", Level::Error), "error");
        assert_eq!(format!("{}", Level::Warning), "warning");
        assert_eq!(format!("{}", Level::Info), "info");
    }

    #[test]
    fn test_level_ordering() {
        assert!(Level::Error < Level::Warning);
        assert!(Level::Warning < Level::Info);
    }

    #[test]
    fn test_diagnostic_constructors() {
        let diag = Diagnostic::error(Rule::Syntax, "bad token", Span::DUMMY);
        assert_eq!(diag.level, Level::Error);
        assert_eq!(diag.rule, Rule::Syntax);

        let diag = Diagnostic::info(Rule::BoilerplateComment, "missing marker", Span::DUMMY);
        assert_eq!(diag.level, Level::Info);
    }

    #[test]
    fn test_handler_counts() {
        let handler = Handler::new();
        handler.report(Diagnostic::error(Rule::Syntax, "e", Span::DUMMY));
        handler.report(Diagnostic::warning(Rule::UnimplementedBuiltin, "w", Span::DUMMY));
        handler.report(Diagnostic::info(Rule::UnusedDeclaration, "i", Span::DUMMY));

        assert!(handler.has_errors());
        assert_eq!(handler.error_count(), 1);
        assert_eq!(handler.warning_count(), 1);
        assert_eq!(handler.info_count(), 1);
        assert_eq!(handler.diagnostics().len(), 3);
    }

    #[test]
    fn test_handler_suppression() {
        let handler = Handler::new();
        let diag = Diagnostic::error(Rule::TypeMismatch, "mismatch", Span::DUMMY);
        handler.report_unless_suppressed(diag.clone(), ["falco-ignore type-mismatch"]);
        assert_eq!(handler.error_count(), 0);

        handler.report_unless_suppressed(diag, ["unrelated comment"]);
        assert_eq!(handler.error_count(), 1);
    }

    #[test]
    fn test_handler_clear() {
        let handler = Handler::new();
        handler.report(Diagnostic::error(Rule::Syntax, "e", Span::DUMMY));
        handler.clear();
        assert!(!handler.has_errors());
    }
}
