//! vex-par - Recursive-descent parser for VCL.
//!
//! The parser consumes the token stream with one-token lookahead
//! (`cur`/`peek`) and produces one [`ast::Declaration`] list per module.
//! Expressions use Pratt-style binding powers (see [`expr`]). Parse errors
//! are reported to the shared diagnostic handler and recovery skips to the
//! next statement terminator or block boundary, so a broken statement does
//! not hide the rest of the file from later passes.

pub mod ast;
mod decl;
mod expr;
mod stmt;

use thiserror::Error;
use vex_lex::{Lexer, Token, TokenKind};
use vex_util::{Diagnostic, FileId, Handler, Rule, Span};

use ast::{Declaration, Ident, Meta};

/// A syntax error detected while parsing.
///
/// Errors are collected, not fatal: the parser reports them through the
/// [`Handler`] and resumes at the next recovery point.
#[derive(Clone, Debug, Error)]
pub enum ParseError {
    /// A specific token kind was required.
    #[error("expected {expected}, found '{found}'")]
    Expected {
        expected: String,
        found: String,
        span: Span,
    },
    /// The token cannot begin a construct at this position.
    #[error("unexpected token '{found}'")]
    Unexpected { found: String, span: Span },
    /// A literal failed to parse into its value type.
    #[error("invalid {kind} literal '{literal}'")]
    InvalidLiteral {
        kind: &'static str,
        literal: String,
        span: Span,
    },
}

impl ParseError {
    /// Location of the offending token.
    pub fn span(&self) -> Span {
        match self {
            ParseError::Expected { span, .. }
            | ParseError::Unexpected { span, .. }
            | ParseError::InvalidLiteral { span, .. } => *span,
        }
    }
}

type PResult<T> = Result<T, ParseError>;

/// The VCL parser.
///
/// # Example
///
/// ```
/// use vex_par::Parser;
/// use vex_util::{FileId, Handler};
///
/// let handler = Handler::new();
/// let decls = Parser::new("sub vcl_recv { return(lookup); }", FileId(0), &handler)
///     .parse_module();
/// assert_eq!(decls.len(), 1);
/// assert!(!handler.has_errors());
/// ```
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    cur: Token,
    peek: Token,
    handler: &'a Handler,
}

impl<'a> Parser<'a> {
    /// Creates a parser over the given source.
    pub fn new(source: &'a str, file_id: FileId, handler: &'a Handler) -> Self {
        let mut lexer = Lexer::new(source, file_id, handler);
        let cur = lexer.next_token();
        let peek = lexer.next_token();
        Self {
            lexer,
            cur,
            peek,
            handler,
        }
    }

    /// Parses the whole module, collecting errors and recovering.
    ///
    /// Always returns as much AST as could be built.
    pub fn parse_module(&mut self) -> Vec<Declaration> {
        let mut declarations = Vec::new();
        while self.cur.kind != TokenKind::Eof {
            match self.parse_declaration() {
                Ok(decl) => declarations.push(decl),
                Err(err) => {
                    self.report(&err);
                    self.recover();
                }
            }
            self.next_token();
        }
        declarations
    }

    // ------------------------------------------------------------------
    // Token plumbing
    // ------------------------------------------------------------------

    pub(crate) fn next_token(&mut self) {
        self.cur = std::mem::replace(&mut self.peek, self.lexer.next_token());
    }

    pub(crate) fn cur_is(&self, kind: TokenKind) -> bool {
        self.cur.kind == kind
    }

    pub(crate) fn peek_is(&self, kind: TokenKind) -> bool {
        self.peek.kind == kind
    }

    /// Advance and require the new current token to be `kind`.
    pub(crate) fn expect_peek(&mut self, kind: TokenKind) -> PResult<()> {
        self.next_token();
        if self.cur.kind == kind {
            Ok(())
        } else {
            Err(self.expected(&format!("{kind:?}")))
        }
    }

    /// Advance and require an identifier-like token, returning it as an
    /// [`Ident`]. Contextual keywords are accepted.
    pub(crate) fn expect_peek_ident(&mut self) -> PResult<Ident> {
        self.next_token();
        self.cur_ident()
    }

    /// Read the current token as an identifier.
    pub(crate) fn cur_ident(&mut self) -> PResult<Ident> {
        if self.cur.kind.is_ident_like() {
            Ok(Ident {
                meta: self.cur_meta(),
                name: self.cur.literal.clone(),
            })
        } else {
            Err(self.expected("identifier"))
        }
    }

    /// Metadata (span + trivia) for the current token.
    pub(crate) fn cur_meta(&self) -> Meta {
        Meta {
            span: self.cur.span,
            leading: self.cur.leading.clone(),
        }
    }

    pub(crate) fn expected(&self, expected: &str) -> ParseError {
        ParseError::Expected {
            expected: expected.to_string(),
            found: self.cur.literal.clone(),
            span: self.cur.span,
        }
    }

    pub(crate) fn unexpected(&self) -> ParseError {
        ParseError::Unexpected {
            found: self.cur.literal.clone(),
            span: self.cur.span,
        }
    }

    pub(crate) fn report(&self, err: &ParseError) {
        self.handler
            .report(Diagnostic::error(Rule::Syntax, err.to_string(), err.span()));
    }

    /// Skip to the next statement terminator or block boundary.
    ///
    /// Stops on a `;` terminator or a `}` so block parsing can close
    /// properly.
    pub(crate) fn recover(&mut self) {
        loop {
            match self.cur.kind {
                TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof => return,
                _ => self.next_token(),
            }
        }
    }
}

/// Parse a source string into declarations, reporting errors to `handler`.
pub fn parse(source: &str, file_id: FileId, handler: &Handler) -> Vec<Declaration> {
    Parser::new(source, file_id, handler).parse_module()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Vec<Declaration> {
        let handler = Handler::new();
        let decls = parse(src, FileId(0), &handler);
        let diags = handler.diagnostics();
        assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
        decls
    }

    #[test]
    fn test_parse_minimal_module() {
        let decls = parse_ok(
            r#"
            backend origin { .host = "example.com"; .port = "443"; }
            sub vcl_recv { set req.http.X = "hi"; return(lookup); }
            "#,
        );
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[1].name(), Some("vcl_recv"));
    }

    #[test]
    fn test_recovery_keeps_later_declarations() {
        let handler = Handler::new();
        let decls = parse(
            r#"
            sub broken { set = ; }
            sub fine { return(pass); }
            "#,
            FileId(0),
            &handler,
        );
        assert!(handler.has_errors());
        // The broken statement is dropped but both subroutines parse.
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[1].name(), Some("fine"));
    }

    #[test]
    fn test_module_statements_round_trip_display() {
        let src = "sub s { set req.http.A = \"x\" req.http.B; if (req.url ~ \"^/api\") { error 404 \"no\"; } }";
        let decls = parse_ok(src);
        let rendered = decls[0].to_string();
        let handler = Handler::new();
        let reparsed = parse(&rendered, FileId(0), &handler);
        assert!(!handler.has_errors());
        assert_eq!(rendered, reparsed[0].to_string());
    }
}
