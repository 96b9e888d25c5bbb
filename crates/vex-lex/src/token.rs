//! Token definitions for the VCL lexer.
//!
//! A [`Token`] pairs a [`TokenKind`] with the literal lexeme text, a source
//! span, and any leading comment trivia. Keywords are contextual in VCL:
//! the parser is free to treat a keyword-kinded token as a plain identifier
//! outside the keyword's declaration context, which is why every token
//! keeps its spelling.

use vex_util::Span;

/// A comment collected as trivia.
///
/// The text excludes the comment delimiters (`//`, `#`, `/* */`).
#[derive(Clone, Debug, PartialEq)]
pub struct Comment {
    /// Comment body without delimiters.
    pub text: String,
    /// Location of the whole comment.
    pub span: Span,
}

/// The kind of a lexical token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    // Punctuation
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `,`
    Comma,
    /// `;`
    Semicolon,
    /// `:`
    Colon,

    // Operators
    /// `=`
    Assign,
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `~` regex / ACL match
    Match,
    /// `!~`
    NotMatch,
    /// `<`
    LessThan,
    /// `<=`
    LessThanEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanEqual,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,
    /// `&&`
    And,
    /// `||`
    Or,
    /// `!`
    Not,
    /// `++`
    Increment,
    /// `--`
    Decrement,

    // Compound assignment operators
    /// `+=`
    AddAssign,
    /// `-=`
    SubAssign,
    /// `*=`
    MulAssign,
    /// `/=`
    DivAssign,
    /// `%=`
    ModAssign,
    /// `|=`
    BarAssign,
    /// `&=`
    AmpAssign,
    /// `^=`
    CaretAssign,
    /// `<<=`
    ShlAssign,
    /// `>>=`
    ShrAssign,
    /// `rol=`
    RolAssign,
    /// `ror=`
    RorAssign,
    /// `&&=`
    AndAssign,
    /// `||=`
    OrAssign,

    // Keywords (contextual)
    Acl,
    Backend,
    Director,
    Table,
    Sub,
    Penaltybox,
    Ratecounter,
    Import,
    Include,
    Declare,
    Set,
    Add,
    Unset,
    Remove,
    Call,
    Error,
    Esi,
    Log,
    Synthetic,
    SyntheticBase64,
    If,
    Else,
    Elsif,
    Elseif,
    Switch,
    Case,
    Default,
    Fallthrough,
    Break,
    Return,
    Restart,
    Goto,
    True,
    False,

    // Literals
    /// Identifier, possibly dotted (`req.http.Host`) or hyphenated.
    Ident,
    /// Quoted string `"…"` with escapes processed.
    String,
    /// Raw heredoc string `{"…"}` with no escape processing.
    OpenString,
    /// Integer literal.
    Int,
    /// Floating-point literal.
    Float,
    /// Duration literal with `ms|s|m|h|d|y` suffix.
    RTime,

    // Special
    /// End of file marker.
    Eof,
    /// Unrecognized input kept for error recovery.
    Illegal,
}

impl TokenKind {
    /// Whether this kind is one of the contextual keywords.
    pub fn is_keyword(&self) -> bool {
        keyword_spelling(*self).is_some()
    }

    /// Whether this kind can stand where an identifier is expected.
    ///
    /// VCL keywords are contextual, so any keyword spelling doubles as an
    /// identifier outside its declaration position.
    pub fn is_ident_like(&self) -> bool {
        *self == TokenKind::Ident || self.is_keyword()
    }

    /// Whether this kind is one of the compound or plain assignment
    /// operators accepted by `set`/`add` statements.
    pub fn is_assignment_operator(&self) -> bool {
        matches!(
            self,
            TokenKind::Assign
                | TokenKind::AddAssign
                | TokenKind::SubAssign
                | TokenKind::MulAssign
                | TokenKind::DivAssign
                | TokenKind::ModAssign
                | TokenKind::BarAssign
                | TokenKind::AmpAssign
                | TokenKind::CaretAssign
                | TokenKind::ShlAssign
                | TokenKind::ShrAssign
                | TokenKind::RolAssign
                | TokenKind::RorAssign
                | TokenKind::AndAssign
                | TokenKind::OrAssign
        )
    }
}

/// Maps an identifier spelling to its keyword kind, if any.
///
/// # Examples
///
/// ```
/// use vex_lex::token::{keyword_from_ident, TokenKind};
///
/// assert_eq!(keyword_from_ident("sub"), Some(TokenKind::Sub));
/// assert_eq!(keyword_from_ident("synthetic.base64"), Some(TokenKind::SyntheticBase64));
/// assert_eq!(keyword_from_ident("req.url"), None);
/// ```
pub fn keyword_from_ident(ident: &str) -> Option<TokenKind> {
    let kind = match ident {
        "acl" => TokenKind::Acl,
        "backend" => TokenKind::Backend,
        "director" => TokenKind::Director,
        "table" => TokenKind::Table,
        "sub" => TokenKind::Sub,
        "penaltybox" => TokenKind::Penaltybox,
        "ratecounter" => TokenKind::Ratecounter,
        "import" => TokenKind::Import,
        "include" => TokenKind::Include,
        "declare" => TokenKind::Declare,
        "set" => TokenKind::Set,
        "add" => TokenKind::Add,
        "unset" => TokenKind::Unset,
        "remove" => TokenKind::Remove,
        "call" => TokenKind::Call,
        "error" => TokenKind::Error,
        "esi" => TokenKind::Esi,
        "log" => TokenKind::Log,
        "synthetic" => TokenKind::Synthetic,
        "synthetic.base64" => TokenKind::SyntheticBase64,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "elsif" => TokenKind::Elsif,
        "elseif" => TokenKind::Elseif,
        "switch" => TokenKind::Switch,
        "case" => TokenKind::Case,
        "default" => TokenKind::Default,
        "fallthrough" => TokenKind::Fallthrough,
        "break" => TokenKind::Break,
        "return" => TokenKind::Return,
        "restart" => TokenKind::Restart,
        "goto" => TokenKind::Goto,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        _ => return None,
    };
    Some(kind)
}

fn keyword_spelling(kind: TokenKind) -> Option<&'static str> {
    let s = match kind {
        TokenKind::Acl => "acl",
        TokenKind::Backend => "backend",
        TokenKind::Director => "director",
        TokenKind::Table => "table",
        TokenKind::Sub => "sub",
        TokenKind::Penaltybox => "penaltybox",
        TokenKind::Ratecounter => "ratecounter",
        TokenKind::Import => "import",
        TokenKind::Include => "include",
        TokenKind::Declare => "declare",
        TokenKind::Set => "set",
        TokenKind::Add => "add",
        TokenKind::Unset => "unset",
        TokenKind::Remove => "remove",
        TokenKind::Call => "call",
        TokenKind::Error => "error",
        TokenKind::Esi => "esi",
        TokenKind::Log => "log",
        TokenKind::Synthetic => "synthetic",
        TokenKind::SyntheticBase64 => "synthetic.base64",
        TokenKind::If => "if",
        TokenKind::Else => "else",
        TokenKind::Elsif => "elsif",
        TokenKind::Elseif => "elseif",
        TokenKind::Switch => "switch",
        TokenKind::Case => "case",
        TokenKind::Default => "default",
        TokenKind::Fallthrough => "fallthrough",
        TokenKind::Break => "break",
        TokenKind::Return => "return",
        TokenKind::Restart => "restart",
        TokenKind::Goto => "goto",
        TokenKind::True => "true",
        TokenKind::False => "false",
        _ => return None,
    };
    Some(s)
}

/// A lexical token with its spelling, position, and leading trivia.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    /// Token category.
    pub kind: TokenKind,
    /// The literal lexeme. For `String` tokens this is the unescaped
    /// value; for `OpenString` the raw body; otherwise the source text.
    pub literal: String,
    /// Source location.
    pub span: Span,
    /// Comments collected immediately before this token.
    pub leading: Vec<Comment>,
}

impl Token {
    /// Create a token without trivia.
    pub fn new(kind: TokenKind, literal: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            literal: literal.into(),
            span,
            leading: Vec::new(),
        }
    }

    /// An EOF token at the given span.
    pub fn eof(span: Span) -> Self {
        Self::new(TokenKind::Eof, "", span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_lookup() {
        assert_eq!(keyword_from_ident("acl"), Some(TokenKind::Acl));
        assert_eq!(keyword_from_ident("elseif"), Some(TokenKind::Elseif));
        assert_eq!(keyword_from_ident("lookup"), None);
    }

    #[test]
    fn test_ident_like() {
        assert!(TokenKind::Ident.is_ident_like());
        assert!(TokenKind::Default.is_ident_like());
        assert!(!TokenKind::Semicolon.is_ident_like());
    }

    #[test]
    fn test_assignment_operator() {
        assert!(TokenKind::Assign.is_assignment_operator());
        assert!(TokenKind::RolAssign.is_assignment_operator());
        assert!(!TokenKind::Equal.is_assignment_operator());
    }
}
