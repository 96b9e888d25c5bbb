//! Main lexer implementation for the VCL configuration language.
//!
//! The lexer dispatches on the first character of each token. Comments are
//! not discarded: they accumulate and attach to the next token as leading
//! trivia, which the linter later inspects for pragmas and boilerplate
//! markers. Errors are reported through the shared diagnostic [`Handler`]
//! and lexing continues with an `Illegal` token so the parser can recover.

use thiserror::Error;
use vex_util::{Diagnostic, FileId, Handler, Rule, Span};

use crate::cursor::Cursor;
use crate::token::{keyword_from_ident, Comment, Token, TokenKind};

/// Lexical error kinds.
///
/// These are rendered into diagnostics at the point of detection; the
/// enum exists so other crates can match on the failure class.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LexError {
    /// String literal with no closing delimiter before EOF.
    #[error("unterminated string literal")]
    UnterminatedString,
    /// Block comment with no closing `*/`.
    #[error("unterminated block comment")]
    UnterminatedComment,
    /// Unknown escape sequence inside a quoted string.
    #[error("invalid escape sequence '\\{0}'")]
    InvalidEscape(char),
    /// A character that cannot begin any token.
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),
    /// A numeric literal with a suffix that is not a duration unit.
    #[error("invalid duration suffix '{0}'")]
    InvalidSuffix(String),
}

/// The VCL lexer.
///
/// # Example
///
/// ```
/// use vex_lex::{Lexer, TokenKind};
/// use vex_util::{FileId, Handler};
///
/// let handler = Handler::new();
/// let mut lexer = Lexer::new("set req.http.Host = \"vex\";", FileId(0), &handler);
///
/// assert_eq!(lexer.next_token().kind, TokenKind::Set);
/// assert_eq!(lexer.next_token().literal, "req.http.Host");
/// ```
pub struct Lexer<'a> {
    /// Character cursor for traversing source.
    cursor: Cursor<'a>,

    /// Diagnostic handler for error reporting.
    handler: &'a Handler,

    /// File the source belongs to.
    file_id: FileId,

    /// Start position of the current token.
    token_start: usize,

    /// Start line of the current token.
    token_start_line: u32,

    /// Start column of the current token.
    token_start_column: u32,

    /// Comments waiting to be attached to the next token.
    pending: Vec<Comment>,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '.'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-'
}

fn is_rtime_suffix(s: &str) -> bool {
    matches!(s, "ms" | "s" | "m" | "h" | "d" | "y")
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given source code.
    pub fn new(source: &'a str, file_id: FileId, handler: &'a Handler) -> Self {
        Self {
            cursor: Cursor::new(source),
            handler,
            file_id,
            token_start: 0,
            token_start_line: 1,
            token_start_column: 1,
            pending: Vec::new(),
        }
    }

    /// Returns the next token from the source.
    ///
    /// Skips whitespace, collects comment trivia, then dispatches on the
    /// first character. Returns a `TokenKind::Eof` token at end of input.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();

        self.token_start = self.cursor.position();
        self.token_start_line = self.cursor.line();
        self.token_start_column = self.cursor.column();

        if self.cursor.is_at_end() {
            return self.finish(TokenKind::Eof, String::new());
        }

        match self.cursor.current_char() {
            '(' => self.single(TokenKind::LParen),
            ')' => self.single(TokenKind::RParen),
            '{' => {
                if self.cursor.peek_char(1) == '"' {
                    self.lex_raw_string()
                } else {
                    self.single(TokenKind::LBrace)
                }
            }
            '}' => self.single(TokenKind::RBrace),
            ',' => self.single(TokenKind::Comma),
            ';' => self.single(TokenKind::Semicolon),
            ':' => self.single(TokenKind::Colon),
            '~' => self.single(TokenKind::Match),
            '+' => self.lex_plus(),
            '-' => self.lex_minus(),
            '*' => self.lex_star(),
            '/' => self.lex_slash(),
            '%' => self.lex_percent(),
            '=' => self.lex_equals(),
            '!' => self.lex_bang(),
            '<' => self.lex_less(),
            '>' => self.lex_greater(),
            '&' => self.lex_ampersand(),
            '|' => self.lex_pipe(),
            '^' => self.lex_caret(),
            '"' => self.lex_string(),
            c if is_ident_start(c) => self.lex_identifier(),
            c if c.is_ascii_digit() => self.lex_number(),
            c => {
                self.report_error(LexError::UnexpectedChar(c));
                self.cursor.advance();
                self.finish(TokenKind::Illegal, c.to_string())
            }
        }
    }

    /// Collects every remaining token, ending with EOF.
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return tokens;
            }
        }
    }

    fn span(&self) -> Span {
        Span::with_file(
            self.token_start,
            self.cursor.position(),
            self.file_id,
            self.token_start_line,
            self.token_start_column,
        )
    }

    fn finish(&mut self, kind: TokenKind, literal: String) -> Token {
        Token {
            kind,
            literal,
            span: self.span(),
            leading: std::mem::take(&mut self.pending),
        }
    }

    fn single(&mut self, kind: TokenKind) -> Token {
        let c = self.cursor.current_char();
        self.cursor.advance();
        self.finish(kind, c.to_string())
    }

    fn lexeme_token(&mut self, kind: TokenKind) -> Token {
        let literal = self.cursor.slice_from(self.token_start).to_string();
        self.finish(kind, literal)
    }

    fn report_error(&mut self, error: LexError) {
        self.handler
            .report(Diagnostic::error(Rule::Syntax, error.to_string(), self.span()));
    }

    // ------------------------------------------------------------------
    // Operators
    // ------------------------------------------------------------------

    fn lex_plus(&mut self) -> Token {
        self.cursor.advance();
        if self.cursor.match_char('=') {
            self.lexeme_token(TokenKind::AddAssign)
        } else if self.cursor.match_char('+') {
            self.lexeme_token(TokenKind::Increment)
        } else {
            self.lexeme_token(TokenKind::Plus)
        }
    }

    fn lex_minus(&mut self) -> Token {
        self.cursor.advance();
        if self.cursor.match_char('=') {
            self.lexeme_token(TokenKind::SubAssign)
        } else if self.cursor.match_char('-') {
            self.lexeme_token(TokenKind::Decrement)
        } else {
            self.lexeme_token(TokenKind::Minus)
        }
    }

    fn lex_star(&mut self) -> Token {
        self.cursor.advance();
        if self.cursor.match_char('=') {
            self.lexeme_token(TokenKind::MulAssign)
        } else {
            self.lexeme_token(TokenKind::Star)
        }
    }

    /// `/` or `/=`. Comments were consumed before dispatch.
    fn lex_slash(&mut self) -> Token {
        self.cursor.advance();
        if self.cursor.match_char('=') {
            self.lexeme_token(TokenKind::DivAssign)
        } else {
            self.lexeme_token(TokenKind::Slash)
        }
    }

    fn lex_percent(&mut self) -> Token {
        self.cursor.advance();
        if self.cursor.match_char('=') {
            self.lexeme_token(TokenKind::ModAssign)
        } else {
            self.lexeme_token(TokenKind::Percent)
        }
    }

    fn lex_equals(&mut self) -> Token {
        self.cursor.advance();
        if self.cursor.match_char('=') {
            self.lexeme_token(TokenKind::Equal)
        } else {
            self.lexeme_token(TokenKind::Assign)
        }
    }

    fn lex_bang(&mut self) -> Token {
        self.cursor.advance();
        if self.cursor.match_char('=') {
            self.lexeme_token(TokenKind::NotEqual)
        } else if self.cursor.match_char('~') {
            self.lexeme_token(TokenKind::NotMatch)
        } else {
            self.lexeme_token(TokenKind::Not)
        }
    }

    fn lex_less(&mut self) -> Token {
        self.cursor.advance();
        if self.cursor.current_char() == '<' && self.cursor.peek_char(1) == '=' {
            self.cursor.advance();
            self.cursor.advance();
            self.lexeme_token(TokenKind::ShlAssign)
        } else if self.cursor.match_char('=') {
            self.lexeme_token(TokenKind::LessThanEqual)
        } else {
            self.lexeme_token(TokenKind::LessThan)
        }
    }

    fn lex_greater(&mut self) -> Token {
        self.cursor.advance();
        if self.cursor.current_char() == '>' && self.cursor.peek_char(1) == '=' {
            self.cursor.advance();
            self.cursor.advance();
            self.lexeme_token(TokenKind::ShrAssign)
        } else if self.cursor.match_char('=') {
            self.lexeme_token(TokenKind::GreaterThanEqual)
        } else {
            self.lexeme_token(TokenKind::GreaterThan)
        }
    }

    /// `&&`, `&&=`, or `&=`. A bare `&` is not a VCL operator.
    fn lex_ampersand(&mut self) -> Token {
        self.cursor.advance();
        if self.cursor.match_char('&') {
            if self.cursor.match_char('=') {
                self.lexeme_token(TokenKind::AndAssign)
            } else {
                self.lexeme_token(TokenKind::And)
            }
        } else if self.cursor.match_char('=') {
            self.lexeme_token(TokenKind::AmpAssign)
        } else {
            self.report_error(LexError::UnexpectedChar('&'));
            self.lexeme_token(TokenKind::Illegal)
        }
    }

    /// `||`, `||=`, or `|=`. A bare `|` is not a VCL operator.
    fn lex_pipe(&mut self) -> Token {
        self.cursor.advance();
        if self.cursor.match_char('|') {
            if self.cursor.match_char('=') {
                self.lexeme_token(TokenKind::OrAssign)
            } else {
                self.lexeme_token(TokenKind::Or)
            }
        } else if self.cursor.match_char('=') {
            self.lexeme_token(TokenKind::BarAssign)
        } else {
            self.report_error(LexError::UnexpectedChar('|'));
            self.lexeme_token(TokenKind::Illegal)
        }
    }

    /// `^=`. A bare `^` is not a VCL operator.
    fn lex_caret(&mut self) -> Token {
        self.cursor.advance();
        if self.cursor.match_char('=') {
            self.lexeme_token(TokenKind::CaretAssign)
        } else {
            self.report_error(LexError::UnexpectedChar('^'));
            self.lexeme_token(TokenKind::Illegal)
        }
    }

    // ------------------------------------------------------------------
    // Identifiers and keywords
    // ------------------------------------------------------------------

    /// Lexes a dotted identifier or contextual keyword.
    ///
    /// `rol`/`ror` immediately followed by `=` fuse into the rotate
    /// compound-assignment operators.
    fn lex_identifier(&mut self) -> Token {
        while is_ident_continue(self.cursor.current_char()) {
            self.cursor.advance();
        }
        let lexeme = self.cursor.slice_from(self.token_start);

        if (lexeme == "rol" || lexeme == "ror") && self.cursor.current_char() == '=' {
            self.cursor.advance();
            let kind = if lexeme == "rol" {
                TokenKind::RolAssign
            } else {
                TokenKind::RorAssign
            };
            return self.lexeme_token(kind);
        }

        let kind = keyword_from_ident(lexeme).unwrap_or(TokenKind::Ident);
        self.lexeme_token(kind)
    }

    // ------------------------------------------------------------------
    // Numbers
    // ------------------------------------------------------------------

    /// Lexes an integer, float, or RTIME duration literal.
    ///
    /// A trailing unit run (`ms`, `s`, `m`, `h`, `d`, `y`) turns the
    /// number into an RTIME token whose lexeme keeps the suffix.
    fn lex_number(&mut self) -> Token {
        while self.cursor.current_char().is_ascii_digit() {
            self.cursor.advance();
        }

        let mut is_float = false;
        if self.cursor.current_char() == '.' && self.cursor.peek_char(1).is_ascii_digit() {
            is_float = true;
            self.cursor.advance();
            while self.cursor.current_char().is_ascii_digit() {
                self.cursor.advance();
            }
        }

        if self.cursor.current_char().is_ascii_alphabetic() {
            let suffix_start = self.cursor.position();
            while self.cursor.current_char().is_ascii_alphabetic() {
                self.cursor.advance();
            }
            let suffix = self.cursor.slice_from(suffix_start).to_string();
            if is_rtime_suffix(&suffix) {
                return self.lexeme_token(TokenKind::RTime);
            }
            self.report_error(LexError::InvalidSuffix(suffix));
            return self.lexeme_token(TokenKind::Illegal);
        }

        if is_float {
            self.lexeme_token(TokenKind::Float)
        } else {
            self.lexeme_token(TokenKind::Int)
        }
    }

    // ------------------------------------------------------------------
    // Strings
    // ------------------------------------------------------------------

    /// Lexes a quoted string, processing escape sequences.
    fn lex_string(&mut self) -> Token {
        self.cursor.advance(); // opening quote
        let mut value = String::new();

        loop {
            match self.cursor.current_char() {
                '"' => {
                    self.cursor.advance();
                    return self.finish(TokenKind::String, value);
                }
                '\0' if self.cursor.is_at_end() => {
                    self.report_error(LexError::UnterminatedString);
                    return self.finish(TokenKind::Illegal, value);
                }
                '\\' => {
                    self.cursor.advance();
                    match self.cursor.current_char() {
                        '\\' => {
                            value.push('\\');
                            self.cursor.advance();
                        }
                        '"' => {
                            value.push('"');
                            self.cursor.advance();
                        }
                        'x' => {
                            self.cursor.advance();
                            let hi = self.cursor.current_char();
                            let lo = self.cursor.peek_char(1);
                            match (hi.to_digit(16), lo.to_digit(16)) {
                                (Some(hi), Some(lo)) => {
                                    self.cursor.advance();
                                    self.cursor.advance();
                                    let byte = (hi * 16 + lo) as u8;
                                    value.push(byte as char);
                                }
                                _ => {
                                    self.report_error(LexError::InvalidEscape('x'));
                                    value.push('x');
                                }
                            }
                        }
                        // Anything else is not an escape: regex patterns
                        // like "\d" keep their backslash.
                        c => {
                            value.push('\\');
                            if !self.cursor.is_at_end() {
                                value.push(c);
                                self.cursor.advance();
                            }
                        }
                    }
                }
                c => {
                    value.push(c);
                    self.cursor.advance();
                }
            }
        }
    }

    /// Lexes a raw heredoc string `{"…"}` with no escape processing.
    fn lex_raw_string(&mut self) -> Token {
        self.cursor.advance(); // {
        self.cursor.advance(); // "
        let body_start = self.cursor.position();

        loop {
            if self.cursor.is_at_end() {
                self.report_error(LexError::UnterminatedString);
                let value = self.cursor.slice_from(body_start).to_string();
                return self.finish(TokenKind::Illegal, value);
            }
            if self.cursor.current_char() == '"' && self.cursor.peek_char(1) == '}' {
                let value = self.cursor.slice_from(body_start).to_string();
                self.cursor.advance();
                self.cursor.advance();
                return self.finish(TokenKind::OpenString, value);
            }
            self.cursor.advance();
        }
    }

    // ------------------------------------------------------------------
    // Trivia
    // ------------------------------------------------------------------

    /// Skips whitespace and collects comments as pending trivia.
    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.cursor.current_char() {
                ' ' | '\t' | '\r' | '\n' => self.cursor.advance(),
                '#' => self.collect_line_comment(1),
                '/' if self.cursor.peek_char(1) == '/' => self.collect_line_comment(2),
                '/' if self.cursor.peek_char(1) == '*' => self.collect_block_comment(),
                _ => return,
            }
            if self.cursor.is_at_end() {
                return;
            }
        }
    }

    fn collect_line_comment(&mut self, delimiter_len: usize) {
        let start = self.cursor.position();
        let line = self.cursor.line();
        let column = self.cursor.column();
        for _ in 0..delimiter_len {
            self.cursor.advance();
        }
        let body_start = self.cursor.position();
        while !self.cursor.is_at_end() && self.cursor.current_char() != '\n' {
            self.cursor.advance();
        }
        let text = self.cursor.slice_from(body_start).to_string();
        self.pending.push(Comment {
            text,
            span: Span::with_file(start, self.cursor.position(), self.file_id, line, column),
        });
    }

    fn collect_block_comment(&mut self) {
        let start = self.cursor.position();
        let line = self.cursor.line();
        let column = self.cursor.column();
        self.cursor.advance(); // /
        self.cursor.advance(); // *
        let body_start = self.cursor.position();

        loop {
            if self.cursor.is_at_end() {
                self.token_start = start;
                self.token_start_line = line;
                self.token_start_column = column;
                self.report_error(LexError::UnterminatedComment);
                return;
            }
            if self.cursor.current_char() == '*' && self.cursor.peek_char(1) == '/' {
                let text = self.cursor.slice_from(body_start).to_string();
                self.cursor.advance();
                self.cursor.advance();
                self.pending.push(Comment {
                    text,
                    span: Span::with_file(
                        start,
                        self.cursor.position(),
                        self.file_id,
                        line,
                        column,
                    ),
                });
                return;
            }
            self.cursor.advance();
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        let token = self.next_token();
        if token.kind == TokenKind::Eof {
            None
        } else {
            Some(token)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<Token> {
        let handler = Handler::new();
        let tokens = Lexer::new(src, FileId(0), &handler).tokenize();
        assert!(!handler.has_errors(), "unexpected lex errors in {src:?}");
        tokens
    }

    fn kinds(src: &str) -> Vec<TokenKind> {
        lex(src).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_punctuation_and_operators() {
        assert_eq!(
            kinds("( ) { } , ; ~ !~ == != <= >="),
            vec![
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::Comma,
                TokenKind::Semicolon,
                TokenKind::Match,
                TokenKind::NotMatch,
                TokenKind::Equal,
                TokenKind::NotEqual,
                TokenKind::LessThanEqual,
                TokenKind::GreaterThanEqual,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_compound_assignment_operators() {
        assert_eq!(
            kinds("+= -= *= /= %= |= &= ^= <<= >>= rol= ror= &&= ||="),
            vec![
                TokenKind::AddAssign,
                TokenKind::SubAssign,
                TokenKind::MulAssign,
                TokenKind::DivAssign,
                TokenKind::ModAssign,
                TokenKind::BarAssign,
                TokenKind::AmpAssign,
                TokenKind::CaretAssign,
                TokenKind::ShlAssign,
                TokenKind::ShrAssign,
                TokenKind::RolAssign,
                TokenKind::RorAssign,
                TokenKind::AndAssign,
                TokenKind::OrAssign,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_dotted_identifier() {
        let tokens = lex("req.http.X-Forwarded-For");
        assert_eq!(tokens[0].kind, TokenKind::Ident);
        assert_eq!(tokens[0].literal, "req.http.X-Forwarded-For");
    }

    #[test]
    fn test_keywords_and_contextual_use() {
        let tokens = lex("sub vcl_recv { set table = 1; }");
        assert_eq!(tokens[0].kind, TokenKind::Sub);
        assert_eq!(tokens[1].kind, TokenKind::Ident);
        // `table` lexes as a keyword; the parser decides whether the
        // position allows an identifier reading.
        assert_eq!(tokens[4].kind, TokenKind::Table);
        assert_eq!(tokens[4].literal, "table");
    }

    #[test]
    fn test_synthetic_base64_keyword() {
        let tokens = lex("synthetic.base64 {\"YWJj\"};");
        assert_eq!(tokens[0].kind, TokenKind::SyntheticBase64);
        assert_eq!(tokens[1].kind, TokenKind::OpenString);
        assert_eq!(tokens[1].literal, "YWJj");
    }

    #[test]
    fn test_string_escapes() {
        let tokens = lex(r#""A=\x41 \"q\" slash=\\""#);
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].literal, "A=A \"q\" slash=\\");
    }

    #[test]
    fn test_string_keeps_regex_backslashes() {
        let tokens = lex(r#""^/api/(\w+)/(\d+)$""#);
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].literal, r"^/api/(\w+)/(\d+)$");
    }

    #[test]
    fn test_raw_string_keeps_backslashes() {
        let tokens = lex(r#"{"no \n escape"}"#);
        assert_eq!(tokens[0].kind, TokenKind::OpenString);
        assert_eq!(tokens[0].literal, r"no \n escape");
    }

    #[test]
    fn test_numbers() {
        let tokens = lex("42 3.14 10s 1d 250ms 1.5h");
        let got: Vec<_> = tokens.iter().map(|t| (t.kind, t.literal.as_str())).collect();
        assert_eq!(
            got,
            vec![
                (TokenKind::Int, "42"),
                (TokenKind::Float, "3.14"),
                (TokenKind::RTime, "10s"),
                (TokenKind::RTime, "1d"),
                (TokenKind::RTime, "250ms"),
                (TokenKind::RTime, "1.5h"),
                (TokenKind::Eof, ""),
            ]
        );
    }

    #[test]
    fn test_invalid_suffix_reports_error() {
        let handler = Handler::new();
        let tokens = Lexer::new("10q", FileId(0), &handler).tokenize();
        assert_eq!(tokens[0].kind, TokenKind::Illegal);
        assert_eq!(handler.error_count(), 1);
    }

    #[test]
    fn test_unterminated_string_reports_error() {
        let handler = Handler::new();
        let tokens = Lexer::new("\"never closed", FileId(0), &handler).tokenize();
        assert_eq!(tokens[0].kind, TokenKind::Illegal);
        assert_eq!(handler.error_count(), 1);
    }

    #[test]
    fn test_leading_comment_trivia() {
        let tokens = lex("// pragma here\n# hash comment\nset req.url = \"/\";");
        assert_eq!(tokens[0].kind, TokenKind::Set);
        let texts: Vec<_> = tokens[0].leading.iter().map(|c| c.text.trim()).collect();
        assert_eq!(texts, vec!["pragma here", "hash comment"]);
        // Trivia is consumed, not duplicated onto later tokens.
        assert!(tokens[1].leading.is_empty());
    }

    #[test]
    fn test_block_comment_trivia() {
        let tokens = lex("/* boilerplate */ acl internal {}");
        assert_eq!(tokens[0].kind, TokenKind::Acl);
        assert_eq!(tokens[0].leading[0].text.trim(), "boilerplate");
    }

    #[test]
    fn test_goto_destination_shape() {
        assert_eq!(
            kinds("goto done; done:"),
            vec![
                TokenKind::Goto,
                TokenKind::Ident,
                TokenKind::Semicolon,
                TokenKind::Ident,
                TokenKind::Colon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_illegal_char_recovers() {
        let handler = Handler::new();
        let tokens = Lexer::new("set @ req", FileId(0), &handler).tokenize();
        assert_eq!(tokens[0].kind, TokenKind::Set);
        assert_eq!(tokens[1].kind, TokenKind::Illegal);
        assert_eq!(tokens[2].kind, TokenKind::Ident);
        assert_eq!(handler.error_count(), 1);
    }

    #[test]
    fn test_iterator_stops_at_eof() {
        let handler = Handler::new();
        let lexer = Lexer::new("restart;", FileId(0), &handler);
        let collected: Vec<_> = lexer.collect();
        assert_eq!(collected.len(), 2);
    }

    #[test]
    fn test_spans_track_lines() {
        let tokens = lex("set\nreq.url");
        assert_eq!(tokens[0].span.line, 1);
        assert_eq!(tokens[1].span.line, 2);
        assert_eq!(tokens[1].span.column, 1);
        assert_eq!(tokens[1].span.start, 4);
    }
}
