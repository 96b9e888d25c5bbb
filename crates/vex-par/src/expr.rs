//! Expression parsing using Pratt-style binding powers.
//!
//! Operator precedence (lowest to highest):
//!
//! | Level | Operators |
//! |-------|-----------|
//! | 1 | `\|\|` |
//! | 2 | `&&` |
//! | 3 | `==`, `!=`, `~`, `!~`, `<`, `<=`, `>`, `>=` |
//! | 4 | `+`, `-`, string concatenation by juxtaposition |
//! | 5 | `*`, `/`, `%` |
//! | 6 | prefix `!`, unary `-` |
//! | 7 | postfix `++`, `--` |
//! | 8 | call `(` |
//!
//! Juxtaposition is the quirk: `"a" req.http.B "c"` concatenates without
//! an operator token. In the Pratt loop a peeked token that can begin a
//! literal or identifier binds at the additive level and desugars to an
//! infix `+`, which is also how the binary codec stores it.

use vex_lex::TokenKind;

use crate::ast::{
    BoolLit, Expr, FloatLit, FunctionCallExpr, GroupedExpr, InfixExpr, IntLit, PostfixExpr,
    PrefixExpr, RTimeLit, StringLit,
};
use crate::{PResult, Parser};

/// Binding power levels. Higher binds tighter.
pub(crate) mod bp {
    pub const LOWEST: u8 = 0;
    pub const OR: u8 = 1;
    pub const AND: u8 = 2;
    pub const COMPARISON: u8 = 3;
    pub const SUM: u8 = 4;
    pub const PRODUCT: u8 = 5;
    pub const PREFIX: u8 = 6;
    pub const POSTFIX: u8 = 7;
    pub const CALL: u8 = 8;
}

/// Binding power of an explicit infix operator token.
fn operator_bp(kind: TokenKind) -> Option<u8> {
    let bp = match kind {
        TokenKind::Or => bp::OR,
        TokenKind::And => bp::AND,
        TokenKind::Equal
        | TokenKind::NotEqual
        | TokenKind::Match
        | TokenKind::NotMatch
        | TokenKind::LessThan
        | TokenKind::LessThanEqual
        | TokenKind::GreaterThan
        | TokenKind::GreaterThanEqual => bp::COMPARISON,
        TokenKind::Plus | TokenKind::Minus => bp::SUM,
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => bp::PRODUCT,
        TokenKind::Increment | TokenKind::Decrement => bp::POSTFIX,
        _ => return None,
    };
    Some(bp)
}

/// Whether a token can begin a juxtaposed concatenation operand.
///
/// Contextual keywords are excluded: a keyword in peek position is the
/// start of the next statement, not a concatenation operand. Dotted
/// runtime names (`req.http.X`) always lex as plain identifiers.
fn concat_operand_start(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Ident
            | TokenKind::String
            | TokenKind::OpenString
            | TokenKind::Int
            | TokenKind::Float
            | TokenKind::RTime
            | TokenKind::True
            | TokenKind::False
    )
}

impl<'a> Parser<'a> {
    /// Parse an expression with the given minimum binding power.
    ///
    /// Invariant: called with `cur` on the expression's first token,
    /// returns with `cur` on its last token.
    pub(crate) fn parse_expression(&mut self, min_bp: u8) -> PResult<Expr> {
        let mut left = self.parse_prefix_expr()?;

        loop {
            let bp = match self.peek_infix_bp(&left) {
                Some(bp) if bp > min_bp => bp,
                _ => break,
            };
            self.next_token();
            left = self.parse_infix_expr(left, bp)?;
        }

        Ok(left)
    }

    /// Binding power of the peeked infix position, if it continues `left`.
    fn peek_infix_bp(&self, left: &Expr) -> Option<u8> {
        if let Some(bp) = operator_bp(self.peek.kind) {
            return Some(bp);
        }
        // Call binds only on a bare identifier head.
        if self.peek.kind == TokenKind::LParen && matches!(left, Expr::Ident(_)) {
            return Some(bp::CALL);
        }
        if concat_operand_start(self.peek.kind) {
            return Some(bp::SUM);
        }
        None
    }

    fn parse_prefix_expr(&mut self) -> PResult<Expr> {
        match self.cur.kind {
            TokenKind::String => Ok(Expr::String(StringLit {
                meta: self.cur_meta(),
                value: self.cur.literal.clone(),
                long: false,
            })),
            TokenKind::OpenString => Ok(Expr::String(StringLit {
                meta: self.cur_meta(),
                value: self.cur.literal.clone(),
                long: true,
            })),
            TokenKind::Int => {
                let value = self
                    .cur
                    .literal
                    .parse::<i64>()
                    .map_err(|_| crate::ParseError::InvalidLiteral {
                        kind: "integer",
                        literal: self.cur.literal.clone(),
                        span: self.cur.span,
                    })?;
                Ok(Expr::Int(IntLit {
                    meta: self.cur_meta(),
                    value,
                }))
            }
            TokenKind::Float => {
                let value = self
                    .cur
                    .literal
                    .parse::<f64>()
                    .map_err(|_| crate::ParseError::InvalidLiteral {
                        kind: "float",
                        literal: self.cur.literal.clone(),
                        span: self.cur.span,
                    })?;
                Ok(Expr::Float(FloatLit {
                    meta: self.cur_meta(),
                    value,
                }))
            }
            TokenKind::RTime => Ok(Expr::RTime(RTimeLit {
                meta: self.cur_meta(),
                value: self.cur.literal.clone(),
            })),
            TokenKind::True | TokenKind::False => Ok(Expr::Bool(BoolLit {
                meta: self.cur_meta(),
                value: self.cur.kind == TokenKind::True,
            })),
            TokenKind::Not | TokenKind::Minus => {
                let meta = self.cur_meta();
                let operator = self.cur.literal.clone();
                self.next_token();
                let right = self.parse_expression(bp::PREFIX)?;
                Ok(Expr::Prefix(PrefixExpr {
                    meta,
                    operator,
                    right: Box::new(right),
                }))
            }
            TokenKind::LParen => {
                let meta = self.cur_meta();
                self.next_token();
                let right = self.parse_expression(bp::LOWEST)?;
                self.expect_peek(TokenKind::RParen)?;
                Ok(Expr::Grouped(GroupedExpr {
                    meta,
                    right: Box::new(right),
                }))
            }
            _ if self.cur.kind.is_ident_like() => Ok(Expr::Ident(self.cur_ident()?)),
            _ => Err(self.unexpected()),
        }
    }

    fn parse_infix_expr(&mut self, left: Expr, bp: u8) -> PResult<Expr> {
        match self.cur.kind {
            TokenKind::LParen => self.parse_call_expr(left),
            TokenKind::Increment | TokenKind::Decrement => Ok(Expr::Postfix(PostfixExpr {
                meta: self.cur_meta(),
                left: Box::new(left),
                operator: self.cur.literal.clone(),
            })),
            kind if operator_bp(kind).is_some() => {
                let meta = self.cur_meta();
                let operator = self.cur.literal.clone();
                self.next_token();
                let right = self.parse_expression(bp)?;
                Ok(Expr::Infix(InfixExpr {
                    meta,
                    operator,
                    left: Box::new(left),
                    right: Box::new(right),
                }))
            }
            // Juxtaposed concatenation: cur is already the first token of
            // the right operand.
            _ => {
                let meta = self.cur_meta();
                let right = self.parse_expression(bp::SUM)?;
                Ok(Expr::Infix(InfixExpr {
                    meta,
                    operator: "+".to_string(),
                    left: Box::new(left),
                    right: Box::new(right),
                }))
            }
        }
    }

    /// Parse a call's argument list; `cur` is on the opening paren.
    pub(crate) fn parse_call_arguments(&mut self) -> PResult<Vec<Expr>> {
        let mut arguments = Vec::new();
        if self.peek_is(TokenKind::RParen) {
            self.next_token();
            return Ok(arguments);
        }
        self.next_token();
        arguments.push(self.parse_expression(bp::LOWEST)?);
        while self.peek_is(TokenKind::Comma) {
            self.next_token();
            self.next_token();
            arguments.push(self.parse_expression(bp::LOWEST)?);
        }
        self.expect_peek(TokenKind::RParen)?;
        Ok(arguments)
    }

    fn parse_call_expr(&mut self, left: Expr) -> PResult<Expr> {
        let function = match left {
            Expr::Ident(ident) => ident,
            _ => return Err(self.unexpected()),
        };
        let meta = function.meta.clone();
        let arguments = self.parse_call_arguments()?;
        Ok(Expr::FunctionCall(FunctionCallExpr {
            meta,
            function,
            arguments,
        }))
    }
}

#[cfg(test)]
mod tests {
    use vex_util::{FileId, Handler};

    use crate::ast::{Declaration, Expr, Statement};
    use crate::Parser;

    /// Parse `src` as the value of a set statement and render it.
    fn expr_of(src: &str) -> String {
        let module = format!("sub s {{ set var.x = {src}; }}");
        let handler = Handler::new();
        let decls = Parser::new(&module, FileId(0), &handler).parse_module();
        assert!(!handler.has_errors(), "diagnostics: {:?}", handler.diagnostics());
        let Declaration::Subroutine(sub) = &decls[0] else {
            panic!("expected subroutine");
        };
        let Statement::Set(set) = &sub.block.statements[0] else {
            panic!("expected set statement");
        };
        set.value.to_string()
    }

    fn expr_ast(src: &str) -> Expr {
        let module = format!("sub s {{ set var.x = {src}; }}");
        let handler = Handler::new();
        let decls = Parser::new(&module, FileId(0), &handler).parse_module();
        let Declaration::Subroutine(sub) = decls.into_iter().next().unwrap() else {
            panic!("expected subroutine");
        };
        let Statement::Set(set) = sub.block.statements.into_iter().next().unwrap() else {
            panic!("expected set statement");
        };
        set.value
    }

    #[test]
    fn test_precedence_product_over_sum() {
        let expr = expr_ast("1 + 2 * 3");
        let Expr::Infix(infix) = expr else { panic!() };
        assert_eq!(infix.operator, "+");
        assert_eq!(infix.right.to_string(), "2 * 3");
    }

    #[test]
    fn test_left_associativity() {
        assert_eq!(expr_of("1 - 2 - 3"), "1 - 2 - 3");
        let Expr::Infix(infix) = expr_ast("1 - 2 - 3") else {
            panic!()
        };
        assert_eq!(infix.left.to_string(), "1 - 2");
    }

    #[test]
    fn test_logical_precedence() {
        let Expr::Infix(infix) = expr_ast("a == \"x\" && b != \"y\" || c") else {
            panic!()
        };
        assert_eq!(infix.operator, "||");
        assert_eq!(infix.left.to_string(), "a == \"x\" && b != \"y\"");
    }

    #[test]
    fn test_regex_match_operator() {
        let Expr::Infix(infix) = expr_ast("req.url ~ \"^/foo\"") else {
            panic!()
        };
        assert_eq!(infix.operator, "~");
    }

    #[test]
    fn test_grouping() {
        let Expr::Infix(infix) = expr_ast("(1 + 2) * 3") else { panic!() };
        assert_eq!(infix.operator, "*");
        assert_eq!(infix.left.to_string(), "(1 + 2)");
    }

    #[test]
    fn test_prefix_operators() {
        assert_eq!(expr_of("!req.http.X"), "!req.http.X");
        assert_eq!(expr_of("-5"), "-5");
    }

    #[test]
    fn test_juxtaposed_concatenation_desugars_to_plus() {
        let Expr::Infix(infix) = expr_ast("\"a\" req.http.B \"c\"") else {
            panic!()
        };
        // Left associative: ("a" + req.http.B) + "c"
        assert_eq!(infix.operator, "+");
        assert_eq!(infix.left.to_string(), "\"a\" + req.http.B");
        assert_eq!(infix.right.to_string(), "\"c\"");
    }

    #[test]
    fn test_function_call_expression() {
        let Expr::FunctionCall(call) = expr_ast("std.tolower(req.http.Host, \"x\")") else {
            panic!()
        };
        assert_eq!(call.function.name, "std.tolower");
        assert_eq!(call.arguments.len(), 2);
    }

    #[test]
    fn test_nested_call_in_concat() {
        assert_eq!(
            expr_of("\"host=\" std.tolower(req.http.Host)"),
            "\"host=\" + std.tolower(req.http.Host)"
        );
    }

    #[test]
    fn test_rtime_literal_keeps_suffix() {
        assert_eq!(expr_of("10s"), "10s");
        assert_eq!(expr_of("1.5h"), "1.5h");
    }
}
