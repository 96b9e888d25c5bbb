//! Statement parsing.
//!
//! Each statement keyword has a dedicated production. A failed statement
//! reports its error and recovery skips to the next `;` or the enclosing
//! `}`, so one broken statement costs exactly one diagnostic.

use vex_lex::TokenKind;

use crate::ast::{
    AddStmt, Block, BreakStmt, CallStmt, CaseStmt, CaseTest, DeclareStmt, ElseStmt, ErrorStmt,
    EsiStmt, FallthroughStmt, FunctionCallStmt, GotoDestinationStmt, GotoStmt, IfStmt,
    ImportStmt, IncludeStmt, LogStmt, RemoveStmt, RestartStmt, ReturnStmt, SetStmt, Statement,
    StringLit, SwitchStmt, SyntheticBase64Stmt, SyntheticStmt, UnsetStmt,
};
use crate::expr::bp;
use crate::{PResult, Parser};

impl<'a> Parser<'a> {
    /// Parse a braced block; `cur` is on `{`, returns with `cur` on `}`.
    pub(crate) fn parse_block(&mut self) -> PResult<Block> {
        let meta = self.cur_meta();
        let mut statements = Vec::new();

        self.next_token();
        while !self.cur_is(TokenKind::RBrace) {
            if self.cur_is(TokenKind::Eof) {
                return Err(self.expected("'}'"));
            }
            match self.parse_statement() {
                Ok(stmt) => statements.push(stmt),
                Err(err) => {
                    self.report(&err);
                    self.recover();
                    if self.cur_is(TokenKind::RBrace) {
                        break;
                    }
                }
            }
            self.next_token();
        }

        Ok(Block { meta, statements })
    }

    /// Parse one statement; `cur` is on its first token, returns with
    /// `cur` on its final token (usually `;`).
    pub(crate) fn parse_statement(&mut self) -> PResult<Statement> {
        match self.cur.kind {
            TokenKind::Set => self.parse_set_statement(),
            TokenKind::Add => self.parse_add_statement(),
            TokenKind::Unset => {
                let meta = self.cur_meta();
                let ident = self.expect_peek_ident()?;
                self.expect_peek(TokenKind::Semicolon)?;
                Ok(Statement::Unset(UnsetStmt { meta, ident }))
            }
            TokenKind::Remove => {
                let meta = self.cur_meta();
                let ident = self.expect_peek_ident()?;
                self.expect_peek(TokenKind::Semicolon)?;
                Ok(Statement::Remove(RemoveStmt { meta, ident }))
            }
            TokenKind::Declare => self.parse_declare_statement(),
            TokenKind::Call => self.parse_call_statement(),
            TokenKind::If => {
                let stmt = self.parse_if_statement("if")?;
                Ok(Statement::If(stmt))
            }
            TokenKind::Switch => self.parse_switch_statement(),
            TokenKind::Return => self.parse_return_statement(),
            TokenKind::Restart => {
                let meta = self.cur_meta();
                self.expect_peek(TokenKind::Semicolon)?;
                Ok(Statement::Restart(RestartStmt { meta }))
            }
            TokenKind::Error => self.parse_error_statement(),
            TokenKind::Esi => {
                let meta = self.cur_meta();
                self.expect_peek(TokenKind::Semicolon)?;
                Ok(Statement::Esi(EsiStmt { meta }))
            }
            TokenKind::Log => {
                let meta = self.cur_meta();
                self.next_token();
                let value = self.parse_expression(bp::LOWEST)?;
                self.expect_peek(TokenKind::Semicolon)?;
                Ok(Statement::Log(LogStmt { meta, value }))
            }
            TokenKind::Synthetic => {
                let meta = self.cur_meta();
                self.next_token();
                let value = self.parse_expression(bp::LOWEST)?;
                self.expect_peek(TokenKind::Semicolon)?;
                Ok(Statement::Synthetic(SyntheticStmt { meta, value }))
            }
            TokenKind::SyntheticBase64 => {
                let meta = self.cur_meta();
                self.next_token();
                let value = self.parse_expression(bp::LOWEST)?;
                self.expect_peek(TokenKind::Semicolon)?;
                Ok(Statement::SyntheticBase64(SyntheticBase64Stmt { meta, value }))
            }
            TokenKind::Goto => {
                let meta = self.cur_meta();
                let destination = self.expect_peek_ident()?;
                self.expect_peek(TokenKind::Semicolon)?;
                Ok(Statement::Goto(GotoStmt { meta, destination }))
            }
            TokenKind::Break => {
                let meta = self.cur_meta();
                self.expect_peek(TokenKind::Semicolon)?;
                Ok(Statement::Break(BreakStmt { meta }))
            }
            TokenKind::Fallthrough => {
                let meta = self.cur_meta();
                self.expect_peek(TokenKind::Semicolon)?;
                Ok(Statement::Fallthrough(FallthroughStmt { meta }))
            }
            TokenKind::Import => {
                let meta = self.cur_meta();
                let name = self.expect_peek_ident()?;
                self.expect_peek(TokenKind::Semicolon)?;
                Ok(Statement::Import(ImportStmt { meta, name }))
            }
            TokenKind::Include => {
                let stmt = self.parse_include()?;
                Ok(Statement::Include(stmt))
            }
            _ if self.cur.kind.is_ident_like() => self.parse_ident_statement(),
            _ => Err(self.unexpected()),
        }
    }

    /// `include "module";` shared between statement and declaration position.
    pub(crate) fn parse_include(&mut self) -> PResult<IncludeStmt> {
        let meta = self.cur_meta();
        self.expect_peek(TokenKind::String)?;
        let module = StringLit {
            meta: self.cur_meta(),
            value: self.cur.literal.clone(),
            long: false,
        };
        self.expect_peek(TokenKind::Semicolon)?;
        Ok(IncludeStmt { meta, module })
    }

    fn parse_set_statement(&mut self) -> PResult<Statement> {
        let meta = self.cur_meta();
        let ident = self.expect_peek_ident()?;
        self.next_token();
        if !self.cur.kind.is_assignment_operator() {
            return Err(self.expected("assignment operator"));
        }
        let operator = self.cur.literal.clone();
        self.next_token();
        let value = self.parse_expression(bp::LOWEST)?;
        self.expect_peek(TokenKind::Semicolon)?;
        Ok(Statement::Set(SetStmt {
            meta,
            ident,
            operator,
            value,
        }))
    }

    /// `add` appends a header occurrence; only plain `=` is meaningful
    /// but the operator spelling is preserved like `set`.
    fn parse_add_statement(&mut self) -> PResult<Statement> {
        let meta = self.cur_meta();
        let ident = self.expect_peek_ident()?;
        self.next_token();
        if !self.cur.kind.is_assignment_operator() {
            return Err(self.expected("assignment operator"));
        }
        let operator = self.cur.literal.clone();
        self.next_token();
        let value = self.parse_expression(bp::LOWEST)?;
        self.expect_peek(TokenKind::Semicolon)?;
        Ok(Statement::Add(AddStmt {
            meta,
            ident,
            operator,
            value,
        }))
    }

    fn parse_declare_statement(&mut self) -> PResult<Statement> {
        let meta = self.cur_meta();
        let local = self.expect_peek_ident()?;
        if local.name != "local" {
            return Err(self.expected("'local'"));
        }
        let name = self.expect_peek_ident()?;
        let value_type = self.expect_peek_ident()?;
        self.expect_peek(TokenKind::Semicolon)?;
        Ok(Statement::Declare(DeclareStmt {
            meta,
            name,
            value_type,
        }))
    }

    fn parse_call_statement(&mut self) -> PResult<Statement> {
        let meta = self.cur_meta();
        let subroutine = self.expect_peek_ident()?;
        // `call sub;` and `call sub();` are both accepted.
        if self.peek_is(TokenKind::LParen) {
            self.next_token();
            self.expect_peek(TokenKind::RParen)?;
        }
        self.expect_peek(TokenKind::Semicolon)?;
        Ok(Statement::Call(CallStmt { meta, subroutine }))
    }

    /// Parse `if`/`else if`/`elsif`/`elseif` chains. `keyword` is the
    /// spelling that introduced this branch.
    fn parse_if_statement(&mut self, keyword: &str) -> PResult<IfStmt> {
        let meta = self.cur_meta();
        self.expect_peek(TokenKind::LParen)?;
        self.next_token();
        let condition = self.parse_expression(bp::LOWEST)?;
        self.expect_peek(TokenKind::RParen)?;
        self.expect_peek(TokenKind::LBrace)?;
        let consequence = self.parse_block()?;

        let mut another = Vec::new();
        let mut alternative = None;

        loop {
            match self.peek.kind {
                TokenKind::Else => {
                    self.next_token();
                    if self.peek_is(TokenKind::If) {
                        self.next_token();
                        another.push(self.parse_if_statement("else if")?);
                    } else {
                        let else_meta = self.cur_meta();
                        self.expect_peek(TokenKind::LBrace)?;
                        let consequence = self.parse_block()?;
                        alternative = Some(ElseStmt {
                            meta: else_meta,
                            consequence,
                        });
                        break;
                    }
                }
                TokenKind::Elsif | TokenKind::Elseif => {
                    self.next_token();
                    let spelling = self.cur.literal.clone();
                    another.push(self.parse_if_statement(&spelling)?);
                }
                _ => break,
            }
        }

        Ok(IfStmt {
            meta,
            keyword: keyword.to_string(),
            condition,
            consequence,
            another,
            alternative,
        })
    }

    fn parse_switch_statement(&mut self) -> PResult<Statement> {
        let meta = self.cur_meta();
        self.expect_peek(TokenKind::LParen)?;
        self.next_token();
        let control = self.parse_expression(bp::LOWEST)?;
        self.expect_peek(TokenKind::RParen)?;
        self.expect_peek(TokenKind::LBrace)?;

        let mut cases: Vec<CaseStmt> = Vec::new();
        let mut default: i64 = -1;

        self.next_token();
        while !self.cur_is(TokenKind::RBrace) {
            if self.cur_is(TokenKind::Eof) {
                return Err(self.expected("'}'"));
            }
            let case = self.parse_case()?;
            if case.test.is_none() {
                if default >= 0 {
                    return Err(self.expected("at most one default case"));
                }
                default = cases.len() as i64;
            }
            cases.push(case);
        }

        Ok(Statement::Switch(SwitchStmt {
            meta,
            control,
            cases,
            default,
        }))
    }

    /// Parse one `case`/`default` arm, leaving `cur` on the token that
    /// starts the next arm or the closing `}`.
    fn parse_case(&mut self) -> PResult<CaseStmt> {
        let meta = self.cur_meta();
        let test = match self.cur.kind {
            TokenKind::Case => {
                let (operator, test_meta) = if self.peek_is(TokenKind::Match) {
                    self.next_token();
                    ("~".to_string(), self.cur_meta())
                } else {
                    ("==".to_string(), self.cur_meta())
                };
                self.next_token();
                let right = self.parse_expression(bp::COMPARISON)?;
                self.expect_peek(TokenKind::Colon)?;
                Some(CaseTest {
                    meta: test_meta,
                    operator,
                    right,
                })
            }
            TokenKind::Default => {
                self.expect_peek(TokenKind::Colon)?;
                None
            }
            _ => return Err(self.expected("'case' or 'default'")),
        };

        let mut statements = Vec::new();
        let mut fell_through = false;
        self.next_token();
        while !matches!(
            self.cur.kind,
            TokenKind::Case | TokenKind::Default | TokenKind::RBrace
        ) {
            if self.cur_is(TokenKind::Eof) {
                return Err(self.expected("'}'"));
            }
            let stmt = self.parse_statement()?;
            if matches!(stmt, Statement::Fallthrough(_)) {
                fell_through = true;
                self.next_token();
                break;
            }
            let is_break = matches!(stmt, Statement::Break(_));
            statements.push(stmt);
            self.next_token();
            if is_break {
                break;
            }
        }

        Ok(CaseStmt {
            meta,
            test,
            statements,
            fallthrough: fell_through,
        })
    }

    fn parse_return_statement(&mut self) -> PResult<Statement> {
        let meta = self.cur_meta();
        if self.peek_is(TokenKind::Semicolon) {
            self.next_token();
            return Ok(Statement::Return(ReturnStmt {
                meta,
                expression: None,
                has_parenthesis: false,
            }));
        }

        let has_parenthesis = self.peek_is(TokenKind::LParen);
        if has_parenthesis {
            self.next_token();
        }
        self.next_token();
        let expression = self.parse_expression(bp::LOWEST)?;
        if has_parenthesis {
            self.expect_peek(TokenKind::RParen)?;
        }
        self.expect_peek(TokenKind::Semicolon)?;
        Ok(Statement::Return(ReturnStmt {
            meta,
            expression: Some(Box::new(expression)),
            has_parenthesis,
        }))
    }

    /// `error [code [argument]];` — the code parses above the
    /// concatenation level so the argument stays a separate expression.
    fn parse_error_statement(&mut self) -> PResult<Statement> {
        let meta = self.cur_meta();
        if self.peek_is(TokenKind::Semicolon) {
            self.next_token();
            return Ok(Statement::Error(ErrorStmt {
                meta,
                code: None,
                argument: None,
            }));
        }

        self.next_token();
        let code = self.parse_expression(bp::PRODUCT)?;
        let argument = if self.peek_is(TokenKind::Semicolon) {
            None
        } else {
            self.next_token();
            Some(self.parse_expression(bp::LOWEST)?)
        };
        self.expect_peek(TokenKind::Semicolon)?;
        Ok(Statement::Error(ErrorStmt {
            meta,
            code: Some(code),
            argument,
        }))
    }

    /// Identifier-headed statements: goto destinations (`name:`) and
    /// function calls (`name(args);`).
    fn parse_ident_statement(&mut self) -> PResult<Statement> {
        let meta = self.cur_meta();
        let ident = self.cur_ident()?;
        match self.peek.kind {
            TokenKind::Colon => {
                self.next_token();
                Ok(Statement::GotoDestination(GotoDestinationStmt {
                    meta,
                    name: ident,
                }))
            }
            TokenKind::LParen => {
                self.next_token();
                let arguments = self.parse_call_arguments()?;
                self.expect_peek(TokenKind::Semicolon)?;
                Ok(Statement::FunctionCall(FunctionCallStmt {
                    meta,
                    function: ident,
                    arguments,
                }))
            }
            _ => Err(self.unexpected()),
        }
    }
}

#[cfg(test)]
mod tests {
    use vex_util::{FileId, Handler};

    use crate::ast::{Declaration, Statement};
    use crate::Parser;

    fn statements(body: &str) -> Vec<Statement> {
        let module = format!("sub s {{ {body} }}");
        let handler = Handler::new();
        let decls = Parser::new(&module, FileId(0), &handler).parse_module();
        assert!(!handler.has_errors(), "diagnostics: {:?}", handler.diagnostics());
        let Declaration::Subroutine(sub) = decls.into_iter().next().unwrap() else {
            panic!("expected subroutine");
        };
        sub.block.statements
    }

    #[test]
    fn test_set_compound_operator() {
        let stmts = statements("set var.a rol= 2;");
        let Statement::Set(set) = &stmts[0] else { panic!() };
        assert_eq!(set.operator, "rol=");
    }

    #[test]
    fn test_declare_local() {
        let stmts = statements("declare local var.count INTEGER;");
        let Statement::Declare(decl) = &stmts[0] else { panic!() };
        assert_eq!(decl.name.name, "var.count");
        assert_eq!(decl.value_type.name, "INTEGER");
    }

    #[test]
    fn test_if_chain_spellings_preserved() {
        let stmts = statements(
            "if (a) { esi; } else if (b) { } elsif (c) { } elseif (d) { } else { restart; }",
        );
        let Statement::If(stmt) = &stmts[0] else { panic!() };
        assert_eq!(stmt.keyword, "if");
        let spellings: Vec<_> = stmt.another.iter().map(|c| c.keyword.as_str()).collect();
        assert_eq!(spellings, vec!["else if", "elsif", "elseif"]);
        assert!(stmt.alternative.is_some());
    }

    #[test]
    fn test_return_forms() {
        let stmts = statements("return; return lookup; return(pass);");
        let Statement::Return(bare) = &stmts[0] else { panic!() };
        assert!(bare.expression.is_none());

        let Statement::Return(action) = &stmts[1] else { panic!() };
        assert!(!action.has_parenthesis);

        let Statement::Return(wrapped) = &stmts[2] else { panic!() };
        assert!(wrapped.has_parenthesis);
        assert_eq!(wrapped.expression.as_ref().unwrap().to_string(), "pass");
    }

    #[test]
    fn test_error_code_and_argument() {
        let stmts = statements("error 404 \"not found: \" req.url;");
        let Statement::Error(err) = &stmts[0] else { panic!() };
        assert_eq!(err.code.as_ref().unwrap().to_string(), "404");
        assert_eq!(
            err.argument.as_ref().unwrap().to_string(),
            "\"not found: \" + req.url"
        );
    }

    #[test]
    fn test_switch_cases_default_and_fallthrough() {
        let stmts = statements(
            r#"switch (req.http.Host) {
                 case "a": set var.x = 1; break;
                 case ~ "^b": fallthrough;
                 default: set var.x = 2; break;
               }"#,
        );
        let Statement::Switch(switch) = &stmts[0] else { panic!() };
        assert_eq!(switch.cases.len(), 3);
        assert_eq!(switch.default, 2);
        assert_eq!(switch.cases[0].test.as_ref().unwrap().operator, "==");
        assert_eq!(switch.cases[1].test.as_ref().unwrap().operator, "~");
        assert!(switch.cases[1].fallthrough);
        assert!(!switch.cases[0].fallthrough);
    }

    #[test]
    fn test_duplicate_default_rejected() {
        let module = "sub s { switch (a) { default: break; default: break; } }";
        let handler = Handler::new();
        Parser::new(module, FileId(0), &handler).parse_module();
        assert!(handler.has_errors());
    }

    #[test]
    fn test_goto_and_destination() {
        let stmts = statements("goto done; set var.x = 1; done:");
        assert!(matches!(stmts[0], Statement::Goto(_)));
        let Statement::GotoDestination(dest) = &stmts[2] else { panic!() };
        assert_eq!(dest.name.name, "done");
    }

    #[test]
    fn test_function_call_statement() {
        let stmts = statements("header.unset(req, \"X-Debug\");");
        let Statement::FunctionCall(call) = &stmts[0] else { panic!() };
        assert_eq!(call.function.name, "header.unset");
        assert_eq!(call.arguments.len(), 2);
    }

    #[test]
    fn test_synthetic_statements() {
        let stmts = statements("synthetic {\"<html></html>\"}; synthetic.base64 \"YWJj\";");
        assert!(matches!(stmts[0], Statement::Synthetic(_)));
        assert!(matches!(stmts[1], Statement::SyntheticBase64(_)));
    }

    #[test]
    fn test_include_inside_subroutine() {
        let stmts = statements("include \"shared_recv\";");
        let Statement::Include(include) = &stmts[0] else { panic!() };
        assert_eq!(include.module.value, "shared_recv");
    }
}
