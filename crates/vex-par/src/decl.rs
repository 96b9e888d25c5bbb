//! Declaration parsing.
//!
//! One production per top-level form: `acl`, `backend`, `director`,
//! `table`, `sub`, `penaltybox`, `ratecounter`, `import`, `include`.

use vex_lex::TokenKind;

use crate::ast::{
    AclDecl, AclEntry, BackendDecl, BackendProperty, Declaration, DirectorBackend, DirectorDecl,
    DirectorEntry, DirectorProperty, Expr, ImportStmt, PenaltyboxDecl, PostfixExpr,
    PropertyValue, RatecounterDecl, StringLit, SubroutineDecl, TableDecl, TableEntry,
};
use crate::expr::bp;
use crate::{PResult, Parser};

impl<'a> Parser<'a> {
    /// Parse one top-level declaration; `cur` is on its first token.
    pub(crate) fn parse_declaration(&mut self) -> PResult<Declaration> {
        match self.cur.kind {
            TokenKind::Acl => self.parse_acl(),
            TokenKind::Backend => self.parse_backend(),
            TokenKind::Director => self.parse_director(),
            TokenKind::Table => self.parse_table(),
            TokenKind::Sub => self.parse_subroutine(),
            TokenKind::Penaltybox => {
                let meta = self.cur_meta();
                let name = self.expect_peek_ident()?;
                self.expect_peek(TokenKind::LBrace)?;
                self.expect_peek(TokenKind::RBrace)?;
                Ok(Declaration::Penaltybox(PenaltyboxDecl { meta, name }))
            }
            TokenKind::Ratecounter => {
                let meta = self.cur_meta();
                let name = self.expect_peek_ident()?;
                self.expect_peek(TokenKind::LBrace)?;
                self.expect_peek(TokenKind::RBrace)?;
                Ok(Declaration::Ratecounter(RatecounterDecl { meta, name }))
            }
            TokenKind::Import => {
                let meta = self.cur_meta();
                let name = self.expect_peek_ident()?;
                self.expect_peek(TokenKind::Semicolon)?;
                Ok(Declaration::Import(ImportStmt { meta, name }))
            }
            TokenKind::Include => Ok(Declaration::Include(self.parse_include()?)),
            _ => Err(self.unexpected()),
        }
    }

    fn parse_acl(&mut self) -> PResult<Declaration> {
        let meta = self.cur_meta();
        let name = self.expect_peek_ident()?;
        self.expect_peek(TokenKind::LBrace)?;

        let mut entries = Vec::new();
        self.next_token();
        while !self.cur_is(TokenKind::RBrace) {
            if self.cur_is(TokenKind::Eof) {
                return Err(self.expected("'}'"));
            }
            entries.push(self.parse_acl_entry()?);
            self.next_token();
        }

        Ok(Declaration::Acl(AclDecl {
            meta,
            name,
            entries,
        }))
    }

    /// One ACL entry: `[!] "address" [/mask];`
    fn parse_acl_entry(&mut self) -> PResult<AclEntry> {
        let meta = self.cur_meta();
        let inverse = if self.cur_is(TokenKind::Not) {
            self.next_token();
            true
        } else {
            false
        };

        if !self.cur_is(TokenKind::String) {
            return Err(self.expected("address string"));
        }
        let address = self.cur.literal.clone();

        let mask = if self.peek_is(TokenKind::Slash) {
            self.next_token();
            self.expect_peek(TokenKind::Int)?;
            let mask = self
                .cur
                .literal
                .parse::<i64>()
                .map_err(|_| self.expected("CIDR mask"))?;
            Some(mask)
        } else {
            None
        };

        self.expect_peek(TokenKind::Semicolon)?;
        Ok(AclEntry {
            meta,
            inverse,
            address,
            mask,
        })
    }

    fn parse_backend(&mut self) -> PResult<Declaration> {
        let meta = self.cur_meta();
        let name = self.expect_peek_ident()?;
        self.expect_peek(TokenKind::LBrace)?;
        let properties = self.parse_backend_properties()?;
        Ok(Declaration::Backend(BackendDecl {
            meta,
            name,
            properties,
        }))
    }

    /// Parse `.key = value;` properties until the closing brace; `cur`
    /// is on `{`, returns with `cur` on `}`.
    fn parse_backend_properties(&mut self) -> PResult<Vec<BackendProperty>> {
        let mut properties = Vec::new();
        self.next_token();
        while !self.cur_is(TokenKind::RBrace) {
            if self.cur_is(TokenKind::Eof) {
                return Err(self.expected("'}'"));
            }
            properties.push(self.parse_backend_property()?);
            self.next_token();
        }
        Ok(properties)
    }

    fn parse_backend_property(&mut self) -> PResult<BackendProperty> {
        let meta = self.cur_meta();
        let key = self.parse_property_key()?;
        self.expect_peek(TokenKind::Assign)?;

        if self.peek_is(TokenKind::LBrace) {
            // Nested object, e.g. `.probe = { .request = …; }`
            self.next_token();
            let object = self.parse_backend_properties()?;
            if self.peek_is(TokenKind::Semicolon) {
                self.next_token();
            }
            return Ok(BackendProperty {
                meta,
                key,
                value: PropertyValue::Object(object),
            });
        }

        self.next_token();
        let value = self.parse_expression(bp::LOWEST)?;
        self.expect_peek(TokenKind::Semicolon)?;
        Ok(BackendProperty {
            meta,
            key,
            value: PropertyValue::Expr(value),
        })
    }

    /// A dotted property key (`.host`). The dot lexes into the identifier.
    fn parse_property_key(&mut self) -> PResult<crate::ast::Ident> {
        let mut key = self.cur_ident()?;
        match key.name.strip_prefix('.') {
            Some(rest) if !rest.is_empty() => {
                key.name = rest.to_string();
                Ok(key)
            }
            _ => Err(self.expected("'.'-prefixed property")),
        }
    }

    fn parse_director(&mut self) -> PResult<Declaration> {
        let meta = self.cur_meta();
        let name = self.expect_peek_ident()?;
        let kind = self.expect_peek_ident()?;
        self.expect_peek(TokenKind::LBrace)?;

        let mut entries = Vec::new();
        self.next_token();
        while !self.cur_is(TokenKind::RBrace) {
            match self.cur.kind {
                TokenKind::Eof => return Err(self.expected("'}'")),
                TokenKind::LBrace => {
                    let backend_meta = self.cur_meta();
                    let mut properties = Vec::new();
                    self.next_token();
                    while !self.cur_is(TokenKind::RBrace) {
                        if self.cur_is(TokenKind::Eof) {
                            return Err(self.expected("'}'"));
                        }
                        properties.push(self.parse_director_property()?);
                        self.next_token();
                    }
                    entries.push(DirectorEntry::Backend(DirectorBackend {
                        meta: backend_meta,
                        properties,
                    }));
                }
                _ => {
                    let property = self.parse_director_property()?;
                    entries.push(DirectorEntry::Property(property));
                }
            }
            self.next_token();
        }

        Ok(Declaration::Director(DirectorDecl {
            meta,
            name,
            kind,
            entries,
        }))
    }

    /// `.key = value;` where the value may carry a `%` weight suffix
    /// (`.quorum = 50%;`).
    fn parse_director_property(&mut self) -> PResult<DirectorProperty> {
        let meta = self.cur_meta();
        let key = self.parse_property_key()?;
        self.expect_peek(TokenKind::Assign)?;
        self.next_token();
        let mut value = self.parse_expression(bp::PRODUCT)?;
        if self.peek_is(TokenKind::Percent) {
            self.next_token();
            value = Expr::Postfix(PostfixExpr {
                meta: self.cur_meta(),
                left: Box::new(value),
                operator: "%".to_string(),
            });
        }
        self.expect_peek(TokenKind::Semicolon)?;
        Ok(DirectorProperty { meta, key, value })
    }

    fn parse_table(&mut self) -> PResult<Declaration> {
        let meta = self.cur_meta();
        let name = self.expect_peek_ident()?;
        let value_type = if !self.peek_is(TokenKind::LBrace) {
            Some(self.expect_peek_ident()?)
        } else {
            None
        };
        self.expect_peek(TokenKind::LBrace)?;

        let mut entries = Vec::new();
        self.next_token();
        while !self.cur_is(TokenKind::RBrace) {
            if self.cur_is(TokenKind::Eof) {
                return Err(self.expected("'}'"));
            }
            entries.push(self.parse_table_entry()?);
            self.next_token();
        }

        Ok(Declaration::Table(TableDecl {
            meta,
            name,
            value_type,
            entries,
        }))
    }

    /// `"key": value[,]`
    fn parse_table_entry(&mut self) -> PResult<TableEntry> {
        let meta = self.cur_meta();
        if !self.cur_is(TokenKind::String) {
            return Err(self.expected("table key string"));
        }
        let key = StringLit {
            meta: self.cur_meta(),
            value: self.cur.literal.clone(),
            long: false,
        };
        self.expect_peek(TokenKind::Colon)?;
        self.next_token();
        let value = self.parse_expression(bp::COMPARISON)?;
        if self.peek_is(TokenKind::Comma) {
            self.next_token();
        }
        Ok(TableEntry { meta, key, value })
    }

    fn parse_subroutine(&mut self) -> PResult<Declaration> {
        let meta = self.cur_meta();
        let name = self.expect_peek_ident()?;
        let return_type = if !self.peek_is(TokenKind::LBrace) {
            Some(self.expect_peek_ident()?)
        } else {
            None
        };
        self.expect_peek(TokenKind::LBrace)?;
        let block = self.parse_block()?;
        Ok(Declaration::Subroutine(SubroutineDecl {
            meta,
            name,
            return_type,
            block,
        }))
    }
}

#[cfg(test)]
mod tests {
    use vex_util::{FileId, Handler};

    use crate::ast::{Declaration, DirectorEntry, PropertyValue};
    use crate::parse;

    fn parse_one(src: &str) -> Declaration {
        let handler = Handler::new();
        let decls = parse(src, FileId(0), &handler);
        assert!(!handler.has_errors(), "diagnostics: {:?}", handler.diagnostics());
        assert_eq!(decls.len(), 1);
        decls.into_iter().next().unwrap()
    }

    #[test]
    fn test_acl_entries() {
        let decl = parse_one(
            r#"acl internal {
                 "10.0.0.0"/8;
                 ! "192.168.0.1";
                 "::1";
               }"#,
        );
        let Declaration::Acl(acl) = decl else { panic!() };
        assert_eq!(acl.name.name, "internal");
        assert_eq!(acl.entries.len(), 3);
        assert_eq!(acl.entries[0].mask, Some(8));
        assert!(acl.entries[1].inverse);
        assert_eq!(acl.entries[2].address, "::1");
    }

    #[test]
    fn test_backend_with_probe_object() {
        let decl = parse_one(
            r#"backend origin {
                 .host = "example.com";
                 .port = "443";
                 .connect_timeout = 1s;
                 .ssl = true;
                 .probe = {
                   .request = "GET / HTTP/1.1";
                   .timeout = 5s;
                 }
               }"#,
        );
        let Declaration::Backend(backend) = decl else { panic!() };
        assert_eq!(backend.properties.len(), 5);
        let PropertyValue::Object(probe) = &backend.properties[4].value else {
            panic!("expected nested probe object");
        };
        assert_eq!(probe.len(), 2);
        assert_eq!(backend.properties[4].key.name, "probe");
    }

    #[test]
    fn test_director_with_weighted_backends() {
        let decl = parse_one(
            r#"director edge random {
                 .quorum = 50%;
                 { .backend = origin_a; .weight = 2; }
                 { .backend = origin_b; .weight = 1; }
               }"#,
        );
        let Declaration::Director(director) = decl else { panic!() };
        assert_eq!(director.kind.name, "random");
        assert_eq!(director.entries.len(), 3);
        let DirectorEntry::Property(quorum) = &director.entries[0] else {
            panic!()
        };
        assert_eq!(quorum.value.to_string(), "50%");
        let DirectorEntry::Backend(member) = &director.entries[1] else {
            panic!()
        };
        assert_eq!(member.properties[0].value.to_string(), "origin_a");
    }

    #[test]
    fn test_table_with_type_and_entries() {
        let decl = parse_one(
            r#"table redirects STRING {
                 "/old": "/new",
                 "/gone": "/",
               }"#,
        );
        let Declaration::Table(table) = decl else { panic!() };
        assert_eq!(table.value_type.as_ref().unwrap().name, "STRING");
        assert_eq!(table.entries.len(), 2);
        assert_eq!(table.entries[0].key.value, "/old");
    }

    #[test]
    fn test_typed_subroutine() {
        let decl = parse_one("sub normalize_host STRING { return(\"x\"); }");
        let Declaration::Subroutine(sub) = decl else { panic!() };
        assert_eq!(sub.return_type.as_ref().unwrap().name, "STRING");
    }

    #[test]
    fn test_penaltybox_and_ratecounter() {
        let handler = Handler::new();
        let decls = parse(
            "penaltybox banned {}\nratecounter requests {}",
            FileId(0),
            &handler,
        );
        assert!(!handler.has_errors());
        assert!(matches!(decls[0], Declaration::Penaltybox(_)));
        assert!(matches!(decls[1], Declaration::Ratecounter(_)));
    }

    #[test]
    fn test_import_and_include() {
        let handler = Handler::new();
        let decls = parse("import std;\ninclude \"shared\";", FileId(0), &handler);
        assert!(!handler.has_errors());
        assert!(matches!(decls[0], Declaration::Import(_)));
        assert!(matches!(decls[1], Declaration::Include(_)));
    }
}
