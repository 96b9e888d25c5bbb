//! AST encoding.
//!
//! Every node packs its fields in declaration order into a scratch buffer
//! drawn from a thread-local pool, then wraps the payload in a TLV record.

use std::cell::RefCell;

use vex_par::ast::{
    AclDecl, AclEntry, AddStmt, BackendProperty, CaseStmt, Declaration, DirectorEntry,
    DirectorProperty, ErrorStmt, Expr, IfStmt, PropertyValue, ReturnStmt, SetStmt, Statement,
    SwitchStmt,
};

use crate::Tag;

thread_local! {
    /// Scratch buffers reused across nested payload assembly. Buffers are
    /// cleared on checkout and never escape the encoder.
    static SCRATCH_POOL: RefCell<Vec<Vec<u8>>> = const { RefCell::new(Vec::new()) };
}

fn with_scratch<R>(f: impl FnOnce(&mut Vec<u8>) -> R) -> R {
    let mut buf = SCRATCH_POOL
        .with(|pool| pool.borrow_mut().pop())
        .unwrap_or_default();
    buf.clear();
    let result = f(&mut buf);
    SCRATCH_POOL.with(|pool| pool.borrow_mut().push(buf));
    result
}

/// Append a LEB128-encoded length.
fn write_uvarint(out: &mut Vec<u8>, mut value: usize) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Append one TLV record.
fn record(out: &mut Vec<u8>, tag: Tag, payload: &[u8]) {
    out.push(tag as u8);
    write_uvarint(out, payload.len());
    out.extend_from_slice(payload);
}

fn pack_ident(out: &mut Vec<u8>, name: &str) {
    record(out, Tag::Ident, name.as_bytes());
}

fn pack_string(out: &mut Vec<u8>, value: &str) {
    record(out, Tag::String, value.as_bytes());
}

fn pack_integer(out: &mut Vec<u8>, value: i64) {
    record(out, Tag::Integer, &value.to_le_bytes());
}

fn pack_boolean(out: &mut Vec<u8>, value: bool) {
    record(out, Tag::Boolean, &[u8::from(value)]);
}

fn end(out: &mut Vec<u8>) {
    record(out, Tag::End, &[]);
}

/// The AST encoder.
///
/// # Example
///
/// ```
/// use vex_codec::{Decoder, Encoder};
/// use vex_util::{FileId, Handler};
///
/// let handler = Handler::new();
/// let decls = vex_par::parse("sub s { return(pass); }", FileId(0), &handler);
/// let bytes = Encoder::new().encode_module(&decls);
/// let decoded = Decoder::new(&bytes).decode_module().unwrap();
/// assert_eq!(decls[0].to_string(), decoded[0].to_string());
/// ```
#[derive(Default)]
pub struct Encoder {
    _private: (),
}

impl Encoder {
    /// Creates an encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode a module's declarations into one byte stream.
    pub fn encode_module(&mut self, declarations: &[Declaration]) -> Vec<u8> {
        let mut out = Vec::new();
        for declaration in declarations {
            self.encode_declaration(&mut out, declaration);
        }
        out
    }

    fn encode_declaration(&mut self, out: &mut Vec<u8>, declaration: &Declaration) {
        match declaration {
            Declaration::Acl(decl) => self.encode_acl(out, decl),
            Declaration::Backend(decl) => with_scratch(|w| {
                pack_ident(w, &decl.name.name);
                for property in &decl.properties {
                    self.encode_backend_property(w, property);
                }
                record(out, Tag::BackendDeclaration, w);
            }),
            Declaration::Director(decl) => with_scratch(|w| {
                pack_ident(w, &decl.name.name);
                pack_ident(w, &decl.kind.name);
                for entry in &decl.entries {
                    match entry {
                        DirectorEntry::Property(property) => {
                            self.encode_director_property(w, property)
                        }
                        DirectorEntry::Backend(backend) => with_scratch(|b| {
                            for property in &backend.properties {
                                self.encode_director_property(b, property);
                            }
                            record(w, Tag::DirectorBackend, b);
                        }),
                    }
                }
                record(out, Tag::DirectorDeclaration, w);
            }),
            Declaration::Table(decl) => with_scratch(|w| {
                pack_ident(w, &decl.name.name);
                if let Some(value_type) = &decl.value_type {
                    pack_ident(w, &value_type.name);
                }
                for entry in &decl.entries {
                    with_scratch(|e| {
                        pack_string(e, &entry.key.value);
                        self.encode_expression(e, &entry.value);
                        record(w, Tag::TableEntry, e);
                    });
                }
                record(out, Tag::TableDeclaration, w);
            }),
            Declaration::Subroutine(decl) => with_scratch(|w| {
                pack_ident(w, &decl.name.name);
                if let Some(return_type) = &decl.return_type {
                    pack_ident(w, &return_type.name);
                }
                for statement in &decl.block.statements {
                    self.encode_statement(w, statement);
                }
                record(out, Tag::SubroutineDeclaration, w);
            }),
            Declaration::Penaltybox(decl) => with_scratch(|w| {
                pack_ident(w, &decl.name.name);
                record(out, Tag::PenaltyboxDeclaration, w);
            }),
            Declaration::Ratecounter(decl) => with_scratch(|w| {
                pack_ident(w, &decl.name.name);
                record(out, Tag::RatecounterDeclaration, w);
            }),
            Declaration::Import(decl) => with_scratch(|w| {
                pack_ident(w, &decl.name.name);
                record(out, Tag::ImportStatement, w);
            }),
            Declaration::Include(decl) => with_scratch(|w| {
                pack_ident(w, &decl.module.value);
                record(out, Tag::IncludeStatement, w);
            }),
        }
    }

    fn encode_acl(&mut self, out: &mut Vec<u8>, decl: &AclDecl) {
        with_scratch(|w| {
            pack_ident(w, &decl.name.name);
            for entry in &decl.entries {
                self.encode_acl_entry(w, entry);
            }
            record(out, Tag::AclDeclaration, w);
        });
    }

    fn encode_acl_entry(&mut self, out: &mut Vec<u8>, entry: &AclEntry) {
        with_scratch(|w| {
            pack_boolean(w, entry.inverse);
            pack_string(w, &entry.address);
            if let Some(mask) = entry.mask {
                pack_integer(w, mask);
            }
            record(out, Tag::AclEntry, w);
        });
    }

    fn encode_backend_property(&mut self, out: &mut Vec<u8>, property: &BackendProperty) {
        with_scratch(|w| {
            pack_ident(w, &property.key.name);
            match &property.value {
                PropertyValue::Expr(expr) => self.encode_expression(w, expr),
                PropertyValue::Object(properties) => with_scratch(|o| {
                    for property in properties {
                        self.encode_backend_property(o, property);
                    }
                    record(w, Tag::BackendObject, o);
                }),
            }
            record(out, Tag::BackendProperty, w);
        });
    }

    fn encode_director_property(&mut self, out: &mut Vec<u8>, property: &DirectorProperty) {
        with_scratch(|w| {
            pack_ident(w, &property.key.name);
            self.encode_expression(w, &property.value);
            record(out, Tag::DirectorProperty, w);
        });
    }

    fn encode_statement(&mut self, out: &mut Vec<u8>, statement: &Statement) {
        match statement {
            Statement::Set(stmt) => self.encode_set(out, stmt),
            Statement::Add(stmt) => self.encode_add(out, stmt),
            Statement::Unset(stmt) => with_scratch(|w| {
                pack_ident(w, &stmt.ident.name);
                record(out, Tag::UnsetStatement, w);
            }),
            Statement::Remove(stmt) => with_scratch(|w| {
                pack_ident(w, &stmt.ident.name);
                record(out, Tag::RemoveStatement, w);
            }),
            Statement::Declare(stmt) => with_scratch(|w| {
                pack_ident(w, &stmt.name.name);
                pack_ident(w, &stmt.value_type.name);
                record(out, Tag::DeclareStatement, w);
            }),
            Statement::Call(stmt) => with_scratch(|w| {
                pack_ident(w, &stmt.subroutine.name);
                record(out, Tag::CallStatement, w);
            }),
            Statement::If(stmt) => self.encode_if(out, stmt),
            Statement::Switch(stmt) => self.encode_switch(out, stmt),
            Statement::Return(stmt) => self.encode_return(out, stmt),
            Statement::Restart(_) => record(out, Tag::RestartStatement, &[]),
            Statement::Error(stmt) => self.encode_error(out, stmt),
            Statement::Esi(_) => record(out, Tag::EsiStatement, &[]),
            Statement::Log(stmt) => with_scratch(|w| {
                self.encode_expression(w, &stmt.value);
                record(out, Tag::LogStatement, w);
            }),
            Statement::Synthetic(stmt) => with_scratch(|w| {
                self.encode_expression(w, &stmt.value);
                record(out, Tag::SyntheticStatement, w);
            }),
            Statement::SyntheticBase64(stmt) => with_scratch(|w| {
                self.encode_expression(w, &stmt.value);
                record(out, Tag::SyntheticBase64Statement, w);
            }),
            Statement::Goto(stmt) => with_scratch(|w| {
                pack_ident(w, &stmt.destination.name);
                record(out, Tag::GotoStatement, w);
            }),
            Statement::GotoDestination(stmt) => with_scratch(|w| {
                pack_ident(w, &stmt.name.name);
                record(out, Tag::GotoDestinationStatement, w);
            }),
            Statement::FunctionCall(stmt) => with_scratch(|w| {
                pack_ident(w, &stmt.function.name);
                for argument in &stmt.arguments {
                    self.encode_expression(w, argument);
                }
                record(out, Tag::FunctionCallStatement, w);
            }),
            Statement::Break(_) => record(out, Tag::BreakStatement, &[]),
            Statement::Fallthrough(_) => record(out, Tag::FallthroughStatement, &[]),
            Statement::Import(stmt) => with_scratch(|w| {
                pack_ident(w, &stmt.name.name);
                record(out, Tag::ImportStatement, w);
            }),
            Statement::Include(stmt) => with_scratch(|w| {
                pack_ident(w, &stmt.module.value);
                record(out, Tag::IncludeStatement, w);
            }),
        }
    }

    fn encode_set(&mut self, out: &mut Vec<u8>, stmt: &SetStmt) {
        with_scratch(|w| {
            pack_ident(w, &stmt.ident.name);
            pack_string(w, &stmt.operator);
            self.encode_expression(w, &stmt.value);
            record(out, Tag::SetStatement, w);
        });
    }

    fn encode_add(&mut self, out: &mut Vec<u8>, stmt: &AddStmt) {
        with_scratch(|w| {
            pack_ident(w, &stmt.ident.name);
            pack_string(w, &stmt.operator);
            self.encode_expression(w, &stmt.value);
            record(out, Tag::AddStatement, w);
        });
    }

    fn encode_if(&mut self, out: &mut Vec<u8>, stmt: &IfStmt) {
        with_scratch(|w| {
            pack_string(w, &stmt.keyword);
            self.encode_expression(w, &stmt.condition);
            for statement in &stmt.consequence.statements {
                self.encode_statement(w, statement);
            }
            end(w);
            for chain in &stmt.another {
                self.encode_if(w, chain);
            }
            if let Some(alternative) = &stmt.alternative {
                with_scratch(|a| {
                    for statement in &alternative.consequence.statements {
                        self.encode_statement(a, statement);
                    }
                    record(w, Tag::ElseStatement, a);
                });
            }
            record(out, Tag::IfStatement, w);
        });
    }

    fn encode_switch(&mut self, out: &mut Vec<u8>, stmt: &SwitchStmt) {
        with_scratch(|w| {
            self.encode_expression(w, &stmt.control);
            for case in &stmt.cases {
                self.encode_case(w, case);
            }
            pack_integer(w, stmt.default);
            record(out, Tag::SwitchStatement, w);
        });
    }

    fn encode_case(&mut self, out: &mut Vec<u8>, case: &CaseStmt) {
        with_scratch(|w| {
            match &case.test {
                Some(test) => {
                    pack_string(w, &test.operator);
                    self.encode_expression(w, &test.right);
                }
                None => pack_ident(w, "default"),
            }
            for statement in &case.statements {
                self.encode_statement(w, statement);
            }
            if case.fallthrough {
                record(w, Tag::FallthroughStatement, &[]);
            }
            record(out, Tag::CaseStatement, w);
        });
    }

    fn encode_return(&mut self, out: &mut Vec<u8>, stmt: &ReturnStmt) {
        with_scratch(|w| {
            if let Some(expression) = &stmt.expression {
                pack_boolean(w, stmt.has_parenthesis);
                self.encode_expression(w, expression);
            }
            record(out, Tag::ReturnStatement, w);
        });
    }

    fn encode_error(&mut self, out: &mut Vec<u8>, stmt: &ErrorStmt) {
        with_scratch(|w| {
            if let Some(code) = &stmt.code {
                self.encode_expression(w, code);
            }
            if let Some(argument) = &stmt.argument {
                self.encode_expression(w, argument);
            }
            record(out, Tag::ErrorStatement, w);
        });
    }

    fn encode_expression(&mut self, out: &mut Vec<u8>, expression: &Expr) {
        match expression {
            Expr::Ident(ident) => pack_ident(out, &ident.name),
            Expr::String(lit) => {
                if lit.long {
                    record(out, Tag::OpenString, lit.value.as_bytes());
                } else {
                    pack_string(out, &lit.value);
                }
            }
            Expr::Int(lit) => pack_integer(out, lit.value),
            Expr::Float(lit) => record(out, Tag::Float, &lit.value.to_le_bytes()),
            Expr::RTime(lit) => record(out, Tag::RTime, lit.value.as_bytes()),
            Expr::Bool(lit) => pack_boolean(out, lit.value),
            Expr::Ip(lit) => record(out, Tag::Ip, lit.value.as_bytes()),
            Expr::Prefix(expr) => with_scratch(|w| {
                pack_string(w, &expr.operator);
                self.encode_expression(w, &expr.right);
                record(out, Tag::PrefixExpression, w);
            }),
            Expr::Infix(expr) => with_scratch(|w| {
                pack_string(w, &expr.operator);
                self.encode_expression(w, &expr.left);
                self.encode_expression(w, &expr.right);
                record(out, Tag::InfixExpression, w);
            }),
            Expr::Postfix(expr) => with_scratch(|w| {
                pack_string(w, &expr.operator);
                self.encode_expression(w, &expr.left);
                record(out, Tag::PostfixExpression, w);
            }),
            Expr::Grouped(expr) => with_scratch(|w| {
                self.encode_expression(w, &expr.right);
                record(out, Tag::GroupedExpression, w);
            }),
            Expr::FunctionCall(expr) => with_scratch(|w| {
                pack_ident(w, &expr.function.name);
                for argument in &expr.arguments {
                    self.encode_expression(w, argument);
                }
                record(out, Tag::FunctionCallExpression, w);
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uvarint_encoding() {
        let mut out = Vec::new();
        write_uvarint(&mut out, 0);
        write_uvarint(&mut out, 127);
        write_uvarint(&mut out, 128);
        write_uvarint(&mut out, 300);
        assert_eq!(out, vec![0x00, 0x7F, 0x80, 0x01, 0xAC, 0x02]);
    }

    #[test]
    fn test_record_layout() {
        let mut out = Vec::new();
        record(&mut out, Tag::Ident, b"req.url");
        assert_eq!(out[0], Tag::Ident as u8);
        assert_eq!(out[1], 7);
        assert_eq!(&out[2..], b"req.url");
    }

    #[test]
    fn test_scratch_pool_reuse() {
        // Two sequential encodes share pooled buffers without interference.
        let first = with_scratch(|w| {
            w.extend_from_slice(b"abc");
            w.clone()
        });
        let second = with_scratch(|w| {
            assert!(w.is_empty());
            w.extend_from_slice(b"xyz");
            w.clone()
        });
        assert_eq!(first, b"abc");
        assert_eq!(second, b"xyz");
    }
}
