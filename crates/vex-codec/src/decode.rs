//! AST decoding.
//!
//! Decoding is positional: each node reads its fields back in the order
//! the encoder wrote them. List contexts (module declarations, statement
//! sequences) skip records with unknown tags by length; positional
//! contexts (an expected expression) treat them as errors. Decoded nodes
//! carry default metadata, spans are not persisted.

use vex_par::ast::{
    AclDecl, AclEntry, AddStmt, BackendDecl, BackendProperty, Block, BoolLit, BreakStmt,
    CallStmt, CaseStmt, CaseTest, Declaration, DeclareStmt, DirectorBackend, DirectorDecl,
    DirectorEntry, DirectorProperty, ElseStmt, ErrorStmt, EsiStmt, Expr, FallthroughStmt,
    FloatLit, FunctionCallExpr, FunctionCallStmt, GotoDestinationStmt, GotoStmt, GroupedExpr,
    Ident, IfStmt, ImportStmt, IncludeStmt, InfixExpr, IntLit, IpLit, LogStmt, Meta,
    PenaltyboxDecl, PostfixExpr, PrefixExpr, PropertyValue, RTimeLit, RatecounterDecl,
    RemoveStmt, RestartStmt, ReturnStmt, SetStmt, Statement, StringLit, SubroutineDecl,
    SwitchStmt, SyntheticBase64Stmt, SyntheticStmt, TableDecl, TableEntry, UnsetStmt,
};

use crate::{CodecError, Tag};

type DResult<T> = Result<T, CodecError>;

/// The AST decoder. See [`crate::Encoder`] for the format.
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    /// Creates a decoder over an encoded byte stream.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn peek_tag(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    fn read_uvarint(&mut self) -> DResult<usize> {
        let mut value: usize = 0;
        let mut shift = 0u32;
        loop {
            let byte = *self.buf.get(self.pos).ok_or(CodecError::UnexpectedEof)?;
            self.pos += 1;
            if shift >= usize::BITS {
                return Err(CodecError::MalformedVarint);
            }
            value |= ((byte & 0x7F) as usize) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    /// Read one `tag · length · payload` record.
    fn read_record(&mut self) -> DResult<(u8, &'a [u8])> {
        let tag = *self.buf.get(self.pos).ok_or(CodecError::UnexpectedEof)?;
        self.pos += 1;
        let length = self.read_uvarint()?;
        let remaining = self.buf.len() - self.pos;
        if length > remaining {
            return Err(CodecError::LengthOverflow { length, remaining });
        }
        let payload = &self.buf[self.pos..self.pos + length];
        self.pos += length;
        Ok((tag, payload))
    }

    /// Decode every declaration in the stream.
    pub fn decode_module(&mut self) -> DResult<Vec<Declaration>> {
        let mut declarations = Vec::new();
        while !self.at_end() {
            let (raw, payload) = self.read_record()?;
            let Some(tag) = Tag::from_u8(raw) else {
                // Forward compatibility: an unassigned tag is skippable.
                continue;
            };
            declarations.push(decode_declaration(tag, payload)?);
        }
        Ok(declarations)
    }
}

// ---------------------------------------------------------------------------
// Payload primitives
// ---------------------------------------------------------------------------

fn utf8_payload(payload: &[u8]) -> DResult<String> {
    String::from_utf8(payload.to_vec()).map_err(|_| CodecError::InvalidUtf8)
}

fn integer_payload(payload: &[u8]) -> DResult<i64> {
    let bytes: [u8; 8] = payload
        .try_into()
        .map_err(|_| CodecError::MalformedPayload {
            kind: "integer",
            len: payload.len(),
        })?;
    Ok(i64::from_le_bytes(bytes))
}

fn float_payload(payload: &[u8]) -> DResult<f64> {
    let bytes: [u8; 8] = payload
        .try_into()
        .map_err(|_| CodecError::MalformedPayload {
            kind: "float",
            len: payload.len(),
        })?;
    Ok(f64::from_le_bytes(bytes))
}

fn boolean_payload(payload: &[u8]) -> DResult<bool> {
    match payload {
        [b] => Ok(*b != 0),
        _ => Err(CodecError::MalformedPayload {
            kind: "boolean",
            len: payload.len(),
        }),
    }
}

fn ident(name: String) -> Ident {
    Ident {
        meta: Meta::default(),
        name,
    }
}

/// Read the next record as an identifier.
fn read_ident(dec: &mut Decoder) -> DResult<Ident> {
    let (tag, payload) = dec.read_record()?;
    if Tag::from_u8(tag) != Some(Tag::Ident) {
        return Err(CodecError::UnexpectedTag {
            found: tag,
            expected: "identifier",
        });
    }
    Ok(ident(utf8_payload(payload)?))
}

/// Read the next record as an operator/keyword string.
fn read_string(dec: &mut Decoder) -> DResult<String> {
    let (tag, payload) = dec.read_record()?;
    if Tag::from_u8(tag) != Some(Tag::String) {
        return Err(CodecError::UnexpectedTag {
            found: tag,
            expected: "string",
        });
    }
    utf8_payload(payload)
}

fn read_boolean(dec: &mut Decoder) -> DResult<bool> {
    let (tag, payload) = dec.read_record()?;
    if Tag::from_u8(tag) != Some(Tag::Boolean) {
        return Err(CodecError::UnexpectedTag {
            found: tag,
            expected: "boolean",
        });
    }
    boolean_payload(payload)
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

fn read_expression(dec: &mut Decoder) -> DResult<Expr> {
    let (raw, payload) = dec.read_record()?;
    let Some(tag) = Tag::from_u8(raw) else {
        return Err(CodecError::UnexpectedTag {
            found: raw,
            expected: "expression",
        });
    };
    decode_expression(tag, payload)
}

fn decode_expression(tag: Tag, payload: &[u8]) -> DResult<Expr> {
    let meta = Meta::default;
    let expr = match tag {
        Tag::Ident => Expr::Ident(ident(utf8_payload(payload)?)),
        Tag::String => Expr::String(StringLit {
            meta: meta(),
            value: utf8_payload(payload)?,
            long: false,
        }),
        Tag::OpenString => Expr::String(StringLit {
            meta: meta(),
            value: utf8_payload(payload)?,
            long: true,
        }),
        Tag::Integer => Expr::Int(IntLit {
            meta: meta(),
            value: integer_payload(payload)?,
        }),
        Tag::Float => Expr::Float(FloatLit {
            meta: meta(),
            value: float_payload(payload)?,
        }),
        Tag::Boolean => Expr::Bool(BoolLit {
            meta: meta(),
            value: boolean_payload(payload)?,
        }),
        Tag::RTime => Expr::RTime(RTimeLit {
            meta: meta(),
            value: utf8_payload(payload)?,
        }),
        Tag::Ip => Expr::Ip(IpLit {
            meta: meta(),
            value: utf8_payload(payload)?,
        }),
        Tag::PrefixExpression => {
            let mut dec = Decoder::new(payload);
            let operator = read_string(&mut dec)?;
            let right = read_expression(&mut dec)?;
            Expr::Prefix(PrefixExpr {
                meta: meta(),
                operator,
                right: Box::new(right),
            })
        }
        Tag::InfixExpression => {
            let mut dec = Decoder::new(payload);
            let operator = read_string(&mut dec)?;
            let left = read_expression(&mut dec)?;
            let right = read_expression(&mut dec)?;
            Expr::Infix(InfixExpr {
                meta: meta(),
                operator,
                left: Box::new(left),
                right: Box::new(right),
            })
        }
        Tag::PostfixExpression => {
            let mut dec = Decoder::new(payload);
            let operator = read_string(&mut dec)?;
            let left = read_expression(&mut dec)?;
            Expr::Postfix(PostfixExpr {
                meta: meta(),
                left: Box::new(left),
                operator,
            })
        }
        Tag::GroupedExpression => {
            let mut dec = Decoder::new(payload);
            let right = read_expression(&mut dec)?;
            Expr::Grouped(GroupedExpr {
                meta: meta(),
                right: Box::new(right),
            })
        }
        Tag::FunctionCallExpression => {
            let mut dec = Decoder::new(payload);
            let function = read_ident(&mut dec)?;
            let mut arguments = Vec::new();
            while !dec.at_end() {
                arguments.push(read_expression(&mut dec)?);
            }
            Expr::FunctionCall(FunctionCallExpr {
                meta: meta(),
                function,
                arguments,
            })
        }
        _ => {
            return Err(CodecError::UnexpectedTag {
                found: tag as u8,
                expected: "expression",
            })
        }
    };
    Ok(expr)
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

/// Read statements until the payload is exhausted, skipping unknown tags.
fn read_statements(dec: &mut Decoder) -> DResult<Vec<Statement>> {
    let mut statements = Vec::new();
    while !dec.at_end() {
        let (raw, payload) = dec.read_record()?;
        let Some(tag) = Tag::from_u8(raw) else {
            continue;
        };
        statements.push(decode_statement(tag, payload)?);
    }
    Ok(statements)
}

fn block(statements: Vec<Statement>) -> Block {
    Block {
        meta: Meta::default(),
        statements,
    }
}

fn decode_statement(tag: Tag, payload: &[u8]) -> DResult<Statement> {
    let meta = Meta::default;
    let statement = match tag {
        Tag::SetStatement => {
            let mut dec = Decoder::new(payload);
            Statement::Set(SetStmt {
                meta: meta(),
                ident: read_ident(&mut dec)?,
                operator: read_string(&mut dec)?,
                value: read_expression(&mut dec)?,
            })
        }
        Tag::AddStatement => {
            let mut dec = Decoder::new(payload);
            Statement::Add(AddStmt {
                meta: meta(),
                ident: read_ident(&mut dec)?,
                operator: read_string(&mut dec)?,
                value: read_expression(&mut dec)?,
            })
        }
        Tag::UnsetStatement => {
            let mut dec = Decoder::new(payload);
            Statement::Unset(UnsetStmt {
                meta: meta(),
                ident: read_ident(&mut dec)?,
            })
        }
        Tag::RemoveStatement => {
            let mut dec = Decoder::new(payload);
            Statement::Remove(RemoveStmt {
                meta: meta(),
                ident: read_ident(&mut dec)?,
            })
        }
        Tag::DeclareStatement => {
            let mut dec = Decoder::new(payload);
            Statement::Declare(DeclareStmt {
                meta: meta(),
                name: read_ident(&mut dec)?,
                value_type: read_ident(&mut dec)?,
            })
        }
        Tag::CallStatement => {
            let mut dec = Decoder::new(payload);
            Statement::Call(CallStmt {
                meta: meta(),
                subroutine: read_ident(&mut dec)?,
            })
        }
        Tag::IfStatement => Statement::If(decode_if(payload)?),
        Tag::SwitchStatement => decode_switch(payload)?,
        Tag::ReturnStatement => {
            if payload.is_empty() {
                Statement::Return(ReturnStmt {
                    meta: meta(),
                    expression: None,
                    has_parenthesis: false,
                })
            } else {
                let mut dec = Decoder::new(payload);
                let has_parenthesis = read_boolean(&mut dec)?;
                let expression = read_expression(&mut dec)?;
                Statement::Return(ReturnStmt {
                    meta: meta(),
                    expression: Some(Box::new(expression)),
                    has_parenthesis,
                })
            }
        }
        Tag::RestartStatement => Statement::Restart(RestartStmt { meta: meta() }),
        Tag::ErrorStatement => {
            let mut dec = Decoder::new(payload);
            let code = if dec.at_end() {
                None
            } else {
                Some(read_expression(&mut dec)?)
            };
            let argument = if dec.at_end() {
                None
            } else {
                Some(read_expression(&mut dec)?)
            };
            Statement::Error(ErrorStmt {
                meta: meta(),
                code,
                argument,
            })
        }
        Tag::EsiStatement => Statement::Esi(EsiStmt { meta: meta() }),
        Tag::LogStatement => {
            let mut dec = Decoder::new(payload);
            Statement::Log(LogStmt {
                meta: meta(),
                value: read_expression(&mut dec)?,
            })
        }
        Tag::SyntheticStatement => {
            let mut dec = Decoder::new(payload);
            Statement::Synthetic(SyntheticStmt {
                meta: meta(),
                value: read_expression(&mut dec)?,
            })
        }
        Tag::SyntheticBase64Statement => {
            let mut dec = Decoder::new(payload);
            Statement::SyntheticBase64(SyntheticBase64Stmt {
                meta: meta(),
                value: read_expression(&mut dec)?,
            })
        }
        Tag::GotoStatement => {
            let mut dec = Decoder::new(payload);
            Statement::Goto(GotoStmt {
                meta: meta(),
                destination: read_ident(&mut dec)?,
            })
        }
        Tag::GotoDestinationStatement => {
            let mut dec = Decoder::new(payload);
            Statement::GotoDestination(GotoDestinationStmt {
                meta: meta(),
                name: read_ident(&mut dec)?,
            })
        }
        Tag::FunctionCallStatement => {
            let mut dec = Decoder::new(payload);
            let function = read_ident(&mut dec)?;
            let mut arguments = Vec::new();
            while !dec.at_end() {
                arguments.push(read_expression(&mut dec)?);
            }
            Statement::FunctionCall(FunctionCallStmt {
                meta: meta(),
                function,
                arguments,
            })
        }
        Tag::BreakStatement => Statement::Break(BreakStmt { meta: meta() }),
        Tag::FallthroughStatement => Statement::Fallthrough(FallthroughStmt { meta: meta() }),
        Tag::ImportStatement => {
            let mut dec = Decoder::new(payload);
            Statement::Import(ImportStmt {
                meta: meta(),
                name: read_ident(&mut dec)?,
            })
        }
        Tag::IncludeStatement => {
            let mut dec = Decoder::new(payload);
            let module = read_ident(&mut dec)?;
            Statement::Include(IncludeStmt {
                meta: meta(),
                module: StringLit {
                    meta: Meta::default(),
                    value: module.name,
                    long: false,
                },
            })
        }
        _ => {
            return Err(CodecError::UnexpectedTag {
                found: tag as u8,
                expected: "statement",
            })
        }
    };
    Ok(statement)
}

fn decode_if(payload: &[u8]) -> DResult<IfStmt> {
    let mut dec = Decoder::new(payload);
    let keyword = read_string(&mut dec)?;
    let condition = read_expression(&mut dec)?;

    let mut consequence = Vec::new();
    loop {
        let (raw, inner) = dec.read_record()?;
        match Tag::from_u8(raw) {
            Some(Tag::End) => break,
            Some(tag) => consequence.push(decode_statement(tag, inner)?),
            None => continue,
        }
    }

    let mut another = Vec::new();
    let mut alternative = None;
    while !dec.at_end() {
        let (raw, inner) = dec.read_record()?;
        match Tag::from_u8(raw) {
            Some(Tag::IfStatement) => another.push(decode_if(inner)?),
            Some(Tag::ElseStatement) => {
                let mut else_dec = Decoder::new(inner);
                alternative = Some(ElseStmt {
                    meta: Meta::default(),
                    consequence: block(read_statements(&mut else_dec)?),
                });
            }
            Some(tag) => {
                return Err(CodecError::UnexpectedTag {
                    found: tag as u8,
                    expected: "else-if chain",
                })
            }
            None => continue,
        }
    }

    Ok(IfStmt {
        meta: Meta::default(),
        keyword,
        condition,
        consequence: block(consequence),
        another,
        alternative,
    })
}

fn decode_switch(payload: &[u8]) -> DResult<Statement> {
    let mut dec = Decoder::new(payload);
    let control = read_expression(&mut dec)?;

    let mut cases = Vec::new();
    let mut default = -1;
    while !dec.at_end() {
        let (raw, inner) = dec.read_record()?;
        match Tag::from_u8(raw) {
            Some(Tag::CaseStatement) => cases.push(decode_case(inner)?),
            Some(Tag::Integer) => {
                default = integer_payload(inner)?;
                break;
            }
            Some(tag) => {
                return Err(CodecError::UnexpectedTag {
                    found: tag as u8,
                    expected: "case",
                })
            }
            None => continue,
        }
    }

    Ok(Statement::Switch(SwitchStmt {
        meta: Meta::default(),
        control,
        cases,
        default,
    }))
}

fn decode_case(payload: &[u8]) -> DResult<CaseStmt> {
    let mut dec = Decoder::new(payload);

    let test = match dec.peek_tag().and_then(Tag::from_u8) {
        Some(Tag::Ident) => {
            // The `default` sentinel.
            let _ = read_ident(&mut dec)?;
            None
        }
        _ => {
            let operator = read_string(&mut dec)?;
            let right = read_expression(&mut dec)?;
            Some(CaseTest {
                meta: Meta::default(),
                operator,
                right,
            })
        }
    };

    let mut statements = Vec::new();
    let mut fallthrough = false;
    while !dec.at_end() {
        let (raw, inner) = dec.read_record()?;
        match Tag::from_u8(raw) {
            Some(Tag::FallthroughStatement) => fallthrough = true,
            Some(tag) => statements.push(decode_statement(tag, inner)?),
            None => continue,
        }
    }

    Ok(CaseStmt {
        meta: Meta::default(),
        test,
        statements,
        fallthrough,
    })
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

fn decode_declaration(tag: Tag, payload: &[u8]) -> DResult<Declaration> {
    let declaration = match tag {
        Tag::AclDeclaration => {
            let mut dec = Decoder::new(payload);
            let name = read_ident(&mut dec)?;
            let mut entries = Vec::new();
            while !dec.at_end() {
                let (raw, inner) = dec.read_record()?;
                match Tag::from_u8(raw) {
                    Some(Tag::AclEntry) => entries.push(decode_acl_entry(inner)?),
                    Some(tag) => {
                        return Err(CodecError::UnexpectedTag {
                            found: tag as u8,
                            expected: "acl entry",
                        })
                    }
                    None => continue,
                }
            }
            Declaration::Acl(AclDecl {
                meta: Meta::default(),
                name,
                entries,
            })
        }
        Tag::BackendDeclaration => {
            let mut dec = Decoder::new(payload);
            let name = read_ident(&mut dec)?;
            Declaration::Backend(BackendDecl {
                meta: Meta::default(),
                name,
                properties: decode_backend_properties(&mut dec)?,
            })
        }
        Tag::DirectorDeclaration => {
            let mut dec = Decoder::new(payload);
            let name = read_ident(&mut dec)?;
            let kind = read_ident(&mut dec)?;
            let mut entries = Vec::new();
            while !dec.at_end() {
                let (raw, inner) = dec.read_record()?;
                match Tag::from_u8(raw) {
                    Some(Tag::DirectorProperty) => {
                        entries.push(DirectorEntry::Property(decode_director_property(inner)?))
                    }
                    Some(Tag::DirectorBackend) => {
                        let mut backend_dec = Decoder::new(inner);
                        let mut properties = Vec::new();
                        while !backend_dec.at_end() {
                            let (raw, inner) = backend_dec.read_record()?;
                            match Tag::from_u8(raw) {
                                Some(Tag::DirectorProperty) => {
                                    properties.push(decode_director_property(inner)?)
                                }
                                Some(tag) => {
                                    return Err(CodecError::UnexpectedTag {
                                        found: tag as u8,
                                        expected: "director property",
                                    })
                                }
                                None => continue,
                            }
                        }
                        entries.push(DirectorEntry::Backend(DirectorBackend {
                            meta: Meta::default(),
                            properties,
                        }));
                    }
                    Some(tag) => {
                        return Err(CodecError::UnexpectedTag {
                            found: tag as u8,
                            expected: "director entry",
                        })
                    }
                    None => continue,
                }
            }
            Declaration::Director(DirectorDecl {
                meta: Meta::default(),
                name,
                kind,
                entries,
            })
        }
        Tag::TableDeclaration => {
            let mut dec = Decoder::new(payload);
            let name = read_ident(&mut dec)?;
            let value_type = match dec.peek_tag().and_then(Tag::from_u8) {
                Some(Tag::Ident) => Some(read_ident(&mut dec)?),
                _ => None,
            };
            let mut entries = Vec::new();
            while !dec.at_end() {
                let (raw, inner) = dec.read_record()?;
                match Tag::from_u8(raw) {
                    Some(Tag::TableEntry) => {
                        let mut entry_dec = Decoder::new(inner);
                        let key = read_string(&mut entry_dec)?;
                        let value = read_expression(&mut entry_dec)?;
                        entries.push(TableEntry {
                            meta: Meta::default(),
                            key: StringLit {
                                meta: Meta::default(),
                                value: key,
                                long: false,
                            },
                            value,
                        });
                    }
                    Some(tag) => {
                        return Err(CodecError::UnexpectedTag {
                            found: tag as u8,
                            expected: "table entry",
                        })
                    }
                    None => continue,
                }
            }
            Declaration::Table(TableDecl {
                meta: Meta::default(),
                name,
                value_type,
                entries,
            })
        }
        Tag::SubroutineDeclaration => {
            let mut dec = Decoder::new(payload);
            let name = read_ident(&mut dec)?;
            let return_type = match dec.peek_tag().and_then(Tag::from_u8) {
                Some(Tag::Ident) => Some(read_ident(&mut dec)?),
                _ => None,
            };
            Declaration::Subroutine(SubroutineDecl {
                meta: Meta::default(),
                name,
                return_type,
                block: block(read_statements(&mut dec)?),
            })
        }
        Tag::PenaltyboxDeclaration => {
            let mut dec = Decoder::new(payload);
            Declaration::Penaltybox(PenaltyboxDecl {
                meta: Meta::default(),
                name: read_ident(&mut dec)?,
            })
        }
        Tag::RatecounterDeclaration => {
            let mut dec = Decoder::new(payload);
            Declaration::Ratecounter(RatecounterDecl {
                meta: Meta::default(),
                name: read_ident(&mut dec)?,
            })
        }
        Tag::ImportStatement => {
            let mut dec = Decoder::new(payload);
            Declaration::Import(ImportStmt {
                meta: Meta::default(),
                name: read_ident(&mut dec)?,
            })
        }
        Tag::IncludeStatement => {
            let mut dec = Decoder::new(payload);
            let module = read_ident(&mut dec)?;
            Declaration::Include(IncludeStmt {
                meta: Meta::default(),
                module: StringLit {
                    meta: Meta::default(),
                    value: module.name,
                    long: false,
                },
            })
        }
        _ => {
            return Err(CodecError::UnexpectedTag {
                found: tag as u8,
                expected: "declaration",
            })
        }
    };
    Ok(declaration)
}

fn decode_acl_entry(payload: &[u8]) -> DResult<AclEntry> {
    let mut dec = Decoder::new(payload);
    let inverse = read_boolean(&mut dec)?;
    let address = read_string(&mut dec)?;
    let mask = if dec.at_end() {
        None
    } else {
        let (raw, inner) = dec.read_record()?;
        if Tag::from_u8(raw) != Some(Tag::Integer) {
            return Err(CodecError::UnexpectedTag {
                found: raw,
                expected: "mask",
            });
        }
        Some(integer_payload(inner)?)
    };
    Ok(AclEntry {
        meta: Meta::default(),
        inverse,
        address,
        mask,
    })
}

fn decode_backend_properties(dec: &mut Decoder) -> DResult<Vec<BackendProperty>> {
    let mut properties = Vec::new();
    while !dec.at_end() {
        let (raw, inner) = dec.read_record()?;
        match Tag::from_u8(raw) {
            Some(Tag::BackendProperty) => {
                let mut prop_dec = Decoder::new(inner);
                let key = read_ident(&mut prop_dec)?;
                let value = match prop_dec.peek_tag().and_then(Tag::from_u8) {
                    Some(Tag::BackendObject) => {
                        let (_, object) = prop_dec.read_record()?;
                        let mut object_dec = Decoder::new(object);
                        PropertyValue::Object(decode_backend_properties(&mut object_dec)?)
                    }
                    _ => PropertyValue::Expr(read_expression(&mut prop_dec)?),
                };
                properties.push(BackendProperty {
                    meta: Meta::default(),
                    key,
                    value,
                });
            }
            Some(tag) => {
                return Err(CodecError::UnexpectedTag {
                    found: tag as u8,
                    expected: "backend property",
                })
            }
            None => continue,
        }
    }
    Ok(properties)
}

fn decode_director_property(payload: &[u8]) -> DResult<DirectorProperty> {
    let mut dec = Decoder::new(payload);
    Ok(DirectorProperty {
        meta: Meta::default(),
        key: read_ident(&mut dec)?,
        value: read_expression(&mut dec)?,
    })
}
