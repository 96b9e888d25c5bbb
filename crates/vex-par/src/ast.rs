//! vex-par - AST node definitions.
//!
//! The AST is a tree of tagged sums: one enum per syntactic category
//! (declaration, statement, expression) with a struct per variant. Every
//! node carries a [`Meta`] with its source span and the leading comment
//! trivia collected by the lexer, which the linter consults for pragmas.
//!
//! `fmt::Display` on every node renders canonical VCL source. The binary
//! codec's round-trip tests compare these renderings, so the output must
//! be deterministic and must preserve surface forms the evaluator depends
//! on (return-statement parentheses, the else-if keyword spelling, raw
//! versus quoted strings).

use std::fmt;

use vex_lex::Comment;
use vex_util::Span;

/// Source metadata attached to every AST node.
#[derive(Clone, Debug, Default)]
pub struct Meta {
    /// Location of the node in its source file.
    pub span: Span,
    /// Comments attached to the node's first token.
    pub leading: Vec<Comment>,
}

impl Meta {
    /// Metadata with a span and no trivia.
    pub fn new(span: Span) -> Self {
        Self {
            span,
            leading: Vec::new(),
        }
    }

    /// Iterate the leading comment texts.
    pub fn comments(&self) -> impl Iterator<Item = &str> {
        self.leading.iter().map(|c| c.text.as_str())
    }
}

/// An identifier reference, possibly dotted (`req.http.Host`).
#[derive(Clone, Debug)]
pub struct Ident {
    pub meta: Meta,
    pub name: String,
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

/// A top-level declaration in a module.
#[derive(Clone, Debug)]
pub enum Declaration {
    Acl(AclDecl),
    Backend(BackendDecl),
    Director(DirectorDecl),
    Table(TableDecl),
    Subroutine(SubroutineDecl),
    Penaltybox(PenaltyboxDecl),
    Ratecounter(RatecounterDecl),
    Import(ImportStmt),
    Include(IncludeStmt),
}

impl Declaration {
    /// The node's metadata.
    pub fn meta(&self) -> &Meta {
        match self {
            Declaration::Acl(d) => &d.meta,
            Declaration::Backend(d) => &d.meta,
            Declaration::Director(d) => &d.meta,
            Declaration::Table(d) => &d.meta,
            Declaration::Subroutine(d) => &d.meta,
            Declaration::Penaltybox(d) => &d.meta,
            Declaration::Ratecounter(d) => &d.meta,
            Declaration::Import(d) => &d.meta,
            Declaration::Include(d) => &d.meta,
        }
    }

    /// The declared name, when the declaration introduces one.
    pub fn name(&self) -> Option<&str> {
        match self {
            Declaration::Acl(d) => Some(&d.name.name),
            Declaration::Backend(d) => Some(&d.name.name),
            Declaration::Director(d) => Some(&d.name.name),
            Declaration::Table(d) => Some(&d.name.name),
            Declaration::Subroutine(d) => Some(&d.name.name),
            Declaration::Penaltybox(d) => Some(&d.name.name),
            Declaration::Ratecounter(d) => Some(&d.name.name),
            Declaration::Import(_) | Declaration::Include(_) => None,
        }
    }
}

/// `acl name { entries }`
#[derive(Clone, Debug)]
pub struct AclDecl {
    pub meta: Meta,
    pub name: Ident,
    pub entries: Vec<AclEntry>,
}

/// One ACL entry: optional `!` inverse, address string, optional CIDR mask.
#[derive(Clone, Debug)]
pub struct AclEntry {
    pub meta: Meta,
    pub inverse: bool,
    pub address: String,
    pub mask: Option<i64>,
}

/// `backend name { .key = value; … }`
#[derive(Clone, Debug)]
pub struct BackendDecl {
    pub meta: Meta,
    pub name: Ident,
    pub properties: Vec<BackendProperty>,
}

/// A dotted property inside a backend declaration.
#[derive(Clone, Debug)]
pub struct BackendProperty {
    pub meta: Meta,
    pub key: Ident,
    pub value: PropertyValue,
}

/// Backend property values are either expressions or nested objects
/// (`.probe = { … }`).
#[derive(Clone, Debug)]
pub enum PropertyValue {
    Expr(Expr),
    Object(Vec<BackendProperty>),
}

/// `director name kind { .key = value; { .backend = b; .weight = 1; } }`
#[derive(Clone, Debug)]
pub struct DirectorDecl {
    pub meta: Meta,
    pub name: Ident,
    pub kind: Ident,
    pub entries: Vec<DirectorEntry>,
}

/// One entry inside a director body.
#[derive(Clone, Debug)]
pub enum DirectorEntry {
    /// `.quorum = 50%;`
    Property(DirectorProperty),
    /// `{ .backend = b; .weight = 1; }`
    Backend(DirectorBackend),
}

/// A dotted director property.
#[derive(Clone, Debug)]
pub struct DirectorProperty {
    pub meta: Meta,
    pub key: Ident,
    pub value: Expr,
}

/// A member-backend object inside a director.
#[derive(Clone, Debug)]
pub struct DirectorBackend {
    pub meta: Meta,
    pub properties: Vec<DirectorProperty>,
}

/// `table name [TYPE] { "key": value, … }`
#[derive(Clone, Debug)]
pub struct TableDecl {
    pub meta: Meta,
    pub name: Ident,
    pub value_type: Option<Ident>,
    pub entries: Vec<TableEntry>,
}

/// One key/value pair in a table.
#[derive(Clone, Debug)]
pub struct TableEntry {
    pub meta: Meta,
    pub key: StringLit,
    pub value: Expr,
}

/// `sub name [TYPE] { … }`
#[derive(Clone, Debug)]
pub struct SubroutineDecl {
    pub meta: Meta,
    pub name: Ident,
    pub return_type: Option<Ident>,
    pub block: Block,
}

/// `penaltybox name {}`
#[derive(Clone, Debug)]
pub struct PenaltyboxDecl {
    pub meta: Meta,
    pub name: Ident,
}

/// `ratecounter name {}`
#[derive(Clone, Debug)]
pub struct RatecounterDecl {
    pub meta: Meta,
    pub name: Ident,
}

/// `import name;` — a dependency on a named module provider.
#[derive(Clone, Debug)]
pub struct ImportStmt {
    pub meta: Meta,
    pub name: Ident,
}

/// `include "module";`
#[derive(Clone, Debug)]
pub struct IncludeStmt {
    pub meta: Meta,
    pub module: StringLit,
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

/// A braced statement list.
#[derive(Clone, Debug)]
pub struct Block {
    pub meta: Meta,
    pub statements: Vec<Statement>,
}

/// A statement inside a subroutine body.
#[derive(Clone, Debug)]
pub enum Statement {
    Set(SetStmt),
    Add(AddStmt),
    Unset(UnsetStmt),
    Remove(RemoveStmt),
    Declare(DeclareStmt),
    Call(CallStmt),
    If(IfStmt),
    Switch(SwitchStmt),
    Return(ReturnStmt),
    Restart(RestartStmt),
    Error(ErrorStmt),
    Esi(EsiStmt),
    Log(LogStmt),
    Synthetic(SyntheticStmt),
    SyntheticBase64(SyntheticBase64Stmt),
    Goto(GotoStmt),
    GotoDestination(GotoDestinationStmt),
    FunctionCall(FunctionCallStmt),
    Break(BreakStmt),
    Fallthrough(FallthroughStmt),
    Import(ImportStmt),
    Include(IncludeStmt),
}

impl Statement {
    /// The node's metadata.
    pub fn meta(&self) -> &Meta {
        match self {
            Statement::Set(s) => &s.meta,
            Statement::Add(s) => &s.meta,
            Statement::Unset(s) => &s.meta,
            Statement::Remove(s) => &s.meta,
            Statement::Declare(s) => &s.meta,
            Statement::Call(s) => &s.meta,
            Statement::If(s) => &s.meta,
            Statement::Switch(s) => &s.meta,
            Statement::Return(s) => &s.meta,
            Statement::Restart(s) => &s.meta,
            Statement::Error(s) => &s.meta,
            Statement::Esi(s) => &s.meta,
            Statement::Log(s) => &s.meta,
            Statement::Synthetic(s) => &s.meta,
            Statement::SyntheticBase64(s) => &s.meta,
            Statement::Goto(s) => &s.meta,
            Statement::GotoDestination(s) => &s.meta,
            Statement::FunctionCall(s) => &s.meta,
            Statement::Break(s) => &s.meta,
            Statement::Fallthrough(s) => &s.meta,
            Statement::Import(s) => &s.meta,
            Statement::Include(s) => &s.meta,
        }
    }
}

/// `set ident OP value;`
#[derive(Clone, Debug)]
pub struct SetStmt {
    pub meta: Meta,
    pub ident: Ident,
    /// Assignment operator spelling (`=`, `+=`, `rol=`, …).
    pub operator: String,
    pub value: Expr,
}

/// `add ident = value;` — appends a new header occurrence.
#[derive(Clone, Debug)]
pub struct AddStmt {
    pub meta: Meta,
    pub ident: Ident,
    pub operator: String,
    pub value: Expr,
}

/// `unset ident;`
#[derive(Clone, Debug)]
pub struct UnsetStmt {
    pub meta: Meta,
    pub ident: Ident,
}

/// `remove ident;` — alias of unset, surface form preserved.
#[derive(Clone, Debug)]
pub struct RemoveStmt {
    pub meta: Meta,
    pub ident: Ident,
}

/// `declare local var.name TYPE;`
#[derive(Clone, Debug)]
pub struct DeclareStmt {
    pub meta: Meta,
    pub name: Ident,
    pub value_type: Ident,
}

/// `call subroutine;`
#[derive(Clone, Debug)]
pub struct CallStmt {
    pub meta: Meta,
    pub subroutine: Ident,
}

/// `if (cond) { … } [else-if chains…] [else { … }]`
#[derive(Clone, Debug)]
pub struct IfStmt {
    pub meta: Meta,
    /// The exact spelling used: `if`, `else if`, `elsif`, or `elseif`.
    pub keyword: String,
    pub condition: Expr,
    pub consequence: Block,
    /// Ordered else-if chains.
    pub another: Vec<IfStmt>,
    pub alternative: Option<ElseStmt>,
}

/// The `else { … }` tail of an if statement.
#[derive(Clone, Debug)]
pub struct ElseStmt {
    pub meta: Meta,
    pub consequence: Block,
}

/// `switch (control) { case …: … default: … }`
#[derive(Clone, Debug)]
pub struct SwitchStmt {
    pub meta: Meta,
    pub control: Expr,
    pub cases: Vec<CaseStmt>,
    /// Zero-based index of the default case, or -1 when absent.
    pub default: i64,
}

/// One `case`/`default` arm.
#[derive(Clone, Debug)]
pub struct CaseStmt {
    pub meta: Meta,
    /// The infix test against the control value; `None` marks `default`.
    pub test: Option<CaseTest>,
    pub statements: Vec<Statement>,
    /// Whether the arm ends in `fallthrough;`.
    pub fallthrough: bool,
}

/// The test of a case arm. The switch control is the implicit left
/// operand; `operator` is `==` or `~`.
#[derive(Clone, Debug)]
pub struct CaseTest {
    pub meta: Meta,
    pub operator: String,
    pub right: Expr,
}

/// `return;`, `return action;`, or `return(expr);`
#[derive(Clone, Debug)]
pub struct ReturnStmt {
    pub meta: Meta,
    pub expression: Option<Box<Expr>>,
    /// Whether the source parenthesized the expression. The surface form
    /// selects between action-keyword and expression evaluation.
    pub has_parenthesis: bool,
}

/// `restart;`
#[derive(Clone, Debug)]
pub struct RestartStmt {
    pub meta: Meta,
}

/// `error [code [argument]];`
#[derive(Clone, Debug)]
pub struct ErrorStmt {
    pub meta: Meta,
    pub code: Option<Expr>,
    pub argument: Option<Expr>,
}

/// `esi;`
#[derive(Clone, Debug)]
pub struct EsiStmt {
    pub meta: Meta,
}

/// `log expr;`
#[derive(Clone, Debug)]
pub struct LogStmt {
    pub meta: Meta,
    pub value: Expr,
}

/// `synthetic expr;`
#[derive(Clone, Debug)]
pub struct SyntheticStmt {
    pub meta: Meta,
    pub value: Expr,
}

/// `synthetic.base64 expr;`
#[derive(Clone, Debug)]
pub struct SyntheticBase64Stmt {
    pub meta: Meta,
    pub value: Expr,
}

/// `goto destination;`
#[derive(Clone, Debug)]
pub struct GotoStmt {
    pub meta: Meta,
    pub destination: Ident,
}

/// `name:` — a goto landing point.
#[derive(Clone, Debug)]
pub struct GotoDestinationStmt {
    pub meta: Meta,
    pub name: Ident,
}

/// `function(args…);` at statement position.
#[derive(Clone, Debug)]
pub struct FunctionCallStmt {
    pub meta: Meta,
    pub function: Ident,
    pub arguments: Vec<Expr>,
}

/// `break;`
#[derive(Clone, Debug)]
pub struct BreakStmt {
    pub meta: Meta,
}

/// `fallthrough;`
#[derive(Clone, Debug)]
pub struct FallthroughStmt {
    pub meta: Meta,
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

/// An expression.
#[derive(Clone, Debug)]
pub enum Expr {
    Ident(Ident),
    String(StringLit),
    Int(IntLit),
    Float(FloatLit),
    RTime(RTimeLit),
    Bool(BoolLit),
    Ip(IpLit),
    Prefix(PrefixExpr),
    Infix(InfixExpr),
    Postfix(PostfixExpr),
    Grouped(GroupedExpr),
    FunctionCall(FunctionCallExpr),
}

impl Expr {
    /// The node's metadata.
    pub fn meta(&self) -> &Meta {
        match self {
            Expr::Ident(e) => &e.meta,
            Expr::String(e) => &e.meta,
            Expr::Int(e) => &e.meta,
            Expr::Float(e) => &e.meta,
            Expr::RTime(e) => &e.meta,
            Expr::Bool(e) => &e.meta,
            Expr::Ip(e) => &e.meta,
            Expr::Prefix(e) => &e.meta,
            Expr::Infix(e) => &e.meta,
            Expr::Postfix(e) => &e.meta,
            Expr::Grouped(e) => &e.meta,
            Expr::FunctionCall(e) => &e.meta,
        }
    }

    /// The node's source span.
    pub fn span(&self) -> Span {
        self.meta().span
    }
}

/// A string literal, quoted or heredoc.
#[derive(Clone, Debug)]
pub struct StringLit {
    pub meta: Meta,
    /// The processed string value.
    pub value: String,
    /// True for the raw `{"…"}` form.
    pub long: bool,
}

/// An integer literal.
#[derive(Clone, Debug)]
pub struct IntLit {
    pub meta: Meta,
    pub value: i64,
}

/// A float literal.
#[derive(Clone, Debug)]
pub struct FloatLit {
    pub meta: Meta,
    pub value: f64,
}

/// A duration literal. The lexeme keeps its unit suffix (`10s`, `1.5h`).
#[derive(Clone, Debug)]
pub struct RTimeLit {
    pub meta: Meta,
    pub value: String,
}

/// A boolean literal.
#[derive(Clone, Debug)]
pub struct BoolLit {
    pub meta: Meta,
    pub value: bool,
}

/// An IP literal. Only materialized where an address is expected.
#[derive(Clone, Debug)]
pub struct IpLit {
    pub meta: Meta,
    pub value: String,
}

/// `!x` or `-x`.
#[derive(Clone, Debug)]
pub struct PrefixExpr {
    pub meta: Meta,
    pub operator: String,
    pub right: Box<Expr>,
}

/// A binary expression. Juxtaposed string concatenation desugars to
/// operator `+`.
#[derive(Clone, Debug)]
pub struct InfixExpr {
    pub meta: Meta,
    pub operator: String,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
}

/// `x++`, `x--`, or a director `50%` weight.
#[derive(Clone, Debug)]
pub struct PostfixExpr {
    pub meta: Meta,
    pub left: Box<Expr>,
    pub operator: String,
}

/// `( expr )`.
#[derive(Clone, Debug)]
pub struct GroupedExpr {
    pub meta: Meta,
    pub right: Box<Expr>,
}

/// `function(args…)` at expression position.
#[derive(Clone, Debug)]
pub struct FunctionCallExpr {
    pub meta: Meta,
    pub function: Ident,
    pub arguments: Vec<Expr>,
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

/// Re-escape a string value for quoted rendering.
///
/// Quoted strings only know `\"`, `\\`, and `\xNN`; control characters
/// render through the byte escape.
fn escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Expr]) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{arg}")?;
    }
    Ok(())
}

impl fmt::Display for StringLit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.long {
            write!(f, "{{\"{}\"}}", self.value)
        } else {
            write!(f, "\"{}\"", escape_string(&self.value))
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Ident(e) => write!(f, "{e}"),
            Expr::String(e) => write!(f, "{e}"),
            Expr::Int(e) => write!(f, "{}", e.value),
            Expr::Float(e) => write!(f, "{}", e.value),
            Expr::RTime(e) => write!(f, "{}", e.value),
            Expr::Bool(e) => write!(f, "{}", e.value),
            Expr::Ip(e) => write!(f, "{}", e.value),
            Expr::Prefix(e) => write!(f, "{}{}", e.operator, e.right),
            Expr::Infix(e) => write!(f, "{} {} {}", e.left, e.operator, e.right),
            Expr::Postfix(e) => write!(f, "{}{}", e.left, e.operator),
            Expr::Grouped(e) => write!(f, "({})", e.right),
            Expr::FunctionCall(e) => {
                write!(f, "{}(", e.function)?;
                write_args(f, &e.arguments)?;
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for stmt in &self.statements {
            write!(f, " {stmt}")?;
        }
        write!(f, " }}")
    }
}

impl fmt::Display for IfStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) {}", self.keyword, self.condition, self.consequence)?;
        for chain in &self.another {
            write!(f, " {chain}")?;
        }
        if let Some(alt) = &self.alternative {
            write!(f, " else {}", alt.consequence)?;
        }
        Ok(())
    }
}

impl fmt::Display for CaseStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.test {
            Some(test) if test.operator == "~" => write!(f, "case ~ {}:", test.right)?,
            Some(test) => write!(f, "case {}:", test.right)?,
            None => write!(f, "default:")?,
        }
        for stmt in &self.statements {
            write!(f, " {stmt}")?;
        }
        if self.fallthrough {
            write!(f, " fallthrough;")?;
        }
        Ok(())
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Set(s) => write!(f, "set {} {} {};", s.ident, s.operator, s.value),
            Statement::Add(s) => write!(f, "add {} {} {};", s.ident, s.operator, s.value),
            Statement::Unset(s) => write!(f, "unset {};", s.ident),
            Statement::Remove(s) => write!(f, "remove {};", s.ident),
            Statement::Declare(s) => write!(f, "declare local {} {};", s.name, s.value_type),
            Statement::Call(s) => write!(f, "call {};", s.subroutine),
            Statement::If(s) => write!(f, "{s}"),
            Statement::Switch(s) => {
                write!(f, "switch ({}) {{", s.control)?;
                for case in &s.cases {
                    write!(f, " {case}")?;
                }
                write!(f, " }}")
            }
            Statement::Return(s) => match (&s.expression, s.has_parenthesis) {
                (Some(expr), true) => write!(f, "return({expr});"),
                (Some(expr), false) => write!(f, "return {expr};"),
                (None, _) => write!(f, "return;"),
            },
            Statement::Restart(_) => write!(f, "restart;"),
            Statement::Error(s) => {
                write!(f, "error")?;
                if let Some(code) = &s.code {
                    write!(f, " {code}")?;
                }
                if let Some(arg) = &s.argument {
                    write!(f, " {arg}")?;
                }
                write!(f, ";")
            }
            Statement::Esi(_) => write!(f, "esi;"),
            Statement::Log(s) => write!(f, "log {};", s.value),
            Statement::Synthetic(s) => write!(f, "synthetic {};", s.value),
            Statement::SyntheticBase64(s) => write!(f, "synthetic.base64 {};", s.value),
            Statement::Goto(s) => write!(f, "goto {};", s.destination),
            Statement::GotoDestination(s) => write!(f, "{}:", s.name),
            Statement::FunctionCall(s) => {
                write!(f, "{}(", s.function)?;
                write_args(f, &s.arguments)?;
                write!(f, ");")
            }
            Statement::Break(_) => write!(f, "break;"),
            Statement::Fallthrough(_) => write!(f, "fallthrough;"),
            Statement::Import(s) => write!(f, "import {};", s.name),
            Statement::Include(s) => write!(f, "include {};", s.module),
        }
    }
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Declaration::Acl(d) => {
                write!(f, "acl {} {{", d.name)?;
                for entry in &d.entries {
                    write!(f, " {entry}")?;
                }
                write!(f, " }}")
            }
            Declaration::Backend(d) => {
                write!(f, "backend {} {{", d.name)?;
                for prop in &d.properties {
                    write!(f, " {prop}")?;
                }
                write!(f, " }}")
            }
            Declaration::Director(d) => {
                write!(f, "director {} {} {{", d.name, d.kind)?;
                for entry in &d.entries {
                    write!(f, " {entry}")?;
                }
                write!(f, " }}")
            }
            Declaration::Table(d) => {
                write!(f, "table {}", d.name)?;
                if let Some(ty) = &d.value_type {
                    write!(f, " {ty}")?;
                }
                write!(f, " {{")?;
                for (i, entry) in d.entries.iter().enumerate() {
                    let sep = if i + 1 < d.entries.len() { "," } else { "" };
                    write!(f, " {}: {}{}", entry.key, entry.value, sep)?;
                }
                write!(f, " }}")
            }
            Declaration::Subroutine(d) => {
                write!(f, "sub {}", d.name)?;
                if let Some(ty) = &d.return_type {
                    write!(f, " {ty}")?;
                }
                write!(f, " {}", d.block)
            }
            Declaration::Penaltybox(d) => write!(f, "penaltybox {} {{}}", d.name),
            Declaration::Ratecounter(d) => write!(f, "ratecounter {} {{}}", d.name),
            Declaration::Import(d) => write!(f, "import {};", d.name),
            Declaration::Include(d) => write!(f, "include {};", d.module),
        }
    }
}

impl fmt::Display for AclEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inverse {
            write!(f, "! ")?;
        }
        write!(f, "\"{}\"", self.address)?;
        if let Some(mask) = self.mask {
            write!(f, "/{mask}")?;
        }
        write!(f, ";")
    }
}

impl fmt::Display for BackendProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            PropertyValue::Expr(expr) => write!(f, ".{} = {};", self.key, expr),
            PropertyValue::Object(props) => {
                write!(f, ".{} = {{", self.key)?;
                for prop in props {
                    write!(f, " {prop}")?;
                }
                write!(f, " }}")
            }
        }
    }
}

impl fmt::Display for DirectorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectorEntry::Property(p) => write!(f, ".{} = {};", p.key, p.value),
            DirectorEntry::Backend(b) => {
                write!(f, "{{")?;
                for prop in &b.properties {
                    write!(f, " .{} = {};", prop.key, prop.value)?;
                }
                write!(f, " }}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Ident {
        Ident {
            meta: Meta::default(),
            name: name.into(),
        }
    }

    fn string(value: &str) -> Expr {
        Expr::String(StringLit {
            meta: Meta::default(),
            value: value.into(),
            long: false,
        })
    }

    #[test]
    fn test_set_display() {
        let stmt = Statement::Set(SetStmt {
            meta: Meta::default(),
            ident: ident("req.http.X"),
            operator: "+=".into(),
            value: string("hi"),
        });
        assert_eq!(stmt.to_string(), "set req.http.X += \"hi\";");
    }

    #[test]
    fn test_return_parenthesis_forms() {
        let bare = Statement::Return(ReturnStmt {
            meta: Meta::default(),
            expression: Some(Box::new(Expr::Ident(ident("lookup")))),
            has_parenthesis: false,
        });
        assert_eq!(bare.to_string(), "return lookup;");

        let wrapped = Statement::Return(ReturnStmt {
            meta: Meta::default(),
            expression: Some(Box::new(Expr::Ident(ident("lookup")))),
            has_parenthesis: true,
        });
        assert_eq!(wrapped.to_string(), "return(lookup);");
    }

    #[test]
    fn test_string_escaping_round_trips() {
        let s = string("a\"b\\c\nd");
        assert_eq!(s.to_string(), "\"a\\\"b\\\\c\\x0ad\"");
    }

    #[test]
    fn test_long_string_display() {
        let s = Expr::String(StringLit {
            meta: Meta::default(),
            value: r"keep \n raw".into(),
            long: true,
        });
        assert_eq!(s.to_string(), r#"{"keep \n raw"}"#);
    }

    #[test]
    fn test_if_chain_display() {
        let stmt = Statement::If(IfStmt {
            meta: Meta::default(),
            keyword: "if".into(),
            condition: Expr::Ident(ident("cond")),
            consequence: Block {
                meta: Meta::default(),
                statements: vec![Statement::Restart(RestartStmt {
                    meta: Meta::default(),
                })],
            },
            another: vec![IfStmt {
                meta: Meta::default(),
                keyword: "elsif".into(),
                condition: Expr::Ident(ident("other")),
                consequence: Block {
                    meta: Meta::default(),
                    statements: vec![],
                },
                another: vec![],
                alternative: None,
            }],
            alternative: Some(ElseStmt {
                meta: Meta::default(),
                consequence: Block {
                    meta: Meta::default(),
                    statements: vec![],
                },
            }),
        });
        assert_eq!(
            stmt.to_string(),
            "if (cond) { restart; } elsif (other) { } else { }"
        );
    }
}
