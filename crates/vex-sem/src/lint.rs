//! The linter.
//!
//! Two passes over the resolved module set. The first collects every
//! declared symbol; the second walks each subroutine with its scope
//! context, resolving references, inferring expression types, and
//! validating assignments, return actions, and builtin calls. All
//! findings flow through the diagnostic handler; nothing aborts.

use rustc_hash::{FxHashMap, FxHashSet};
use vex_par::ast::{
    Block, CaseStmt, Declaration, DirectorEntry, Expr, IfStmt, Meta, Statement, SubroutineDecl,
};
use vex_res::Module;
use vex_util::{Diagnostic, Handler, Rule};

use crate::builtin;
use crate::scope::Scope;
use crate::types::ValueType;
use crate::variables;

/// Actions any subroutine may legally return.
const ALL_ACTIONS: &[&str] = &[
    "lookup",
    "pass",
    "hash",
    "deliver",
    "fetch",
    "restart",
    "error",
    "hit_for_pass",
    "deliver_stale",
];

/// Module providers accepted by `import`.
const KNOWN_IMPORTS: &[&str] = &[
    "std",
    "math",
    "table",
    "querystring",
    "digest",
    "accept",
    "uuid",
    "setcookie",
    "header",
    "crypto",
];

/// HTTP object names accepted where a builtin expects an `ID` target.
const HTTP_OBJECTS: &[&str] = &["req", "bereq", "beresp", "resp", "obj"];

/// Lint a resolved module set, reporting into `handler`.
pub fn lint(modules: &[Module], handler: &Handler) {
    let mut linter = Linter::new(handler);
    linter.collect(modules);
    linter.check(modules);
    linter.report_unused();
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum SymbolKind {
    Subroutine,
    Backend,
    Director,
    Acl,
    Table,
    Penaltybox,
    Ratecounter,
}

impl SymbolKind {
    fn describe(self) -> &'static str {
        match self {
            SymbolKind::Subroutine => "subroutine",
            SymbolKind::Backend => "backend",
            SymbolKind::Director => "director",
            SymbolKind::Acl => "acl",
            SymbolKind::Table => "table",
            SymbolKind::Penaltybox => "penaltybox",
            SymbolKind::Ratecounter => "ratecounter",
        }
    }
}

struct SymbolEntry {
    kind: SymbolKind,
    meta: Meta,
    /// Declared return type for typed subroutines.
    return_type: Option<ValueType>,
}

/// Per-subroutine checking context.
///
/// A custom subroutine has no `hook`: its effective scope depends on
/// the caller, so scope checks only reject what no scope permits.
struct SubContext {
    /// The single hook scope, when the subroutine is a hook.
    hook: Option<Scope>,
    return_type: Option<ValueType>,
    locals: FxHashMap<String, ValueType>,
}

struct Linter<'a> {
    handler: &'a Handler,
    symbols: FxHashMap<String, SymbolEntry>,
    used: FxHashSet<String>,
}

impl<'a> Linter<'a> {
    fn new(handler: &'a Handler) -> Self {
        Self {
            handler,
            symbols: FxHashMap::default(),
            used: FxHashSet::default(),
        }
    }

    fn report(&self, meta: &Meta, diagnostic: Diagnostic) {
        self.handler
            .report_unless_suppressed(diagnostic, meta.comments());
    }

    // ------------------------------------------------------------------
    // Pass 1: symbol collection
    // ------------------------------------------------------------------

    fn collect(&mut self, modules: &[Module]) {
        for module in modules {
            for declaration in &module.declarations {
                let (kind, return_type) = match declaration {
                    Declaration::Acl(_) => (SymbolKind::Acl, None),
                    Declaration::Backend(_) => (SymbolKind::Backend, None),
                    Declaration::Director(_) => (SymbolKind::Director, None),
                    Declaration::Table(_) => (SymbolKind::Table, None),
                    Declaration::Penaltybox(_) => (SymbolKind::Penaltybox, None),
                    Declaration::Ratecounter(_) => (SymbolKind::Ratecounter, None),
                    Declaration::Subroutine(sub) => {
                        let return_type = match &sub.return_type {
                            Some(name) => match ValueType::from_name(&name.name) {
                                Some(ty) => Some(ty),
                                None => {
                                    self.report(
                                        &sub.meta,
                                        Diagnostic::error(
                                            Rule::TypeMismatch,
                                            format!("unknown return type {}", name.name),
                                            name.meta.span,
                                        ),
                                    );
                                    None
                                }
                            },
                            None => None,
                        };
                        (SymbolKind::Subroutine, return_type)
                    }
                    Declaration::Import(import) => {
                        if !KNOWN_IMPORTS.contains(&import.name.name.as_str()) {
                            self.report(
                                &import.meta,
                                Diagnostic::error(
                                    Rule::InvalidImport,
                                    format!("unknown import module {}", import.name.name),
                                    import.name.meta.span,
                                ),
                            );
                        }
                        continue;
                    }
                    Declaration::Include(_) => continue,
                };

                let name = declaration.name().unwrap_or_default().to_string();
                let meta = declaration.meta().clone();
                if let Some(existing) = self.symbols.get(&name) {
                    self.report(
                        &meta,
                        Diagnostic::error(
                            Rule::DuplicateDeclaration,
                            format!("{} {} is already declared", existing.kind.describe(), name),
                            meta.span,
                        ),
                    );
                    continue;
                }
                self.symbols.insert(
                    name,
                    SymbolEntry {
                        kind,
                        meta,
                        return_type,
                    },
                );
            }
        }
    }

    fn mark_used(&mut self, name: &str) {
        self.used.insert(name.to_string());
    }

    fn symbol_kind(&self, name: &str) -> Option<SymbolKind> {
        self.symbols.get(name).map(|entry| entry.kind)
    }

    fn report_unused(&self) {
        for (name, entry) in &self.symbols {
            if self.used.contains(name) {
                continue;
            }
            if entry.kind == SymbolKind::Subroutine && Scope::from_hook_subroutine(name).is_some()
            {
                continue;
            }
            self.report(
                &entry.meta,
                Diagnostic::info(
                    Rule::UnusedDeclaration,
                    format!("{} {} is never referenced", entry.kind.describe(), name),
                    entry.meta.span,
                ),
            );
        }
    }

    // ------------------------------------------------------------------
    // Pass 2: checks
    // ------------------------------------------------------------------

    fn check(&mut self, modules: &[Module]) {
        for module in modules {
            for declaration in &module.declarations {
                match declaration {
                    Declaration::Subroutine(sub) => self.check_subroutine(sub),
                    Declaration::Director(director) => {
                        for entry in &director.entries {
                            let DirectorEntry::Backend(member) = entry else {
                                continue;
                            };
                            for property in &member.properties {
                                if property.key.name != "backend" {
                                    continue;
                                }
                                if let Expr::Ident(ident) = &property.value {
                                    if matches!(
                                        self.symbol_kind(&ident.name),
                                        Some(SymbolKind::Backend)
                                    ) {
                                        self.mark_used(&ident.name);
                                    } else {
                                        self.report(
                                            &property.meta,
                                            Diagnostic::error(
                                                Rule::UndefinedReference,
                                                format!("backend {} is not declared", ident.name),
                                                ident.meta.span,
                                            ),
                                        );
                                    }
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    fn check_subroutine(&mut self, sub: &SubroutineDecl) {
        let hook = Scope::from_hook_subroutine(&sub.name.name);
        if let Some(scope) = hook {
            self.check_boilerplate(sub, scope);
        }

        let return_type = self
            .symbols
            .get(&sub.name.name)
            .and_then(|entry| entry.return_type);
        let mut ctx = SubContext {
            hook,
            return_type,
            locals: FxHashMap::default(),
        };

        self.check_block(&sub.block, &mut ctx);

        if let Some(ty) = ctx.return_type {
            if !always_returns(&sub.block.statements) {
                self.report(
                    &sub.meta,
                    Diagnostic::error(
                        Rule::ReturnType,
                        format!(
                            "subroutine {} does not return {} on every path",
                            sub.name.name, ty
                        ),
                        sub.meta.span,
                    ),
                );
            }
        }
    }

    /// Hook subroutines should carry the `#FASTLY <phase>` marker the
    /// production pipeline splices boilerplate at.
    fn check_boilerplate(&self, sub: &SubroutineDecl, scope: Scope) {
        let Some(marker) = scope.marker() else { return };
        let expected = format!("FASTLY {marker}");
        let found = sub
            .block
            .statements
            .first()
            .map(|stmt| stmt.meta())
            .into_iter()
            .chain(std::iter::once(&sub.meta))
            .any(|meta| meta.comments().any(|c| c.trim() == expected));
        if !found {
            self.report(
                &sub.meta,
                Diagnostic::info(
                    Rule::BoilerplateComment,
                    format!("{} should contain the #{expected} marker comment", sub.name.name),
                    sub.meta.span,
                ),
            );
        }
    }

    fn check_block(&mut self, block: &Block, ctx: &mut SubContext) {
        let destinations: FxHashSet<&str> = block
            .statements
            .iter()
            .filter_map(|stmt| match stmt {
                Statement::GotoDestination(dest) => Some(dest.name.name.as_str()),
                _ => None,
            })
            .collect();

        for statement in &block.statements {
            if let Statement::Goto(goto) = statement {
                if !destinations.contains(goto.destination.name.as_str()) {
                    self.report(
                        &goto.meta,
                        Diagnostic::error(
                            Rule::UndefinedReference,
                            format!("goto destination {} is not defined", goto.destination.name),
                            goto.destination.meta.span,
                        ),
                    );
                }
            }
            self.check_statement(statement, ctx);
        }
    }

    fn check_statement(&mut self, statement: &Statement, ctx: &mut SubContext) {
        match statement {
            Statement::Declare(decl) => {
                if !decl.name.name.starts_with("var.") {
                    self.report(
                        &decl.meta,
                        Diagnostic::error(
                            Rule::Syntax,
                            format!("local variable {} must begin with var.", decl.name.name),
                            decl.name.meta.span,
                        ),
                    );
                    return;
                }
                let Some(ty) = ValueType::from_name(&decl.value_type.name) else {
                    self.report(
                        &decl.meta,
                        Diagnostic::error(
                            Rule::TypeMismatch,
                            format!("unknown type {}", decl.value_type.name),
                            decl.value_type.meta.span,
                        ),
                    );
                    return;
                };
                if ctx.locals.insert(decl.name.name.clone(), ty).is_some() {
                    self.report(
                        &decl.meta,
                        Diagnostic::error(
                            Rule::DuplicateDeclaration,
                            format!("local variable {} is already declared", decl.name.name),
                            decl.name.meta.span,
                        ),
                    );
                }
            }
            Statement::Set(set) => {
                self.check_assignment(&set.meta, &set.ident.name, &set.operator, &set.value, ctx)
            }
            Statement::Add(add) => {
                if !add.ident.name.contains(".http.") {
                    self.report(
                        &add.meta,
                        Diagnostic::error(
                            Rule::TypeMismatch,
                            format!("add requires a header variable, {} is not one", add.ident.name),
                            add.ident.meta.span,
                        ),
                    );
                    return;
                }
                self.check_assignment(&add.meta, &add.ident.name, &add.operator, &add.value, ctx)
            }
            Statement::Unset(unset) => {
                self.check_unset(&unset.meta, &unset.ident.name, unset.ident.meta.span, ctx)
            }
            Statement::Remove(remove) => {
                self.check_unset(&remove.meta, &remove.ident.name, remove.ident.meta.span, ctx)
            }
            Statement::Call(call) => {
                if matches!(
                    self.symbol_kind(&call.subroutine.name),
                    Some(SymbolKind::Subroutine)
                ) {
                    self.mark_used(&call.subroutine.name);
                } else {
                    self.report(
                        &call.meta,
                        Diagnostic::error(
                            Rule::UndefinedReference,
                            format!("subroutine {} is not declared", call.subroutine.name),
                            call.subroutine.meta.span,
                        ),
                    );
                }
            }
            Statement::If(stmt) => self.check_if(stmt, ctx),
            Statement::Switch(stmt) => {
                if let Some(ty) = self.infer(&stmt.meta, &stmt.control, ctx) {
                    if !ty.is_string_coercible() {
                        self.report(
                            &stmt.meta,
                            Diagnostic::error(
                                Rule::TypeMismatch,
                                format!("switch control cannot be {ty}"),
                                stmt.control.span(),
                            ),
                        );
                    }
                }
                for case in &stmt.cases {
                    self.check_case(case, ctx);
                }
            }
            Statement::Return(ret) => self.check_return(
                &ret.meta,
                ret.expression.as_deref(),
                ctx,
            ),
            Statement::Error(err) => {
                if let Some(code) = &err.code {
                    if let Some(ty) = self.infer(&err.meta, code, ctx) {
                        if ty != ValueType::Integer {
                            self.report(
                                &err.meta,
                                Diagnostic::error(
                                    Rule::TypeMismatch,
                                    format!("error status must be INTEGER, found {ty}"),
                                    code.span(),
                                ),
                            );
                        }
                    }
                }
                if let Some(argument) = &err.argument {
                    self.check_string_context(&err.meta, argument, ctx);
                }
            }
            Statement::Log(log) => self.check_string_context(&log.meta, &log.value, ctx),
            Statement::Synthetic(synth) => self.check_string_context(&synth.meta, &synth.value, ctx),
            Statement::SyntheticBase64(synth) => {
                self.check_string_context(&synth.meta, &synth.value, ctx)
            }
            Statement::FunctionCall(call) => {
                self.check_function_call(&call.meta, &call.function.name, &call.arguments, ctx);
            }
            Statement::Goto(_)
            | Statement::GotoDestination(_)
            | Statement::Restart(_)
            | Statement::Esi(_)
            | Statement::Break(_)
            | Statement::Fallthrough(_)
            | Statement::Import(_)
            | Statement::Include(_) => {}
        }
    }

    fn check_if(&mut self, stmt: &IfStmt, ctx: &mut SubContext) {
        if let Some(ty) = self.infer(&stmt.meta, &stmt.condition, ctx) {
            // STRING conditions are presence checks on headers.
            if ty != ValueType::Bool && ty != ValueType::String {
                self.report(
                    &stmt.meta,
                    Diagnostic::error(
                        Rule::TypeMismatch,
                        format!("if condition must be BOOL, found {ty}"),
                        stmt.condition.span(),
                    ),
                );
            }
        }
        self.check_block(&stmt.consequence, ctx);
        for chain in &stmt.another {
            self.check_if(chain, ctx);
        }
        if let Some(alternative) = &stmt.alternative {
            self.check_block(&alternative.consequence, ctx);
        }
    }

    fn check_case(&mut self, case: &CaseStmt, ctx: &mut SubContext) {
        if let Some(test) = &case.test {
            if test.operator == "~" {
                self.check_regex_literal(&case.meta, &test.right);
            }
        }
        for statement in &case.statements {
            self.check_statement(statement, ctx);
        }
    }

    fn check_return(&mut self, meta: &Meta, expression: Option<&Expr>, ctx: &mut SubContext) {
        if let Some(ty) = ctx.return_type {
            match expression {
                Some(expr) => {
                    if let Some(found) = self.infer(meta, expr, ctx) {
                        if found != ty {
                            self.report(
                                meta,
                                Diagnostic::error(
                                    Rule::ReturnType,
                                    format!("return type mismatch: expected {ty}, found {found}"),
                                    expr.span(),
                                ),
                            );
                        }
                    }
                }
                None => self.report(
                    meta,
                    Diagnostic::error(
                        Rule::ReturnType,
                        format!("typed subroutine must return {ty}"),
                        meta.span,
                    ),
                ),
            }
            return;
        }

        // Untyped subroutines return actions.
        let Some(expr) = expression else { return };
        let action = match unwrap_grouped(expr) {
            Expr::Ident(ident) => Some(ident.name.as_str()),
            _ => None,
        };
        let Some(action) = action else {
            self.report(
                meta,
                Diagnostic::error(
                    Rule::ReturnAction,
                    "return of an untyped subroutine must name an action",
                    expr.span(),
                ),
            );
            return;
        };

        let allowed = match ctx.hook {
            Some(scope) => scope.allowed_actions(),
            None => ALL_ACTIONS,
        };
        if !allowed.contains(&action) {
            let context = match ctx.hook {
                Some(scope) => format!("in {}", scope.hook_subroutine().unwrap_or("hook")),
                None => "here".to_string(),
            };
            self.report(
                meta,
                Diagnostic::error(
                    Rule::ReturnAction,
                    format!("action {action} cannot be returned {context}"),
                    expr.span(),
                ),
            );
        }
    }

    fn check_assignment(
        &mut self,
        meta: &Meta,
        lhs_name: &str,
        operator: &str,
        value: &Expr,
        ctx: &mut SubContext,
    ) {
        let Some(lhs) = self.resolve_writable(meta, lhs_name, ctx) else {
            return;
        };
        let rhs = self.infer(meta, value, ctx);
        let Some(rhs) = rhs else { return };
        let rhs_literal = is_literal_expr(value);

        if let Err(message) = assignment_allowed(operator, lhs, rhs, rhs_literal) {
            self.report(
                meta,
                Diagnostic::error(Rule::OperatorAssignment, message, value.span()),
            );
        }
    }

    /// Resolve an assignment target and enforce its writable scope set.
    fn resolve_writable(
        &mut self,
        meta: &Meta,
        name: &str,
        ctx: &mut SubContext,
    ) -> Option<ValueType> {
        if let Some(ty) = ctx.locals.get(name) {
            return Some(*ty);
        }
        if let Some(spec) = variables::lookup(name) {
            let writable = match ctx.hook {
                Some(scope) => spec.write.contains(scope),
                None => !spec.write.is_empty(),
            };
            if !writable {
                self.report(
                    meta,
                    Diagnostic::error(
                        Rule::RestrictedScope,
                        format!("{name} cannot be written in this scope"),
                        meta.span,
                    ),
                );
            }
            return Some(spec.ty);
        }
        self.report(
            meta,
            Diagnostic::error(
                Rule::UndefinedVariable,
                format!("variable {name} is not defined"),
                meta.span,
            ),
        );
        None
    }

    fn check_unset(
        &mut self,
        meta: &Meta,
        name: &str,
        span: vex_util::Span,
        ctx: &mut SubContext,
    ) {
        if !name.contains(".http.") {
            self.report(
                meta,
                Diagnostic::error(
                    Rule::TypeMismatch,
                    format!("{name} cannot be unset"),
                    span,
                ),
            );
            return;
        }
        self.resolve_writable(meta, name, ctx);
    }

    fn check_string_context(&mut self, meta: &Meta, expr: &Expr, ctx: &mut SubContext) {
        if let Some(ty) = self.infer(meta, expr, ctx) {
            if !ty.is_string_coercible() {
                self.report(
                    meta,
                    Diagnostic::error(
                        Rule::TypeMismatch,
                        format!("{ty} cannot be used in a string context"),
                        expr.span(),
                    ),
                );
            }
        }
    }

    fn check_regex_literal(&mut self, meta: &Meta, expr: &Expr) {
        if let Expr::String(lit) = unwrap_grouped(expr) {
            if let Err(err) = regex::Regex::new(&lit.value) {
                self.report(
                    meta,
                    Diagnostic::error(
                        Rule::RegexSyntax,
                        format!("invalid regular expression: {err}"),
                        lit.meta.span,
                    ),
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // Expression typing
    // ------------------------------------------------------------------

    /// Infer an expression's type, reporting any findings along the way.
    ///
    /// `None` means the type is unknown; the error was already reported,
    /// so callers should not cascade.
    fn infer(&mut self, meta: &Meta, expr: &Expr, ctx: &mut SubContext) -> Option<ValueType> {
        match expr {
            Expr::String(_) => Some(ValueType::String),
            Expr::Int(_) => Some(ValueType::Integer),
            Expr::Float(_) => Some(ValueType::Float),
            Expr::RTime(_) => Some(ValueType::RTime),
            Expr::Bool(_) => Some(ValueType::Bool),
            Expr::Ip(_) => Some(ValueType::Ip),
            Expr::Grouped(group) => self.infer(meta, &group.right, ctx),
            Expr::Ident(ident) => self.infer_ident(meta, &ident.name, ident.meta.span, ctx),
            Expr::Prefix(prefix) => {
                let ty = self.infer(meta, &prefix.right, ctx)?;
                match prefix.operator.as_str() {
                    "!" if ty == ValueType::Bool || ty == ValueType::String => {
                        Some(ValueType::Bool)
                    }
                    "-" if ty.is_numeric() || ty == ValueType::RTime => Some(ty),
                    op => {
                        self.report(
                            meta,
                            Diagnostic::error(
                                Rule::TypeMismatch,
                                format!("prefix {op} cannot apply to {ty}"),
                                prefix.right.span(),
                            ),
                        );
                        None
                    }
                }
            }
            Expr::Postfix(postfix) => match postfix.operator.as_str() {
                "%" => self.infer(meta, &postfix.left, ctx),
                _ => Some(ValueType::Integer),
            },
            Expr::Infix(infix) => self.infer_infix(meta, infix, ctx),
            Expr::FunctionCall(call) => {
                self.check_function_call(meta, &call.function.name, &call.arguments, ctx)
            }
        }
    }

    fn infer_ident(
        &mut self,
        meta: &Meta,
        name: &str,
        span: vex_util::Span,
        ctx: &mut SubContext,
    ) -> Option<ValueType> {
        if let Some(ty) = ctx.locals.get(name) {
            return Some(*ty);
        }
        if let Some(spec) = variables::lookup(name) {
            let readable = match ctx.hook {
                Some(scope) => spec.read.contains(scope),
                None => true,
            };
            if !readable {
                self.report(
                    meta,
                    Diagnostic::error(
                        Rule::RestrictedScope,
                        format!("{name} cannot be read in this scope"),
                        span,
                    ),
                );
            }
            return Some(spec.ty);
        }
        if let Some(kind) = self.symbol_kind(name) {
            self.mark_used(name);
            let ty = match kind {
                SymbolKind::Backend | SymbolKind::Director => ValueType::Backend,
                SymbolKind::Acl => ValueType::Acl,
                SymbolKind::Table | SymbolKind::Penaltybox | SymbolKind::Ratecounter => {
                    ValueType::Id
                }
                SymbolKind::Subroutine => {
                    return self.symbols.get(name).and_then(|entry| entry.return_type)
                }
            };
            return Some(ty);
        }

        let rule = if name.contains('.') {
            Rule::UndefinedVariable
        } else {
            Rule::UndefinedReference
        };
        self.report(
            meta,
            Diagnostic::error(rule, format!("{name} is not defined"), span),
        );
        None
    }

    fn infer_infix(
        &mut self,
        meta: &Meta,
        infix: &vex_par::ast::InfixExpr,
        ctx: &mut SubContext,
    ) -> Option<ValueType> {
        match infix.operator.as_str() {
            "&&" | "||" => {
                for side in [&infix.left, &infix.right] {
                    if let Some(ty) = self.infer(meta, side, ctx) {
                        // STRING operands are header presence checks.
                        if ty != ValueType::Bool && ty != ValueType::String {
                            self.report(
                                meta,
                                Diagnostic::error(
                                    Rule::TypeMismatch,
                                    format!("logical operand must be BOOL, found {ty}"),
                                    side.span(),
                                ),
                            );
                        }
                    }
                }
                Some(ValueType::Bool)
            }
            "==" | "!=" | "<" | "<=" | ">" | ">=" => {
                let left = self.infer(meta, &infix.left, ctx);
                let right = self.infer(meta, &infix.right, ctx);
                if let (Some(left), Some(right)) = (left, right) {
                    let comparable = left == right
                        || (left.is_numeric() && right.is_numeric())
                        || left == ValueType::String
                        || right == ValueType::String;
                    if !comparable {
                        self.report(
                            meta,
                            Diagnostic::error(
                                Rule::TypeMismatch,
                                format!("cannot compare {left} with {right}"),
                                infix.right.span(),
                            ),
                        );
                    }
                }
                Some(ValueType::Bool)
            }
            "~" | "!~" => {
                let left = self.infer(meta, &infix.left, ctx);
                let right = self.infer(meta, &infix.right, ctx);
                match right {
                    Some(ValueType::Acl) => {
                        if let Some(left) = left {
                            if left != ValueType::Ip && left != ValueType::String {
                                self.report(
                                    meta,
                                    Diagnostic::error(
                                        Rule::TypeMismatch,
                                        format!("acl match requires IP, found {left}"),
                                        infix.left.span(),
                                    ),
                                );
                            }
                        }
                    }
                    _ => {
                        self.check_regex_literal(meta, &infix.right);
                        if let Some(left) = left {
                            if !left.is_string_coercible() {
                                self.report(
                                    meta,
                                    Diagnostic::error(
                                        Rule::TypeMismatch,
                                        format!("{left} cannot be matched"),
                                        infix.left.span(),
                                    ),
                                );
                            }
                        }
                    }
                }
                Some(ValueType::Bool)
            }
            "+" | "-" => {
                let left = self.infer(meta, &infix.left, ctx)?;
                let right = self.infer(meta, &infix.right, ctx)?;
                // Concatenation: `+` over anything stringy.
                if infix.operator == "+"
                    && (left == ValueType::String || right == ValueType::String)
                {
                    for (ty, side) in [(left, &infix.left), (right, &infix.right)] {
                        if !ty.is_string_coercible() {
                            self.report(
                                meta,
                                Diagnostic::error(
                                    Rule::TypeMismatch,
                                    format!("{ty} cannot be concatenated"),
                                    side.span(),
                                ),
                            );
                        }
                    }
                    return Some(ValueType::String);
                }
                self.arith_result(meta, infix, left, right)
            }
            "*" | "/" | "%" => {
                let left = self.infer(meta, &infix.left, ctx)?;
                let right = self.infer(meta, &infix.right, ctx)?;
                if infix.operator == "%"
                    && (left != ValueType::Integer || right != ValueType::Integer)
                {
                    self.report(
                        meta,
                        Diagnostic::error(
                            Rule::TypeMismatch,
                            format!("remainder requires INTEGER operands, found {left} and {right}"),
                            infix.right.span(),
                        ),
                    );
                    return None;
                }
                self.arith_result(meta, infix, left, right)
            }
            op => {
                self.report(
                    meta,
                    Diagnostic::error(
                        Rule::TypeMismatch,
                        format!("unsupported operator {op}"),
                        meta.span,
                    ),
                );
                None
            }
        }
    }

    fn arith_result(
        &mut self,
        meta: &Meta,
        infix: &vex_par::ast::InfixExpr,
        left: ValueType,
        right: ValueType,
    ) -> Option<ValueType> {
        use ValueType::{Float, Integer, RTime, Time};
        let result = match (left, right) {
            (Integer, Integer) => Some(Integer),
            (Integer, Float) | (Float, Integer) | (Float, Float) => Some(Float),
            (RTime, RTime) | (RTime, Integer) | (RTime, Float) => Some(RTime),
            (Time, RTime) | (Time, Integer) => Some(Time),
            _ => None,
        };
        if result.is_none() {
            self.report(
                meta,
                Diagnostic::error(
                    Rule::TypeMismatch,
                    format!(
                        "operator {} cannot combine {left} and {right}",
                        infix.operator
                    ),
                    infix.right.span(),
                ),
            );
        }
        result
    }

    // ------------------------------------------------------------------
    // Builtin calls
    // ------------------------------------------------------------------

    fn check_function_call(
        &mut self,
        meta: &Meta,
        name: &str,
        arguments: &[Expr],
        ctx: &mut SubContext,
    ) -> Option<ValueType> {
        let Some(spec) = builtin::lookup(name) else {
            self.report(
                meta,
                Diagnostic::error(
                    Rule::UndefinedFunction,
                    format!("function {name} is not defined"),
                    meta.span,
                ),
            );
            return None;
        };

        let arg_types: Vec<Option<ValueType>> = arguments
            .iter()
            .map(|arg| self.infer_call_argument(meta, arg, ctx))
            .collect();

        let matched = spec
            .signatures
            .iter()
            .find(|signature| signature.matches(&arg_types));
        let Some(signature) = matched else {
            let arity_matches = spec.signatures.iter().any(|signature| {
                signature.args.len() == arguments.len()
                    || (signature.variadic && arguments.len() >= signature.args.len())
            });
            let (rule, message) = if arity_matches {
                (
                    Rule::TypeMismatch,
                    format!("no signature of {name} accepts these argument types"),
                )
            } else {
                (
                    Rule::ArityMismatch,
                    format!("{name} does not take {} arguments", arguments.len()),
                )
            };
            self.report(meta, Diagnostic::error(rule, message, meta.span));
            return None;
        };

        if !spec.implemented {
            self.report(
                meta,
                Diagnostic::warning(
                    Rule::UnimplementedBuiltin,
                    format!("builtin function {name} is not implemented"),
                    meta.span,
                ),
            );
        }

        // Regex-taking builtins get their pattern literal validated.
        if matches!(name, "regsub" | "regsuball") {
            if let Some(pattern) = arguments.get(1) {
                self.check_regex_literal(meta, pattern);
            }
        }

        Some(signature.ret)
    }

    /// Call arguments resolve like expressions except that a bare
    /// identifier may name a declared object or HTTP object where the
    /// parameter expects an `ID`.
    fn infer_call_argument(
        &mut self,
        meta: &Meta,
        arg: &Expr,
        ctx: &mut SubContext,
    ) -> Option<ValueType> {
        if let Expr::Ident(ident) = arg {
            if HTTP_OBJECTS.contains(&ident.name.as_str()) {
                return Some(ValueType::Id);
            }
            if let Some(kind) = self.symbol_kind(&ident.name) {
                if matches!(
                    kind,
                    SymbolKind::Table
                        | SymbolKind::Penaltybox
                        | SymbolKind::Ratecounter
                        | SymbolKind::Acl
                        | SymbolKind::Backend
                        | SymbolKind::Director
                ) {
                    self.mark_used(&ident.name);
                    return Some(ValueType::Id);
                }
            }
        }
        self.infer(meta, arg, ctx)
    }
}

/// Strip grouping parentheses.
fn unwrap_grouped(expr: &Expr) -> &Expr {
    match expr {
        Expr::Grouped(group) => unwrap_grouped(&group.right),
        other => other,
    }
}

/// Whether the expression is a source literal.
///
/// The literal flag the evaluator tracks at runtime is statically
/// decidable here: only literal nodes (through grouping) carry it.
fn is_literal_expr(expr: &Expr) -> bool {
    matches!(
        unwrap_grouped(expr),
        Expr::String(_) | Expr::Int(_) | Expr::Float(_) | Expr::RTime(_) | Expr::Bool(_) | Expr::Ip(_)
    )
}

/// The §4.7 assignment compatibility table, statically applied.
fn assignment_allowed(
    operator: &str,
    lhs: ValueType,
    rhs: ValueType,
    rhs_literal: bool,
) -> Result<(), String> {
    use ValueType::{Bool, Float, Integer, RTime, String as Str, Time};

    let reject = || {
        Err(format!(
            "operator {operator} cannot assign {rhs}{} to {lhs}",
            if rhs_literal { " literal" } else { "" }
        ))
    };

    match operator {
        "=" => match lhs {
            Str => {
                if rhs.is_string_coercible() {
                    Ok(())
                } else {
                    reject()
                }
            }
            Float => match rhs {
                Integer | Float | RTime | Time => Ok(()),
                _ => reject(),
            },
            _ if lhs == rhs => Ok(()),
            _ => reject(),
        },
        "+=" | "-=" => match lhs {
            Integer => match rhs {
                Integer => Ok(()),
                Float if !rhs_literal => Ok(()),
                RTime if !rhs_literal => Ok(()),
                Time => Ok(()),
                _ => reject(),
            },
            Float => match rhs {
                Integer | Float => Ok(()),
                RTime if !rhs_literal => Ok(()),
                Time => Ok(()),
                _ => reject(),
            },
            RTime => match rhs {
                Integer | Float if !rhs_literal => Ok(()),
                RTime => Ok(()),
                Time => Ok(()),
                _ => reject(),
            },
            Time => match rhs {
                Integer | Float if !rhs_literal => Ok(()),
                RTime => Ok(()),
                _ => reject(),
            },
            _ => reject(),
        },
        "*=" | "/=" => match lhs {
            Integer => match rhs {
                Integer => Ok(()),
                Float if !rhs_literal => Ok(()),
                _ => reject(),
            },
            Float => match rhs {
                Integer | Float => Ok(()),
                _ => reject(),
            },
            RTime => match rhs {
                Integer | Float if !rhs_literal => Ok(()),
                _ => reject(),
            },
            _ => reject(),
        },
        "%=" | "|=" | "&=" | "^=" | "<<=" | ">>=" | "rol=" | "ror=" => {
            if lhs == Integer && rhs == Integer {
                Ok(())
            } else {
                reject()
            }
        }
        "&&=" | "||=" => {
            if lhs == Bool && rhs == Bool {
                Ok(())
            } else {
                reject()
            }
        }
        _ => Err(format!("unknown assignment operator {operator}")),
    }
}

/// Whether every control path through the statements reaches a return.
fn always_returns(statements: &[Statement]) -> bool {
    statements.iter().any(statement_returns)
}

fn statement_returns(statement: &Statement) -> bool {
    match statement {
        Statement::Return(_) | Statement::Error(_) => true,
        Statement::If(stmt) => {
            stmt.alternative.is_some()
                && always_returns(&stmt.consequence.statements)
                && stmt
                    .another
                    .iter()
                    .all(|chain| always_returns(&chain.consequence.statements))
                && stmt
                    .alternative
                    .as_ref()
                    .is_some_and(|alt| always_returns(&alt.consequence.statements))
        }
        Statement::Switch(stmt) => {
            stmt.default >= 0
                && stmt
                    .cases
                    .iter()
                    .all(|case| always_returns(&case.statements))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vex_res::Resolver;
    use vex_util::{Level, SourceMap};

    fn lint_source(source: &str) -> Handler {
        let handler = Handler::new();
        let mut map = SourceMap::new();
        let modules = Resolver::new(vec![])
            .resolve_source("main", source, &mut map, &handler)
            .unwrap();
        lint(&modules, &handler);
        handler
    }

    fn errors_of(handler: &Handler) -> Vec<(Rule, String)> {
        handler
            .diagnostics()
            .into_iter()
            .filter(|d| d.level == Level::Error)
            .map(|d| (d.rule, d.message))
            .collect()
    }

    #[test]
    fn test_clean_config() {
        let handler = lint_source(
            r#"
            backend origin { .host = "example.com"; }
            sub vcl_recv {
              #FASTLY recv
              set req.http.X = "hi";
              return(lookup);
            }
            "#,
        );
        assert_eq!(errors_of(&handler), vec![]);
    }

    #[test]
    fn test_rtime_nonliteral_addition_is_clean() {
        // Scenario: INTEGER += RTIME via a non-literal passes lint.
        let handler = lint_source(
            r#"
            sub vcl_recv {
              #FASTLY recv
              declare local var.a INTEGER;
              declare local var.t RTIME;
              set var.a = 1;
              set var.a += var.t;
              return(lookup);
            }
            "#,
        );
        assert_eq!(errors_of(&handler), vec![]);
    }

    #[test]
    fn test_rtime_literal_addition_rejected() {
        // Scenario: `set var.a += 10s;` with a literal RTIME is an error.
        let handler = lint_source(
            r#"
            sub vcl_recv {
              #FASTLY recv
              declare local var.a INTEGER;
              set var.a += 10s;
              return(lookup);
            }
            "#,
        );
        let errors = errors_of(&handler);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, Rule::OperatorAssignment);
    }

    #[test]
    fn test_header_presence_condition_is_clean() {
        let handler = lint_source(
            "sub vcl_recv {\n#FASTLY recv\nif (req.http.A && !req.http.B) {\nunset req.http.A;\n}\nreturn(lookup); }",
        );
        assert_eq!(errors_of(&handler), vec![]);
    }

    #[test]
    fn test_undefined_variable() {
        let handler = lint_source("sub vcl_recv {\n#FASTLY recv\nset req.nope = \"x\"; }");
        let errors = errors_of(&handler);
        assert_eq!(errors[0].0, Rule::UndefinedVariable);
    }

    #[test]
    fn test_restricted_scope_write() {
        // beresp.ttl is FETCH-scoped; writing it in RECV is an error.
        let handler = lint_source(
            "sub vcl_recv {\n#FASTLY recv\nset beresp.ttl = 10s;\nreturn(lookup); }",
        );
        let errors = errors_of(&handler);
        assert_eq!(errors[0].0, Rule::RestrictedScope);
    }

    #[test]
    fn test_invalid_return_action() {
        let handler = lint_source(
            "sub vcl_recv {\n#FASTLY recv\nreturn(deliver); }",
        );
        let errors = errors_of(&handler);
        assert_eq!(errors[0].0, Rule::ReturnAction);
    }

    #[test]
    fn test_typed_subroutine_return_paths() {
        let handler = lint_source(
            r#"
            sub pick STRING {
              if (req.http.A == "1") {
                return "a";
              }
            }
            sub vcl_recv {
              #FASTLY recv
              set req.http.P = pick;
              return(lookup);
            }
            "#,
        );
        let errors = errors_of(&handler);
        assert!(errors.iter().any(|(rule, _)| *rule == Rule::ReturnType));
    }

    #[test]
    fn test_typed_subroutine_complete_paths_clean() {
        let handler = lint_source(
            r#"
            sub pick STRING {
              if (req.http.A == "1") {
                return "a";
              } else {
                return "b";
              }
            }
            sub vcl_recv {
              #FASTLY recv
              set req.http.P = pick;
              return(lookup);
            }
            "#,
        );
        assert_eq!(errors_of(&handler), vec![]);
    }

    #[test]
    fn test_call_undefined_subroutine() {
        let handler = lint_source("sub vcl_recv {\n#FASTLY recv\ncall missing; }");
        let errors = errors_of(&handler);
        assert_eq!(errors[0].0, Rule::UndefinedReference);
    }

    #[test]
    fn test_arity_mismatch() {
        let handler =
            lint_source("sub vcl_recv {\n#FASTLY recv\nset req.http.X = std.tolower(); }");
        let errors = errors_of(&handler);
        assert_eq!(errors[0].0, Rule::ArityMismatch);
    }

    #[test]
    fn test_unimplemented_builtin_is_warning() {
        let handler = lint_source(
            "sub vcl_recv {\n#FASTLY recv\nset req.http.X = digest.hash_md5(\"a\"); }",
        );
        assert_eq!(errors_of(&handler), vec![]);
        assert_eq!(handler.warning_count(), 1);
    }

    #[test]
    fn test_pragma_suppression() {
        let handler = lint_source(
            "sub vcl_recv {\n#FASTLY recv\n// falco-ignore undefined-variable\nset req.nope = \"x\"; }",
        );
        assert_eq!(errors_of(&handler), vec![]);
    }

    #[test]
    fn test_boilerplate_comment_info() {
        let handler = lint_source("sub vcl_recv { return(lookup); }");
        assert!(handler
            .diagnostics()
            .iter()
            .any(|d| d.rule == Rule::BoilerplateComment && d.level == Level::Info));
    }

    #[test]
    fn test_unused_declaration_info() {
        let handler = lint_source(
            "backend lonely { .host = \"x\"; }\nsub vcl_recv {\n#FASTLY recv\nreturn(lookup); }",
        );
        assert!(handler
            .diagnostics()
            .iter()
            .any(|d| d.rule == Rule::UnusedDeclaration && d.message.contains("lonely")));
    }

    #[test]
    fn test_duplicate_declaration() {
        let handler = lint_source("acl a {}\nacl a {}");
        let errors = errors_of(&handler);
        assert_eq!(errors[0].0, Rule::DuplicateDeclaration);
    }

    #[test]
    fn test_invalid_regex() {
        let handler = lint_source(
            "sub vcl_recv {\n#FASTLY recv\nif (req.url ~ \"([\") { esi; }\nreturn(lookup); }",
        );
        let errors = errors_of(&handler);
        assert!(errors.iter().any(|(rule, _)| *rule == Rule::RegexSyntax));
    }

    #[test]
    fn test_acl_match_marks_usage() {
        let handler = lint_source(
            r#"
            acl internal { "10.0.0.0"/8; }
            sub vcl_recv {
              #FASTLY recv
              if (client.ip ~ internal) {
                error 403 "forbidden";
              }
              return(lookup);
            }
            "#,
        );
        assert_eq!(errors_of(&handler), vec![]);
        assert!(!handler
            .diagnostics()
            .iter()
            .any(|d| d.rule == Rule::UnusedDeclaration));
    }

    #[test]
    fn test_unknown_import() {
        let handler = lint_source("import nonsense;");
        let errors = errors_of(&handler);
        assert_eq!(errors[0].0, Rule::InvalidImport);
    }

    #[test]
    fn test_goto_undefined_destination() {
        let handler = lint_source("sub vcl_recv {\n#FASTLY recv\ngoto nowhere;\nreturn(lookup); }");
        let errors = errors_of(&handler);
        assert_eq!(errors[0].0, Rule::UndefinedReference);
    }

    #[test]
    fn test_table_function_argument() {
        let handler = lint_source(
            r#"
            table redirects STRING { "/a": "/b" }
            sub vcl_recv {
              #FASTLY recv
              set req.http.Location = table.lookup(redirects, req.url);
              return(lookup);
            }
            "#,
        );
        assert_eq!(errors_of(&handler), vec![]);
    }
}
