//! The state-machine interpreter.

use std::net::IpAddr;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use vex_par::ast::{
    CaseStmt, Declaration, Expr, IfStmt, Statement, SubroutineDecl,
};
use vex_res::Module;
use vex_sem::{Scope, ValueType};

use crate::assign;
use crate::builtin::registry;
use crate::context::{AclMatcher, Context};
use crate::http::{HttpRequest, HttpResponse};
use crate::value::{parse_rtime, Value};
use crate::RuntimeError;

/// Maximum `restart` transitions before the machine forces `ERROR`.
const MAX_RESTARTS: i64 = 3;

/// Maximum `call` frame depth.
const MAX_CALL_DEPTH: usize = 100;

/// HTTP object names usable where builtins expect an `ID` target.
const HTTP_OBJECTS: &[&str] = &["req", "bereq", "beresp", "resp", "obj"];

/// A hook return action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Lookup,
    Pass,
    Hash,
    Deliver,
    DeliverStale,
    Fetch,
    Restart,
    Error,
    HitForPass,
}

impl Action {
    /// Parse an action keyword.
    pub fn from_name(name: &str) -> Option<Action> {
        let action = match name {
            "lookup" => Action::Lookup,
            "pass" => Action::Pass,
            "hash" => Action::Hash,
            "deliver" => Action::Deliver,
            "deliver_stale" => Action::DeliverStale,
            "fetch" => Action::Fetch,
            "restart" => Action::Restart,
            "error" => Action::Error,
            "hit_for_pass" => Action::HitForPass,
            _ => return None,
        };
        Some(action)
    }
}

/// Statement-level control flow.
enum Flow {
    Normal,
    Break,
    /// `return` with an optional value (typed subroutines only).
    Return(Option<Value>),
    /// `return(action)`, `restart;`, or `error …;`.
    Action(Action),
}

/// One machine state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Recv,
    Hash,
    Hit,
    Miss,
    Pass,
    Fetch,
    Error,
    Deliver,
    Log,
    Done,
}

/// The program index: declarations digested from the resolved modules.
struct Program {
    subroutines: FxHashMap<String, SubroutineDecl>,
    tables: FxHashMap<String, FxHashMap<String, String>>,
    acls: FxHashMap<String, Vec<AclMatcher>>,
    backends: Vec<String>,
}

impl Program {
    fn build(modules: &[Module]) -> Result<Program, RuntimeError> {
        let mut program = Program {
            subroutines: FxHashMap::default(),
            tables: FxHashMap::default(),
            acls: FxHashMap::default(),
            backends: Vec::new(),
        };
        for module in modules {
            for declaration in &module.declarations {
                match declaration {
                    Declaration::Subroutine(sub) => {
                        program
                            .subroutines
                            .insert(sub.name.name.clone(), sub.clone());
                    }
                    Declaration::Backend(backend) => {
                        program.backends.push(backend.name.name.clone());
                    }
                    Declaration::Director(director) => {
                        program.backends.push(director.name.name.clone());
                    }
                    Declaration::Table(table) => {
                        let mut entries = FxHashMap::default();
                        for entry in &table.entries {
                            let value = literal_string(&entry.value)?;
                            entries.insert(entry.key.value.clone(), value);
                        }
                        program.tables.insert(table.name.name.clone(), entries);
                    }
                    Declaration::Acl(acl) => {
                        let mut matchers = Vec::new();
                        for entry in &acl.entries {
                            let addr: IpAddr = entry.address.parse().map_err(|_| {
                                RuntimeError::Evaluation(format!(
                                    "invalid address {} in acl {}",
                                    entry.address, acl.name.name
                                ))
                            })?;
                            matchers.push(AclMatcher {
                                inverse: entry.inverse,
                                addr,
                                mask: entry.mask.map(|m| m as u8),
                            });
                        }
                        program.acls.insert(acl.name.name.clone(), matchers);
                    }
                    _ => {}
                }
            }
        }
        Ok(program)
    }
}

/// Table values are literal; anything else is a configuration error.
fn literal_string(expr: &Expr) -> Result<String, RuntimeError> {
    match expr {
        Expr::String(lit) => Ok(lit.value.clone()),
        Expr::Int(lit) => Ok(lit.value.to_string()),
        Expr::Float(lit) => Ok(format!("{:.3}", lit.value)),
        Expr::Bool(lit) => Ok(if lit.value { "1" } else { "0" }.to_string()),
        Expr::RTime(lit) => Ok(lit.value.clone()),
        _ => Err(RuntimeError::Evaluation(
            "table entries must be literals".to_string(),
        )),
    }
}

/// The outcome of one simulated request.
#[derive(Debug)]
pub struct Execution {
    /// The response delivered to the client.
    pub response: HttpResponse,
    /// Final state of the client request, for assertions.
    pub request: HttpRequest,
    /// The diagnostic log buffer.
    pub logs: Vec<String>,
    /// Restarts consumed.
    pub restarts: i64,
}

/// The tree-walking interpreter.
///
/// # Example
///
/// ```
/// use vex_rt::{HttpRequest, Interpreter};
/// use vex_res::Resolver;
/// use vex_util::{Handler, SourceMap};
///
/// let source = r#"
///   backend origin { .host = "example.com"; }
///   sub vcl_recv { set req.http.X = "hi"; return(lookup); }
/// "#;
/// let handler = Handler::new();
/// let mut map = SourceMap::new();
/// let modules = Resolver::new(vec![])
///     .resolve_source("main", source, &mut map, &handler)
///     .unwrap();
///
/// let execution = Interpreter::new(&modules)
///     .unwrap()
///     .execute(HttpRequest::get("/"))
///     .unwrap();
/// assert_eq!(execution.response.status, 200);
/// assert_eq!(execution.request.headers.get("X"), Some("hi"));
/// ```
pub struct Interpreter {
    program: Program,
    fixed_now: Option<DateTime<Utc>>,
    seed: u64,
    deadline: Option<Instant>,
}

impl Interpreter {
    /// Build an interpreter over a resolved module set.
    pub fn new(modules: &[Module]) -> Result<Interpreter, RuntimeError> {
        Ok(Interpreter {
            program: Program::build(modules)?,
            fixed_now: None,
            seed: 0x5EED,
            deadline: None,
        })
    }

    /// Pin the request clock, for reproducible runs.
    pub fn with_fixed_clock(mut self, now: DateTime<Utc>) -> Interpreter {
        self.fixed_now = Some(now);
        self
    }

    /// Pin the RNG seed.
    pub fn with_seed(mut self, seed: u64) -> Interpreter {
        self.seed = seed;
        self
    }

    /// Abort execution at statement granularity past this deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Interpreter {
        self.deadline = Some(deadline);
        self
    }

    /// Drive one request through the state machine.
    pub fn execute(&self, request: HttpRequest) -> Result<Execution, RuntimeError> {
        let now = self.fixed_now.unwrap_or_else(Utc::now);
        let mut ctx = Context::new(request, now, self.seed);
        ctx.deadline = self.deadline;
        ctx.tables = self.program.tables.clone();
        ctx.acls = self.program.acls.clone();
        ctx.selected_backend = self.program.backends.first().cloned();

        let mut cache: FxHashMap<String, HttpResponse> = FxHashMap::default();
        let mut state = State::Recv;
        let mut pass_intent = false;

        while state != State::Done {
            let step = self.step(&mut ctx, &mut cache, state, &mut pass_intent);
            state = match step {
                Ok(next) => next,
                Err(RuntimeError::DeadlineExceeded) => return Err(RuntimeError::DeadlineExceeded),
                Err(RuntimeError::Fatal(message)) => return Err(RuntimeError::Fatal(message)),
                Err(error) => {
                    if state == State::Error {
                        return Err(RuntimeError::Fatal(error.to_string()));
                    }
                    ctx.log(format!("runtime error: {error}"));
                    ctx.error_status = Some(500);
                    ctx.error_message = Some(error.to_string());
                    State::Error
                }
            };
        }

        let response = ctx
            .response
            .take()
            .unwrap_or_else(|| HttpResponse::with_status(200, "OK"));
        Ok(Execution {
            response,
            request: ctx.request.clone(),
            logs: std::mem::take(&mut ctx.logs),
            restarts: ctx.restarts,
        })
    }

    fn step(
        &self,
        ctx: &mut Context,
        cache: &mut FxHashMap<String, HttpResponse>,
        state: State,
        pass_intent: &mut bool,
    ) -> Result<State, RuntimeError> {
        match state {
            State::Recv => {
                ctx.scope = Scope::Recv;
                let action = self.run_hook(ctx, "vcl_recv", Action::Lookup)?;
                match action {
                    Action::Lookup | Action::Hash => Ok(State::Hash),
                    Action::Pass => {
                        *pass_intent = true;
                        Ok(State::Hash)
                    }
                    Action::Error => Ok(State::Error),
                    Action::Restart => Ok(self.restart(ctx, pass_intent)),
                    other => Err(invalid_action("vcl_recv", other)),
                }
            }
            State::Hash => {
                ctx.scope = Scope::Hash;
                self.run_hook(ctx, "vcl_hash", Action::Hash)?;
                if ctx.hash.is_empty() {
                    let host = ctx.request.headers.get("Host").unwrap_or("").to_string();
                    ctx.hash = format!("{host}{}", ctx.request.url);
                }
                if *pass_intent {
                    Ok(State::Pass)
                } else if let Some(cached) = cache.get(&ctx.hash) {
                    ctx.obj_hits += 1;
                    ctx.object = Some(cached.clone());
                    Ok(State::Hit)
                } else {
                    Ok(State::Miss)
                }
            }
            State::Hit => {
                ctx.scope = Scope::Hit;
                let action = self.run_hook(ctx, "vcl_hit", Action::Deliver)?;
                match action {
                    Action::Deliver | Action::DeliverStale => Ok(State::Deliver),
                    Action::Pass => Ok(State::Pass),
                    Action::Error => Ok(State::Error),
                    Action::Restart => Ok(self.restart(ctx, pass_intent)),
                    other => Err(invalid_action("vcl_hit", other)),
                }
            }
            State::Miss => {
                ctx.scope = Scope::Miss;
                ctx.bereq = Some(ctx.request.clone());
                let action = self.run_hook(ctx, "vcl_miss", Action::Fetch)?;
                match action {
                    Action::Fetch => Ok(State::Fetch),
                    Action::DeliverStale => Ok(State::Deliver),
                    Action::Pass => Ok(State::Pass),
                    Action::Error => Ok(State::Error),
                    other => Err(invalid_action("vcl_miss", other)),
                }
            }
            State::Pass => {
                ctx.scope = Scope::Pass;
                ctx.bereq = Some(ctx.request.clone());
                let action = self.run_hook(ctx, "vcl_pass", Action::Pass)?;
                match action {
                    Action::Pass | Action::Fetch => Ok(State::Fetch),
                    Action::Error => Ok(State::Error),
                    other => Err(invalid_action("vcl_pass", other)),
                }
            }
            State::Fetch => {
                ctx.scope = Scope::Fetch;
                // No real origin: synthesize the backend response.
                ctx.beresp = Some(HttpResponse::with_status(200, "OK"));
                let action = self.run_hook(ctx, "vcl_fetch", Action::Deliver)?;
                match action {
                    Action::Deliver | Action::DeliverStale | Action::HitForPass | Action::Pass => {
                        if let Some(beresp) = &ctx.beresp {
                            if !*pass_intent && action == Action::Deliver {
                                cache.insert(ctx.hash.clone(), beresp.clone());
                            }
                        }
                        Ok(State::Deliver)
                    }
                    Action::Error => Ok(State::Error),
                    Action::Restart => Ok(self.restart(ctx, pass_intent)),
                    other => Err(invalid_action("vcl_fetch", other)),
                }
            }
            State::Error => {
                ctx.scope = Scope::Error;
                let status = ctx.error_status.take().unwrap_or(500);
                let message = ctx.error_message.take().unwrap_or_default();
                ctx.object = Some(HttpResponse::with_status(status, message));
                let action = self.run_hook(ctx, "vcl_error", Action::Deliver)?;
                if let Some(object) = &mut ctx.object {
                    if let Some(synthetic) = ctx.synthetic.take() {
                        object.body = synthetic;
                    } else if object.body.is_empty() {
                        object.body = object.response.clone();
                    }
                }
                match action {
                    Action::Deliver | Action::DeliverStale => Ok(State::Deliver),
                    Action::Restart => Ok(self.restart(ctx, pass_intent)),
                    other => Err(invalid_action("vcl_error", other)),
                }
            }
            State::Deliver => {
                ctx.scope = Scope::Deliver;
                let delivered = ctx
                    .object
                    .clone()
                    .or_else(|| ctx.beresp.clone())
                    .unwrap_or_else(|| HttpResponse::with_status(200, "OK"));
                ctx.response = Some(delivered);
                let action = self.run_hook(ctx, "vcl_deliver", Action::Deliver)?;
                match action {
                    Action::Deliver => Ok(State::Log),
                    Action::Restart => Ok(self.restart(ctx, pass_intent)),
                    other => Err(invalid_action("vcl_deliver", other)),
                }
            }
            State::Log => {
                ctx.scope = Scope::Log;
                self.run_hook(ctx, "vcl_log", Action::Deliver)?;
                Ok(State::Done)
            }
            State::Done => Ok(State::Done),
        }
    }

    /// Consume one restart, or force `ERROR` once the bound is hit.
    fn restart(&self, ctx: &mut Context, pass_intent: &mut bool) -> State {
        if ctx.restarts >= MAX_RESTARTS {
            ctx.error_status = Some(503);
            ctx.error_message = Some("restart limit exceeded".to_string());
            return State::Error;
        }
        ctx.restarts += 1;
        *pass_intent = false;
        ctx.bereq = None;
        ctx.beresp = None;
        ctx.object = None;
        ctx.response = None;
        ctx.hash.clear();
        State::Recv
    }

    /// Run a hook subroutine, mapping its flow to the next action.
    fn run_hook(
        &self,
        ctx: &mut Context,
        name: &str,
        default: Action,
    ) -> Result<Action, RuntimeError> {
        let Some(sub) = self.program.subroutines.get(name) else {
            return Ok(default);
        };
        ctx.locals.push(FxHashMap::default());
        let flow = self.exec_block(ctx, &sub.block.statements, false);
        ctx.locals.pop();
        match flow? {
            Flow::Action(action) => Ok(action),
            Flow::Normal | Flow::Return(None) => Ok(default),
            Flow::Return(Some(_)) => Err(RuntimeError::Evaluation(format!(
                "hook {name} cannot return a value"
            ))),
            Flow::Break => Err(RuntimeError::Evaluation(
                "break outside switch".to_string(),
            )),
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    /// Execute a statement list. `functional` is true inside typed
    /// subroutines, whose `return` carries a value instead of an action.
    fn exec_block(
        &self,
        ctx: &mut Context,
        statements: &[Statement],
        functional: bool,
    ) -> Result<Flow, RuntimeError> {
        let mut index = 0;
        while index < statements.len() {
            if let Some(deadline) = ctx.deadline {
                if Instant::now() >= deadline {
                    return Err(RuntimeError::DeadlineExceeded);
                }
            }

            match &statements[index] {
                Statement::Set(set) => {
                    let mut base = ctx.get_assign_base(&set.ident.name)?;
                    let value = self.eval(ctx, &set.value)?;
                    assign::apply(&set.operator, &mut base, value)?;
                    ctx.set_var(&set.ident.name, base)?;
                }
                Statement::Add(add) => {
                    let value = self.eval(ctx, &add.value)?;
                    ctx.add_var(&add.ident.name, value)?;
                }
                Statement::Unset(unset) => ctx.unset_var(&unset.ident.name)?,
                Statement::Remove(remove) => ctx.unset_var(&remove.ident.name)?,
                Statement::Declare(decl) => {
                    let ty = ValueType::from_name(&decl.value_type.name).ok_or_else(|| {
                        RuntimeError::Evaluation(format!(
                            "unknown type {}",
                            decl.value_type.name
                        ))
                    })?;
                    ctx.declare_local(&decl.name.name, ty)?;
                }
                Statement::Call(call) => {
                    if let Flow::Action(action) = self.call_subroutine(ctx, &call.subroutine.name)?
                    {
                        return Ok(Flow::Action(action));
                    }
                }
                Statement::If(stmt) => match self.exec_if(ctx, stmt, functional)? {
                    Flow::Normal => {}
                    flow => return Ok(flow),
                },
                Statement::Switch(stmt) => {
                    match self.exec_switch(ctx, stmt, functional)? {
                        Flow::Normal | Flow::Break => {}
                        flow => return Ok(flow),
                    }
                }
                Statement::Return(ret) => {
                    let Some(expression) = &ret.expression else {
                        return Ok(Flow::Return(None));
                    };
                    if functional {
                        let value = self.eval(ctx, expression)?;
                        return Ok(Flow::Return(Some(value)));
                    }
                    let action = match unwrap_grouped(expression) {
                        Expr::Ident(ident) => Action::from_name(&ident.name),
                        _ => None,
                    };
                    let Some(action) = action else {
                        return Err(RuntimeError::Evaluation(
                            "return must name an action".to_string(),
                        ));
                    };
                    return Ok(Flow::Action(action));
                }
                Statement::Restart(_) => return Ok(Flow::Action(Action::Restart)),
                Statement::Error(err) => {
                    if let Some(code) = &err.code {
                        let value = self.eval(ctx, code)?;
                        let Value::Integer { value: status, .. } = value else {
                            return Err(RuntimeError::TypeMismatch(
                                "error status must be INTEGER".to_string(),
                            ));
                        };
                        ctx.error_status = Some(status);
                    }
                    if let Some(argument) = &err.argument {
                        let message = self.eval(ctx, argument)?.to_canonical_string()?;
                        ctx.error_message = Some(message);
                    }
                    return Ok(Flow::Action(Action::Error));
                }
                Statement::Esi(_) => ctx.log("esi"),
                Statement::Log(log) => {
                    let line = self.eval(ctx, &log.value)?.to_canonical_string()?;
                    ctx.log(line);
                }
                Statement::Synthetic(synth) => {
                    let body = self.eval(ctx, &synth.value)?.to_canonical_string()?;
                    ctx.synthetic = Some(body);
                }
                Statement::SyntheticBase64(synth) => {
                    use base64::engine::general_purpose::STANDARD;
                    use base64::Engine;
                    let encoded = self.eval(ctx, &synth.value)?.to_canonical_string()?;
                    let decoded = STANDARD.decode(encoded.trim()).map_err(|err| {
                        RuntimeError::Evaluation(format!("invalid base64 body: {err}"))
                    })?;
                    ctx.synthetic = Some(String::from_utf8_lossy(&decoded).into_owned());
                }
                Statement::Goto(goto) => {
                    let target = statements[index + 1..]
                        .iter()
                        .position(|stmt| match stmt {
                            Statement::GotoDestination(dest) => {
                                dest.name.name == goto.destination.name
                            }
                            _ => false,
                        })
                        .ok_or_else(|| {
                            RuntimeError::UndefinedGoto(goto.destination.name.clone())
                        })?;
                    index += target + 1;
                    continue;
                }
                Statement::GotoDestination(_) => {}
                Statement::FunctionCall(call) => {
                    self.eval_call(ctx, &call.function.name, &call.arguments)?;
                }
                Statement::Break(_) => return Ok(Flow::Break),
                Statement::Fallthrough(_) => {
                    return Err(RuntimeError::Evaluation(
                        "fallthrough outside switch".to_string(),
                    ))
                }
                Statement::Import(_) | Statement::Include(_) => {}
            }
            index += 1;
        }
        Ok(Flow::Normal)
    }

    fn exec_if(
        &self,
        ctx: &mut Context,
        stmt: &IfStmt,
        functional: bool,
    ) -> Result<Flow, RuntimeError> {
        let condition = self.eval(ctx, &stmt.condition)?;
        if truthy(&condition)? {
            return self.exec_block(ctx, &stmt.consequence.statements, functional);
        }
        for chain in &stmt.another {
            let condition = self.eval(ctx, &chain.condition)?;
            if truthy(&condition)? {
                return self.exec_block(ctx, &chain.consequence.statements, functional);
            }
        }
        if let Some(alternative) = &stmt.alternative {
            return self.exec_block(ctx, &alternative.consequence.statements, functional);
        }
        Ok(Flow::Normal)
    }

    fn exec_switch(
        &self,
        ctx: &mut Context,
        stmt: &vex_par::ast::SwitchStmt,
        functional: bool,
    ) -> Result<Flow, RuntimeError> {
        let control = self.eval(ctx, &stmt.control)?.to_canonical_string()?;

        let matched = self.find_case(ctx, &stmt.cases, &control)?;
        let Some(mut index) = matched.or_else(|| {
            (stmt.default >= 0).then_some(stmt.default as usize)
        }) else {
            return Ok(Flow::Normal);
        };

        while index < stmt.cases.len() {
            let case = &stmt.cases[index];
            match self.exec_block(ctx, &case.statements, functional)? {
                Flow::Break => return Ok(Flow::Normal),
                Flow::Normal => {
                    if case.fallthrough {
                        index += 1;
                        continue;
                    }
                    return Ok(Flow::Normal);
                }
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn find_case(
        &self,
        ctx: &mut Context,
        cases: &[CaseStmt],
        control: &str,
    ) -> Result<Option<usize>, RuntimeError> {
        for (index, case) in cases.iter().enumerate() {
            let Some(test) = &case.test else { continue };
            let right = self.eval(ctx, &test.right)?.to_canonical_string()?;
            let matched = match test.operator.as_str() {
                "==" => control == right,
                "~" => regex::Regex::new(&right)
                    .map_err(|err| RuntimeError::Evaluation(format!("invalid regex: {err}")))?
                    .is_match(control),
                op => {
                    return Err(RuntimeError::Evaluation(format!(
                        "unsupported case operator {op}"
                    )))
                }
            };
            if matched {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    fn call_subroutine(&self, ctx: &mut Context, name: &str) -> Result<Flow, RuntimeError> {
        let sub = self
            .program
            .subroutines
            .get(name)
            .ok_or_else(|| RuntimeError::Evaluation(format!("subroutine {name} is not defined")))?;
        if ctx.locals.len() >= MAX_CALL_DEPTH {
            return Err(RuntimeError::CallDepthExceeded);
        }
        ctx.locals.push(FxHashMap::default());
        let flow = self.exec_block(ctx, &sub.block.statements, false);
        ctx.locals.pop();
        match flow? {
            Flow::Action(action) => Ok(Flow::Action(action)),
            _ => Ok(Flow::Normal),
        }
    }

    /// Run a typed subroutine for its value.
    fn call_functional(&self, ctx: &mut Context, name: &str) -> Result<Value, RuntimeError> {
        let sub = self
            .program
            .subroutines
            .get(name)
            .ok_or_else(|| RuntimeError::Evaluation(format!("subroutine {name} is not defined")))?;
        if ctx.locals.len() >= MAX_CALL_DEPTH {
            return Err(RuntimeError::CallDepthExceeded);
        }
        ctx.locals.push(FxHashMap::default());
        let flow = self.exec_block(ctx, &sub.block.statements, true);
        ctx.locals.pop();
        match flow? {
            Flow::Return(Some(value)) => Ok(value),
            _ => Err(RuntimeError::Evaluation(format!(
                "subroutine {name} finished without returning a value"
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn eval(&self, ctx: &mut Context, expr: &Expr) -> Result<Value, RuntimeError> {
        match expr {
            Expr::String(lit) => Ok(Value::String {
                value: lit.value.clone(),
                literal: true,
            }),
            Expr::Int(lit) => Ok(Value::Integer {
                value: lit.value,
                literal: true,
            }),
            Expr::Float(lit) => Ok(Value::Float {
                value: lit.value,
                literal: true,
            }),
            Expr::Bool(lit) => Ok(Value::Bool {
                value: lit.value,
                literal: true,
            }),
            Expr::RTime(lit) => {
                let ms = parse_rtime(&lit.value).ok_or_else(|| {
                    RuntimeError::Evaluation(format!("invalid duration {}", lit.value))
                })?;
                Ok(Value::RTime { ms, literal: true })
            }
            Expr::Ip(lit) => {
                let value: IpAddr = lit.value.parse().map_err(|_| {
                    RuntimeError::Evaluation(format!("invalid IP address {}", lit.value))
                })?;
                Ok(Value::Ip {
                    value,
                    literal: true,
                })
            }
            Expr::Grouped(group) => self.eval(ctx, &group.right),
            Expr::Ident(ident) => self.eval_ident(ctx, &ident.name),
            Expr::Prefix(prefix) => {
                let right = self.eval(ctx, &prefix.right)?;
                match prefix.operator.as_str() {
                    "!" => Ok(Value::bool(!truthy(&right)?)),
                    "-" => match right {
                        Value::Integer { value, .. } => Ok(Value::integer(-value)),
                        Value::Float { value, .. } => Ok(Value::float(-value)),
                        Value::RTime { ms, .. } => Ok(Value::rtime_ms(-ms)),
                        _ => Err(RuntimeError::TypeMismatch(
                            "unary minus requires a numeric operand".to_string(),
                        )),
                    },
                    op => Err(RuntimeError::Evaluation(format!(
                        "unsupported prefix operator {op}"
                    ))),
                }
            }
            Expr::Infix(infix) => self.eval_infix(ctx, infix),
            Expr::Postfix(postfix) => Err(RuntimeError::Evaluation(format!(
                "postfix {} is not valid here",
                postfix.operator
            ))),
            Expr::FunctionCall(call) => self.eval_call(ctx, &call.function.name, &call.arguments),
        }
    }

    fn eval_ident(&self, ctx: &mut Context, name: &str) -> Result<Value, RuntimeError> {
        match ctx.get_var(name) {
            Ok(value) => Ok(value),
            Err(RuntimeError::UndefinedVariable(_)) => {
                if self.program.backends.iter().any(|b| b == name) {
                    return Ok(Value::Backend {
                        name: name.to_string(),
                        literal: false,
                    });
                }
                if self.program.acls.contains_key(name) {
                    return Ok(Value::Acl {
                        name: name.to_string(),
                        literal: false,
                    });
                }
                if self.program.tables.contains_key(name) {
                    return Ok(Value::Ident {
                        name: name.to_string(),
                        literal: false,
                    });
                }
                if let Some(sub) = self.program.subroutines.get(name) {
                    if sub.return_type.is_some() {
                        return self.call_functional(ctx, name);
                    }
                }
                Err(RuntimeError::UndefinedVariable(name.to_string()))
            }
            Err(other) => Err(other),
        }
    }

    fn eval_infix(
        &self,
        ctx: &mut Context,
        infix: &vex_par::ast::InfixExpr,
    ) -> Result<Value, RuntimeError> {
        match infix.operator.as_str() {
            "&&" => {
                let left = self.eval(ctx, &infix.left)?;
                if !truthy(&left)? {
                    return Ok(Value::bool(false));
                }
                let right = self.eval(ctx, &infix.right)?;
                Ok(Value::bool(truthy(&right)?))
            }
            "||" => {
                let left = self.eval(ctx, &infix.left)?;
                if truthy(&left)? {
                    return Ok(Value::bool(true));
                }
                let right = self.eval(ctx, &infix.right)?;
                Ok(Value::bool(truthy(&right)?))
            }
            "==" | "!=" | "<" | "<=" | ">" | ">=" => {
                let left = self.eval(ctx, &infix.left)?;
                let right = self.eval(ctx, &infix.right)?;
                compare(&infix.operator, &left, &right)
            }
            "~" | "!~" => {
                let left = self.eval(ctx, &infix.left)?;
                let right = self.eval(ctx, &infix.right)?;
                let matched = self.match_operator(ctx, &left, &right)?;
                Ok(Value::bool(if infix.operator == "~" {
                    matched
                } else {
                    !matched
                }))
            }
            "+" => {
                let left = self.eval(ctx, &infix.left)?;
                let right = self.eval(ctx, &infix.right)?;
                arithmetic_or_concat(&left, &right)
            }
            "-" | "*" | "/" | "%" => {
                let left = self.eval(ctx, &infix.left)?;
                let right = self.eval(ctx, &infix.right)?;
                numeric_op(&infix.operator, &left, &right)
            }
            op => Err(RuntimeError::Evaluation(format!(
                "unsupported operator {op}"
            ))),
        }
    }

    /// `~` dispatch: ACL membership when the right side is an ACL,
    /// regex match otherwise. Capture groups land in `re.group.N`.
    fn match_operator(
        &self,
        ctx: &mut Context,
        left: &Value,
        right: &Value,
    ) -> Result<bool, RuntimeError> {
        if let Value::Acl { name, .. } = right {
            let Value::Ip { value, .. } = left else {
                return Err(RuntimeError::TypeMismatch(
                    "acl match requires an IP left operand".to_string(),
                ));
            };
            return ctx.acl_matches(name, *value);
        }

        let pattern = right.to_canonical_string()?;
        let re = regex::Regex::new(&pattern)
            .map_err(|err| RuntimeError::Evaluation(format!("invalid regex: {err}")))?;
        let subject = left.to_canonical_string()?;
        match re.captures(&subject) {
            Some(captures) => {
                ctx.regex_groups = (0..captures.len())
                    .map(|i| {
                        captures
                            .get(i)
                            .map(|m| m.as_str().to_string())
                            .unwrap_or_default()
                    })
                    .collect();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn eval_call(
        &self,
        ctx: &mut Context,
        name: &str,
        arguments: &[Expr],
    ) -> Result<Value, RuntimeError> {
        let mut values = Vec::with_capacity(arguments.len());
        for argument in arguments {
            values.push(self.eval_call_argument(ctx, argument)?);
        }
        registry().call(ctx, name, &values)
    }

    /// Bare identifiers naming declared objects or HTTP objects pass as
    /// `ID` references instead of evaluating as variables.
    fn eval_call_argument(&self, ctx: &mut Context, argument: &Expr) -> Result<Value, RuntimeError> {
        if let Expr::Ident(ident) = argument {
            let name = ident.name.as_str();
            if HTTP_OBJECTS.contains(&name)
                || self.program.tables.contains_key(name)
                || self.program.acls.contains_key(name)
            {
                return Ok(Value::Ident {
                    name: name.to_string(),
                    literal: false,
                });
            }
        }
        self.eval(ctx, argument)
    }
}

fn invalid_action(hook: &str, action: Action) -> RuntimeError {
    RuntimeError::Evaluation(format!("{hook} cannot return {action:?}"))
}

fn unwrap_grouped(expr: &Expr) -> &Expr {
    match expr {
        Expr::Grouped(group) => unwrap_grouped(&group.right),
        other => other,
    }
}

/// Condition truthiness: BOOL by value, NULL false, STRING by presence.
fn truthy(value: &Value) -> Result<bool, RuntimeError> {
    match value {
        Value::Bool { value, .. } => Ok(*value),
        Value::Null => Ok(false),
        Value::String { value, .. } => Ok(!value.is_empty()),
        other => Err(RuntimeError::TypeMismatch(format!(
            "condition must be BOOL, found {}",
            other
                .ty()
                .map(|t| t.to_string())
                .unwrap_or_else(|| "NULL".into())
        ))),
    }
}

fn compare(operator: &str, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    use std::cmp::Ordering;

    let ordering: Option<Ordering> = match (left, right) {
        (Value::Integer { value: l, .. }, Value::Integer { value: r, .. }) => Some(l.cmp(r)),
        (Value::Float { value: l, .. }, Value::Float { value: r, .. }) => l.partial_cmp(r),
        (Value::Integer { value: l, .. }, Value::Float { value: r, .. }) => {
            (*l as f64).partial_cmp(r)
        }
        (Value::Float { value: l, .. }, Value::Integer { value: r, .. }) => {
            l.partial_cmp(&(*r as f64))
        }
        (Value::RTime { ms: l, .. }, Value::RTime { ms: r, .. }) => Some(l.cmp(r)),
        (Value::Time { value: l, .. }, Value::Time { value: r, .. }) => Some(l.cmp(r)),
        (Value::Bool { value: l, .. }, Value::Bool { value: r, .. }) => Some(l.cmp(r)),
        (Value::Null, _) | (_, Value::Null) => None,
        (l, r) => {
            let l = l.to_canonical_string()?;
            let r = r.to_canonical_string()?;
            Some(l.cmp(&r))
        }
    };

    let result = match (operator, ordering) {
        ("==", Some(Ordering::Equal)) => true,
        ("==", _) => false,
        ("!=", Some(Ordering::Equal)) => false,
        ("!=", _) => true,
        (_, None) => {
            return Err(RuntimeError::TypeMismatch(
                "values cannot be ordered".to_string(),
            ))
        }
        ("<", Some(ordering)) => ordering == Ordering::Less,
        ("<=", Some(ordering)) => ordering != Ordering::Greater,
        (">", Some(ordering)) => ordering == Ordering::Greater,
        (">=", Some(ordering)) => ordering != Ordering::Less,
        _ => {
            return Err(RuntimeError::Evaluation(format!(
                "unsupported comparison {operator}"
            )))
        }
    };
    Ok(Value::bool(result))
}

/// Infix `+`: arithmetic over the numeric family, canonical-string
/// concatenation otherwise. Results never carry the literal flag.
fn arithmetic_or_concat(left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    match (left, right) {
        (Value::Integer { .. } | Value::Float { .. } | Value::RTime { .. } | Value::Time { .. },
         Value::Integer { .. } | Value::Float { .. } | Value::RTime { .. } | Value::Time { .. }) => {
            numeric_op("+", left, right)
        }
        _ => {
            let mut out = left.to_canonical_string()?;
            out.push_str(&right.to_canonical_string()?);
            Ok(Value::string(out))
        }
    }
}

fn numeric_op(operator: &str, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    use Value::{Float, Integer, RTime, Time};

    let value = match (left, right) {
        (Integer { value: l, .. }, Integer { value: r, .. }) => match operator {
            "+" => Value::integer(l + r),
            "-" => Value::integer(l - r),
            "*" => Value::integer(l * r),
            "/" => {
                if *r == 0 {
                    return Err(RuntimeError::Evaluation("division by zero".to_string()));
                }
                Value::integer(l / r)
            }
            "%" => {
                if *r == 0 {
                    return Err(RuntimeError::Evaluation("remainder by zero".to_string()));
                }
                Value::integer(l % r)
            }
            _ => return Err(RuntimeError::Evaluation(format!("bad operator {operator}"))),
        },
        (Integer { .. } | Float { .. }, Integer { .. } | Float { .. }) => {
            let l = float_of(left);
            let r = float_of(right);
            match operator {
                "+" => Value::float(l + r),
                "-" => Value::float(l - r),
                "*" => Value::float(l * r),
                "/" => {
                    if r == 0.0 {
                        return Err(RuntimeError::Evaluation("division by zero".to_string()));
                    }
                    Value::float(l / r)
                }
                _ => {
                    return Err(RuntimeError::TypeMismatch(
                        "remainder requires INTEGER operands".to_string(),
                    ))
                }
            }
        }
        (RTime { ms: l, .. }, RTime { ms: r, .. }) => match operator {
            "+" => Value::rtime_ms(l + r),
            "-" => Value::rtime_ms(l - r),
            _ => {
                return Err(RuntimeError::TypeMismatch(
                    "durations only add and subtract".to_string(),
                ))
            }
        },
        (Time { value: l, .. }, RTime { ms: r, .. }) => match operator {
            "+" => Value::Time {
                value: *l + chrono::Duration::milliseconds(*r),
                literal: false,
            },
            "-" => Value::Time {
                value: *l - chrono::Duration::milliseconds(*r),
                literal: false,
            },
            _ => {
                return Err(RuntimeError::TypeMismatch(
                    "time arithmetic only adds and subtracts durations".to_string(),
                ))
            }
        },
        _ => {
            return Err(RuntimeError::TypeMismatch(format!(
                "operator {operator} cannot combine these operands"
            )))
        }
    };
    Ok(value)
}

fn float_of(value: &Value) -> f64 {
    match value {
        Value::Integer { value, .. } => *value as f64,
        Value::Float { value, .. } => *value,
        _ => 0.0,
    }
}
