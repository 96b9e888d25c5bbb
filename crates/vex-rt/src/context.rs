//! Execution context and the scoped variable store.
//!
//! One [`Context`] exists per simulated request: the HTTP objects the
//! hooks see, the local-variable frame stack, the request clock captured
//! at `RECV` entry, restart and hit counters, the log buffer, and the
//! deterministic RNG. The variable store resolves dotted names against
//! the semantic catalog, enforcing read/write scope sets at runtime the
//! same way the linter does statically.

use std::net::IpAddr;
use std::time::Instant;

use chrono::{DateTime, TimeZone, Utc};
use rustc_hash::FxHashMap;
use vex_sem::{variables, Scope, ValueType};

use crate::http::{HttpRequest, HttpResponse};
use crate::value::Value;
use crate::RuntimeError;

/// One compiled ACL entry.
#[derive(Clone, Debug)]
pub struct AclMatcher {
    pub inverse: bool,
    pub addr: IpAddr,
    /// CIDR prefix length; `None` matches the exact address.
    pub mask: Option<u8>,
}

impl AclMatcher {
    /// Whether an address matches this entry, ignoring the inverse flag.
    pub fn covers(&self, ip: IpAddr) -> bool {
        match self.mask {
            None => self.addr == ip,
            Some(bits) => match (self.addr, ip) {
                (IpAddr::V4(net), IpAddr::V4(addr)) => {
                    let shift = 32u32.saturating_sub(u32::from(bits));
                    if shift >= 32 {
                        return true;
                    }
                    (u32::from(net) >> shift) == (u32::from(addr) >> shift)
                }
                (IpAddr::V6(net), IpAddr::V6(addr)) => {
                    let shift = 128u32.saturating_sub(u32::from(bits));
                    if shift >= 128 {
                        return true;
                    }
                    (u128::from(net) >> shift) == (u128::from(addr) >> shift)
                }
                _ => false,
            },
        }
    }
}

/// Per-request execution state.
pub struct Context {
    /// The scope of the hook currently executing.
    pub scope: Scope,

    pub request: HttpRequest,
    pub bereq: Option<HttpRequest>,
    pub beresp: Option<HttpResponse>,
    /// Cache or error object.
    pub object: Option<HttpResponse>,
    pub response: Option<HttpResponse>,

    pub client_ip: IpAddr,
    pub client_identity: String,
    pub client_port: i64,

    pub selected_backend: Option<String>,
    pub hash: String,
    pub restarts: i64,
    pub obj_hits: i64,

    /// Wall clock captured at `RECV` entry; fixed in tests.
    pub now: DateTime<Utc>,

    /// Local-variable frames, one per subroutine invocation.
    pub locals: Vec<FxHashMap<String, Value>>,
    /// Capture groups of the most recent regex match.
    pub regex_groups: Vec<String>,

    pub logs: Vec<String>,
    pub error_status: Option<i64>,
    pub error_message: Option<String>,
    pub synthetic: Option<String>,

    /// Optional external cancellation deadline, checked between
    /// statements.
    pub deadline: Option<Instant>,

    /// Declared tables, flattened to canonical strings.
    pub tables: FxHashMap<String, FxHashMap<String, String>>,
    /// Compiled ACLs.
    pub acls: FxHashMap<String, Vec<AclMatcher>>,

    rng_state: u64,
}

impl Context {
    /// A fresh context for one request.
    pub fn new(request: HttpRequest, now: DateTime<Utc>, seed: u64) -> Self {
        Self {
            scope: Scope::Recv,
            request,
            bereq: None,
            beresp: None,
            object: None,
            response: None,
            client_ip: IpAddr::from([127, 0, 0, 1]),
            client_identity: String::new(),
            client_port: 0,
            selected_backend: None,
            hash: String::new(),
            restarts: 0,
            obj_hits: 0,
            now,
            locals: vec![FxHashMap::default()],
            regex_groups: Vec::new(),
            logs: Vec::new(),
            error_status: None,
            error_message: None,
            synthetic: None,
            deadline: None,
            tables: FxHashMap::default(),
            acls: FxHashMap::default(),
            rng_state: seed | 1,
        }
    }

    /// Deterministic xorshift64 step.
    pub fn next_random(&mut self) -> u64 {
        let mut x = self.rng_state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng_state = x;
        x
    }

    /// Append one line to the diagnostic log.
    pub fn log(&mut self, line: impl Into<String>) {
        self.logs.push(line.into());
    }

    fn frame(&self) -> &FxHashMap<String, Value> {
        self.locals.last().expect("at least one local frame")
    }

    fn frame_mut(&mut self) -> &mut FxHashMap<String, Value> {
        self.locals.last_mut().expect("at least one local frame")
    }

    /// Declare a local in the current frame, initialized to its zero.
    pub fn declare_local(&mut self, name: &str, ty: ValueType) -> Result<(), RuntimeError> {
        if !name.starts_with("var.") {
            return Err(RuntimeError::Evaluation(format!(
                "local variable {name} must begin with var."
            )));
        }
        self.frame_mut().insert(name.to_string(), Value::zero_of(ty));
        Ok(())
    }

    fn beresp_or_default(&mut self) -> &mut HttpResponse {
        self.beresp.get_or_insert_with(HttpResponse::default)
    }

    fn object_or_default(&mut self) -> &mut HttpResponse {
        self.object.get_or_insert_with(HttpResponse::default)
    }

    fn response_or_default(&mut self) -> &mut HttpResponse {
        self.response.get_or_insert_with(HttpResponse::default)
    }

    // ------------------------------------------------------------------
    // Variable store
    // ------------------------------------------------------------------

    /// Read a variable.
    ///
    /// Values read from the store never carry the literal flag.
    pub fn get_var(&mut self, name: &str) -> Result<Value, RuntimeError> {
        if let Some(value) = self.frame().get(name) {
            return Ok(value.clone().deliteralized());
        }
        if let Some(group) = name.strip_prefix("re.group.") {
            let index: usize = group.parse().map_err(|_| {
                RuntimeError::UndefinedVariable(name.to_string())
            })?;
            let value = self.regex_groups.get(index).cloned().unwrap_or_default();
            return Ok(Value::string(value));
        }

        let spec = variables::lookup(name)
            .ok_or_else(|| RuntimeError::UndefinedVariable(name.to_string()))?;
        if !spec.read.contains(self.scope) {
            return Err(RuntimeError::RestrictedScope(
                name.to_string(),
                self.scope,
            ));
        }
        self.read_slot(name, spec.ty)
    }

    fn read_slot(&mut self, name: &str, ty: ValueType) -> Result<Value, RuntimeError> {
        let value = match name {
            "req.url" => Value::string(self.request.url.clone()),
            "req.method" => Value::string(self.request.method.clone()),
            "req.proto" => Value::string(self.request.proto.clone()),
            "req.backend" => Value::Backend {
                name: self.selected_backend.clone().unwrap_or_default(),
                literal: false,
            },
            "req.restarts" => Value::integer(self.restarts),
            "req.hash" => Value::string(self.hash.clone()),
            "client.ip" => Value::Ip {
                value: self.client_ip,
                literal: false,
            },
            "client.identity" => Value::string(self.client_identity.clone()),
            "client.port" => Value::integer(self.client_port),
            "server.hostname" => Value::string("cache-local"),
            "server.region" => Value::string("local"),
            "client.geo.country_code" => Value::string("**"),
            "client.geo.city" => Value::string("**"),
            "now" => Value::Time {
                value: self.now,
                literal: false,
            },
            "now.sec" => Value::string(self.now.timestamp().to_string()),
            "bereq.url" => Value::string(
                self.bereq.as_ref().map(|r| r.url.clone()).unwrap_or_default(),
            ),
            "bereq.method" => Value::string(
                self.bereq
                    .as_ref()
                    .map(|r| r.method.clone())
                    .unwrap_or_default(),
            ),
            "beresp.status" => Value::integer(self.beresp_or_default().status),
            "beresp.response" => {
                let response = self.beresp_or_default().response.clone();
                Value::string(response)
            }
            "beresp.ttl" => Value::rtime_ms(0),
            "beresp.grace" => Value::rtime_ms(0),
            "obj.status" => Value::integer(self.object_or_default().status),
            "obj.response" => {
                let response = self.object_or_default().response.clone();
                Value::string(response)
            }
            "obj.hits" => Value::integer(self.obj_hits),
            "obj.ttl" => Value::rtime_ms(0),
            "resp.status" => Value::integer(self.response_or_default().status),
            "resp.response" => {
                let response = self.response_or_default().response.clone();
                Value::string(response)
            }
            _ => {
                if let Some(header) = self.header_slot(name) {
                    return Ok(header);
                }
                Value::zero_of(ty)
            }
        };
        Ok(value)
    }

    fn header_slot(&mut self, name: &str) -> Option<Value> {
        let (object, header) = self.split_header_name(name)?;
        let headers = match object {
            "req" => &self.request.headers,
            "bereq" => &self.bereq.as_ref()?.headers,
            "beresp" => &self.beresp_or_default().headers,
            "obj" => &self.object_or_default().headers,
            "resp" => &self.response_or_default().headers,
            _ => return None,
        };
        Some(match headers.get(&header) {
            Some(value) => Value::string(value.to_string()),
            None => Value::Null,
        })
    }

    fn split_header_name(&self, name: &str) -> Option<(&'static str, String)> {
        for object in ["req", "bereq", "beresp", "resp", "obj"] {
            if let Some(rest) = name.strip_prefix(object) {
                if let Some(header) = rest.strip_prefix(".http.") {
                    if !header.is_empty() {
                        return Some((object, header.to_string()));
                    }
                }
            }
        }
        None
    }

    /// Current value of an assignment target, typed by its declaration.
    ///
    /// Missing headers materialize as empty strings so compound
    /// operators have a base value.
    pub fn get_assign_base(&mut self, name: &str) -> Result<Value, RuntimeError> {
        self.check_writable(name)?;
        if self.frame().contains_key(name) {
            return Ok(self.frame().get(name).cloned().unwrap_or(Value::Null));
        }
        if self.split_header_name(name).is_some() {
            let current = self.header_slot(name);
            return Ok(match current {
                Some(Value::Null) | None => Value::string(""),
                Some(value) => value,
            });
        }
        let spec = variables::lookup(name)
            .ok_or_else(|| RuntimeError::UndefinedVariable(name.to_string()))?;
        self.read_slot(name, spec.ty)
    }

    fn check_writable(&self, name: &str) -> Result<(), RuntimeError> {
        if self.frame().contains_key(name) {
            return Ok(());
        }
        let spec = variables::lookup(name)
            .ok_or_else(|| RuntimeError::UndefinedVariable(name.to_string()))?;
        if !spec.write.contains(self.scope) {
            return Err(RuntimeError::RestrictedScope(
                name.to_string(),
                self.scope,
            ));
        }
        Ok(())
    }

    /// Store a value back into an assignment target.
    pub fn set_var(&mut self, name: &str, value: Value) -> Result<(), RuntimeError> {
        if self.frame().contains_key(name) {
            self.frame_mut().insert(name.to_string(), value);
            return Ok(());
        }
        self.check_writable(name)?;

        if let Some((object, header)) = self.split_header_name(name) {
            let rendered = value.to_canonical_string()?;
            let headers = match object {
                "req" => &mut self.request.headers,
                "bereq" => {
                    &mut self
                        .bereq
                        .get_or_insert_with(HttpRequest::default)
                        .headers
                }
                "beresp" => &mut self.beresp_or_default().headers,
                "obj" => &mut self.object_or_default().headers,
                _ => &mut self.response_or_default().headers,
            };
            headers.set(&header, rendered);
            return Ok(());
        }

        match name {
            "req.url" => self.request.url = value.to_canonical_string()?,
            "req.method" => self.request.method = value.to_canonical_string()?,
            "req.backend" => {
                let Value::Backend { name: backend, .. } = &value else {
                    return Err(RuntimeError::TypeMismatch(
                        "req.backend requires a BACKEND".to_string(),
                    ));
                };
                self.selected_backend = Some(backend.clone());
            }
            "req.hash" => self.hash = value.to_canonical_string()?,
            "client.identity" => self.client_identity = value.to_canonical_string()?,
            "bereq.url" => {
                self.bereq.get_or_insert_with(HttpRequest::default).url =
                    value.to_canonical_string()?
            }
            "bereq.method" => {
                self.bereq.get_or_insert_with(HttpRequest::default).method =
                    value.to_canonical_string()?
            }
            "beresp.status" => {
                self.beresp_or_default().status = integer_of(&value)?;
            }
            "beresp.response" => {
                let rendered = value.to_canonical_string()?;
                self.beresp_or_default().response = rendered;
            }
            "beresp.ttl" | "beresp.grace" => {
                // TTLs are accepted and dropped: the simulator keeps no
                // real cache aging.
            }
            "obj.status" => {
                self.object_or_default().status = integer_of(&value)?;
            }
            "obj.response" => {
                let rendered = value.to_canonical_string()?;
                self.object_or_default().response = rendered;
            }
            "resp.status" => {
                self.response_or_default().status = integer_of(&value)?;
            }
            "resp.response" => {
                let rendered = value.to_canonical_string()?;
                self.response_or_default().response = rendered;
            }
            _ => {
                return Err(RuntimeError::Evaluation(format!(
                    "variable {name} cannot be stored"
                )))
            }
        }
        Ok(())
    }

    /// Append a header occurrence (`add` statement).
    pub fn add_var(&mut self, name: &str, value: Value) -> Result<(), RuntimeError> {
        let Some((object, header)) = self.split_header_name(name) else {
            return Err(RuntimeError::TypeMismatch(format!(
                "add requires a header variable, {name} is not one"
            )));
        };
        self.check_writable(name)?;
        let rendered = value.to_canonical_string()?;
        let headers = match object {
            "req" => &mut self.request.headers,
            "bereq" => {
                &mut self
                    .bereq
                    .get_or_insert_with(HttpRequest::default)
                    .headers
            }
            "beresp" => &mut self.beresp_or_default().headers,
            "obj" => &mut self.object_or_default().headers,
            _ => &mut self.response_or_default().headers,
        };
        headers.add(&header, rendered);
        Ok(())
    }

    /// Delete a header (`unset`/`remove` statements).
    pub fn unset_var(&mut self, name: &str) -> Result<(), RuntimeError> {
        let Some((object, header)) = self.split_header_name(name) else {
            return Err(RuntimeError::TypeMismatch(format!(
                "{name} cannot be unset"
            )));
        };
        self.check_writable(name)?;
        let headers = match object {
            "req" => &mut self.request.headers,
            "bereq" => {
                &mut self
                    .bereq
                    .get_or_insert_with(HttpRequest::default)
                    .headers
            }
            "beresp" => &mut self.beresp_or_default().headers,
            "obj" => &mut self.object_or_default().headers,
            _ => &mut self.response_or_default().headers,
        };
        headers.unset(&header);
        Ok(())
    }

    /// Match an address against a compiled ACL.
    pub fn acl_matches(&self, acl: &str, ip: IpAddr) -> Result<bool, RuntimeError> {
        let matchers = self
            .acls
            .get(acl)
            .ok_or_else(|| RuntimeError::UndefinedVariable(acl.to_string()))?;
        for matcher in matchers {
            if matcher.covers(ip) {
                return Ok(!matcher.inverse);
            }
        }
        Ok(false)
    }
}

fn integer_of(value: &Value) -> Result<i64, RuntimeError> {
    match value {
        Value::Integer { value, .. } => Ok(*value),
        _ => Err(RuntimeError::TypeMismatch(format!(
            "expected INTEGER, found {}",
            value
                .ty()
                .map(|t| t.to_string())
                .unwrap_or_else(|| "NULL".into())
        ))),
    }
}

/// A fixed clock for reproducible runs.
pub fn fixed_time(timestamp: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(timestamp, 0).single().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Context {
        Context::new(HttpRequest::get("/index"), fixed_time(1_700_000_000), 42)
    }

    #[test]
    fn test_header_round_trip() {
        let mut ctx = ctx();
        ctx.set_var("req.http.X-Test", Value::string("on")).unwrap();
        let value = ctx.get_var("req.http.X-Test").unwrap();
        assert_eq!(value.to_canonical_string().unwrap(), "on");
    }

    #[test]
    fn test_missing_header_is_null() {
        let mut ctx = ctx();
        assert_eq!(ctx.get_var("req.http.Missing").unwrap(), Value::Null);
    }

    #[test]
    fn test_add_appends_occurrences() {
        let mut ctx = ctx();
        ctx.scope = Scope::Deliver;
        ctx.add_var("resp.http.Set-Cookie", Value::string("a=1"))
            .unwrap();
        ctx.add_var("resp.http.Set-Cookie", Value::string("b=2"))
            .unwrap();
        let response = ctx.response.as_ref().unwrap();
        assert_eq!(response.headers.get_all("Set-Cookie"), &["a=1", "b=2"]);
    }

    #[test]
    fn test_scope_enforcement() {
        let mut ctx = ctx();
        ctx.scope = Scope::Recv;
        let err = ctx
            .set_var("resp.http.X", Value::string("nope"))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::RestrictedScope(..)));

        let err = ctx.get_var("beresp.status").unwrap_err();
        assert!(matches!(err, RuntimeError::RestrictedScope(..)));
    }

    #[test]
    fn test_locals_shadow_catalog() {
        let mut ctx = ctx();
        ctx.declare_local("var.count", ValueType::Integer).unwrap();
        ctx.set_var("var.count", Value::integer(3)).unwrap();
        assert_eq!(ctx.get_var("var.count").unwrap(), Value::integer(3));
    }

    #[test]
    fn test_local_reads_clear_literal_flag() {
        let mut ctx = ctx();
        ctx.declare_local("var.t", ValueType::RTime).unwrap();
        ctx.set_var(
            "var.t",
            Value::RTime {
                ms: 10_000,
                literal: true,
            },
        )
        .unwrap();
        let read = ctx.get_var("var.t").unwrap();
        assert!(!read.is_literal());
    }

    #[test]
    fn test_unset_non_header_rejected() {
        let mut ctx = ctx();
        assert!(ctx.unset_var("req.url").is_err());
    }

    #[test]
    fn test_acl_matching() {
        let mut ctx = ctx();
        ctx.acls.insert(
            "internal".to_string(),
            vec![
                AclMatcher {
                    inverse: true,
                    addr: "10.1.2.3".parse().unwrap(),
                    mask: None,
                },
                AclMatcher {
                    inverse: false,
                    addr: "10.0.0.0".parse().unwrap(),
                    mask: Some(8),
                },
            ],
        );
        assert!(ctx
            .acl_matches("internal", "10.9.9.9".parse().unwrap())
            .unwrap());
        // The inverse entry wins before the wider block.
        assert!(!ctx
            .acl_matches("internal", "10.1.2.3".parse().unwrap())
            .unwrap());
        assert!(!ctx
            .acl_matches("internal", "192.168.0.1".parse().unwrap())
            .unwrap());
    }

    #[test]
    fn test_deterministic_rng() {
        let mut a = ctx();
        let mut b = ctx();
        assert_eq!(a.next_random(), b.next_random());
    }

    #[test]
    fn test_fixed_clock() {
        let mut ctx = ctx();
        let now = ctx.get_var("now").unwrap();
        assert_eq!(
            now.to_canonical_string().unwrap(),
            "Tue, 14 Nov 2023 22:13:20 GMT"
        );
    }
}
