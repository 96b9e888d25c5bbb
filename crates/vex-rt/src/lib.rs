//! vex-rt - The reference interpreter for VCL configurations.
//!
//! A single-threaded, tree-walking evaluator driving one synthetic
//! request at a time through the edge hook sequence:
//!
//! ```text
//! RECV → HASH → HIT|MISS → (PASS)? → FETCH → DELIVER → LOG
//!                 │            │                 │
//!                 └─── ERROR ──┴─── RESTART ─────┘   (bounded)
//! ```
//!
//! Each hook runs the user subroutine when present and interprets its
//! terminal `return(action)` to select the next state. Restarts are
//! bounded at 3, `call` frames at depth 100; runtime failures inside a
//! hook synthesize a 500 and route to `ERROR` once, failures inside the
//! `ERROR` hook are fatal.

pub mod assign;
pub mod builtin;
pub mod context;
pub mod http;
mod interpreter;
pub mod value;

pub use context::Context;
pub use http::{Headers, HttpRequest, HttpResponse};
pub use interpreter::{Action, Execution, Interpreter};
pub use value::Value;

use thiserror::Error;
use vex_sem::Scope;

/// Evaluation failure.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum RuntimeError {
    /// Operand or assignment types are incompatible.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    /// A dotted name resolves to nothing.
    #[error("variable {0} is not defined")]
    UndefinedVariable(String),
    /// A variable was touched outside its declared scope set.
    #[error("variable {0} is not accessible in scope {1}")]
    RestrictedScope(String, Scope),
    /// A call names no registered builtin.
    #[error("function {0} is not defined")]
    UndefinedFunction(String),
    /// No registered signature matches the provided arguments.
    #[error("no matching signature for function {0}")]
    ArityMismatch(String),
    /// The builtin body is a stub.
    #[error("builtin function {0} is not implemented")]
    NotImplemented(String),
    /// `call` recursion exceeded the frame bound.
    #[error("subroutine call depth exceeded")]
    CallDepthExceeded,
    /// `goto` found no matching destination.
    #[error("goto destination {0} is not defined")]
    UndefinedGoto(String),
    /// The external cancellation deadline passed.
    #[error("execution deadline exceeded")]
    DeadlineExceeded,
    /// General evaluation failure.
    #[error("{0}")]
    Evaluation(String),
    /// Unrecoverable failure, including errors raised inside the
    /// `ERROR` hook.
    #[error("fatal: {0}")]
    Fatal(String),
}
