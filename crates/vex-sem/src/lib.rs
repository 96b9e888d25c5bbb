//! vex-sem - Semantic layer for VCL: types, scopes, catalogs, and the
//! linter.
//!
//! This crate owns the static knowledge the toolchain shares:
//!
//! - [`ValueType`], the VCL type lattice;
//! - [`Scope`]/[`ScopeSet`], the state-machine scopes with their hook
//!   names and permitted return actions;
//! - [`variables`], the predefined variable catalog with per-scope
//!   read/write sets;
//! - [`builtin`], the builtin function signature table the runtime
//!   registry attaches bodies to;
//! - [`lint`], the two-pass linter producing leveled diagnostics;
//! - [`Stats`], aggregate configuration statistics.

pub mod builtin;
mod lint;
mod scope;
mod stats;
mod types;
pub mod variables;

pub use lint::lint;
pub use scope::{Scope, ScopeSet};
pub use stats::Stats;
pub use types::ValueType;
