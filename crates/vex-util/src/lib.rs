//! vex-util - Shared infrastructure for the vex VCL toolchain.
//!
//! This crate provides the pieces every phase needs: source positions
//! ([`Span`], [`FileId`], [`SourceMap`]) and the diagnostic stream
//! ([`Diagnostic`], [`Handler`], [`Level`], [`Rule`]).

pub mod diagnostic;
pub mod span;

pub use diagnostic::{Diagnostic, Handler, Level, Rule};
pub use span::{FileId, SourceFile, SourceMap, Span};
