//! vex-lex - Lexical analyzer for the VCL edge-configuration language.
//!
//! The lexer transforms UTF-8 source text into a stream of [`Token`]s.
//! Whitespace is skipped; comments are collected and attached to the next
//! token as leading trivia so downstream passes can inspect pragmas. VCL
//! identifiers are dotted (`req.http.Host`) and may contain hyphens
//! (`X-Forwarded-For`), keywords are contextual, and numeric literals
//! split into integers, floats, and RTIME durations by suffix.

pub mod cursor;
pub mod lexer;
pub mod token;

pub use cursor::Cursor;
pub use lexer::{LexError, Lexer};
pub use token::{keyword_from_ident, Comment, Token, TokenKind};
