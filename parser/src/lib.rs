//! # Parser
//!
//! Lexer and recursive-descent parser for the script language run by
//! tessel.
//!
//! ```text
//!  impl Read (file, &[u8], …)
//!      │
//!      ▼
//!  ┌────────┐    Token stream     ┌────────┐
//!  │ Lexer  │ ──────────────────▶ │ Parser │ ──────────▶ Program
//!  └────────┘  (impl Iterator)    └────────┘
//! ```
//!
//! ```rust
//! use parser::{StmtKind, parse};
//!
//! let program = parse("function f(a, b) { return a + b; }").unwrap();
//! assert!(matches!(program.body[0].kind, StmtKind::FunctionDecl(_)));
//! ```
//!
//! Statements end at `;`, and a semicolon is inserted at a line break,
//! before `}` and at end of input. `return`, `throw`, `yield` and postfix
//! `++`/`--` do not continue across a line break.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod span;
pub mod token;

pub use ast::{
    BinaryOp, Expr, ExprKind, ForInit, Function, LogicalOp, Param, Program,
    Stmt, StmtKind, UnaryOp, UpdateOp, VarDecl,
};
pub use lexer::Lexer;
pub use parser::{ParseError, Parser};
pub use span::{Pos, Span};
pub use token::{Token, TokenKind};

/// Parse a complete script held in memory.
pub fn parse(source: &str) -> Result<Program, ParseError> {
    Parser::new(Lexer::from_str(source)).parse_program()
}
