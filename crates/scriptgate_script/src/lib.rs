//! scriptgate script language
//!
//! Parses untrusted script text into a restricted executable unit. The
//! grammar is a small, indentation-structured, Python-like language; the
//! compiler rejects every construct that could reach outside the guarded
//! interpreter dispatch (private names, reflection builtins, attribute
//! assignment, unrestricted imports).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod compiler;
pub mod lexer;
pub mod parser;
pub mod template;

pub use ast::{Expr, ExprKind, FunctionDef, Literal, Pos, Program, Stmt, StmtKind, Target};
pub use compiler::{CompiledScript, ScriptCompiler, RESERVED_NAMES};
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::{Parser, MAX_NESTING};
pub use template::{
    ParameterSlot, ParameterTable, Parameters, RenderedScript, TemplateRenderer, PLACEHOLDER_EXAMPLE,
};
