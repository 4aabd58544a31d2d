//! # Rule Expression Language
//!
//! A sandboxed expression language for rule bodies. Expressions are
//! compiled once against an [`Env`] that declares which top-level variables
//! exist, then evaluated many times against fact payloads.
//!
//! ## Pipeline
//!
//! ```text
//! Source string
//!     ↓
//! [Parser]        → AST (winnow grammar)
//!     ↓
//! [Env::compile]  → macro expansion, reference resolution, static checks
//!     ↓
//! [Env::program]  → Program (cost ceiling, optional state tracking)
//!     ↓
//! [Program::evaluate]  → Value (+ trace)
//! ```
//!
//! Variables are dynamically typed: the environment controls which names
//! resolve, not the runtime types of their fields. Static checks catch
//! syntax errors, undeclared references, unknown functions, and type
//! conflicts between literals; everything else surfaces at evaluate time.
//! Evaluation cost is metered and capped, so no tenant expression can
//! monopolize a worker.

mod ast;
mod env;
mod error;
mod eval;
mod parser;
mod value;

pub use ast::{BinaryOp, Expr, UnaryOp};
pub use env::{Ast, Env, EnvBuilder, ProgramOptions, STANDARD_MACROS};
pub use error::{CompileError, EvalError};
pub use eval::{Evaluation, Program, TraceStep};
pub use value::{facts_from_json, Facts, Value};
