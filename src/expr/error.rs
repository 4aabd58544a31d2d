//! Compile-time and evaluate-time errors for the expression language.

use thiserror::Error;

/// Errors produced while compiling an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// The source text is not valid expression syntax.
    #[error("syntax error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    /// The expression names a variable the environment does not declare.
    #[error("undeclared reference to '{name}'")]
    UndeclaredReference { name: String },

    /// The expression calls a function that does not exist (or a macro the
    /// environment has cleared).
    #[error("undeclared function '{name}'")]
    UndeclaredFunction { name: String },

    /// Wrong number of arguments to a function or macro.
    #[error("'{name}' expects {expected} argument(s), got {got}")]
    BadArity {
        name: String,
        expected: usize,
        got: usize,
    },

    /// A macro was invoked with an argument shape it cannot expand.
    #[error("'{name}' expects {expected}")]
    BadMacroArgument {
        name: String,
        expected: &'static str,
    },

    /// An operator was applied to literal operands of incompatible types.
    #[error("found no matching overload for '{op}' applied to ({lhs}, {rhs})")]
    NoSuchOverload {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },
}

/// Errors produced while evaluating a compiled program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// The cumulative evaluation cost exceeded the program's ceiling.
    #[error("evaluation cost limit of {limit} exceeded")]
    CostLimitExceeded { limit: u64 },

    /// A declared variable is absent from the fact payload.
    #[error("no such attribute '{name}'")]
    MissingAttribute { name: String },

    /// A field selection found no such field on the object.
    #[error("no such field '{field}'")]
    MissingField { field: String },

    /// A field selection was applied to a non-object value.
    #[error("cannot select field '{field}' from {type_name}")]
    NotAnObject {
        field: String,
        type_name: &'static str,
    },

    /// An operator was applied to runtime values of incompatible types.
    #[error("found no matching overload for '{op}' applied to ({lhs}, {rhs})")]
    NoSuchOverload {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },

    /// Integer division or remainder by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// Integer arithmetic overflowed.
    #[error("integer overflow in '{op}'")]
    ArithmeticOverflow { op: &'static str },
}
