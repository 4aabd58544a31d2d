//! Crate-wide error taxonomy.
//!
//! [`Error`] is the single error type crossing the store → engine → manager
//! boundaries. Subsystems with their own failure vocabulary (expression
//! compilation, expression evaluation, schema validation) keep dedicated
//! enums and convert in via `#[from]`, so the original diagnostic text is
//! preserved all the way to the caller.

use thiserror::Error;

use crate::expr::{CompileError, EvalError};
use crate::schema::SchemaError;

/// Errors returned by store, engine, and manager operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed request input (missing tenant id, undecodable facts, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Schema failed structural validation.
    #[error("invalid schema: {0}")]
    InvalidSchema(#[from] SchemaError),

    /// Expression failed to compile. The compile diagnostic is kept verbatim
    /// behind a single prefix and never wrapped again further up the stack.
    #[error("rule validation failed: {0}")]
    InvalidExpression(#[from] CompileError),

    /// Tenant, rule, or schema absent for this tenant.
    #[error("{what} '{id}' not found")]
    NotFound { what: &'static str, id: String },

    /// Duplicate rule id or name within a tenant.
    #[error("rule with ID '{0}' already exists")]
    AlreadyExists(String),

    /// A rule exists in the store but has no compiled program in the engine.
    #[error("rule '{0}' is not compiled")]
    NotCompiled(String),

    /// A rule failed at evaluate time (cost limit, missing field, type error).
    #[error("rule '{id}' failed to evaluate: {source}")]
    Evaluation {
        id: String,
        #[source]
        source: EvalError,
    },

    /// Backing-store failure, wrapped with operation context.
    #[error("{op}: {source}")]
    Store {
        op: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    /// Connection pool failure.
    #[error("connection pool: {0}")]
    Pool(#[from] r2d2::Error),

    /// JSON (de)serialization failure.
    #[error("serialization: {0}")]
    Serde(#[from] serde_json::Error),

    /// Unexpected condition; never silently swallowed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap a backing-store error with the name of the failing operation.
    pub fn store(op: &'static str, source: rusqlite::Error) -> Self {
        Error::Store { op, source }
    }

    /// Shorthand for a not-found error.
    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            what,
            id: id.into(),
        }
    }

    /// True if this error means the requested entity does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// True if this error means a uniqueness constraint was violated.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::AlreadyExists(_))
    }
}

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
