//! Error types for the PIR compiler core

use std::fmt;
use thiserror::Error;

/// Main error type for the compiler core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Input to `compile`/`optimize` was not a closure
    #[error("NotAClosure: {0}")]
    NotAClosure(String),

    /// Operation requires a compiled dispatch-table entry that isn't there
    #[error("NotCompiled: {0}")]
    NotCompiled(String),

    /// Union attempted across `PirType` universes (R-type vs. native-type)
    #[error("TypeMismatch: cannot union {lhs} with {rhs}")]
    TypeMismatch { lhs: String, rhs: String },

    /// Failed to parse a textual `PirType` or a debug-flag name
    #[error("ParseError: {0}")]
    ParseError(String),

    /// A pass reported failure; the driver recovers by returning the input unchanged
    #[error("CompilationFailed: {0}")]
    CompilationFailed(String),

    /// SSA or use-list inconsistency detected by an assertion; not recoverable
    #[error("InvariantViolation: {0}")]
    InvariantViolation(String),
}

impl Error {
    pub fn not_a_closure(what: impl Into<String>) -> Self {
        Error::NotAClosure(what.into())
    }

    pub fn type_mismatch(lhs: impl fmt::Display, rhs: impl fmt::Display) -> Self {
        Error::TypeMismatch {
            lhs: lhs.to_string(),
            rhs: rhs.to_string(),
        }
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Error::InvariantViolation(msg.into())
    }
}

/// Result type alias for the compiler core
pub type Result<T> = std::result::Result<T, Error>;
