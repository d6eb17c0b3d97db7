//! Error taxonomy for model assembly and solving.
//!
//! Assembly failures ([`ModelError`]) abort before any solver call and always
//! carry enough context to locate the offending record. Solve failures
//! ([`SolveError`]) happen after submission and carry the backend's message
//! untouched.

use std::time::Duration;
use thiserror::Error;

/// Malformed or inconsistent input detected while building the program.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("configuration error in {context}: {message}")]
    Configuration { context: String, message: String },
    #[error("{context} references unknown bus '{bus}'")]
    UnknownBus { context: String, bus: String },
    #[error("{context}: expected a series of length {expected}, found {found}")]
    SeriesLength {
        context: String,
        expected: usize,
        found: usize,
    },
    #[error("unsupported tariff '{tariff}' for territory '{territory}'")]
    InvalidTariff { tariff: String, territory: String },
    #[error("duplicate name in program: {0}")]
    DuplicateName(String),
}

impl ModelError {
    pub fn config(context: impl Into<String>, message: impl Into<String>) -> Self {
        ModelError::Configuration {
            context: context.into(),
            message: message.into(),
        }
    }
}

/// Failures reported by (or in front of) a solver backend.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolveError {
    #[error("problem is infeasible: {0}")]
    Infeasible(String),
    #[error("problem is unbounded")]
    Unbounded,
    #[error("constraint '{constraint}' is nonconvex and nonconvex handling is not enabled")]
    NonconvexNotEnabled { constraint: String },
    #[error("backend '{backend}' cannot handle constraint '{constraint}'")]
    Unsupported { backend: String, constraint: String },
    #[error("backend '{backend}' cannot branch on integer variable '{variable}'")]
    IntegerUnsupported { backend: String, variable: String },
    #[error("solver timed out after {0:?}")]
    Timeout(Duration),
    #[error("solver failure: {0}")]
    Backend(String),
    #[error("unknown solver backend '{0}'")]
    UnknownBackend(String),
}
