//! Core engine errors (C1–C12 failure taxonomy).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown distribution function: {0}")]
    UnknownDistribution(String),

    #[error("malformed distribution formula '{formula}': {reason}")]
    MalformedFormula { formula: String, reason: String },

    #[error("distribution '{name}' expected {expected} argument(s), got {actual}")]
    ArityMismatch {
        name: String,
        expected: String,
        actual: usize,
    },

    #[error("no semantic column mapping for role '{role}' on table '{table}'")]
    MissingColumnMapping { table: String, role: String },

    #[error("resource table '{0}' is not declared in the database config")]
    UnknownResourceTable(String),

    #[error("queue '{0}' is not declared in the simulation config")]
    UnknownQueue(String),

    #[error("flow '{flow}' has no step named '{step}'")]
    UnknownStep { flow: String, step: String },

    #[error("termination formula parse error at position {position}: {reason}")]
    TerminationParseError { position: usize, reason: String },

    #[error("scheduler invariant violated: {0}")]
    SchedulerInvariant(String),

    #[error("entity store error: {0}")]
    Store(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<des_domain::DomainError> for CoreError {
    fn from(err: des_domain::DomainError) -> Self {
        CoreError::Internal(err.to_string())
    }
}
