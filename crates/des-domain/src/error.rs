//! Configuration errors for the schema and simulation YAML documents.

use thiserror::Error;

/// Validation/parse errors for the declarative configuration layer.
///
/// These surface before a run starts and name the offending element; none
/// of them are recoverable mid-run.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unknown distribution name: {0}")]
    UnknownDistribution(String),

    #[error("malformed formula '{formula}': {reason}")]
    MalformedFormula { formula: String, reason: String },

    #[error("unknown step kind: {0}")]
    UnknownStepKind(String),
}
