//! Declarative distribution formulas as they appear in simulation YAML.
//!
//! A `DistributionSpec` is the config-layer representation of a formula
//! string such as `"NORM(10, 2)"` or `"DISC(0.3, 1, 0.7, 2)"`. Parsing the
//! formula into a sampleable distribution is `des-core`'s job (the
//! Distribution Engine); this crate only models the shape that comes out of
//! YAML and validates it is non-empty.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A raw distribution formula as authored in YAML, e.g. `NORM(10, 2)`.
///
/// Kept as an opaque string at the config layer: the grammar (function name,
/// argument tokenization respecting quoted strings, DISC argument-order
/// tolerance) is the Distribution Engine's concern, not the config model's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DistributionSpec {
    pub formula: String,
}

impl DistributionSpec {
    pub fn new(formula: impl Into<String>) -> Self {
        Self {
            formula: formula.into(),
        }
    }

    /// The function name portion of the formula (before the first `(`),
    /// upper-cased for case-insensitive dispatch.
    pub fn function_name(&self) -> Option<&str> {
        self.formula.split('(').next().map(|s| s.trim())
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.formula.trim().is_empty() {
            return Err(DomainError::Validation(
                "distribution formula must not be empty".to_string(),
            ));
        }
        if !self.formula.contains('(') || !self.formula.trim_end().ends_with(')') {
            return Err(DomainError::MalformedFormula {
                formula: self.formula.clone(),
                reason: "expected NAME(args) shape".to_string(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for DistributionSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.formula)
    }
}
