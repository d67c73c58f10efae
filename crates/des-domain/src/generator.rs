//! Attribute generator configuration (C5 Entity Manager input).
//!
//! Mirrors `original_source`'s per-attribute `generator` block: each
//! attribute in an entity/event/resource table config may declare how its
//! value is produced when a row is created.

use serde::{Deserialize, Serialize};

use crate::distribution::DistributionSpec;
use crate::error::DomainError;

/// The kind of value-generation strategy attached to a table attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeneratorSpec {
    /// Faker-backed synthetic data, e.g. `{ type: faker, method: "name" }`.
    Faker { method: String },
    /// A literal Python-style `{}` template filled from other row fields.
    Template { template: String },
    /// A value sampled from a distribution formula.
    Distribution { formula: DistributionSpec },
    /// A foreign key resolved by picking among the existing rows of
    /// `table`. With no `formula`, the index is drawn uniformly at random;
    /// with one, `spec.md` §4.5 says a numeric sample selects
    /// `value mod len(parents)` as the index, otherwise falls back to
    /// uniform random.
    ForeignKey {
        table: String,
        #[serde(default)]
        column: Option<String>,
        #[serde(default)]
        formula: Option<DistributionSpec>,
    },
    /// Produced internally by the scheduler (e.g. event timestamps); config
    /// authors declare it so the resolver knows to skip it, but no value is
    /// generated from this variant directly.
    SimulationEvent,
}

impl GeneratorSpec {
    /// `original_source`'s `_generate_event_attributes` explicitly skips
    /// `simulation_event`-typed generators when synthesizing event rows.
    pub fn is_simulation_event(&self) -> bool {
        matches!(self, GeneratorSpec::SimulationEvent)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        match self {
            GeneratorSpec::Faker { method } if method.trim().is_empty() => Err(
                DomainError::Validation("faker generator requires a method name".to_string()),
            ),
            GeneratorSpec::Template { template } if template.trim().is_empty() => Err(
                DomainError::Validation("template generator requires a template string".to_string()),
            ),
            GeneratorSpec::Distribution { formula } => formula.validate(),
            GeneratorSpec::ForeignKey { table, .. } if table.trim().is_empty() => Err(
                DomainError::Validation("foreign_key generator requires a table name".to_string()),
            ),
            GeneratorSpec::ForeignKey { formula: Some(f), .. } => f.validate(),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulation_event_is_recognized() {
        assert!(GeneratorSpec::SimulationEvent.is_simulation_event());
        assert!(!GeneratorSpec::Faker {
            method: "name".into()
        }
        .is_simulation_event());
    }

    #[test]
    fn validate_rejects_empty_faker_method() {
        let gen = GeneratorSpec::Faker {
            method: "".to_string(),
        };
        assert!(gen.validate().is_err());
    }
}
