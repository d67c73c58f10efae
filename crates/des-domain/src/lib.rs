//! Config-layer data model for the discrete-event simulator.
//!
//! This crate has no behavior beyond parsing and validating the two YAML
//! documents a run is driven by: a database schema config (`db_config`) and
//! a simulation config (`sim_config`). Everything else (sampling, the
//! scheduler, persistence, orchestration) lives in the crates downstream of
//! this one.

pub mod db_config;
pub mod distribution;
pub mod error;
pub mod generator;
pub mod queue;
pub mod sim_config;
pub mod time_unit;

pub use db_config::{AttributeConfig, DatabaseConfig, TableConfig, TableKind};
pub use distribution::DistributionSpec;
pub use error::DomainError;
pub use generator::GeneratorSpec;
pub use queue::{QueueConfig, QueueDiscipline};
pub use sim_config::{
    AssignStepConfig, DecisionCondition, DecisionOutcome, DecisionType, EntityArrivalConfig,
    EventStepConfig, FlowConfig, ResourceRequirement, SimulationConfig, StepConfig,
};
pub use time_unit::BaseTimeUnit;

/// Parse and validate a database schema config from a YAML document.
pub fn load_database_config(yaml: &str) -> Result<DatabaseConfig, DomainError> {
    let config: DatabaseConfig = serde_yaml::from_str(yaml)?;
    config.validate()?;
    Ok(config)
}

/// Parse and validate a simulation config from a YAML document.
pub fn load_simulation_config(yaml: &str) -> Result<SimulationConfig, DomainError> {
    let config: SimulationConfig = serde_yaml::from_str(yaml)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_yaml() {
        let err = load_database_config("not: [valid").unwrap_err();
        assert!(matches!(err, DomainError::Yaml(_)));
    }
}
