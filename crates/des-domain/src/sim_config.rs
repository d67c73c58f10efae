//! Simulation configuration (the second of the two YAML inputs).
//!
//! Describes entity arrival processes, the flow each entity walks through
//! (a graph of steps), queue disciplines, and the termination formula. This
//! is the config-layer mirror of `original_source`'s `SimulationConfig`
//! dataclass tree (`event_config.py`, `entity_manager.py` arrival handling,
//! `termination/formula.py`).

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::distribution::DistributionSpec;
use crate::error::DomainError;
use crate::queue::QueueConfig;
use crate::time_unit::BaseTimeUnit;

/// How many units of a resource requirement to acquire: a fixed literal, or
/// a distribution formula resampled on every request (`spec.md` §3
/// "Resource Requirement").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CountSpec {
    Literal(u32),
    Formula(DistributionSpec),
}

impl Default for CountSpec {
    fn default() -> Self {
        CountSpec::Literal(1)
    }
}

/// A resource requirement attached to an event step: acquire `count` units
/// of `resource_table` rows whose type column equals `value`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRequirement {
    pub resource_table: String,
    pub value: String,
    #[serde(default)]
    pub count: CountSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventStepConfig {
    pub name: String,
    pub duration: DistributionSpec,
    #[serde(default)]
    pub resource_requirements: Vec<ResourceRequirement>,
    /// The queue an entity waits in while resources are unavailable, if any.
    #[serde(default)]
    pub queue: Option<String>,
}

/// `decide_config.decision_type` (`spec.md` §4.9/§6): `probability` is fully
/// implemented; `condition` is accepted but evaluated by always choosing the
/// first outcome and logging a warning, matching
/// `original_source/step_processors/decide_processor.py::_evaluate_conditional_decision`
/// ("placeholder for future implementation").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    Probability,
    Condition,
}

/// One `outcomes[].conditions[]` entry. Only `condition_type = "probability"`
/// carries a value the engine consumes; other condition types are accepted
/// syntactically (for `decision_type: condition` outcomes) but never
/// evaluated, per `original_source`'s own placeholder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionCondition {
    pub condition_type: String,
    #[serde(default)]
    pub probability: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub next_step_id: String,
    #[serde(default)]
    pub conditions: Vec<DecisionCondition>,
}

impl DecisionOutcome {
    /// The probability carried by this outcome's first `probability`-typed
    /// condition, defaulting to `0.0` when none is present (`spec.md` §4.9
    /// n-way probability decisions normalise missing weights to uniform).
    pub fn probability(&self) -> f64 {
        self.conditions
            .iter()
            .find(|c| c.condition_type == "probability")
            .and_then(|c| c.probability)
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignStepConfig {
    pub attribute: String,
    pub value: DistributionSpec,
}

/// A single step in a flow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepConfig {
    /// Entry point: entities enter the flow here. Only valid as a flow's
    /// `start_step`.
    Create {
        #[serde(default)]
        next_steps: Vec<String>,
    },
    /// Acquire resources, hold them for a sampled duration, release them,
    /// then advance. The unit of C9 that actually suspends on resource
    /// availability.
    Event {
        event: EventStepConfig,
        #[serde(default)]
        next_steps: Vec<String>,
    },
    /// Branch among `outcomes`, per `decision_type` (`spec.md` §4.9 Decide).
    Decide {
        decision_type: DecisionType,
        outcomes: Vec<DecisionOutcome>,
    },
    /// Sets an entity attribute from a sampled/generated value.
    Assign {
        assign: AssignStepConfig,
        #[serde(default)]
        next_steps: Vec<String>,
    },
    /// Terminal step: the entity's walk through this flow ends here. Any
    /// resources it still retains under a group allocation are released
    /// before the entity is considered done.
    Release,
}

impl StepConfig {
    pub fn next_steps(&self) -> &[String] {
        match self {
            StepConfig::Create { next_steps } => next_steps,
            StepConfig::Event { next_steps, .. } => next_steps,
            StepConfig::Assign { next_steps, .. } => next_steps,
            StepConfig::Decide { .. } | StepConfig::Release => &[],
            // Decide has no unconditional `next_steps`; its successors are
            // `outcomes[].next_step_id`, validated separately below.
        }
    }

    pub fn validate(&self, step_id: &str) -> Result<(), DomainError> {
        match self {
            StepConfig::Event { event, .. } => event.duration.validate(),
            StepConfig::Assign { assign, .. } => assign.value.validate(),
            StepConfig::Decide { outcomes, .. } => {
                // Probability weights are normalised at evaluation time
                // (`spec.md` §4.9: "if all zero, uniform; otherwise divide by
                // sum"), so validation only requires at least one outcome —
                // it does not demand the weights already sum to 1.0.
                if outcomes.is_empty() {
                    return Err(DomainError::Validation(format!(
                        "decide step '{}' must declare at least one outcome",
                        step_id
                    )));
                }
                Ok(())
            }
            StepConfig::Create { .. } | StepConfig::Release => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityArrivalConfig {
    pub entity_table: String,
    pub interarrival: DistributionSpec,
    #[serde(default)]
    pub max_entities: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    pub name: String,
    pub entity_table: String,
    pub start_step: String,
    pub steps: HashMap<String, StepConfig>,
}

impl FlowConfig {
    pub fn validate(&self) -> Result<(), DomainError> {
        if !self.steps.contains_key(&self.start_step) {
            return Err(DomainError::Validation(format!(
                "flow '{}' start_step '{}' is not a declared step",
                self.name, self.start_step
            )));
        }
        for (step_id, step) in &self.steps {
            step.validate(step_id)?;
            for next in step.next_steps() {
                if !self.steps.contains_key(next) {
                    return Err(DomainError::Validation(format!(
                        "flow '{}' step '{}' points to undeclared next step '{}'",
                        self.name, step_id, next
                    )));
                }
            }
            if let StepConfig::Decide { outcomes, .. } = step {
                for outcome in outcomes {
                    if !self.steps.contains_key(&outcome.next_step_id) {
                        return Err(DomainError::Validation(format!(
                            "flow '{}' decide step '{}' points to undeclared next step '{}'",
                            self.name, step_id, outcome.next_step_id
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Root of the simulation YAML document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub name: String,
    #[serde(default)]
    pub start_date: Option<NaiveDateTime>,
    #[serde(default)]
    pub base_time_unit: BaseTimeUnit,
    pub arrivals: Vec<EntityArrivalConfig>,
    pub flows: Vec<FlowConfig>,
    #[serde(default)]
    pub queues: Vec<QueueConfig>,
    pub termination: String,
    /// Optional fixed seed for the PRNG driving all distribution sampling;
    /// same seed + same config reproduces the same run deterministically.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.termination.trim().is_empty() {
            return Err(DomainError::Validation(
                "termination formula must not be empty".to_string(),
            ));
        }
        if self.flows.is_empty() {
            return Err(DomainError::Validation(
                "simulation must declare at least one flow".to_string(),
            ));
        }
        for flow in &self.flows {
            flow.validate()?;
        }
        for arrival in &self.arrivals {
            arrival.interarrival.validate()?;
        }
        Ok(())
    }
}
