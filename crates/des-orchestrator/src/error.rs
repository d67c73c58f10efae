//! C12 Simulation Orchestrator errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("configuration error: {0}")]
    Config(#[from] des_domain::DomainError),

    #[error("engine error: {0}")]
    Core(#[from] des_core::errors::CoreError),

    #[error("persistence error: {0}")]
    Persistence(#[from] des_persistence::PersistenceError),
}
