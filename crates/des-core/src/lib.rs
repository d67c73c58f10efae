//! des-core: the discrete-event simulation engine.
//!
//! Purpose:
//! - Drive a configuration-described simulation (arrivals, flows, resource
//!   pools, queues, termination) over a virtual clock, independent of any
//!   concrete persistence or value-generation backend.
//! - Stay neutral of storage/generation concerns: `store` defines the trait
//!   seams `des-persistence` and `des-generators` implement; this crate never
//!   opens a database connection or calls into `fake` directly.
//!
//! Main components:
//! - `sched`: C2 virtual clock + cooperative scheduler (`Scheduler`,
//!   `SimTask`).
//! - `step`: C9/C10 step processors and flow runner (`World`, `ArrivalTask`,
//!   `FlowRunnerTask`, `run_to_completion`).
//! - `entity`: C5 entity creation and attribute generation dispatch.
//! - `resource_pool`: C6 resource pool acquisition/release/grouping.
//! - `queue_manager` / `queue`: C7 queue disciplines and wait-time stats.
//! - `column_resolver`: C3 semantic-role -> concrete column name mapping.
//! - `distribution`: C1 distribution formula parsing and sampling.
//! - `termination`: C11 termination formula parsing and evaluation.
//! - `time`: integer epoch-millis simulation datetime arithmetic.
//! - `value`: the typed `Value`/`AttributeMap` row representation.
//! - `hashing`: canonical JSON and fingerprint helpers.
//! - `errors`: the engine's failure taxonomy.

pub mod column_resolver;
pub mod constants;
pub mod distribution;
pub mod entity;
pub mod errors;
pub mod hashing;
pub mod queue;
pub mod queue_manager;
pub mod resource;
pub mod resource_pool;
pub mod sched;
pub mod step;
pub mod store;
pub mod termination;
pub mod time;
pub mod value;

pub use column_resolver::{ColumnResolver, ColumnRole};
pub use distribution::{sample_many, sample_one, DistributionEngine};
pub use entity::{compute_assigned_by_flow, AssignedByFlow, EntityManager};
pub use errors::CoreError;
pub use queue::{Queue, QueueAction, QueueActivity, QueueEntry};
pub use queue_manager::QueueManager;
pub use resource::{Resource, ResourceKey, UtilizationRecord};
pub use resource_pool::{AcquireAttempt, ResourcePool};
pub use sched::{Scheduler, SimTask, TaskId, TaskOutcome, WakeAt};
pub use step::{run_to_completion, ArrivalTask, FlowRunnerTask, TerminationMonitorTask, World};
pub use store::{EntityStore, EventLog, ValueGenerator};
pub use termination::{evaluate, parse, Condition, Expr, TerminationContext};
pub use time::SimDateTime;
pub use value::{AttributeMap, Value};
