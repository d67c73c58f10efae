//! des-orchestrator: C12 Simulation Orchestrator.
//!
//! Wires every other component together in the fixed order `spec.md` §4.12
//! mandates, drives the run loop to termination, and assembles the final
//! metrics report. This crate is the only one that knows all of
//! `des-core`, `des-domain`, `des-persistence`, and `des-generators` at
//! once — everything downstream (the CLI) just calls [`run`].

pub mod error;
pub mod metrics;

use std::collections::HashMap;

use des_core::column_resolver::ColumnRole;
use des_core::distribution::DistributionEngine;
use des_core::entity::{compute_assigned_by_flow, EntityManager};
use des_core::queue_manager::QueueManager;
use des_core::resource::find_resource_type_column;
use des_core::resource_pool::ResourcePool;
use des_core::sched::{Scheduler, SimTask, TaskId};
use des_core::step::{run_to_completion, ArrivalTask, TerminationMonitorTask, World};
use des_core::termination;
use des_core::time::SimDateTime;
use des_domain::{DatabaseConfig, SimulationConfig, TableKind};
use des_generators::FakerGenerator;
use des_persistence::{SqliteEntityStore, SqliteEventLog};
use log::info;

pub use error::OrchestratorError;
pub use metrics::SimulationMetrics;

/// Runs one complete simulation end to end: opens the output store, seeds
/// the PRNG streams, loads resource tables, spawns one arrival task per
/// declared entity arrival, drives the scheduler to termination, and
/// returns the final metrics report.
///
/// Both store connections are closed on every exit path, including error
/// paths, per `spec.md` §4.12 ("Cleanup must run on every exit path").
pub fn run(db_config: &DatabaseConfig, sim_config: &SimulationConfig) -> Result<SimulationMetrics, OrchestratorError> {
    let termination_expr = termination::parse(&sim_config.termination)?;

    let store = Box::new(SqliteEntityStore::open(db_config)?);
    let events = Box::new(SqliteEventLog::open(db_config)?);

    let seed = sim_config.random_seed;
    let dist = match seed {
        Some(s) => DistributionEngine::new_seeded(s),
        None => DistributionEngine::new_entropy(),
    };
    let gen = match seed {
        Some(s) => Box::new(FakerGenerator::new_seeded(s)) as Box<dyn des_core::store::ValueGenerator>,
        None => Box::new(FakerGenerator::new_entropy()) as Box<dyn des_core::store::ValueGenerator>,
    };

    let queues = QueueManager::from_config(&sim_config.queues);
    let resources = ResourcePool::new();
    let assigned_by_flow = compute_assigned_by_flow(&sim_config.flows);
    let entities = EntityManager::new(db_config, assigned_by_flow);
    let sim_start = sim_config
        .start_date
        .map(SimDateTime::from_naive)
        .unwrap_or(SimDateTime { epoch_millis: 0 });

    let mut world = World::new(db_config, sim_config, sim_start, dist, entities, resources, queues, store, events, gen);

    let outcome = drive(&mut world, db_config, sim_config, &termination_expr);

    let close_store = world.store.close();
    let close_events = world.events.close();

    let metrics = outcome?;
    close_store?;
    close_events?;
    Ok(metrics)
}

/// Resource loading, task spawning, and the run loop itself — split out of
/// [`run`] so cleanup always happens on the path back out regardless of
/// which step here fails.
fn drive(
    world: &mut World,
    db_config: &DatabaseConfig,
    sim_config: &SimulationConfig,
    termination_expr: &des_core::termination::Expr,
) -> Result<SimulationMetrics, OrchestratorError> {
    for table in db_config.tables_of_kind(TableKind::Resource) {
        let pk_column = world.resolver.resolve(&table.name, ColumnRole::Pk)?;
        let column_names: Vec<String> = table.attributes.iter().map(|a| a.name.clone()).collect();
        let type_column = find_resource_type_column(&column_names);
        let loaded = world.store.load_resources(&table.name, &pk_column, &type_column)?;
        info!("loaded {} resource(s) from '{}'", loaded.len(), table.name);
        world.resources.load(loaded);
    }

    let mut scheduler = Scheduler::new();
    let mut tasks: HashMap<TaskId, Box<dyn SimTask<World>>> = HashMap::new();
    for (index, _arrival) in sim_config.arrivals.iter().enumerate() {
        let id = world.new_task_id();
        tasks.insert(id, Box::new(ArrivalTask::new(index)));
        scheduler.schedule_after(id, 0.0);
    }

    // C11's heartbeat (`spec.md` §5) — keeps the clock advancing past the
    // last real task so a `TIME(...)` (or any other) termination condition
    // still gets a chance to fire even once every arrival/flow task has
    // drained or parked.
    let monitor_id = world.new_task_id();
    tasks.insert(monitor_id, Box::new(TerminationMonitorTask));
    scheduler.schedule_after(monitor_id, 1.0);

    run_to_completion(world, &mut scheduler, &mut tasks, termination_expr);

    let now = scheduler.now();
    let termination_reason = scheduler
        .termination_reason()
        .unwrap_or("scheduler idle, no further tasks runnable")
        .to_string();
    let entity_count = world.entity_count(None);
    let processed_events = world.events.total_events();

    Ok(metrics::collect(
        now,
        sim_config.base_time_unit,
        termination_reason,
        entity_count,
        processed_events,
        &world.resources,
        &world.queues,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use des_domain::{AttributeConfig, DistributionSpec, EntityArrivalConfig, FlowConfig, StepConfig, TableConfig};
    use std::collections::HashMap;

    fn pk(name: &str) -> AttributeConfig {
        AttributeConfig {
            name: name.to_string(),
            column_type: Some("integer".to_string()),
            is_primary_key: true,
            is_foreign_key: false,
            references: None,
            generator: None,
        }
    }

    fn db_config() -> DatabaseConfig {
        DatabaseConfig {
            db_path: ":memory:".to_string(),
            tables: vec![TableConfig {
                name: "patients".to_string(),
                kind: TableKind::Entity,
                attributes: vec![pk("id")],
                column_roles: HashMap::new(),
            }],
        }
    }

    fn sim_config() -> SimulationConfig {
        let mut steps = HashMap::new();
        steps.insert(
            "start".to_string(),
            StepConfig::Create {
                next_steps: vec!["end".to_string()],
            },
        );
        steps.insert("end".to_string(), StepConfig::Release);
        SimulationConfig {
            name: "intake".to_string(),
            start_date: None,
            base_time_unit: des_domain::BaseTimeUnit::Minutes,
            arrivals: vec![EntityArrivalConfig {
                entity_table: "patients".to_string(),
                interarrival: DistributionSpec::new("FIXED(5)"),
                max_entities: Some(3),
            }],
            flows: vec![FlowConfig {
                name: "intake".to_string(),
                entity_table: "patients".to_string(),
                start_step: "start".to_string(),
                steps,
            }],
            queues: vec![],
            termination: "TIME(999)".to_string(),
            random_seed: Some(42),
        }
    }

    #[test]
    fn runs_to_completion_and_counts_every_arrival() {
        let db = db_config();
        let sim = sim_config();
        let metrics = run(&db, &sim).expect("run should succeed");
        assert_eq!(metrics.entity_count, 3);
        assert_eq!(metrics.entities_processed, 3);
        assert_eq!(metrics.termination_reason.is_empty(), false);
    }

    #[test]
    fn rejects_malformed_termination_formula() {
        let db = db_config();
        let mut sim = sim_config();
        sim.termination = "NOT_A_FUNCTION()".to_string();
        assert!(run(&db, &sim).is_err());
    }

    #[test]
    fn event_step_inserts_a_row_into_the_declared_event_table() {
        use des_domain::{EventStepConfig, GeneratorSpec};

        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("sim.db");

        let db = DatabaseConfig {
            db_path: db_path.to_string_lossy().to_string(),
            tables: vec![
                TableConfig {
                    name: "patients".to_string(),
                    kind: TableKind::Entity,
                    attributes: vec![pk("id")],
                    column_roles: HashMap::new(),
                },
                TableConfig {
                    name: "visits".to_string(),
                    kind: TableKind::Event,
                    attributes: vec![
                        pk("id"),
                        AttributeConfig {
                            name: "patient_id".to_string(),
                            column_type: Some("event_id".to_string()),
                            is_primary_key: false,
                            is_foreign_key: false,
                            references: None,
                            generator: None,
                        },
                        AttributeConfig {
                            name: "kind".to_string(),
                            column_type: Some("event_type".to_string()),
                            is_primary_key: false,
                            is_foreign_key: false,
                            references: None,
                            generator: None,
                        },
                        AttributeConfig {
                            name: "note".to_string(),
                            column_type: Some("text".to_string()),
                            is_primary_key: false,
                            is_foreign_key: false,
                            references: None,
                            generator: Some(GeneratorSpec::Faker { method: "word".to_string() }),
                        },
                    ],
                    column_roles: HashMap::new(),
                },
            ],
        };

        let mut steps = HashMap::new();
        steps.insert(
            "start".to_string(),
            StepConfig::Create {
                next_steps: vec!["triage".to_string()],
            },
        );
        steps.insert(
            "triage".to_string(),
            StepConfig::Event {
                event: EventStepConfig {
                    name: "triage".to_string(),
                    duration: DistributionSpec::new("FIXED(10)"),
                    resource_requirements: vec![],
                    queue: None,
                },
                next_steps: vec!["end".to_string()],
            },
        );
        steps.insert("end".to_string(), StepConfig::Release);

        let sim = SimulationConfig {
            name: "intake".to_string(),
            start_date: None,
            base_time_unit: des_domain::BaseTimeUnit::Minutes,
            arrivals: vec![EntityArrivalConfig {
                entity_table: "patients".to_string(),
                interarrival: DistributionSpec::new("FIXED(5)"),
                max_entities: Some(2),
            }],
            flows: vec![FlowConfig {
                name: "intake".to_string(),
                entity_table: "patients".to_string(),
                start_step: "start".to_string(),
                steps,
            }],
            queues: vec![],
            termination: "TIME(999)".to_string(),
            random_seed: Some(7),
        };

        let metrics = run(&db, &sim).expect("run should succeed");
        assert_eq!(metrics.entity_count, 2);

        let conn = rusqlite::Connection::open(&db_path).unwrap();
        let row_count: i64 = conn.query_row("SELECT COUNT(*) FROM visits", [], |r| r.get(0)).unwrap();
        assert_eq!(row_count, 2);
        let (patient_id, kind, note): (i64, String, Option<String>) = conn
            .query_row("SELECT patient_id, kind, note FROM visits LIMIT 1", [], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
            .unwrap();
        assert!(patient_id > 0);
        assert_eq!(kind, "triage");
        assert!(note.is_some());

        // The persisted `event_id` must be the declared event table's own
        // primary key, not a derived flow/step/entity label.
        let visit_ids: Vec<i64> = {
            let mut stmt = conn.prepare("SELECT id FROM visits ORDER BY id ASC").unwrap();
            stmt.query_map([], |r| r.get(0)).unwrap().map(|r| r.unwrap()).collect()
        };
        let mut stmt = conn.prepare("SELECT event_id FROM sim_event_processing ORDER BY id ASC").unwrap();
        let processed_event_ids: Vec<String> = stmt.query_map([], |r| r.get(0)).unwrap().map(|r| r.unwrap()).collect();
        let expected: Vec<String> = visit_ids.iter().map(|id| id.to_string()).collect();
        assert_eq!(processed_event_ids, expected);
    }
}
