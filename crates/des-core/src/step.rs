//! C9 Step Processors + C10 Flow Runner, and the `World` every task type
//! resumes against (`spec.md` §4.9/§4.10).
//!
//! There are exactly two schedulable task families:
//! - [`ArrivalTask`]: one per declared `EntityArrivalConfig`. Samples an
//!   interarrival delay, creates an entity, spawns a [`FlowRunnerTask`] for
//!   it, and reschedules itself.
//! - [`FlowRunnerTask`]: one per live entity. Walks its flow's step graph,
//!   suspending on `Event` (resource acquisition + duration) steps, executing
//!   `Assign`/`Decide` steps inline, and finishing at `Release`.
//!
//! Dynamic task creation doesn't fit `Scheduler::run`'s fixed dispatch loop
//! (its `tasks` map is owned by the caller, not the scheduler), so
//! [`World::spawn`] buffers newly-created tasks and [`run_to_completion`]
//! drains that buffer between resumptions — the same dispatch order as
//! `Scheduler::run`, with one extra step.

use std::collections::HashMap;

use des_domain::sim_config::CountSpec;
use des_domain::{
    DatabaseConfig, DecisionOutcome, DecisionType, EventStepConfig, FlowConfig, ResourceRequirement, SimulationConfig, StepConfig,
    TableKind,
};

use crate::column_resolver::{ColumnResolver, ColumnRole};
use crate::distribution::DistributionEngine;
use crate::entity::EntityManager;
use crate::errors::CoreError;
use crate::queue_manager::QueueManager;
use crate::resource::ResourceKey;
use crate::resource_pool::{AcquireAttempt, ResourcePool};
use crate::sched::{Scheduler, SimTask, TaskId, TaskOutcome, WakeAt};
use crate::store::{EntityStore, EventLog, ValueGenerator};
use crate::termination::{self, Expr, TerminationContext};
use crate::time::SimDateTime;
use crate::value::Value;

/// Everything a task needs to run a step of the simulation. Owns the
/// persistence/generator backends behind their trait objects so `des-core`
/// never names a concrete SQLite or faker type.
pub struct World<'cfg> {
    pub db_config: &'cfg DatabaseConfig,
    pub sim_config: &'cfg SimulationConfig,
    pub sim_start: SimDateTime,
    pub dist: DistributionEngine,
    pub resolver: ColumnResolver<'cfg>,
    pub resources: ResourcePool,
    pub queues: QueueManager,
    pub entities: EntityManager<'cfg>,
    pub store: Box<dyn EntityStore>,
    pub events: Box<dyn EventLog>,
    pub gen: Box<dyn ValueGenerator>,

    flows_by_entity_table: HashMap<String, FlowConfig>,
    entity_counts: HashMap<String, u64>,
    next_task_id: u64,
    spawns: Vec<(TaskId, Box<dyn SimTask<World<'cfg>>>, f64)>,
}

impl<'cfg> World<'cfg> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db_config: &'cfg DatabaseConfig,
        sim_config: &'cfg SimulationConfig,
        sim_start: SimDateTime,
        dist: DistributionEngine,
        entities: EntityManager<'cfg>,
        resources: ResourcePool,
        queues: QueueManager,
        store: Box<dyn EntityStore>,
        events: Box<dyn EventLog>,
        gen: Box<dyn ValueGenerator>,
    ) -> Self {
        let flows_by_entity_table = sim_config
            .flows
            .iter()
            .map(|f| (f.entity_table.clone(), f.clone()))
            .collect();
        World {
            db_config,
            sim_config,
            sim_start,
            dist,
            resolver: ColumnResolver::new(db_config),
            resources,
            queues,
            entities,
            store,
            events,
            gen,
            flows_by_entity_table,
            entity_counts: HashMap::new(),
            next_task_id: 0,
            spawns: Vec::new(),
        }
    }

    pub fn new_task_id(&mut self) -> TaskId {
        let id = TaskId(self.next_task_id);
        self.next_task_id += 1;
        id
    }

    /// Buffers a task created mid-run (an arrival's freshly-created entity
    /// starting its flow) to be picked up at `delay` minutes from now by
    /// [`run_to_completion`].
    pub fn spawn(&mut self, id: TaskId, task: Box<dyn SimTask<World<'cfg>>>, delay: f64) {
        self.spawns.push((id, task, delay));
    }

    fn take_spawns(&mut self) -> Vec<(TaskId, Box<dyn SimTask<World<'cfg>>>, f64)> {
        std::mem::take(&mut self.spawns)
    }

    pub fn flow_for(&self, entity_table: &str) -> Option<&FlowConfig> {
        self.flows_by_entity_table.get(entity_table)
    }

    pub fn record_entity_created(&mut self, entity_table: &str) {
        *self.entity_counts.entry(entity_table.to_string()).or_insert(0) += 1;
    }

    pub fn entity_count(&self, table: Option<&str>) -> u64 {
        match table {
            Some(t) => self.entity_counts.get(t).copied().unwrap_or(0),
            None => self.entity_counts.values().sum(),
        }
    }

    /// The simulation's declared event table (`spec.md` §4.9 Event step,
    /// `TableKind::Event`). Configs name at most one; `None` means an Event
    /// step's database row is skipped but resource acquisition still runs.
    pub fn event_table_name(&self) -> Option<&str> {
        self.db_config.tables_of_kind(TableKind::Event).next().map(|t| t.name.as_str())
    }

    /// Drains every enqueue/dequeue recorded by the queue manager since the
    /// last flush and persists it to `sim_queue_activity` (`spec.md` §6 /
    /// §4.7). `QueueManager` only buffers — it can't reach the store
    /// directly (`des-core` must not depend on a concrete backend) — so the
    /// scheduler loop is responsible for calling this after every dispatch.
    pub fn flush_queue_activity(&mut self) {
        for activity in self.queues.drain_activity() {
            let action = match activity.action {
                crate::queue::QueueAction::Entry => "entry",
                crate::queue::QueueAction::Exit => "exit",
            };
            let sim_datetime = self.sim_start.plus_minutes(activity.sim_time).to_iso8601();
            if let Err(e) = self.events.record_queue_activity(
                &activity.queue_name,
                &Value::Text(activity.entity_id.clone()),
                &activity.entity_table,
                action,
                activity.sim_time,
                &sim_datetime,
                activity.priority,
                activity.length_before,
                activity.length_after,
                activity.wait_time,
            ) {
                log::warn!("failed to record queue activity: {e}");
            }
        }
    }
}

/// Runs every registered + dynamically-spawned task to completion or halt,
/// re-checking the termination formula after each dispatch (`spec.md` §4.11
/// "evaluated whenever the simulation state changes").
pub fn run_to_completion(
    world: &mut World,
    scheduler: &mut Scheduler,
    tasks: &mut HashMap<TaskId, Box<dyn SimTask<World>>>,
    termination: &Expr,
) {
    loop {
        for (id, task, delay) in world.take_spawns() {
            tasks.insert(id, task);
            scheduler.schedule_after(id, delay);
        }
        if scheduler.is_halted() {
            break;
        }
        let Some(id) = scheduler.next_runnable() else {
            break;
        };
        let Some(mut task) = tasks.remove(&id) else {
            continue;
        };
        match task.resume(world, scheduler) {
            TaskOutcome::Done => scheduler.task_finished(id),
            TaskOutcome::Suspend(WakeAt::Delay(dt)) => {
                scheduler.schedule_after(id, dt);
                tasks.insert(id, task);
            }
            TaskOutcome::Suspend(WakeAt::Parked) => {
                tasks.insert(id, task);
            }
            TaskOutcome::Suspend(WakeAt::ChildDone(child)) => {
                scheduler.wait_for(id, child);
                tasks.insert(id, task);
            }
        }
        world.flush_queue_activity();
        let now = scheduler.now();
        let entity_counts = |table: Option<&str>| world.entity_count(table);
        let event_count = |_: Option<&str>| world.events.total_events();
        let ctx = TerminationContext {
            now,
            base_time_unit: world.sim_config.base_time_unit,
            entity_counts: &entity_counts,
            event_count: &event_count,
        };
        if let Some(reason) = termination::evaluate(termination, &ctx) {
            scheduler.halt(reason);
            break;
        }
    }
}

/// C11's heartbeat: re-arms every 1 virtual minute forever, with no side
/// effects of its own (`spec.md` §5: "`delay(Δ)` inside Create/Event/
/// termination-monitor (1 virtual minute polling interval)";
/// `original_source/.../lifecycle/termination.py`'s `while True: yield
/// env.timeout(1.0)`). `run_to_completion` re-evaluates the termination
/// formula after *every* dispatch regardless of which task ran it, so this
/// task exists purely to keep virtual time advancing — and the scheduler
/// out of idle deadlock — when every entity-driven task is parked or has
/// finished before the termination condition is otherwise reached (e.g. a
/// `Create(max=N)` arrival that drains before a `TIME(...)` limit).
pub struct TerminationMonitorTask;

impl<'cfg> SimTask<World<'cfg>> for TerminationMonitorTask {
    fn resume(&mut self, _world: &mut World<'cfg>, _scheduler: &mut Scheduler) -> TaskOutcome {
        TaskOutcome::Suspend(WakeAt::Delay(1.0))
    }
}

/// One per `EntityArrivalConfig`: samples interarrival time, creates an
/// entity, and starts its flow (`spec.md` §4.5 entity arrivals, §4.10).
pub struct ArrivalTask {
    arrival_index: usize,
}

impl ArrivalTask {
    pub fn new(arrival_index: usize) -> Self {
        ArrivalTask { arrival_index }
    }
}

impl<'cfg> SimTask<World<'cfg>> for ArrivalTask {
    fn resume(&mut self, world: &mut World<'cfg>, scheduler: &mut Scheduler) -> TaskOutcome {
        let arrival = world.sim_config.arrivals[self.arrival_index].clone();
        if let Some(max) = arrival.max_entities {
            if world.entity_count(Some(&arrival.entity_table)) >= max {
                return TaskOutcome::Done;
            }
        }

        let now = scheduler.now();
        match world
            .entities
            .create(&mut *world.store, &mut world.dist, &mut *world.gen, &arrival.entity_table, None, world.sim_start, now)
        {
            Ok(pk) => {
                world.record_entity_created(&arrival.entity_table);
                if let Some(flow) = world.flow_for(&arrival.entity_table).cloned() {
                    let first_step = flow
                        .steps
                        .get(&flow.start_step)
                        .and_then(|s| s.next_steps().first().cloned());
                    if let Some(step_id) = first_step {
                        let task_id = world.new_task_id();
                        let runner = Box::new(FlowRunnerTask::new(task_id, pk, arrival.entity_table.clone(), flow.name.clone(), step_id));
                        world.spawn(task_id, runner, 0.0);
                    } else {
                        log::warn!("flow '{}' has no step after Create; created entity never runs", flow.name);
                    }
                } else {
                    log::warn!("no flow declared for entity table '{}'", arrival.entity_table);
                }
            }
            Err(e) => {
                log::error!("entity creation failed for '{}': {e}", arrival.entity_table);
                scheduler.halt(format!("entity creation failed: {e}"));
                return TaskOutcome::Done;
            }
        }

        match world.dist.sample_one(&arrival.interarrival.formula) {
            Ok(v) => {
                let sampled = v.as_f64().unwrap_or(0.0).max(0.0);
                let minutes = world.sim_config.base_time_unit.to_minutes(sampled);
                TaskOutcome::Suspend(WakeAt::Delay(minutes))
            }
            Err(e) => {
                log::error!("interarrival sampling failed: {e}");
                scheduler.halt(format!("interarrival sampling failed: {e}"));
                TaskOutcome::Done
            }
        }
    }
}

/// A single resource unit to acquire, expanded from a `ResourceRequirement`'s
/// `count` (`spec.md` §3 "Resource Requirement").
#[derive(Clone)]
struct UnitRequest {
    resource_table: String,
    type_value: String,
}

/// `spec.md` §4.9 Decide step. `Probability` mirrors
/// `original_source/step_processors/decide_processor.py::_evaluate_probability_decision`:
/// one outcome is always taken, two outcomes draw against the first
/// outcome's probability (default 0.5), and three-or-more normalise weights
/// (uniform if every weight is zero) before a cumulative draw. `Condition`
/// is the unimplemented placeholder `spec.md` names: log a warning and take
/// the first outcome.
fn evaluate_decision(decision_type: DecisionType, outcomes: &[DecisionOutcome], dist: &mut DistributionEngine) -> Option<String> {
    if outcomes.is_empty() {
        return None;
    }
    match decision_type {
        DecisionType::Condition => {
            log::warn!("decide step uses decision_type=condition, which is not implemented; choosing first outcome");
            Some(outcomes[0].next_step_id.clone())
        }
        DecisionType::Probability if outcomes.len() == 1 => Some(outcomes[0].next_step_id.clone()),
        DecisionType::Probability => {
            let draw = dist.sample_one("RAND()").ok().and_then(|v| v.as_f64()).unwrap_or(0.0);
            if outcomes.len() == 2 {
                let has_probability = outcomes[0].conditions.iter().any(|c| c.condition_type == "probability");
                let p = if has_probability { outcomes[0].probability() } else { 0.5 };
                return Some(if draw <= p { outcomes[0].next_step_id.clone() } else { outcomes[1].next_step_id.clone() });
            }
            let raw: Vec<f64> = outcomes.iter().map(|o| o.probability()).collect();
            let total: f64 = raw.iter().sum();
            let weights: Vec<f64> = if total <= 0.0 {
                vec![1.0 / outcomes.len() as f64; outcomes.len()]
            } else {
                raw.iter().map(|p| p / total).collect()
            };
            let mut cumulative = 0.0;
            for (outcome, weight) in outcomes.iter().zip(weights.iter()) {
                cumulative += weight;
                if draw <= cumulative {
                    return Some(outcome.next_step_id.clone());
                }
            }
            outcomes.last().map(|o| o.next_step_id.clone())
        }
    }
}

fn resolve_requirements(reqs: &[ResourceRequirement], dist: &mut DistributionEngine) -> Vec<UnitRequest> {
    let mut out = Vec::new();
    for req in reqs {
        let count = match &req.count {
            CountSpec::Literal(n) => *n,
            CountSpec::Formula(formula) => dist
                .sample_one(&formula.formula)
                .ok()
                .and_then(|v| v.as_f64())
                .map(|f| f.round().max(1.0) as u32)
                .unwrap_or(1),
        };
        for _ in 0..count.max(1) {
            out.push(UnitRequest {
                resource_table: req.resource_table.clone(),
                type_value: req.value.clone(),
            });
        }
    }
    out
}

enum Phase {
    Enter,
    Acquiring {
        event: EventStepConfig,
        event_id: Value,
        next: Option<String>,
        requests: Vec<UnitRequest>,
        idx: usize,
        acquired: Vec<ResourceKey>,
    },
    InService {
        acquired: Vec<ResourceKey>,
        allocation_key: String,
        event_id: Value,
        event_name: String,
        start_time: f64,
        next: Option<String>,
    },
}

/// C10 Flow Runner: one live task per entity, walking its flow's step graph
/// (`spec.md` §4.10). Suspends at `Event` (acquire → hold → release) steps;
/// `Assign`/`Decide` execute inline within one `resume` call.
pub struct FlowRunnerTask {
    task_id: TaskId,
    entity_id: Value,
    entity_table: String,
    flow_name: String,
    step_id: String,
    phase: Phase,
}

impl FlowRunnerTask {
    pub fn new(task_id: TaskId, entity_id: Value, entity_table: String, flow_name: String, step_id: String) -> Self {
        FlowRunnerTask {
            task_id,
            entity_id,
            entity_table,
            flow_name,
            step_id,
            phase: Phase::Enter,
        }
    }

    fn advance(&mut self, next: Option<String>) -> bool {
        match next {
            Some(step_id) => {
                self.step_id = step_id;
                true
            }
            None => false,
        }
    }

    fn entity_id_string(&self) -> String {
        self.entity_id.to_string()
    }

    /// `spec.md` §4.9 Event step steps 1-2. Resolves the event table's
    /// relationship and event-type columns via C3 and inserts a row,
    /// returning its primary key for use as the `event_id` half of
    /// `allocation_key` (`spec.md` §4.10: `flow_id + ":" + event_id`). Logs
    /// and continues (rather than aborting the step) when no event table is
    /// declared or column resolution fails, since resource acquisition
    /// doesn't depend on it; callers fall back to the step id in that case.
    fn create_event_row(&self, world: &mut World, event: &EventStepConfig) -> Option<Value> {
        let event_table = world.event_table_name().map(|s| s.to_string())?;
        let relationship_column = match world.resolver.resolve(&event_table, ColumnRole::EventId) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("event step '{}' could not resolve relationship column on '{event_table}': {e}", event.name);
                return None;
            }
        };
        let event_type_column = match world.resolver.resolve(&event_table, ColumnRole::EventType) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("event step '{}' could not resolve event_type column on '{event_table}': {e}", event.name);
                return None;
            }
        };
        match world.entities.create_event_row(
            &mut *world.store,
            &mut world.dist,
            &mut *world.gen,
            &event_table,
            &relationship_column,
            &event_type_column,
            &self.entity_id,
            &event.name,
        ) {
            Ok(pk) => Some(pk),
            Err(e) => {
                log::warn!("event step '{}' failed to insert event row into '{event_table}': {e}", event.name);
                None
            }
        }
    }
}

impl<'cfg> SimTask<World<'cfg>> for FlowRunnerTask {
    fn resume(&mut self, world: &mut World<'cfg>, scheduler: &mut Scheduler) -> TaskOutcome {
        loop {
            match &mut self.phase {
                Phase::Enter => {
                    let step = match world
                        .flow_for(&self.entity_table)
                        .and_then(|f| f.steps.get(&self.step_id))
                        .cloned()
                    {
                        Some(s) => s,
                        None => {
                            log::error!("flow runner for '{}' referenced unknown step '{}'", self.entity_table, self.step_id);
                            return TaskOutcome::Done;
                        }
                    };
                    match step {
                        StepConfig::Create { next_steps } => {
                            if !self.advance(next_steps.first().cloned()) {
                                return TaskOutcome::Done;
                            }
                        }
                        StepConfig::Release => {
                            let now = scheduler.now();
                            world.resources.release_all_groups_for_entity(&self.entity_id_string(), now, &mut world.queues, scheduler);
                            return TaskOutcome::Done;
                        }
                        StepConfig::Assign { assign, next_steps } => {
                            match world.dist.sample_one(&assign.value.formula) {
                                Ok(value) => {
                                    if let Err(e) = world.entities.update_attr(
                                        &mut *world.store,
                                        &self.entity_table,
                                        &self.entity_id,
                                        &assign.attribute,
                                        value,
                                    ) {
                                        log::warn!("assign step failed to persist '{}': {e}", assign.attribute);
                                    }
                                }
                                Err(e) => log::warn!("assign step sampling failed: {e}"),
                            }
                            if !self.advance(next_steps.first().cloned()) {
                                return TaskOutcome::Done;
                            }
                        }
                        StepConfig::Decide { decision_type, outcomes } => {
                            let chosen = evaluate_decision(decision_type, &outcomes, &mut world.dist);
                            if !self.advance(chosen) {
                                return TaskOutcome::Done;
                            }
                        }
                        StepConfig::Event { event, next_steps } => {
                            let event_id = self
                                .create_event_row(world, &event)
                                .unwrap_or_else(|| Value::Text(self.step_id.clone()));
                            let requests = resolve_requirements(&event.resource_requirements, &mut world.dist);
                            self.phase = Phase::Acquiring {
                                event,
                                event_id,
                                next: next_steps.first().cloned(),
                                requests,
                                idx: 0,
                                acquired: Vec::new(),
                            };
                        }
                    }
                }
                Phase::Acquiring {
                    event,
                    event_id,
                    next,
                    requests,
                    idx,
                    acquired,
                } => {
                    if let Some(key) = world.resources.take_grant(self.task_id) {
                        acquired.push(key);
                        *idx += 1;
                    }
                    if *idx >= requests.len() {
                        let acquired = std::mem::take(acquired);
                        let allocation_key = format!("{}:{}", self.flow_name, event_id);
                        let event_id = event_id.clone();
                        let event_name = event.name.clone();
                        world.resources.commit_allocation(allocation_key.clone(), acquired.clone());
                        let sampled = world
                            .dist
                            .sample_one(&event.duration.formula)
                            .ok()
                            .and_then(|v| v.as_f64())
                            .unwrap_or(0.0)
                            .max(0.0);
                        let dt = world.sim_config.base_time_unit.to_minutes(sampled);
                        let start_time = scheduler.now();
                        self.phase = Phase::InService {
                            acquired,
                            allocation_key,
                            event_id,
                            event_name,
                            start_time,
                            next: next.take(),
                        };
                        return TaskOutcome::Suspend(WakeAt::Delay(dt));
                    }
                    let req = requests[*idx].clone();
                    let now = scheduler.now();
                    let pk_column = match world.resolver.resolve(&self.entity_table, ColumnRole::Pk) {
                        Ok(c) => c,
                        Err(e) => {
                            log::error!("column resolution failed: {e}");
                            return TaskOutcome::Done;
                        }
                    };
                    let attrs = world
                        .store
                        .fetch_row(&self.entity_table, &pk_column, &self.entity_id)
                        .unwrap_or_default();
                    let entity_id_str = self.entity_id_string();
                    match world.resources.attempt_acquire(
                        self.task_id,
                        &req.resource_table,
                        &req.type_value,
                        event.queue.as_deref(),
                        (&entity_id_str, &self.entity_table, &attrs),
                        &mut world.queues,
                        now,
                    ) {
                        Ok(AcquireAttempt::Granted(key)) => {
                            acquired.push(key);
                            *idx += 1;
                        }
                        Ok(AcquireAttempt::Parked) => return TaskOutcome::Suspend(WakeAt::Parked),
                        Err(e) => {
                            log::error!("resource acquisition failed: {e}");
                            return TaskOutcome::Done;
                        }
                    }
                }
                Phase::InService {
                    acquired,
                    allocation_key,
                    event_id,
                    event_name,
                    start_time,
                    next,
                } => {
                    let now = scheduler.now();
                    let start_time = *start_time;
                    let next = next.take();
                    let start_dt = world.sim_start.plus_minutes(start_time).to_iso8601();
                    let end_dt = world.sim_start.plus_minutes(now).to_iso8601();
                    let event_id = event_id.clone();

                    let released = world
                        .resources
                        .release(allocation_key, now, &mut world.queues, scheduler)
                        .unwrap_or_else(|_| std::mem::take(acquired));

                    for key in &released {
                        if let Err(e) = world.events.record_resource_allocation(
                            &self.flow_name,
                            &event_id,
                            &key.table,
                            &Value::Text(key.id.clone()),
                            start_time,
                            now,
                            &start_dt,
                            &end_dt,
                            &self.entity_id,
                            &self.entity_table,
                            event_name,
                        ) {
                            log::warn!("failed to record resource allocation: {e}");
                        }
                    }
                    if let Err(e) =
                        world
                            .events
                            .record_event_processing(&self.flow_name, &event_id, &self.entity_id, &self.entity_table, start_time, now, &start_dt, &end_dt)
                    {
                        log::warn!("failed to record event processing: {e}");
                    }

                    self.phase = Phase::Enter;
                    if !self.advance(next) {
                        return TaskOutcome::Done;
                    }
                }
            }
        }
    }
}
