//! C5 Entity Manager: entity creation with per-attribute value generation,
//! and batch attribute updates from flow steps (`spec.md` §4.5).

use std::collections::{HashMap, HashSet};

use des_domain::{AttributeConfig, DatabaseConfig, FlowConfig, GeneratorSpec, StepConfig};

use crate::column_resolver::{ColumnResolver, ColumnRole};
use crate::distribution::DistributionEngine;
use crate::errors::CoreError;
use crate::store::{EntityStore, ValueGenerator};
use crate::time::SimDateTime;
use crate::value::{AttributeMap, Value};

/// Table name -> set of attribute names written by some Assign step whose
/// flow targets that table. Pre-computed once at orchestrator start-up
/// (`spec.md` §4.5 last paragraph) so `create` knows which attributes to
/// leave `NULL` rather than generate.
pub type AssignedByFlow = HashMap<String, HashSet<String>>;

/// Scans every Assign step in every flow and maps each flow's entity table
/// to the attribute names its Assign steps write.
pub fn compute_assigned_by_flow(flows: &[FlowConfig]) -> AssignedByFlow {
    let mut out: AssignedByFlow = HashMap::new();
    for flow in flows {
        let entry = out.entry(flow.entity_table.clone()).or_default();
        for step in flow.steps.values() {
            if let StepConfig::Assign { assign, .. } = step {
                entry.insert(assign.attribute.clone());
            }
        }
    }
    out
}

fn is_datetime_like(column_type: Option<&str>) -> bool {
    column_type
        .map(|t| {
            let base = t.split('(').next().unwrap_or(t).trim().to_ascii_lowercase();
            base == "datetime" || base == "timestamp" || base == "date"
        })
        .unwrap_or(false)
}

pub struct EntityManager<'a> {
    db_config: &'a DatabaseConfig,
    resolver: ColumnResolver<'a>,
    assigned_by_flow: AssignedByFlow,
}

impl<'a> EntityManager<'a> {
    pub fn new(db_config: &'a DatabaseConfig, assigned_by_flow: AssignedByFlow) -> Self {
        EntityManager {
            db_config,
            resolver: ColumnResolver::new(db_config),
            assigned_by_flow,
        }
    }

    /// `spec.md` §4.5 `create()`. `sim_now` folds into any datetime-like
    /// attribute left unset by its generator (`simulation_start + now()`).
    pub fn create(
        &self,
        store: &mut dyn EntityStore,
        dist: &mut DistributionEngine,
        gen: &mut dyn ValueGenerator,
        table: &str,
        initial_data: Option<AttributeMap>,
        sim_start: SimDateTime,
        sim_now_minutes: f64,
    ) -> Result<Value, CoreError> {
        let table_cfg = self
            .db_config
            .table(table)
            .ok_or_else(|| CoreError::UnknownResourceTable(table.to_string()))?;
        let pk_column = self.resolver.resolve(table, ColumnRole::Pk)?;
        let row_index = store.count_rows(table)?;
        let assigned = self.assigned_by_flow.get(table);
        let initial = initial_data.unwrap_or_default();

        let mut row = AttributeMap::new();
        let mut pk_value: Option<Value> = None;

        for attr in &table_cfg.attributes {
            if attr.is_primary_key {
                if let Some(value) = self.generate_attr(attr, dist, gen, row_index, &row)? {
                    pk_value = Some(value);
                }
                continue;
            }
            if let Some(value) = initial.get(&attr.name) {
                row.insert(attr.name.clone(), value.clone());
                continue;
            }
            if assigned.map(|set| set.contains(&attr.name)).unwrap_or(false) {
                row.insert(attr.name.clone(), Value::Null);
                continue;
            }
            let mut value = if matches!(attr.generator, Some(GeneratorSpec::ForeignKey { .. })) {
                self.generate_foreign_key(attr, store, dist)?
            } else {
                self.generate_attr(attr, dist, gen, row_index, &row)?.unwrap_or(Value::Null)
            };
            if value.is_null() && is_datetime_like(attr.column_type.as_deref()) {
                value = Value::DateTime(sim_start.plus_minutes(sim_now_minutes));
            }
            row.insert(attr.name.clone(), value);
        }

        if let Some(pk) = pk_value {
            row.insert(pk_column.clone(), pk.clone());
            store.insert(table, &pk_column, &row)?;
            Ok(pk)
        } else {
            store.insert(table, &pk_column, &row)
        }
    }

    /// Dispatches everything except `foreign_key` (handled separately since
    /// it needs store access for the parent id pool). Returns `Ok(None)`
    /// when the attribute has no generator at all (left `NULL`).
    fn generate_attr(
        &self,
        attr: &AttributeConfig,
        dist: &mut DistributionEngine,
        gen: &mut dyn ValueGenerator,
        row_index: u64,
        row_so_far: &AttributeMap,
    ) -> Result<Option<Value>, CoreError> {
        match &attr.generator {
            None => Ok(None),
            Some(GeneratorSpec::SimulationEvent) => Ok(None),
            Some(GeneratorSpec::Faker { method }) => gen.faker(method).map(Some),
            Some(GeneratorSpec::Template { template }) => {
                gen.template(template, row_index, row_so_far).map(Some)
            }
            Some(GeneratorSpec::Distribution { formula }) => dist.sample_one(&formula.formula).map(Some),
            Some(GeneratorSpec::ForeignKey { .. }) => Ok(None),
        }
    }

    /// `spec.md` §4.5 step 3's foreign_key rule: empty parent table -> NULL;
    /// a numeric formula sample selects `value mod len(parents)`; otherwise
    /// (no formula, or a non-numeric sample) pick uniformly at random.
    fn generate_foreign_key(
        &self,
        attr: &AttributeConfig,
        store: &mut dyn EntityStore,
        dist: &mut DistributionEngine,
    ) -> Result<Value, CoreError> {
        let (parent_table, formula) = match &attr.generator {
            Some(GeneratorSpec::ForeignKey { table, formula, .. }) => (table, formula),
            _ => unreachable!("generate_foreign_key called on a non-foreign_key attribute"),
        };
        let parents = store.primary_keys(parent_table)?;
        if parents.is_empty() {
            return Ok(Value::Null);
        }
        let index = match formula {
            Some(spec) => match dist.sample_one(&spec.formula)? {
                Value::Integer(i) => (i.rem_euclid(parents.len() as i64)) as usize,
                Value::Real(r) => ((r.round() as i64).rem_euclid(parents.len() as i64)) as usize,
                _ => {
                    let draw = dist.sample_one("RAND()")?;
                    let frac = draw.as_f64().unwrap_or(0.0);
                    ((frac * parents.len() as f64) as usize).min(parents.len() - 1)
                }
            },
            None => {
                let draw = dist.sample_one("RAND()")?;
                let frac = draw.as_f64().unwrap_or(0.0);
                ((frac * parents.len() as f64) as usize).min(parents.len() - 1)
            }
        };
        Ok(parents[index].clone())
    }

    /// `spec.md` §4.9 Event step steps 1-2: inserts a row into the
    /// simulation's declared event table, carrying the relationship FK back
    /// to `entity_id`, `event_type` set to the step's name, and every other
    /// attribute generated the same way entity attributes are (skipping
    /// foreign keys and `simulation_event`-generated columns, matching
    /// `original_source`'s `_generate_event_attributes`). Returns the new
    /// row's primary key.
    #[allow(clippy::too_many_arguments)]
    pub fn create_event_row(
        &self,
        store: &mut dyn EntityStore,
        dist: &mut DistributionEngine,
        gen: &mut dyn ValueGenerator,
        event_table: &str,
        relationship_column: &str,
        event_type_column: &str,
        entity_id: &Value,
        event_type: &str,
    ) -> Result<Value, CoreError> {
        let table_cfg = self
            .db_config
            .table(event_table)
            .ok_or_else(|| CoreError::UnknownResourceTable(event_table.to_string()))?;
        let pk_column = self.resolver.resolve(event_table, ColumnRole::Pk)?;
        let row_index = store.count_rows(event_table)?;

        let mut row = AttributeMap::new();
        row.insert(relationship_column.to_string(), entity_id.clone());
        row.insert(event_type_column.to_string(), Value::Text(event_type.to_string()));

        for attr in &table_cfg.attributes {
            if attr.is_primary_key || attr.is_foreign_key || row.contains_key(&attr.name) {
                continue;
            }
            if let Some(value) = self.generate_attr(attr, dist, gen, row_index, &row)? {
                row.insert(attr.name.clone(), value);
            }
        }

        store.insert(event_table, &pk_column, &row)
    }

    pub fn update_attr(
        &self,
        store: &mut dyn EntityStore,
        table: &str,
        pk: &Value,
        column: &str,
        value: Value,
    ) -> Result<(), CoreError> {
        let pk_column = self.resolver.resolve(table, ColumnRole::Pk)?;
        let mut columns = AttributeMap::new();
        columns.insert(column.to_string(), value);
        store.update(table, &pk_column, pk, &columns)?;
        Ok(())
    }

    pub fn batch_update(
        &self,
        store: &mut dyn EntityStore,
        table: &str,
        pk: &Value,
        columns: &AttributeMap,
    ) -> Result<(), CoreError> {
        let pk_column = self.resolver.resolve(table, ColumnRole::Pk)?;
        store.update(table, &pk_column, pk, columns)?;
        Ok(())
    }
}
