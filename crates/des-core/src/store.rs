//! Trait boundary between `des-core`'s simulation logic and the concrete
//! persistence/generator backends.
//!
//! `des-core` drives the simulation but never opens a database connection
//! or calls into the `fake` crate directly — it depends on these traits,
//! which `des-persistence` (C4 Persistence Adapter + C8 Event Tracker) and
//! `des-generators` (C5's faker/template dispatch) implement. This mirrors
//! how the teacher crate kept `chem-core::{EventStore, FlowRepository}` as
//! trait seams for `chem-persistence` to fill in.

use crate::errors::CoreError;
use crate::resource::Resource;
use crate::value::{AttributeMap, Value};

/// C4 Persistence Adapter: typed row insert/update/select against the
/// output store (`spec.md` §4.4), plus the one-time resource-table load C6
/// needs at start-up.
pub trait EntityStore {
    /// Inserts a row, returning the resolved primary-key value. `columns`
    /// excludes the PK column when the PK is store-autogenerated; includes
    /// it when the config supplies a custom generator (`spec.md` §4.5 step
    /// 2: "the value is generated up-front and supplied").
    fn insert(&mut self, table: &str, pk_column: &str, columns: &AttributeMap) -> Result<Value, CoreError>;

    fn update(&mut self, table: &str, pk_column: &str, pk: &Value, columns: &AttributeMap) -> Result<u64, CoreError>;

    /// Row count for a table, used by the Entity Manager's foreign-key
    /// generator and the Termination Evaluator's `ENTITIES(table, n)`.
    fn count_rows(&mut self, table: &str) -> Result<u64, CoreError>;

    /// Re-reads a single row, used by the Queue Manager when a
    /// `low_attribute`/`high_attribute` discipline needs an entity's current
    /// attribute value at enqueue time (`spec.md` §4.7).
    fn fetch_row(&mut self, table: &str, pk_column: &str, pk: &Value) -> Result<AttributeMap, CoreError>;

    /// All primary-key values currently in `table`, in insertion order —
    /// the candidate pool for a `foreign_key` generator.
    fn primary_keys(&mut self, table: &str) -> Result<Vec<Value>, CoreError>;

    /// Loads every row of a configured resource table into `Resource`
    /// objects for `ResourcePool::load` (`spec.md` §4.6).
    fn load_resources(&mut self, table: &str, pk_column: &str, type_column: &str) -> Result<Vec<Resource>, CoreError>;

    /// Releases the store's own connection/file handle deterministically
    /// (`spec.md` §4.4: "must release file handles deterministically so
    /// the file can be renamed/deleted on all platforms").
    fn close(&mut self) -> Result<(), CoreError>;
}

/// C8 Event Tracker: persists event-processing spans, resource-allocation
/// spans, queue activity, and the dynamic entity↔resource bridge rows
/// (`spec.md` §4.8).
pub trait EventLog {
    #[allow(clippy::too_many_arguments)]
    fn record_event_processing(
        &mut self,
        flow: &str,
        event_id: &Value,
        entity_id: &Value,
        entity_table: &str,
        start_time: f64,
        end_time: f64,
        start_datetime: &str,
        end_datetime: &str,
    ) -> Result<(), CoreError>;

    #[allow(clippy::too_many_arguments)]
    fn record_resource_allocation(
        &mut self,
        flow: &str,
        event_id: &Value,
        resource_table: &str,
        resource_id: &Value,
        allocation_time: f64,
        release_time: f64,
        allocation_datetime: &str,
        release_datetime: &str,
        entity_id: &Value,
        entity_table: &str,
        event_type: &str,
    ) -> Result<(), CoreError>;

    #[allow(clippy::too_many_arguments)]
    fn record_queue_activity(
        &mut self,
        queue_name: &str,
        entity_id: &Value,
        entity_table: &str,
        action: &str,
        sim_time: f64,
        sim_datetime: &str,
        priority: Option<f64>,
        length_before: usize,
        length_after: usize,
        wait_time: Option<f64>,
    ) -> Result<(), CoreError>;

    fn total_events(&self) -> u64;

    fn close(&mut self) -> Result<(), CoreError>;
}

/// C5's faker/template value-generation dispatch (`des-generators`). Kept as
/// a trait so `des-core` never depends on the `fake` crate directly.
pub trait ValueGenerator {
    fn faker(&mut self, method: &str) -> Result<Value, CoreError>;

    /// `row_index` is the count of existing rows, used so `{id}`-style
    /// placeholders in a template generator resolve deterministically
    /// (`spec.md` §4.5 step 2).
    fn template(&self, template: &str, row_index: u64, row: &AttributeMap) -> Result<Value, CoreError>;
}
