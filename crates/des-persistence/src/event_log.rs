//! C8 Event Tracker: `des_core::store::EventLog` over its own `rusqlite`
//! connection to the same file `SqliteEntityStore` writes to, plus the
//! dynamic entity<->resource bridge-table discovery `spec.md` §4.8
//! describes.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use des_core::errors::CoreError;
use des_core::store::EventLog;
use des_core::value::Value;
use des_domain::{DatabaseConfig, TableKind};
use rusqlite::Connection;

use crate::error::PersistenceError;
use crate::migrations::ensure_schema;
use crate::schema::bridge_table_sql;
use crate::value_conv::SqlValue;

/// A discovered bridge table's concrete column names, cached per
/// `(entity_table, resource_table)` pair so repeated allocations in the
/// same run don't re-scan the config.
#[derive(Clone)]
struct BridgeInfo {
    table: String,
    entity_fk_column: String,
    resource_fk_column: String,
    event_type_column: Option<String>,
}

pub struct SqliteEventLog {
    conn: Option<Connection>,
    db_config: DatabaseConfig,
    events_recorded: Cell<u64>,
    bridge_cache: RefCell<HashMap<(String, String), Option<BridgeInfo>>>,
    bridge_tables_created: RefCell<std::collections::HashSet<String>>,
}

impl SqliteEventLog {
    /// Keeps a clone of `db_config` around: the bridge-discovery scan
    /// (`spec.md` §4.8) happens lazily inside `record_resource_allocation`,
    /// which the `EventLog` trait — shared with whatever other backend
    /// might implement it — doesn't carry a config parameter for.
    pub fn open(db_config: &DatabaseConfig) -> Result<Self, PersistenceError> {
        let conn = if db_config.db_path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(&db_config.db_path)?
        };
        ensure_schema(&conn, db_config)?;
        Ok(SqliteEventLog {
            conn: Some(conn),
            db_config: db_config.clone(),
            events_recorded: Cell::new(0),
            bridge_cache: RefCell::new(HashMap::new()),
            bridge_tables_created: RefCell::new(std::collections::HashSet::new()),
        })
    }

    fn conn(&self) -> Result<&Connection, CoreError> {
        self.conn
            .as_ref()
            .ok_or_else(|| CoreError::Store("event log connection already closed".to_string()))
    }

    /// Scans `db_config` for a `Bridge`-kind table carrying a foreign key
    /// into `entity_table` and another into `resource_table`; memoizes the
    /// result (including the absence of one) keyed on the table pair.
    fn find_bridge(&self, db_config: &DatabaseConfig, entity_table: &str, resource_table: &str) -> Option<BridgeInfo> {
        let key = (entity_table.to_string(), resource_table.to_string());
        if let Some(hit) = self.bridge_cache.borrow().get(&key) {
            return hit.clone();
        }
        let found = db_config.tables_of_kind(TableKind::Bridge).find_map(|table| {
            let entity_fk = table.attributes.iter().find(|a| {
                a.is_foreign_key
                    && a.references
                        .as_deref()
                        .map(|r| r.splitn(2, '.').next().unwrap_or(r) == entity_table)
                        .unwrap_or(false)
            })?;
            let resource_fk = table.attributes.iter().find(|a| {
                a.is_foreign_key
                    && a.name != entity_fk.name
                    && a.references
                        .as_deref()
                        .map(|r| r.splitn(2, '.').next().unwrap_or(r) == resource_table)
                        .unwrap_or(false)
            })?;
            let event_type_column = table
                .column_roles
                .get("event_type")
                .cloned()
                .or_else(|| table.attributes.iter().find(|a| a.column_type.as_deref() == Some("event_type")).map(|a| a.name.clone()));
            Some(BridgeInfo {
                table: table.name.clone(),
                entity_fk_column: entity_fk.name.clone(),
                resource_fk_column: resource_fk.name.clone(),
                event_type_column,
            })
        });
        self.bridge_cache.borrow_mut().insert(key, found.clone());
        found
    }

    fn ensure_bridge_table(&self, bridge: &BridgeInfo) -> Result<(), CoreError> {
        if self.bridge_tables_created.borrow().contains(&bridge.table) {
            return Ok(());
        }
        let conn = self.conn()?;
        let sql = bridge_table_sql(
            &bridge.table,
            &bridge.entity_fk_column,
            &bridge.resource_fk_column,
            bridge.event_type_column.as_deref(),
        );
        conn.execute(&sql, []).map_err(PersistenceError::from)?;
        self.bridge_tables_created.borrow_mut().insert(bridge.table.clone());
        Ok(())
    }

    fn insert_bridge_row(
        &self,
        bridge: &BridgeInfo,
        entity_id: &Value,
        resource_id: &Value,
        allocation_datetime: &str,
        release_datetime: &str,
        event_type: &str,
    ) -> Result<(), CoreError> {
        self.ensure_bridge_table(bridge)?;
        let conn = self.conn()?;
        let mut columns = vec![
            format!("\"{}\"", bridge.entity_fk_column),
            format!("\"{}\"", bridge.resource_fk_column),
            "\"allocation_datetime\"".to_string(),
            "\"release_datetime\"".to_string(),
        ];
        let mut values: Vec<SqlValue> = vec![SqlValue(entity_id), SqlValue(resource_id)];
        let allocation_value = Value::Text(allocation_datetime.to_string());
        let release_value = Value::Text(release_datetime.to_string());
        values.push(SqlValue(&allocation_value));
        values.push(SqlValue(&release_value));
        let event_type_value = Value::Text(event_type.to_string());
        if bridge.event_type_column.is_some() {
            columns.push(format!("\"{}\"", bridge.event_type_column.as_ref().unwrap()));
            values.push(SqlValue(&event_type_value));
        }
        let placeholders: Vec<String> = (0..columns.len()).map(|i| format!("?{}", i + 1)).collect();
        let sql = format!(
            "INSERT INTO \"{}\" ({}) VALUES ({})",
            bridge.table,
            columns.join(", "),
            placeholders.join(", ")
        );
        let param_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
        conn.execute(&sql, param_refs.as_slice()).map_err(PersistenceError::from)?;
        Ok(())
    }
}

impl EventLog for SqliteEventLog {
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
    ) -> Result<(), CoreError> {
        let conn = self.conn()?;
        let duration = end_time - start_time;
        let event_id_value = Value::Text(event_id.to_string());
        let entity_id_value = Value::Text(entity_id.to_string());
        conn.execute(
            "INSERT INTO sim_event_processing \
             (event_flow, event_id, entity_id, entity_table, start_time, end_time, duration, start_datetime, end_datetime) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                flow,
                event_id_value.to_string(),
                entity_id_value.to_string(),
                entity_table,
                start_time,
                end_time,
                duration,
                start_datetime,
                end_datetime
            ],
        )
        .map_err(PersistenceError::from)?;
        self.events_recorded.set(self.events_recorded.get() + 1);
        Ok(())
    }

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
    ) -> Result<(), CoreError> {
        {
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO sim_resource_allocations \
                 (event_flow, event_id, resource_table, resource_id, allocation_time, release_time, \
                  allocation_datetime, release_datetime, entity_id, entity_table) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    flow,
                    event_id.to_string(),
                    resource_table,
                    resource_id.to_string(),
                    allocation_time,
                    release_time,
                    allocation_datetime,
                    release_datetime,
                    entity_id.to_string(),
                    entity_table
                ],
            )
            .map_err(PersistenceError::from)?;
        }
        let db_config = self.db_config.clone();
        if let Some(bridge) = self.find_bridge(&db_config, entity_table, resource_table) {
            self.insert_bridge_row(&bridge, entity_id, resource_id, allocation_datetime, release_datetime, event_type)?;
        }
        Ok(())
    }

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
    ) -> Result<(), CoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sim_queue_activity \
             (queue_name, entity_id, entity_table, action, sim_time, sim_datetime, priority, \
              length_before, length_after, wait_time) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
                queue_name,
                entity_id.to_string(),
                entity_table,
                action,
                sim_time,
                sim_datetime,
                priority,
                length_before as i64,
                length_after as i64,
                wait_time
            ],
        )
        .map_err(PersistenceError::from)?;
        Ok(())
    }

    fn total_events(&self) -> u64 {
        self.events_recorded.get()
    }

    fn close(&mut self) -> Result<(), CoreError> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, err)| PersistenceError::from(err))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use des_domain::{AttributeConfig, TableConfig};
    use std::collections::HashMap as StdHashMap;

    fn config_with_bridge() -> DatabaseConfig {
        DatabaseConfig {
            db_path: ":memory:".to_string(),
            tables: vec![TableConfig {
                name: "visit_doctor".to_string(),
                kind: TableKind::Bridge,
                attributes: vec![
                    AttributeConfig {
                        name: "visit_id".to_string(),
                        column_type: Some("integer".to_string()),
                        is_primary_key: false,
                        is_foreign_key: true,
                        references: Some("visits.visit_id".to_string()),
                        generator: None,
                    },
                    AttributeConfig {
                        name: "doctor_id".to_string(),
                        column_type: Some("integer".to_string()),
                        is_primary_key: false,
                        is_foreign_key: true,
                        references: Some("doctors.doctor_id".to_string()),
                        generator: None,
                    },
                ],
                column_roles: StdHashMap::new(),
            }],
        }
    }

    #[test]
    fn record_event_processing_increments_total() {
        let config = config_with_bridge();
        let mut log = SqliteEventLog::open(&config).unwrap();
        assert_eq!(log.total_events(), 0);
        log.record_event_processing(
            "visit_flow",
            &Value::Integer(1),
            &Value::Integer(10),
            "visits",
            0.0,
            5.0,
            "2026-01-01T00:00:00",
            "2026-01-01T00:05:00",
        )
        .unwrap();
        assert_eq!(log.total_events(), 1);
    }

    #[test]
    fn finds_bridge_table_by_foreign_key_references() {
        let config = config_with_bridge();
        let log = SqliteEventLog::open(&config).unwrap();
        let bridge = log.find_bridge(&config, "visits", "doctors").unwrap();
        assert_eq!(bridge.table, "visit_doctor");
        assert_eq!(bridge.entity_fk_column, "visit_id");
        assert_eq!(bridge.resource_fk_column, "doctor_id");
    }

    #[test]
    fn no_bridge_found_for_unrelated_tables() {
        let config = config_with_bridge();
        let log = SqliteEventLog::open(&config).unwrap();
        assert!(log.find_bridge(&config, "patients", "nurses").is_none());
    }

    #[test]
    fn record_resource_allocation_populates_bridge_table() {
        let config = config_with_bridge();
        let mut log = SqliteEventLog::open(&config).unwrap();
        log.record_resource_allocation(
            "visit_flow",
            &Value::Integer(99),
            "doctors",
            &Value::Integer(2),
            0.0,
            5.0,
            "2026-01-01T00:00:00",
            "2026-01-01T00:05:00",
            &Value::Integer(1),
            "visits",
            "consultation",
        )
        .unwrap();
        let conn = log.conn.as_ref().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM visit_doctor", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
