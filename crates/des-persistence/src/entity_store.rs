//! C4 Persistence Adapter: `des_core::store::EntityStore` over a single
//! `rusqlite` connection.

use std::collections::BTreeMap;

use des_core::errors::CoreError;
use des_core::resource::{Resource, ResourceKey};
use des_core::store::EntityStore;
use des_core::value::{AttributeMap, Value};
use des_domain::DatabaseConfig;
use rusqlite::Connection;

use crate::error::PersistenceError;
use crate::migrations::ensure_schema;
use crate::value_conv::{value_from_ref, SqlValue};

pub struct SqliteEntityStore {
    conn: Option<Connection>,
}

impl SqliteEntityStore {
    /// Opens (or creates) the sqlite file at `db_config.db_path` and runs
    /// the idempotent schema bootstrap before handing back the store.
    pub fn open(db_config: &DatabaseConfig) -> Result<Self, PersistenceError> {
        let conn = if db_config.db_path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(&db_config.db_path)?
        };
        ensure_schema(&conn, db_config)?;
        Ok(SqliteEntityStore { conn: Some(conn) })
    }

    fn conn(&self) -> Result<&Connection, CoreError> {
        self.conn
            .as_ref()
            .ok_or_else(|| CoreError::Store("entity store connection already closed".to_string()))
    }
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

impl EntityStore for SqliteEntityStore {
    fn insert(&mut self, table: &str, pk_column: &str, columns: &AttributeMap) -> Result<Value, CoreError> {
        let conn = self.conn()?;
        let names: Vec<&String> = columns.keys().collect();
        let placeholders: Vec<String> = (0..names.len()).map(|i| format!("?{}", i + 1)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(table),
            names.iter().map(|n| quote(n)).collect::<Vec<_>>().join(", "),
            placeholders.join(", ")
        );
        let params: Vec<SqlValue> = names.iter().map(|n| SqlValue(&columns[*n])).collect();
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
        conn.execute(&sql, param_refs.as_slice()).map_err(PersistenceError::from)?;

        if let Some(pk_value) = columns.get(pk_column) {
            return Ok(pk_value.clone());
        }
        Ok(Value::Integer(conn.last_insert_rowid()))
    }

    fn update(&mut self, table: &str, pk_column: &str, pk: &Value, columns: &AttributeMap) -> Result<u64, CoreError> {
        let conn = self.conn()?;
        let names: Vec<&String> = columns.keys().collect();
        let assignments: Vec<String> = names
            .iter()
            .enumerate()
            .map(|(i, n)| format!("{} = ?{}", quote(n), i + 1))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            quote(table),
            assignments.join(", "),
            quote(pk_column),
            names.len() + 1
        );
        let mut params: Vec<SqlValue> = names.iter().map(|n| SqlValue(&columns[*n])).collect();
        params.push(SqlValue(pk));
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
        let rows = conn.execute(&sql, param_refs.as_slice()).map_err(PersistenceError::from)?;
        Ok(rows as u64)
    }

    fn count_rows(&mut self, table: &str) -> Result<u64, CoreError> {
        let conn = self.conn()?;
        let sql = format!("SELECT COUNT(*) FROM {}", quote(table));
        let count: i64 = conn
            .query_row(&sql, [], |row| row.get(0))
            .map_err(PersistenceError::from)?;
        Ok(count as u64)
    }

    fn fetch_row(&mut self, table: &str, pk_column: &str, pk: &Value) -> Result<AttributeMap, CoreError> {
        let conn = self.conn()?;
        let sql = format!("SELECT * FROM {} WHERE {} = ?1", quote(table), quote(pk_column));
        let mut stmt = conn.prepare(&sql).map_err(PersistenceError::from)?;
        let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let row = stmt
            .query_row([SqlValue(pk)], |row| {
                let mut map = BTreeMap::new();
                for (i, name) in column_names.iter().enumerate() {
                    let value_ref = row.get_ref(i)?;
                    map.insert(name.clone(), value_from_ref(value_ref));
                }
                Ok(map)
            })
            .map_err(PersistenceError::from)?;
        Ok(row)
    }

    fn primary_keys(&mut self, table: &str) -> Result<Vec<Value>, CoreError> {
        let conn = self.conn()?;
        let db_config_pk = self.primary_key_column_for(table)?;
        let sql = format!("SELECT {} FROM {} ORDER BY rowid", quote(&db_config_pk), quote(table));
        let mut stmt = conn.prepare(&sql).map_err(PersistenceError::from)?;
        let rows = stmt
            .query_map([], |row| {
                let value_ref = row.get_ref(0)?;
                Ok(value_from_ref(value_ref))
            })
            .map_err(PersistenceError::from)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(PersistenceError::from)?);
        }
        Ok(out)
    }

    fn load_resources(&mut self, table: &str, pk_column: &str, type_column: &str) -> Result<Vec<Resource>, CoreError> {
        let conn = self.conn()?;
        let sql = format!("SELECT * FROM {}", quote(table));
        let mut stmt = conn.prepare(&sql).map_err(PersistenceError::from)?;
        let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let rows = stmt
            .query_map([], |row| {
                let mut map = BTreeMap::new();
                for (i, name) in column_names.iter().enumerate() {
                    let value_ref = row.get_ref(i)?;
                    map.insert(name.clone(), value_from_ref(value_ref));
                }
                Ok(map)
            })
            .map_err(PersistenceError::from)?;

        let mut resources = Vec::new();
        for row in rows {
            let attributes = row.map_err(PersistenceError::from)?;
            let id = attributes
                .get(pk_column)
                .map(|v| v.to_string())
                .ok_or_else(|| CoreError::Store(format!("resource table '{table}' has no '{pk_column}' column")))?;
            let resource_type = attributes
                .get(type_column)
                .map(|v| v.to_string())
                .unwrap_or_default();
            resources.push(Resource {
                key: ResourceKey { table: table.to_string(), id },
                resource_type,
                attributes,
            });
        }
        Ok(resources)
    }

    fn close(&mut self) -> Result<(), CoreError> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, err)| PersistenceError::from(err))?;
        }
        Ok(())
    }
}

impl SqliteEntityStore {
    /// `primary_keys` is called with a bare table name by the Entity
    /// Manager's foreign-key generator, which doesn't carry a
    /// `DatabaseConfig` reference; we fall back to sqlite's own
    /// `pragma table_info` rather than thread the config through.
    fn primary_key_column_for(&self, table: &str) -> Result<String, CoreError> {
        let conn = self.conn()?;
        let sql = format!("PRAGMA table_info({})", quote(table));
        let mut stmt = conn.prepare(&sql).map_err(PersistenceError::from)?;
        let mut rows = stmt.query([]).map_err(PersistenceError::from)?;
        while let Some(row) = rows.next().map_err(PersistenceError::from)? {
            let name: String = row.get(1).map_err(PersistenceError::from)?;
            let pk_flag: i64 = row.get(5).map_err(PersistenceError::from)?;
            if pk_flag == 1 {
                return Ok(name);
            }
        }
        Err(CoreError::Store(format!("table '{table}' has no primary key column")))
    }
}
