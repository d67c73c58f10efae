//! Schema bootstrap: every user-declared table from the loaded
//! `DatabaseConfig`, plus the three fixed engine-output tables
//! (`spec.md` §4.4/§6). Idempotent (`CREATE TABLE IF NOT EXISTS`), so both
//! the adapter's own connection and the Event Tracker's independent
//! connection to the same file can call it safely.

use des_domain::DatabaseConfig;
use rusqlite::Connection;

use crate::error::PersistenceError;
use crate::schema::{create_table_sql, SIM_EVENT_PROCESSING_DDL, SIM_QUEUE_ACTIVITY_DDL, SIM_RESOURCE_ALLOCATIONS_DDL};

/// WAL journaling (`spec.md` §4.4: "must use WAL journal mode") plus every
/// table the config declares and the three engine-output tables.
pub fn ensure_schema(conn: &Connection, db_config: &DatabaseConfig) -> Result<(), PersistenceError> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    for table in &db_config.tables {
        conn.execute(&create_table_sql(table), [])?;
    }
    conn.execute(SIM_EVENT_PROCESSING_DDL, [])?;
    conn.execute(SIM_RESOURCE_ALLOCATIONS_DDL, [])?;
    conn.execute(SIM_QUEUE_ACTIVITY_DDL, [])?;
    Ok(())
}
