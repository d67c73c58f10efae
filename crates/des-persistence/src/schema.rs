//! Dynamic DDL: translates a loaded `DatabaseConfig` into `CREATE TABLE`
//! statements, plus the three fixed engine-output tables `spec.md` §6
//! mandates regardless of what the config declares.

use des_domain::{AttributeConfig, TableConfig};

/// A column's declared `column_type` is either one of the five semantic
/// roles the Column Resolver matches on (`pk`, `entity_id`, `resource_id`,
/// `event_id`, `event_type`) or a SQL-ish scalar type. Either way we need a
/// concrete SQLite storage class to create the column with.
fn base_type(column_type: &str) -> String {
    column_type.split('(').next().unwrap_or(column_type).trim().to_ascii_lowercase()
}

fn is_role_type(base: &str) -> bool {
    matches!(base, "pk" | "entity_id" | "resource_id" | "event_id")
}

/// Role-typed id columns default to `INTEGER`, unless the column carries a
/// generator (`uuid`/`template`/`faker`), which produces text the adapter
/// must accept as-is rather than coerce.
fn sqlite_type_for(attr: &AttributeConfig) -> &'static str {
    let base = attr.column_type.as_deref().map(base_type).unwrap_or_default();
    if is_role_type(&base) {
        return if attr.generator.is_some() { "TEXT" } else { "INTEGER" };
    }
    match base.as_str() {
        "event_type" | "text" | "string" | "varchar" | "char" => "TEXT",
        "integer" | "int" | "bigint" | "smallint" => "INTEGER",
        "real" | "float" | "double" | "decimal" | "numeric" => "REAL",
        "boolean" | "bool" => "INTEGER",
        "datetime" | "timestamp" | "date" => "TEXT",
        _ => "TEXT",
    }
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub fn create_table_sql(table: &TableConfig) -> String {
    let mut columns: Vec<String> = Vec::new();
    for attr in &table.attributes {
        let sql_type = sqlite_type_for(attr);
        if attr.is_primary_key {
            if sql_type == "INTEGER" {
                columns.push(format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", quote(&attr.name)));
            } else {
                columns.push(format!("{} TEXT PRIMARY KEY", quote(&attr.name)));
            }
        } else {
            columns.push(format!("{} {}", quote(&attr.name), sql_type));
        }
    }
    for attr in &table.attributes {
        if attr.is_foreign_key {
            if let Some(reference) = &attr.references {
                let mut parts = reference.splitn(2, '.');
                let ref_table = parts.next().unwrap_or(reference);
                columns.push(format!("FOREIGN KEY ({}) REFERENCES {}", quote(&attr.name), quote(ref_table)));
            }
        }
    }
    format!("CREATE TABLE IF NOT EXISTS {} ({})", quote(&table.name), columns.join(", "))
}

/// `spec.md` §6's three engine-output tables, created in every run
/// regardless of what the config declares.
pub const SIM_EVENT_PROCESSING_DDL: &str = "CREATE TABLE IF NOT EXISTS sim_event_processing (\
    id INTEGER PRIMARY KEY AUTOINCREMENT, \
    event_flow TEXT NOT NULL, \
    event_id TEXT NOT NULL, \
    entity_id TEXT NOT NULL, \
    entity_table TEXT NOT NULL, \
    start_time REAL NOT NULL, \
    end_time REAL NOT NULL, \
    duration REAL NOT NULL, \
    start_datetime TEXT NOT NULL, \
    end_datetime TEXT NOT NULL\
)";

pub const SIM_RESOURCE_ALLOCATIONS_DDL: &str = "CREATE TABLE IF NOT EXISTS sim_resource_allocations (\
    id INTEGER PRIMARY KEY AUTOINCREMENT, \
    event_flow TEXT NOT NULL, \
    event_id TEXT NOT NULL, \
    resource_table TEXT NOT NULL, \
    resource_id TEXT NOT NULL, \
    allocation_time REAL NOT NULL, \
    release_time REAL NOT NULL, \
    allocation_datetime TEXT NOT NULL, \
    release_datetime TEXT NOT NULL, \
    entity_id TEXT NOT NULL, \
    entity_table TEXT NOT NULL\
)";

pub const SIM_QUEUE_ACTIVITY_DDL: &str = "CREATE TABLE IF NOT EXISTS sim_queue_activity (\
    id INTEGER PRIMARY KEY AUTOINCREMENT, \
    queue_name TEXT NOT NULL, \
    entity_id TEXT NOT NULL, \
    entity_table TEXT NOT NULL, \
    action TEXT NOT NULL, \
    sim_time REAL NOT NULL, \
    sim_datetime TEXT NOT NULL, \
    priority REAL, \
    length_before INTEGER NOT NULL, \
    length_after INTEGER NOT NULL, \
    wait_time REAL\
)";

/// A dynamically-reflected entity<->resource bridge table (`spec.md` §4.8),
/// created the first time the Event Tracker discovers one.
pub fn bridge_table_sql(table: &str, entity_fk_column: &str, resource_fk_column: &str, event_type_column: Option<&str>) -> String {
    let mut columns = vec![
        "id INTEGER PRIMARY KEY AUTOINCREMENT".to_string(),
        format!("{} TEXT NOT NULL", quote(entity_fk_column)),
        format!("{} TEXT NOT NULL", quote(resource_fk_column)),
        "allocation_datetime TEXT NOT NULL".to_string(),
        "release_datetime TEXT NOT NULL".to_string(),
    ];
    if let Some(col) = event_type_column {
        columns.push(format!("{} TEXT", quote(col)));
    }
    format!("CREATE TABLE IF NOT EXISTS {} ({})", quote(table), columns.join(", "))
}
