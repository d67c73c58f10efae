//! Database schema configuration (the first of the two YAML inputs).
//!
//! Describes the tables the simulation creates in the output store: entity
//! tables, event tables, and resource tables, each with a column list and an
//! optional per-column generator. The Column Resolver (`des-core`) maps the
//! semantic roles (`pk`, `entity_id`, `event_id`, `resource_id`,
//! `event_type`) onto these concrete column names; this crate only models
//! the declaration, not the resolution.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::DomainError;
use crate::generator::GeneratorSpec;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeConfig {
    pub name: String,
    #[serde(default)]
    pub column_type: Option<String>,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default)]
    pub is_foreign_key: bool,
    /// Table this column references, when `is_foreign_key` is set.
    #[serde(default)]
    pub references: Option<String>,
    #[serde(default)]
    pub generator: Option<GeneratorSpec>,
}

/// A named semantic role a table can play (`entity`, `event`, `resource`),
/// used by the Column Resolver as a hint alongside explicit role mappings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Entity,
    Event,
    Resource,
    /// A declared entity↔resource link table, discovered by the Event
    /// Tracker (`spec.md` §4.8) rather than populated by Create steps.
    Bridge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,
    pub kind: TableKind,
    pub attributes: Vec<AttributeConfig>,
    /// Explicit semantic-role -> column-name overrides for this table, e.g.
    /// `{ event_type: "kind" }`. The Column Resolver consults this map
    /// first and never falls back to a guessed name.
    #[serde(default)]
    pub column_roles: HashMap<String, String>,
}

impl TableConfig {
    pub fn primary_key_column(&self) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.is_primary_key)
            .map(|a| a.name.as_str())
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::Validation("table name must not be empty".into()));
        }
        let pk_count = self.attributes.iter().filter(|a| a.is_primary_key).count();
        if pk_count != 1 {
            return Err(DomainError::Validation(format!(
                "table '{}' must declare exactly one primary key column, found {}",
                self.name, pk_count
            )));
        }
        for attr in &self.attributes {
            if let Some(gen) = &attr.generator {
                gen.validate()?;
            }
            if attr.is_foreign_key && attr.references.is_none() {
                return Err(DomainError::Validation(format!(
                    "column '{}.{}' is marked as a foreign key but has no 'references' table",
                    self.name, attr.name
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite file the simulation writes to; relative paths are
    /// resolved against the current working directory at load time.
    pub db_path: String,
    pub tables: Vec<TableConfig>,
}

impl DatabaseConfig {
    pub fn table(&self, name: &str) -> Option<&TableConfig> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn tables_of_kind(&self, kind: TableKind) -> impl Iterator<Item = &TableConfig> {
        self.tables.iter().filter(move |t| t.kind == kind)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.db_path.trim().is_empty() {
            return Err(DomainError::Validation("db_path must not be empty".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for table in &self.tables {
            table.validate()?;
            if !seen.insert(table.name.clone()) {
                return Err(DomainError::Validation(format!(
                    "duplicate table name '{}'",
                    table.name
                )));
            }
        }
        Ok(())
    }
}
