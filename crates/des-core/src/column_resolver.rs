//! C3 Column Resolver: semantic role -> concrete column name.
//!
//! `spec.md` §4.3: given a table and a role in `{pk, entity_id, resource_id,
//! event_id, event_type}`, scan the table's attribute list for the first
//! attribute whose type equals that role. Parameterised types like
//! `decimal(10,2)` match on the base name before `(`. No conventional
//! fallbacks; memoised per `(table, role)`.

use std::cell::RefCell;
use std::collections::HashMap;

use des_domain::DatabaseConfig;

use crate::errors::CoreError;

/// The five semantic roles the spec names explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnRole {
    Pk,
    EntityId,
    ResourceId,
    EventId,
    EventType,
}

impl ColumnRole {
    fn as_str(self) -> &'static str {
        match self {
            ColumnRole::Pk => "pk",
            ColumnRole::EntityId => "entity_id",
            ColumnRole::ResourceId => "resource_id",
            ColumnRole::EventId => "event_id",
            ColumnRole::EventType => "event_type",
        }
    }
}

/// Strips parameterisation (`decimal(10,2)` -> `decimal`) before comparing
/// a column's declared type against a role name.
fn base_type(column_type: &str) -> &str {
    column_type.split('(').next().unwrap_or(column_type).trim()
}

pub struct ColumnResolver<'a> {
    config: &'a DatabaseConfig,
    cache: RefCell<HashMap<(String, ColumnRole), String>>,
}

impl<'a> ColumnResolver<'a> {
    pub fn new(config: &'a DatabaseConfig) -> Self {
        ColumnResolver {
            config,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Resolves `role` on `table`. Checks the table's explicit
    /// `column_roles` override map first (so config authors can disambiguate
    /// when more than one attribute could plausibly carry a role), then
    /// scans attribute types for an exact (post-parameterisation-stripping)
    /// match. Never guesses a conventional name like `id`.
    pub fn resolve(&self, table: &str, role: ColumnRole) -> Result<String, CoreError> {
        let key = (table.to_string(), role);
        if let Some(hit) = self.cache.borrow().get(&key) {
            return Ok(hit.clone());
        }
        let table_cfg = self.config.table(table).ok_or_else(|| CoreError::MissingColumnMapping {
            table: table.to_string(),
            role: role.as_str().to_string(),
        })?;
        if let Some(column) = table_cfg.column_roles.get(role.as_str()) {
            self.cache.borrow_mut().insert(key, column.clone());
            return Ok(column.clone());
        }
        let found = table_cfg.attributes.iter().find(|attr| {
            attr.column_type
                .as_deref()
                .map(|t| base_type(t).eq_ignore_ascii_case(role.as_str()))
                .unwrap_or(false)
                || (role == ColumnRole::Pk && attr.is_primary_key)
        });
        let column = found
            .map(|attr| attr.name.clone())
            .ok_or_else(|| CoreError::MissingColumnMapping {
                table: table.to_string(),
                role: role.as_str().to_string(),
            })?;
        self.cache.borrow_mut().insert(key, column.clone());
        Ok(column)
    }
}
