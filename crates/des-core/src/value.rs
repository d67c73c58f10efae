//! Dynamically-typed scalar used for entity/resource/event attribute maps.
//!
//! `spec.md` §9's design notes call for "a column-resolved typed row map
//! keyed by column name, with value as a sum-type scalar" since per-table
//! schemas are only known from config, not at compile time. `Value` is that
//! sum type.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::time::SimDateTime;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Boolean(bool),
    DateTime(SimDateTime),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(r) => Some(*r),
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::DateTime(dt) => write!(f, "{}", dt.to_iso8601()),
        }
    }
}

/// A row's attribute map, ordered by column name for deterministic
/// persistence and snapshot comparisons (queue entries store a copy of this
/// for priority extraction).
pub type AttributeMap = BTreeMap<String, Value>;
