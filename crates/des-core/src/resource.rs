//! Resource data model (`spec.md` §3 "Resource") and per-resource
//! utilisation bookkeeping.

use crate::value::AttributeMap;

/// Unique identity is `(table, id)` per `spec.md` §3.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub table: String,
    pub id: String,
}

#[derive(Debug, Clone)]
pub struct Resource {
    pub key: ResourceKey,
    /// The resource-type tag (e.g. "Cardiologist"), read from the
    /// auto-discovered type column (`spec.md` §4.6 / SPEC_FULL.md §12.6).
    pub resource_type: String,
    pub attributes: AttributeMap,
}

/// Per-resource utilisation tracking (`spec.md` §4.6).
#[derive(Debug, Clone, Default)]
pub struct UtilizationRecord {
    pub allocation_count: u64,
    pub total_busy_minutes: f64,
    pub last_allocated: Option<f64>,
    pub last_released: Option<f64>,
}

impl UtilizationRecord {
    /// `total_busy_time / T * 100`, folding in in-progress busy time if the
    /// resource is still allocated at `now` (`spec.md` §4.6).
    pub fn utilization_percent(&self, now: f64, currently_allocated: bool) -> f64 {
        if now <= 0.0 {
            return 0.0;
        }
        let mut busy = self.total_busy_minutes;
        if currently_allocated {
            if let Some(last) = self.last_allocated {
                busy += (now - last).max(0.0);
            }
        }
        (busy / now) * 100.0
    }
}

/// The candidate column names `spec.md` §4.6 calls "role-auto-discovered",
/// enumerated in full per SPEC_FULL.md §12.6 (`original_source`'s
/// `_find_resource_type_column`): first exact match wins, else first
/// substring match, else fall back to `"role"`.
pub const RESOURCE_TYPE_COLUMN_CANDIDATES: &[&str] =
    &["role", "type", "resource_type", "category", "skill", "position"];

pub fn find_resource_type_column(column_names: &[String]) -> String {
    for candidate in RESOURCE_TYPE_COLUMN_CANDIDATES {
        if column_names.iter().any(|c| c.eq_ignore_ascii_case(candidate)) {
            return (*candidate).to_string();
        }
    }
    for candidate in RESOURCE_TYPE_COLUMN_CANDIDATES {
        if let Some(hit) = column_names.iter().find(|c| c.to_lowercase().contains(candidate)) {
            return hit.clone();
        }
    }
    "role".to_string()
}
