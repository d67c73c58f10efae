//! Engine-wide constants.
//!
//! Grouped here because they participate in `definition_hash` computation:
//! changing `ENGINE_VERSION` is a deliberate way to invalidate cached
//! determinism checks across incompatible engine revisions.

/// Logical engine version folded into a `SimulationConfig`'s definition
/// hash, so a config hashed under one engine revision never silently
/// compares equal to one hashed under an incompatible revision.
pub const ENGINE_VERSION: &str = "D1.0";

/// Epsilon used when comparing virtual-time floating point values (branch
/// probability sums, termination `TIME` comparisons).
pub const TIME_EPSILON: f64 = 1e-9;

/// `original_source`'s distribution engine treats a sampled float within
/// this tolerance of an integer as that integer (day-count rounding).
pub const INTEGER_COERCION_EPSILON: f64 = 1e-5;
