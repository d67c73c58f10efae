//! Hash helpers, kept behind a narrow API so the algorithm can change
//! without touching callers.
//!
//! BLAKE3 today, for its speed and well-understood collision properties.

use crate::hashing::to_canonical_json;
use blake3::Hasher;
use serde_json::Value;

/// Hashes a string, returning hex.
pub fn hash_str(input: &str) -> String {
    let mut h = Hasher::new();
    h.update(input.as_bytes());
    h.finalize().to_hex().to_string()
}

/// Canonicalizes a JSON value, then hashes it.
pub fn hash_value(v: &Value) -> String {
    let canonical = to_canonical_json(v);
    hash_str(&canonical)
}
