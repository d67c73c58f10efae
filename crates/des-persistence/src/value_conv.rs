//! `des_core::value::Value` <-> `rusqlite` storage-class conversions.

use des_core::value::Value;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::ToSql;

/// A thin wrapper so `Value` can be passed straight into `rusqlite::params!`
/// without `des-core` depending on `rusqlite` itself.
pub struct SqlValue<'a>(pub &'a Value);

impl ToSql for SqlValue<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self.0 {
            Value::Null => rusqlite::types::Value::Null,
            Value::Integer(i) => rusqlite::types::Value::Integer(*i),
            Value::Real(r) => rusqlite::types::Value::Real(*r),
            Value::Text(s) => rusqlite::types::Value::Text(s.clone()),
            Value::Boolean(b) => rusqlite::types::Value::Integer(if *b { 1 } else { 0 }),
            Value::DateTime(dt) => rusqlite::types::Value::Text(dt.to_iso8601()),
        };
        Ok(ToSqlOutput::Owned(value))
    }
}

/// Reads a column back as a `Value`. SQLite's dynamic typing means this is
/// necessarily lossy for `Boolean`/`DateTime` (both round-trip as
/// `Integer`/`Text`), which is fine: nothing downstream depends on the
/// distinction surviving a store round-trip, only on the `Display`able
/// literal.
pub fn value_from_ref(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(r) => Value::Real(r),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).to_string()),
        ValueRef::Blob(_) => Value::Null,
    }
}
