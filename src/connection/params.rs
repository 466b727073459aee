use rusqlite::ToSql;
use rusqlite::types::Value;

use crate::types::SqlValue;

/// Convert a single `SqlValue` into a driver value.
pub(crate) fn to_sqlite_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Int(i) => Value::Integer(*i),
        SqlValue::Float(f) => Value::Real(*f),
        SqlValue::Text(s) => Value::Text(s.clone()),
        SqlValue::Bool(b) => Value::Integer(i64::from(*b)),
        SqlValue::Timestamp(dt) => Value::Text(dt.format("%F %T%.f").to_string()),
        SqlValue::Null => Value::Null,
        SqlValue::Json(json) => Value::Text(json.to_string()),
        SqlValue::Blob(bytes) => Value::Blob(bytes.clone()),
    }
}

pub(crate) fn to_sqlite_values(params: &[SqlValue]) -> Vec<Value> {
    params.iter().map(to_sqlite_value).collect()
}

pub(crate) fn values_as_tosql(values: &[Value]) -> Vec<&dyn ToSql> {
    values.iter().map(|value| value as &dyn ToSql).collect()
}
