use std::sync::Arc;

use rusqlite::Statement;
use rusqlite::types::Value;

use crate::results::Row;
use crate::types::SqlValue;

use super::params::values_as_tosql;

/// Extract one column of the current driver row as a `SqlValue`.
pub(crate) fn extract_value(row: &rusqlite::Row, idx: usize) -> Result<SqlValue, rusqlite::Error> {
    Ok(match row.get_ref(idx)? {
        rusqlite::types::ValueRef::Null => SqlValue::Null,
        rusqlite::types::ValueRef::Integer(i) => SqlValue::Int(i),
        rusqlite::types::ValueRef::Real(f) => SqlValue::Float(f),
        rusqlite::types::ValueRef::Text(bytes) => {
            SqlValue::Text(String::from_utf8_lossy(bytes).into_owned())
        }
        rusqlite::types::ValueRef::Blob(bytes) => SqlValue::Blob(bytes.to_vec()),
    })
}

/// Run a rows-returning statement and collect up to `limit` rows, sharing
/// the column names and lookup index across all of them.
pub(crate) fn collect_rows(
    stmt: &mut Statement<'_>,
    params: &[Value],
    limit: Option<usize>,
) -> Result<Vec<Row>, rusqlite::Error> {
    let columns: Vec<String> = stmt
        .column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    let index = Arc::new(Row::build_index(&columns));
    let columns = Arc::new(columns);
    let column_count = columns.len();

    let param_refs = values_as_tosql(params);
    let mut driver_rows = stmt.query(&param_refs[..])?;
    let mut rows = Vec::new();
    while let Some(driver_row) = driver_rows.next()? {
        if limit.is_some_and(|cap| rows.len() >= cap) {
            break;
        }
        let mut values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            values.push(extract_value(driver_row, i)?);
        }
        rows.push(Row::new(Arc::clone(&columns), Arc::clone(&index), values));
    }
    Ok(rows)
}
