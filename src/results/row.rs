use std::collections::HashMap;
use std::sync::Arc;

use crate::error::WebSqlite3Error;
use crate::types::SqlValue;

/// A single result row: ordered values plus column names shared across the
/// whole result set.
///
/// Column-name lookups go through an index built once per statement. When a
/// query yields duplicate column names, the last occurrence wins.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<Vec<String>>,
    index: Arc<HashMap<String, usize>>,
    values: Vec<SqlValue>,
}

impl Row {
    pub(crate) fn new(
        columns: Arc<Vec<String>>,
        index: Arc<HashMap<String, usize>>,
        values: Vec<SqlValue>,
    ) -> Self {
        Self {
            columns,
            index,
            values,
        }
    }

    /// Build the name-to-position index for a column list. Later duplicates
    /// overwrite earlier ones, so lookups resolve to the last occurrence.
    pub(crate) fn build_index(columns: &[String]) -> HashMap<String, usize> {
        columns
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect()
    }

    /// Column names, in statement order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Get a value by column name, or `None` if the column is absent.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.index.get(column).and_then(|&i| self.values.get(i))
    }

    /// Get a value by position, or `None` if out of bounds.
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    /// All values, in column order.
    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Project this row into a user-defined record type.
    ///
    /// # Errors
    /// Propagates whatever `T::from_row` reports for missing or mistyped
    /// columns.
    pub fn project<T: FromRow>(&self) -> Result<T, WebSqlite3Error> {
        T::from_row(self)
    }
}

/// Conversion from a dynamic [`Row`] into a concrete record type.
pub trait FromRow: Sized {
    /// # Errors
    /// Implementations report missing or mistyped columns as
    /// `WebSqlite3Error::Query`.
    fn from_row(row: &Row) -> Result<Self, WebSqlite3Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row(columns: Vec<&str>, values: Vec<SqlValue>) -> Row {
        let columns: Vec<String> = columns.into_iter().map(str::to_string).collect();
        let index = Arc::new(Row::build_index(&columns));
        Row::new(Arc::new(columns), index, values)
    }

    #[test]
    fn lookup_by_name_and_index() {
        let row = sample_row(
            vec!["id", "name"],
            vec![SqlValue::Int(7), SqlValue::Text("x".into())],
        );
        assert_eq!(row.get("id").and_then(SqlValue::as_int), Some(7));
        assert_eq!(row.get_by_index(1).and_then(|v| v.as_text()), Some("x"));
        assert!(row.get("missing").is_none());
    }

    #[test]
    fn duplicate_column_names_resolve_to_last() {
        let row = sample_row(
            vec!["v", "v"],
            vec![SqlValue::Int(1), SqlValue::Int(2)],
        );
        assert_eq!(row.get("v").and_then(SqlValue::as_int), Some(2));
    }
}
