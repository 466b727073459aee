mod row;

pub use row::{FromRow, Row};

use std::time::Duration;

/// Outcome of one executed request.
///
/// Statements that return rows fill `rows` (and `rows_affected` counts
/// them); DML statements fill `rows_affected` and, when at least one row
/// changed, `last_insert_rowid`. `elapsed` is the driver-side execution
/// time.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub rows_affected: usize,
    pub last_insert_rowid: Option<i64>,
    pub elapsed: Duration,
}

impl QueryResult {
    /// First row of the result, if any.
    #[must_use]
    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }
}
