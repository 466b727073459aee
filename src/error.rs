use thiserror::Error;

/// Errors surfaced by the access layer.
///
/// Each failure mode maps to exactly one variant; nothing is retried
/// internally and no error is swallowed. Retry policy belongs to the caller.
#[derive(Debug, Error)]
pub enum WebSqlite3Error {
    /// Bad configuration file or field values (e.g. `min_size > max_size`).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The driver could not open or keep a database handle.
    #[error("connection error: {0}")]
    Connection(String),

    /// No connection became available before the deadline.
    #[error("pool exhausted: {0}")]
    PoolExhausted(String),

    /// The driver rejected a statement; the message is the driver's.
    #[error("query error: {0}")]
    Query(String),

    /// BEGIN/COMMIT/ROLLBACK failure, or use of an uninitialized client.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// A deadline elapsed at queue wait, pool acquisition, or execution.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The client or pool is shutting down; the request was cancelled.
    #[error("shutdown: {0}")]
    Shutdown(String),
}

impl From<rusqlite::Error> for WebSqlite3Error {
    fn from(err: rusqlite::Error) -> Self {
        WebSqlite3Error::Query(err.to_string())
    }
}

/// Whether a driver error means the handle itself is damaged, as opposed to
/// a plain SQL error on a still-usable connection.
pub(crate) fn is_connection_level(err: &rusqlite::Error) -> bool {
    match err.sqlite_error_code() {
        Some(code) => matches!(
            code,
            rusqlite::ErrorCode::CannotOpen
                | rusqlite::ErrorCode::NotADatabase
                | rusqlite::ErrorCode::DatabaseCorrupt
                | rusqlite::ErrorCode::DiskFull
                | rusqlite::ErrorCode::SystemIoFailure
        ),
        None => false,
    }
}
