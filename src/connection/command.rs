use tokio::sync::oneshot;

use crate::error::WebSqlite3Error;
use crate::results::QueryResult;
use crate::types::SqlValue;

/// The unit of work carried by a request: what to run and with which
/// arguments. `Execute` on a rows-returning statement still yields its rows.
#[derive(Debug, Clone)]
pub enum RequestKind {
    Execute {
        sql: String,
        params: Vec<SqlValue>,
    },
    ExecuteMany {
        sql: String,
        batches: Vec<Vec<SqlValue>>,
    },
    FetchOne {
        sql: String,
        params: Vec<SqlValue>,
    },
    FetchAll {
        sql: String,
        params: Vec<SqlValue>,
    },
    Begin,
    Commit,
    Rollback,
    /// A batch of semicolon-separated statements, run without parameters.
    Raw {
        sql: String,
    },
}

impl RequestKind {
    pub(crate) fn sql_text(&self) -> Option<&str> {
        match self {
            RequestKind::Execute { sql, .. }
            | RequestKind::ExecuteMany { sql, .. }
            | RequestKind::FetchOne { sql, .. }
            | RequestKind::FetchAll { sql, .. }
            | RequestKind::Raw { sql } => Some(sql),
            RequestKind::Begin | RequestKind::Commit | RequestKind::Rollback => None,
        }
    }

    pub(crate) fn is_transaction_control(&self) -> bool {
        matches!(
            self,
            RequestKind::Begin | RequestKind::Commit | RequestKind::Rollback
        )
    }
}

pub(crate) enum Command {
    Run {
        kind: RequestKind,
        respond_to: oneshot::Sender<Result<QueryResult, WebSqlite3Error>>,
    },
    Ping {
        respond_to: oneshot::Sender<Result<(), WebSqlite3Error>>,
    },
    Shutdown,
}
