use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::time::Instant;

use rusqlite::OpenFlags;
use tokio::sync::oneshot;
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::error::{WebSqlite3Error, is_connection_level};
use crate::results::QueryResult;
use crate::types::{IsolationLevel, SqlValue};

use super::command::{Command, RequestKind};
use super::params::{to_sqlite_values, values_as_tosql};
use super::query::collect_rows;

pub(super) struct WorkerSetup {
    pub cfg: ConnectionConfig,
    pub echo: bool,
    pub healthy: Arc<AtomicBool>,
    pub receiver: Receiver<Command>,
    pub ready: oneshot::Sender<Result<rusqlite::InterruptHandle, WebSqlite3Error>>,
}

/// Thread main for one connection: open the handle, report the interrupt
/// handle back, then serve commands until shutdown.
pub(super) fn run(setup: WorkerSetup) {
    let WorkerSetup {
        cfg,
        echo,
        healthy,
        receiver,
        ready,
    } = setup;

    let mut conn = match open_database(&cfg) {
        Ok(conn) => conn,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };
    let _ = ready.send(Ok(conn.get_interrupt_handle()));

    while let Ok(command) = receiver.recv() {
        match command {
            Command::Shutdown => break,
            Command::Ping { respond_to } => {
                let _ = respond_to.send(ping(&conn, &healthy));
            }
            Command::Run { kind, respond_to } => {
                let _ = respond_to.send(run_kind(&mut conn, kind, echo, &cfg, &healthy));
            }
        }
    }
}

fn open_database(cfg: &ConnectionConfig) -> Result<rusqlite::Connection, WebSqlite3Error> {
    let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    if cfg.uri {
        flags |= OpenFlags::SQLITE_OPEN_URI;
    }
    let conn = rusqlite::Connection::open_with_flags(&cfg.database, flags).map_err(|e| {
        WebSqlite3Error::Connection(format!("failed to open {}: {e}", cfg.database))
    })?;
    conn.busy_timeout(cfg.busy_timeout())
        .map_err(|e| WebSqlite3Error::Connection(format!("cannot set busy timeout: {e}")))?;
    conn.set_prepared_statement_cache_capacity(cfg.cached_statements);
    Ok(conn)
}

fn ping(conn: &rusqlite::Connection, healthy: &AtomicBool) -> Result<(), WebSqlite3Error> {
    conn.query_row("SELECT 1", [], |_row| Ok(())).map_err(|e| {
        healthy.store(false, Ordering::Relaxed);
        WebSqlite3Error::Connection(format!("health check failed: {e}"))
    })
}

fn run_kind(
    conn: &mut rusqlite::Connection,
    kind: RequestKind,
    echo: bool,
    cfg: &ConnectionConfig,
    healthy: &AtomicBool,
) -> Result<QueryResult, WebSqlite3Error> {
    if echo && let Some(sql) = kind.sql_text() {
        debug!(target: "web_sqlite3::sql", %sql, "executing");
    }
    let transaction_control = kind.is_transaction_control();
    let started = Instant::now();
    let outcome = match kind {
        RequestKind::Execute { sql, params } => run_statement(conn, &sql, &params, None),
        RequestKind::FetchOne { sql, params } => run_statement(conn, &sql, &params, Some(1)),
        RequestKind::FetchAll { sql, params } => run_statement(conn, &sql, &params, None),
        RequestKind::ExecuteMany { sql, batches } => run_batch(conn, &sql, &batches),
        RequestKind::Begin => begin(conn, cfg.isolation_level),
        RequestKind::Commit => end_transaction(conn, "COMMIT"),
        RequestKind::Rollback => end_transaction(conn, "ROLLBACK"),
        RequestKind::Raw { sql } => {
            conn.execute_batch(&sql).map(|()| QueryResult::default())
        }
    };
    match outcome {
        Ok(mut result) => {
            result.elapsed = started.elapsed();
            Ok(result)
        }
        Err(err) => Err(classify(err, transaction_control, healthy)),
    }
}

/// A connection-level driver failure poisons the handle; a plain SQL error
/// leaves it usable. BEGIN/COMMIT/ROLLBACK failures surface as transaction
/// errors.
fn classify(
    err: rusqlite::Error,
    transaction_control: bool,
    healthy: &AtomicBool,
) -> WebSqlite3Error {
    if is_connection_level(&err) {
        healthy.store(false, Ordering::Relaxed);
        WebSqlite3Error::Connection(err.to_string())
    } else if transaction_control {
        WebSqlite3Error::Transaction(err.to_string())
    } else {
        WebSqlite3Error::Query(err.to_string())
    }
}

fn run_statement(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &[SqlValue],
    limit: Option<usize>,
) -> Result<QueryResult, rusqlite::Error> {
    let values = to_sqlite_values(params);
    let mut stmt = conn.prepare_cached(sql)?;
    if stmt.column_count() > 0 {
        let rows = collect_rows(&mut stmt, &values, limit)?;
        let rows_affected = rows.len();
        Ok(QueryResult {
            rows,
            rows_affected,
            ..QueryResult::default()
        })
    } else {
        let param_refs = values_as_tosql(&values);
        let rows_affected = stmt.execute(&param_refs[..])?;
        drop(stmt);
        let last_insert_rowid = (rows_affected > 0).then(|| conn.last_insert_rowid());
        Ok(QueryResult {
            rows_affected,
            last_insert_rowid,
            ..QueryResult::default()
        })
    }
}

/// Outside an explicit transaction the whole batch commits or rolls back as
/// one unit; inside one, it joins the caller's transaction.
fn run_batch(
    conn: &mut rusqlite::Connection,
    sql: &str,
    batches: &[Vec<SqlValue>],
) -> Result<QueryResult, rusqlite::Error> {
    let rows_affected = if conn.is_autocommit() {
        let tx = conn.transaction()?;
        let total = execute_batches(&tx, sql, batches)?;
        tx.commit()?;
        total
    } else {
        execute_batches(conn, sql, batches)?
    };
    Ok(QueryResult {
        rows_affected,
        ..QueryResult::default()
    })
}

fn execute_batches(
    conn: &rusqlite::Connection,
    sql: &str,
    batches: &[Vec<SqlValue>],
) -> Result<usize, rusqlite::Error> {
    let mut stmt = conn.prepare_cached(sql)?;
    let mut total = 0;
    for batch in batches {
        let values = to_sqlite_values(batch);
        let param_refs = values_as_tosql(&values);
        total += stmt.execute(&param_refs[..])?;
    }
    Ok(total)
}

fn begin(
    conn: &rusqlite::Connection,
    isolation: Option<IsolationLevel>,
) -> Result<QueryResult, rusqlite::Error> {
    if !conn.is_autocommit() {
        return Ok(QueryResult::default());
    }
    let sql = isolation.map_or("BEGIN", IsolationLevel::begin_sql);
    conn.execute_batch(sql)?;
    Ok(QueryResult::default())
}

fn end_transaction(
    conn: &rusqlite::Connection,
    sql: &str,
) -> Result<QueryResult, rusqlite::Error> {
    if conn.is_autocommit() {
        return Ok(QueryResult::default());
    }
    conn.execute_batch(sql)?;
    Ok(QueryResult::default())
}
