use std::sync::Arc;
use std::time::Duration;

use crate::connection::{Connection, RequestKind};
use crate::error::WebSqlite3Error;
use crate::pool::Pool;
use crate::results::{QueryResult, Row};
use crate::types::SqlValue;

/// A transaction pinned to one connection, from `BEGIN` to
/// `COMMIT`/`ROLLBACK`.
///
/// The configured `isolation_level` decides the `BEGIN` variant; all
/// statements run on the pinned connection in program order. Dropping the
/// scope without committing rolls the transaction back and returns the
/// connection to the pool. The scope must not be shared across concurrent
/// tasks.
pub struct TransactionScope {
    conn: Option<Connection>,
    pool: Arc<Pool>,
}

impl TransactionScope {
    pub(crate) async fn begin(
        pool: Arc<Pool>,
        deadline: std::time::Instant,
    ) -> Result<Self, WebSqlite3Error> {
        let conn = pool.acquire(deadline).await?;
        match conn.run(RequestKind::Begin).await {
            Ok(_) => Ok(Self {
                conn: Some(conn),
                pool,
            }),
            Err(err) => {
                let keep = conn.healthy();
                pool.release(conn, keep);
                Err(err)
            }
        }
    }

    /// Run a statement inside the transaction.
    ///
    /// # Errors
    /// `Transaction` if the scope already completed, `Timeout` if the call
    /// exceeds `timeout`, otherwise the driver's error.
    pub async fn execute(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        timeout: Option<Duration>,
    ) -> Result<QueryResult, WebSqlite3Error> {
        self.run(
            RequestKind::Execute {
                sql: sql.to_owned(),
                params: params.to_vec(),
            },
            timeout,
        )
        .await
    }

    /// Run a parameter batch inside the transaction.
    ///
    /// # Errors
    /// Same failure modes as [`TransactionScope::execute`].
    pub async fn executemany(
        &mut self,
        sql: &str,
        batches: &[Vec<SqlValue>],
        timeout: Option<Duration>,
    ) -> Result<QueryResult, WebSqlite3Error> {
        self.run(
            RequestKind::ExecuteMany {
                sql: sql.to_owned(),
                batches: batches.to_vec(),
            },
            timeout,
        )
        .await
    }

    /// # Errors
    /// Same failure modes as [`TransactionScope::execute`].
    pub async fn fetchone(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        timeout: Option<Duration>,
    ) -> Result<Option<Row>, WebSqlite3Error> {
        let result = self
            .run(
                RequestKind::FetchOne {
                    sql: sql.to_owned(),
                    params: params.to_vec(),
                },
                timeout,
            )
            .await?;
        Ok(result.rows.into_iter().next())
    }

    /// # Errors
    /// Same failure modes as [`TransactionScope::execute`].
    pub async fn fetchall(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        timeout: Option<Duration>,
    ) -> Result<Vec<Row>, WebSqlite3Error> {
        let result = self
            .run(
                RequestKind::FetchAll {
                    sql: sql.to_owned(),
                    params: params.to_vec(),
                },
                timeout,
            )
            .await?;
        Ok(result.rows)
    }

    /// Commit and release the pinned connection.
    ///
    /// # Errors
    /// `Transaction` if COMMIT fails; the connection is then discarded.
    pub async fn commit(mut self) -> Result<(), WebSqlite3Error> {
        let conn = self.take_conn()?;
        match conn.run(RequestKind::Commit).await {
            Ok(_) => {
                let keep = conn.healthy();
                self.pool.release(conn, keep);
                Ok(())
            }
            Err(err) => {
                conn.mark_unhealthy();
                self.pool.release(conn, false);
                Err(err)
            }
        }
    }

    /// Roll back and release the pinned connection.
    ///
    /// # Errors
    /// `Transaction` if ROLLBACK fails; the connection is then discarded.
    pub async fn rollback(mut self) -> Result<(), WebSqlite3Error> {
        let conn = self.take_conn()?;
        match conn.run(RequestKind::Rollback).await {
            Ok(_) => {
                let keep = conn.healthy();
                self.pool.release(conn, keep);
                Ok(())
            }
            Err(err) => {
                conn.mark_unhealthy();
                self.pool.release(conn, false);
                Err(err)
            }
        }
    }

    async fn run(
        &mut self,
        kind: RequestKind,
        timeout: Option<Duration>,
    ) -> Result<QueryResult, WebSqlite3Error> {
        let conn = self.conn.as_ref().ok_or_else(|| {
            WebSqlite3Error::Transaction("transaction already completed".into())
        })?;
        run_with_timeout(conn, kind, timeout).await
    }

    fn take_conn(&mut self) -> Result<Connection, WebSqlite3Error> {
        self.conn.take().ok_or_else(|| {
            WebSqlite3Error::Transaction("transaction already completed".into())
        })
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let pool = Arc::clone(&self.pool);
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let rolled_back = conn.run(RequestKind::Rollback).await.is_ok();
                    let keep = rolled_back && conn.healthy();
                    pool.release(conn, keep);
                });
            } else {
                pool.release(conn, false);
            }
        }
    }
}

/// A raw pinned connection without BEGIN/COMMIT framing.
///
/// Statements autocommit individually unless the caller issues transaction
/// control through `raw`. Dropping the scope returns the connection.
pub struct ConnectionScope {
    conn: Option<Connection>,
    pool: Arc<Pool>,
}

impl ConnectionScope {
    pub(crate) async fn acquire(
        pool: Arc<Pool>,
        deadline: std::time::Instant,
    ) -> Result<Self, WebSqlite3Error> {
        let conn = pool.acquire(deadline).await?;
        Ok(Self {
            conn: Some(conn),
            pool,
        })
    }

    /// # Errors
    /// `Timeout` if the call exceeds `timeout`, otherwise the driver's
    /// error.
    pub async fn execute(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        timeout: Option<Duration>,
    ) -> Result<QueryResult, WebSqlite3Error> {
        self.run(
            RequestKind::Execute {
                sql: sql.to_owned(),
                params: params.to_vec(),
            },
            timeout,
        )
        .await
    }

    /// # Errors
    /// Same failure modes as [`ConnectionScope::execute`].
    pub async fn executemany(
        &mut self,
        sql: &str,
        batches: &[Vec<SqlValue>],
        timeout: Option<Duration>,
    ) -> Result<QueryResult, WebSqlite3Error> {
        self.run(
            RequestKind::ExecuteMany {
                sql: sql.to_owned(),
                batches: batches.to_vec(),
            },
            timeout,
        )
        .await
    }

    /// # Errors
    /// Same failure modes as [`ConnectionScope::execute`].
    pub async fn fetchone(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        timeout: Option<Duration>,
    ) -> Result<Option<Row>, WebSqlite3Error> {
        let result = self
            .run(
                RequestKind::FetchOne {
                    sql: sql.to_owned(),
                    params: params.to_vec(),
                },
                timeout,
            )
            .await?;
        Ok(result.rows.into_iter().next())
    }

    /// # Errors
    /// Same failure modes as [`ConnectionScope::execute`].
    pub async fn fetchall(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        timeout: Option<Duration>,
    ) -> Result<Vec<Row>, WebSqlite3Error> {
        let result = self
            .run(
                RequestKind::FetchAll {
                    sql: sql.to_owned(),
                    params: params.to_vec(),
                },
                timeout,
            )
            .await?;
        Ok(result.rows)
    }

    /// Run a batch of semicolon-separated statements without parameters.
    ///
    /// # Errors
    /// Same failure modes as [`ConnectionScope::execute`].
    pub async fn raw(
        &mut self,
        sql: &str,
        timeout: Option<Duration>,
    ) -> Result<(), WebSqlite3Error> {
        self.run(RequestKind::Raw { sql: sql.to_owned() }, timeout)
            .await
            .map(|_| ())
    }

    async fn run(
        &mut self,
        kind: RequestKind,
        timeout: Option<Duration>,
    ) -> Result<QueryResult, WebSqlite3Error> {
        let conn = self.conn.as_ref().ok_or_else(|| {
            WebSqlite3Error::Connection("connection scope already released".into())
        })?;
        run_with_timeout(conn, kind, timeout).await
    }
}

impl Drop for ConnectionScope {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let keep = conn.healthy();
            self.pool.release(conn, keep);
        }
    }
}

/// Run one statement on a pinned connection, honoring a per-call timeout.
/// A timed-out statement is interrupted and leaves the connection in an
/// unknown state, so it is marked for discard.
async fn run_with_timeout(
    conn: &Connection,
    kind: RequestKind,
    timeout: Option<Duration>,
) -> Result<QueryResult, WebSqlite3Error> {
    match timeout {
        None => conn.run(kind).await,
        Some(limit) => match tokio::time::timeout(limit, conn.run(kind)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                conn.interrupt();
                conn.mark_unhealthy();
                Err(WebSqlite3Error::Timeout(format!(
                    "statement exceeded {limit:?}"
                )))
            }
        },
    }
}
