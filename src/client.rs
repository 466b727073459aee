use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::info;

use crate::config::Config;
use crate::connection::RequestKind;
use crate::error::WebSqlite3Error;
use crate::executor::Executor;
use crate::pool::Pool;
use crate::results::{QueryResult, Row};
use crate::stats::Stats;
use crate::transaction::{ConnectionScope, TransactionScope};
use crate::types::{Priority, SqlValue};

/// How long `close` waits for in-flight workers before abandoning them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Per-request scheduling options.
///
/// ```rust
/// use std::time::Duration;
/// use web_sqlite3::{Priority, QueryOptions};
///
/// let opts = QueryOptions::new()
///     .priority(Priority::High)
///     .timeout(Duration::from_secs(2));
/// # let _ = opts;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
    pub priority: Priority,
    pub timeout: Option<Duration>,
}

impl QueryOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

enum State {
    Idle,
    Running(Running),
    Closed,
}

#[derive(Clone)]
struct Running {
    pool: Arc<Pool>,
    executor: Arc<Executor>,
}

/// Façade over the pool and executor for one database.
///
/// Multiple clients may coexist against different database files; there is
/// no process-wide state. All operations before `connect` fail with
/// `Transaction` ("not initialized"); all operations after `close` fail
/// with `Shutdown`.
pub struct Client {
    config: Config,
    state: RwLock<State>,
}

impl Client {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: RwLock::new(State::Idle),
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Idempotent start: validate the configuration, populate the pool to
    /// `min_size`, and start one executor worker per pool slot.
    ///
    /// # Errors
    /// `Configuration` for invalid settings, `Connection` if the initial
    /// connections cannot be opened.
    pub async fn connect(&self) -> Result<(), WebSqlite3Error> {
        let mut state = self.state.write().await;
        if matches!(&*state, State::Running(_)) {
            return Ok(());
        }
        self.config.validate()?;

        let pool = Pool::new(self.config.connection.clone(), self.config.pool.clone());
        pool.initialize().await?;
        let executor = Arc::new(Executor::start(
            Arc::clone(&pool),
            self.config.pool.max_size,
            self.config.connection_timeout(),
        ));
        *state = State::Running(Running { pool, executor });
        info!(
            target: "web_sqlite3::client",
            database = %self.config.connection.database,
            "client connected"
        );
        Ok(())
    }

    /// Idempotent stop: refuse new submissions, cancel everything queued
    /// with `Shutdown`, stop the workers within a bounded grace period, and
    /// close all connections.
    ///
    /// # Errors
    /// Currently infallible; the `Result` reserves room for teardown
    /// reporting.
    pub async fn close(&self) -> Result<(), WebSqlite3Error> {
        let mut state = self.state.write().await;
        let running = match std::mem::replace(&mut *state, State::Closed) {
            State::Running(running) => running,
            State::Idle => {
                *state = State::Idle;
                return Ok(());
            }
            State::Closed => return Ok(()),
        };
        running.executor.stop(SHUTDOWN_GRACE).await;
        running.pool.close();
        info!(target: "web_sqlite3::client", "client closed");
        Ok(())
    }

    /// Run a statement at `Normal` priority with no timeout.
    ///
    /// # Errors
    /// See [`Client::execute_with`].
    pub async fn execute(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<QueryResult, WebSqlite3Error> {
        self.execute_with(sql, params, QueryOptions::default()).await
    }

    /// Run a statement with explicit priority and timeout.
    ///
    /// # Errors
    /// `Transaction` before `connect`, `Shutdown` after `close`, `Timeout`
    /// past the deadline, `PoolExhausted` when no connection frees up, or
    /// the driver's `Query`/`Connection` error.
    pub async fn execute_with(
        &self,
        sql: &str,
        params: &[SqlValue],
        options: QueryOptions,
    ) -> Result<QueryResult, WebSqlite3Error> {
        let running = self.running().await?;
        running
            .executor
            .run(
                RequestKind::Execute {
                    sql: sql.to_owned(),
                    params: params.to_vec(),
                },
                options.priority,
                options.timeout,
            )
            .await
    }

    /// Run one statement over a batch of parameter sets.
    ///
    /// # Errors
    /// See [`Client::execute_with`].
    pub async fn executemany(
        &self,
        sql: &str,
        batches: &[Vec<SqlValue>],
    ) -> Result<QueryResult, WebSqlite3Error> {
        self.executemany_with(sql, batches, QueryOptions::default())
            .await
    }

    /// # Errors
    /// See [`Client::execute_with`].
    pub async fn executemany_with(
        &self,
        sql: &str,
        batches: &[Vec<SqlValue>],
        options: QueryOptions,
    ) -> Result<QueryResult, WebSqlite3Error> {
        let running = self.running().await?;
        running
            .executor
            .run(
                RequestKind::ExecuteMany {
                    sql: sql.to_owned(),
                    batches: batches.to_vec(),
                },
                options.priority,
                options.timeout,
            )
            .await
    }

    /// Fetch the first row, or `None` when the query matches nothing.
    ///
    /// # Errors
    /// See [`Client::execute_with`].
    pub async fn fetchone(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Option<Row>, WebSqlite3Error> {
        self.fetchone_with(sql, params, QueryOptions::default())
            .await
    }

    /// # Errors
    /// See [`Client::execute_with`].
    pub async fn fetchone_with(
        &self,
        sql: &str,
        params: &[SqlValue],
        options: QueryOptions,
    ) -> Result<Option<Row>, WebSqlite3Error> {
        let running = self.running().await?;
        let result = running
            .executor
            .run(
                RequestKind::FetchOne {
                    sql: sql.to_owned(),
                    params: params.to_vec(),
                },
                options.priority,
                options.timeout,
            )
            .await?;
        Ok(result.rows.into_iter().next())
    }

    /// Fetch every matching row.
    ///
    /// # Errors
    /// See [`Client::execute_with`].
    pub async fn fetchall(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Vec<Row>, WebSqlite3Error> {
        self.fetchall_with(sql, params, QueryOptions::default())
            .await
    }

    /// # Errors
    /// See [`Client::execute_with`].
    pub async fn fetchall_with(
        &self,
        sql: &str,
        params: &[SqlValue],
        options: QueryOptions,
    ) -> Result<Vec<Row>, WebSqlite3Error> {
        let running = self.running().await?;
        let result = running
            .executor
            .run(
                RequestKind::FetchAll {
                    sql: sql.to_owned(),
                    params: params.to_vec(),
                },
                options.priority,
                options.timeout,
            )
            .await?;
        Ok(result.rows)
    }

    /// Begin a transaction on a connection acquired directly from the pool,
    /// bypassing the executor queue. Bounded by `pool.connection_timeout`.
    ///
    /// # Errors
    /// `PoolExhausted` if no connection frees up in time, `Transaction` if
    /// `BEGIN` fails or the client is not initialized.
    pub async fn transaction(&self) -> Result<TransactionScope, WebSqlite3Error> {
        let running = self.running().await?;
        let deadline = Instant::now() + self.config.connection_timeout();
        TransactionScope::begin(running.pool, deadline).await
    }

    /// Pin a raw connection without transaction framing, with the same
    /// lifecycle guarantees as [`Client::transaction`].
    ///
    /// # Errors
    /// `PoolExhausted` if no connection frees up in time, `Transaction` if
    /// the client is not initialized.
    pub async fn connection(&self) -> Result<ConnectionScope, WebSqlite3Error> {
        let running = self.running().await?;
        let deadline = Instant::now() + self.config.connection_timeout();
        ConnectionScope::acquire(running.pool, deadline).await
    }

    /// Snapshot of pool and executor counters plus the configuration echo.
    pub async fn stats(&self) -> Stats {
        let state = self.state.read().await;
        match &*state {
            State::Running(running) => Stats {
                initialized: true,
                pool: running.pool.stats(),
                executor: running.executor.stats(),
                config: self.config.clone(),
            },
            State::Idle | State::Closed => Stats {
                initialized: false,
                pool: Default::default(),
                executor: Default::default(),
                config: self.config.clone(),
            },
        }
    }

    async fn running(&self) -> Result<Running, WebSqlite3Error> {
        let state = self.state.read().await;
        match &*state {
            State::Running(running) => Ok(running.clone()),
            State::Idle => Err(WebSqlite3Error::Transaction(
                "client not initialized; call connect() first".into(),
            )),
            State::Closed => Err(WebSqlite3Error::Shutdown("client is closed".into())),
        }
    }
}
