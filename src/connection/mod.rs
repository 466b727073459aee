mod command;
mod params;
mod query;
mod worker;

pub use command::RequestKind;
pub(crate) use command::Command;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tracing::trace;

use crate::config::ConnectionConfig;
use crate::error::WebSqlite3Error;
use crate::results::QueryResult;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// One driver handle, running on a dedicated worker thread.
///
/// All driver calls travel over a command channel and come back on oneshot
/// channels, so callers never block the async runtime. A connection is used
/// by at most one holder at a time; the pool enforces that by ownership.
pub struct Connection {
    id: u64,
    sender: Sender<Command>,
    interrupt: rusqlite::InterruptHandle,
    healthy: Arc<AtomicBool>,
    created_at: Instant,
    last_used_at: Mutex<Instant>,
    use_count: AtomicU64,
}

impl Connection {
    /// Open the database on a fresh worker thread and wait for the
    /// handshake.
    ///
    /// # Errors
    /// Returns `WebSqlite3Error::Connection` if the thread cannot be
    /// spawned or the driver cannot open the database.
    pub(crate) async fn open(
        cfg: &ConnectionConfig,
        echo: bool,
    ) -> Result<Self, WebSqlite3Error> {
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel::<Command>();
        let (ready_tx, ready_rx) = oneshot::channel();
        let healthy = Arc::new(AtomicBool::new(true));

        let setup = worker::WorkerSetup {
            cfg: cfg.clone(),
            echo,
            healthy: Arc::clone(&healthy),
            receiver,
            ready: ready_tx,
        };
        thread::Builder::new()
            .name(format!("web-sqlite3-conn-{id}"))
            .spawn(move || worker::run(setup))
            .map_err(|e| {
                WebSqlite3Error::Connection(format!("failed to spawn connection thread: {e}"))
            })?;

        let interrupt = ready_rx.await.map_err(|_| {
            WebSqlite3Error::Connection("connection thread exited before handshake".into())
        })??;

        trace!(target: "web_sqlite3::pool", id, "connection opened");
        let now = Instant::now();
        Ok(Self {
            id,
            sender,
            interrupt,
            healthy,
            created_at: now,
            last_used_at: Mutex::new(now),
            use_count: AtomicU64::new(0),
        })
    }

    /// Run one request on this connection's worker thread.
    ///
    /// # Errors
    /// Surfaces the worker's `Query`/`Transaction`/`Connection` error, or a
    /// `Connection` error if the worker thread is gone.
    pub(crate) async fn run(&self, kind: RequestKind) -> Result<QueryResult, WebSqlite3Error> {
        self.use_count.fetch_add(1, Ordering::Relaxed);
        self.request(
            |respond_to| Command::Run { kind, respond_to },
            "connection worker dropped while running a request",
        )
        .await
    }

    /// Verify the handle still answers `SELECT 1`.
    pub(crate) async fn ping(&self) -> bool {
        self.request(
            |respond_to| Command::Ping { respond_to },
            "connection worker dropped during health check",
        )
        .await
        .is_ok()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, WebSqlite3Error>>) -> Command,
        drop_message: &'static str,
    ) -> Result<T, WebSqlite3Error> {
        let (tx, rx) = oneshot::channel();
        self.send(build(tx))?;
        rx.await.map_err(|_| {
            self.healthy.store(false, Ordering::Relaxed);
            WebSqlite3Error::Connection(drop_message.into())
        })?
    }

    fn send(&self, command: Command) -> Result<(), WebSqlite3Error> {
        self.sender.send(command).map_err(|_| {
            self.healthy.store(false, Ordering::Relaxed);
            WebSqlite3Error::Connection("connection worker closed".into())
        })
    }

    /// Abort whatever statement the worker thread is currently running.
    pub(crate) fn interrupt(&self) {
        self.interrupt.interrupt();
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_unhealthy(&self) {
        self.healthy.store(false, Ordering::Relaxed);
    }

    pub(crate) fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub(crate) fn idle_for(&self) -> Duration {
        self.last_used_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    /// Record a return to the pool; the idle clock restarts here.
    pub(crate) fn touch(&self) {
        *self
            .last_used_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub(crate) fn use_count(&self) -> u64 {
        self.use_count.load(Ordering::Relaxed)
    }

    pub(crate) fn close(self) {
        // Drop sends the shutdown command to the worker thread.
        drop(self);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.sender.send(Command::Shutdown);
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("healthy", &self.healthy())
            .field("use_count", &self.use_count())
            .finish()
    }
}
