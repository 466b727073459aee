mod queue;

pub(crate) use queue::{PriorityQueue, Request};

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::connection::RequestKind;
use crate::error::WebSqlite3Error;
use crate::pool::Pool;
use crate::results::QueryResult;
use crate::stats::ExecutorStats;
use crate::types::Priority;

/// Fixed set of workers pulling requests in priority order and running them
/// on pooled connections.
///
/// Deadlines are observed at three points: queue wait, pool acquisition,
/// and driver execution. The first to fire completes the request's future
/// with `Timeout`; the future resolves exactly once either way.
pub(crate) struct Executor {
    inner: Arc<ExecutorInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

struct ExecutorInner {
    queue: PriorityQueue,
    pool: Arc<Pool>,
    connection_timeout: Duration,
    worker_count: usize,
    active_workers: AtomicUsize,
    total_executed: AtomicU64,
    total_failed: AtomicU64,
    total_timed_out: AtomicU64,
}

impl Executor {
    pub(crate) fn start(
        pool: Arc<Pool>,
        worker_count: usize,
        connection_timeout: Duration,
    ) -> Self {
        let inner = Arc::new(ExecutorInner {
            queue: PriorityQueue::new(),
            pool,
            connection_timeout,
            worker_count,
            active_workers: AtomicUsize::new(0),
            total_executed: AtomicU64::new(0),
            total_failed: AtomicU64::new(0),
            total_timed_out: AtomicU64::new(0),
        });
        let mut workers = Vec::with_capacity(worker_count);
        for worker in 0..worker_count {
            let inner = Arc::clone(&inner);
            workers.push(tokio::spawn(worker_loop(inner, worker)));
        }
        debug!(target: "web_sqlite3::executor", workers = worker_count, "executor started");
        Self {
            inner,
            workers: Mutex::new(workers),
        }
    }

    /// Submit a request and await its outcome.
    ///
    /// # Errors
    /// `Shutdown` if the executor has stopped, otherwise whatever the
    /// dispatched request produced.
    pub(crate) async fn run(
        &self,
        kind: RequestKind,
        priority: Priority,
        timeout: Option<Duration>,
    ) -> Result<QueryResult, WebSqlite3Error> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let (respond_to, rx) = oneshot::channel();
        let request = Request {
            kind,
            priority,
            deadline,
            respond_to,
        };
        if self.inner.queue.push(request).is_err() {
            return Err(WebSqlite3Error::Shutdown("executor is stopped".into()));
        }
        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(WebSqlite3Error::Shutdown(
                "executor dropped the request".into(),
            )),
        }
    }

    /// Stop accepting work, cancel everything still queued, and wait up to
    /// `grace` for in-flight workers before aborting them.
    pub(crate) async fn stop(&self, grace: Duration) {
        let drained = self.inner.queue.close();
        let cancelled = drained.len();
        for request in drained {
            let _ = request
                .respond_to
                .send(Err(WebSqlite3Error::Shutdown("executor is stopping".into())));
        }
        if cancelled > 0 {
            debug!(target: "web_sqlite3::executor", cancelled, "cancelled queued requests");
        }

        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self
                .workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *workers)
        };
        let deadline = tokio::time::Instant::now() + grace;
        for mut handle in handles {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                warn!(
                    target: "web_sqlite3::executor",
                    "worker did not stop within the grace period; aborting"
                );
                handle.abort();
            }
        }
        debug!(target: "web_sqlite3::executor", "executor stopped");
    }

    pub(crate) fn stats(&self) -> ExecutorStats {
        ExecutorStats {
            queue_size: self.inner.queue.len(),
            workers: self.inner.worker_count,
            active_workers: self.inner.active_workers.load(Ordering::Relaxed),
            total_executed: self.inner.total_executed.load(Ordering::Relaxed),
            total_failed: self.inner.total_failed.load(Ordering::Relaxed),
            total_timed_out: self.inner.total_timed_out.load(Ordering::Relaxed),
        }
    }
}

async fn worker_loop(inner: Arc<ExecutorInner>, worker: usize) {
    trace!(target: "web_sqlite3::executor", worker, "worker started");
    while let Some(request) = inner.queue.pop().await {
        inner.active_workers.fetch_add(1, Ordering::Relaxed);
        run_request(&inner, request).await;
        inner.active_workers.fetch_sub(1, Ordering::Relaxed);
    }
    trace!(target: "web_sqlite3::executor", worker, "worker stopped");
}

async fn run_request(inner: &ExecutorInner, request: Request) {
    let Request {
        kind,
        deadline,
        mut respond_to,
        ..
    } = request;

    // submitter already gone; skip without touching the pool
    if respond_to.is_closed() {
        return;
    }

    let now = Instant::now();
    if let Some(d) = deadline
        && d <= now
    {
        inner.total_timed_out.fetch_add(1, Ordering::Relaxed);
        let _ = respond_to.send(Err(WebSqlite3Error::Timeout(
            "deadline expired before dispatch".into(),
        )));
        return;
    }

    let connection_deadline = now + inner.connection_timeout;
    let acquire_deadline = match deadline {
        Some(d) => d.min(connection_deadline),
        None => connection_deadline,
    };
    let conn = tokio::select! {
        acquired = inner.pool.acquire(acquire_deadline) => match acquired {
            Ok(conn) => conn,
            // The request's own deadline can be the binding bound on the
            // wait; expiry then is a timeout, not pool exhaustion, which is
            // reserved for connection_timeout.
            Err(WebSqlite3Error::PoolExhausted(_))
                if deadline.is_some_and(|d| d <= connection_deadline) =>
            {
                inner.total_timed_out.fetch_add(1, Ordering::Relaxed);
                let _ = respond_to.send(Err(WebSqlite3Error::Timeout(
                    "deadline expired while waiting for a connection".into(),
                )));
                return;
            }
            Err(err) => {
                inner.total_failed.fetch_add(1, Ordering::Relaxed);
                let _ = respond_to.send(Err(err));
                return;
            }
        },
        // cancelled while waiting; the pool tolerates the dead waiter
        () = respond_to.closed() => return,
    };

    tokio::select! {
        outcome = conn.run(kind) => {
            let keep = conn.healthy();
            match &outcome {
                Ok(_) => inner.total_executed.fetch_add(1, Ordering::Relaxed),
                Err(_) => inner.total_failed.fetch_add(1, Ordering::Relaxed),
            };
            let _ = respond_to.send(outcome);
            inner.pool.release(conn, keep);
        }
        () = deadline_elapsed(deadline) => {
            conn.interrupt();
            inner.total_timed_out.fetch_add(1, Ordering::Relaxed);
            let _ = respond_to.send(Err(WebSqlite3Error::Timeout(
                "query exceeded its deadline".into(),
            )));
            // the statement may still be finishing on the worker thread
            inner.pool.release(conn, false);
        }
        () = respond_to.closed() => {
            conn.interrupt();
            inner.pool.release(conn, false);
        }
    }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(tokio::time::Instant::from_std(d)).await,
        None => std::future::pending().await,
    }
}
