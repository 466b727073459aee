use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::config::{ConnectionConfig, PoolConfig};
use crate::connection::Connection;
use crate::error::WebSqlite3Error;
use crate::stats::PoolStats;

/// An idle connection older than this gets a `SELECT 1` probe before being
/// handed out.
const PING_IDLE_THRESHOLD: Duration = Duration::from_secs(30);

/// Bounded set of [`Connection`]s with lifecycle policies.
///
/// Holds `min_size..=max_size` connections, serves waiters in arrival
/// order, and retires connections on age, idle time, use count, or health.
/// The internal lock guards O(1) bookkeeping only; the driver is never
/// touched while it is held.
pub(crate) struct Pool {
    connection_cfg: ConnectionConfig,
    cfg: PoolConfig,
    state: Mutex<PoolState>,
    next_waiter_id: AtomicU64,
}

struct PoolState {
    idle: VecDeque<Connection>,
    waiters: VecDeque<Waiter>,
    size: usize,
    in_use: usize,
    created_total: u64,
    closed_total: u64,
    closed: bool,
}

struct Waiter {
    id: u64,
    grant: oneshot::Sender<Grant>,
}

/// What a released slot hands to the earliest waiter: a live connection, or
/// the right to create one.
enum Grant {
    Conn(Connection),
    Slot,
}

enum Plan {
    Ready(Connection),
    Create,
    Wait(oneshot::Receiver<Grant>, u64),
}

impl Pool {
    pub(crate) fn new(connection_cfg: ConnectionConfig, cfg: PoolConfig) -> Arc<Self> {
        Arc::new(Self {
            connection_cfg,
            cfg,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                waiters: VecDeque::new(),
                size: 0,
                in_use: 0,
                created_total: 0,
                closed_total: 0,
                closed: false,
            }),
            next_waiter_id: AtomicU64::new(1),
        })
    }

    /// Pre-populate `min_size` connections and start the idle sweep.
    ///
    /// # Errors
    /// Returns `WebSqlite3Error::Connection` if any initial connection
    /// cannot be opened.
    pub(crate) async fn initialize(self: &Arc<Self>) -> Result<(), WebSqlite3Error> {
        for _ in 0..self.cfg.min_size {
            let conn = Connection::open(&self.connection_cfg, self.cfg.echo).await?;
            let mut state = self.state();
            state.size += 1;
            state.created_total += 1;
            state.idle.push_back(conn);
        }

        let weak = Arc::downgrade(self);
        let tick = self.sweep_interval();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(tick).await;
                let Some(pool) = weak.upgrade() else { break };
                if pool.is_closed() {
                    break;
                }
                pool.sweep();
            }
        });
        Ok(())
    }

    /// Obtain a connection before `deadline`.
    ///
    /// Order of preference: a healthy idle connection, a freshly created
    /// one while below `max_size`, otherwise wait in FIFO order for a
    /// release.
    ///
    /// # Errors
    /// `PoolExhausted` if the deadline passes first, `Shutdown` once the
    /// pool is closed, `Connection` if the driver cannot open a handle.
    pub(crate) async fn acquire(&self, deadline: Instant) -> Result<Connection, WebSqlite3Error> {
        loop {
            let mut retired: Vec<Connection> = Vec::new();
            let plan = {
                let mut state = self.state();
                if state.closed {
                    return Err(WebSqlite3Error::Shutdown("pool is closed".into()));
                }
                let mut picked = None;
                while let Some(conn) = state.idle.pop_front() {
                    if self.should_retire(&conn) {
                        state.size -= 1;
                        state.closed_total += 1;
                        retired.push(conn);
                        continue;
                    }
                    picked = Some(conn);
                    break;
                }
                match picked {
                    Some(conn) => {
                        state.in_use += 1;
                        Plan::Ready(conn)
                    }
                    None if state.size < self.cfg.max_size => {
                        state.size += 1;
                        state.in_use += 1;
                        Plan::Create
                    }
                    None => {
                        let id = self.next_waiter_id.fetch_add(1, Ordering::Relaxed);
                        let (tx, rx) = oneshot::channel();
                        state.waiters.push_back(Waiter { id, grant: tx });
                        Plan::Wait(rx, id)
                    }
                }
            };
            drop(retired);

            match plan {
                Plan::Ready(conn) => {
                    if conn.idle_for() >= PING_IDLE_THRESHOLD && !conn.ping().await {
                        self.discard_in_use(conn);
                        continue;
                    }
                    return Ok(conn);
                }
                Plan::Create => return self.create_reserved().await,
                Plan::Wait(mut rx, id) => {
                    let grant =
                        tokio::time::timeout_at(tokio::time::Instant::from_std(deadline), &mut rx)
                            .await;
                    match grant {
                        Ok(Ok(Grant::Conn(conn))) => return Ok(conn),
                        Ok(Ok(Grant::Slot)) => return self.create_reserved().await,
                        Ok(Err(_)) => {
                            return Err(WebSqlite3Error::Shutdown("pool is closed".into()));
                        }
                        Err(_) => {
                            self.abandon_waiter(id, rx);
                            return Err(WebSqlite3Error::PoolExhausted(
                                "no connection became available before the deadline".into(),
                            ));
                        }
                    }
                }
            }
        }
    }

    /// Return a connection. Unhealthy, over-age, or over-used connections
    /// are closed and their slot offered to the earliest waiter; healthy
    /// ones go straight to a waiter or back onto the idle list.
    pub(crate) fn release(&self, conn: Connection, ok: bool) {
        let mut to_close: Option<Connection> = None;
        {
            let mut state = self.state();
            state.in_use = state.in_use.saturating_sub(1);
            if state.closed {
                state.size = state.size.saturating_sub(1);
                state.closed_total += 1;
                to_close = Some(conn);
            } else if !ok || !conn.healthy() || self.should_retire(&conn) {
                state.size = state.size.saturating_sub(1);
                state.closed_total += 1;
                self.grant_slot_locked(&mut state);
                to_close = Some(conn);
            } else {
                conn.touch();
                let mut handoff = Some(conn);
                while let Some(candidate) = handoff.take() {
                    match state.waiters.pop_front() {
                        Some(waiter) => {
                            state.in_use += 1;
                            match waiter.grant.send(Grant::Conn(candidate)) {
                                Ok(()) => {}
                                Err(Grant::Conn(returned)) => {
                                    // waiter gave up; try the next one
                                    state.in_use -= 1;
                                    handoff = Some(returned);
                                }
                                Err(Grant::Slot) => {
                                    state.in_use -= 1;
                                }
                            }
                        }
                        None => state.idle.push_back(candidate),
                    }
                }
            }
        }
        if let Some(conn) = to_close {
            trace!(target: "web_sqlite3::pool", id = conn.id(), "connection retired");
            conn.close();
        }
    }

    /// Drain waiters and close every idle connection. Connections still
    /// held by scopes or workers are closed when they come back.
    pub(crate) fn close(&self) {
        let (idle, waiters) = {
            let mut state = self.state();
            if state.closed {
                return;
            }
            state.closed = true;
            let idle = std::mem::take(&mut state.idle);
            let waiters = std::mem::take(&mut state.waiters);
            state.size = state.size.saturating_sub(idle.len());
            state.closed_total += idle.len() as u64;
            (idle, waiters)
        };
        // dropping the grant senders cancels every waiter with Shutdown
        drop(waiters);
        let closed = idle.len();
        drop(idle);
        debug!(target: "web_sqlite3::pool", closed, "pool closed");
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state().closed
    }

    pub(crate) fn stats(&self) -> PoolStats {
        let state = self.state();
        PoolStats {
            size: state.size,
            in_use: state.in_use,
            available: state.idle.len(),
            created_total: state.created_total,
            closed_total: state.closed_total,
            waiters: state.waiters.len(),
        }
    }

    /// Open a connection for a slot that is already reserved in `size` and
    /// `in_use`. On failure the reservation is rolled back and offered to
    /// the next waiter.
    async fn create_reserved(&self) -> Result<Connection, WebSqlite3Error> {
        match Connection::open(&self.connection_cfg, self.cfg.echo).await {
            Ok(conn) => {
                self.state().created_total += 1;
                Ok(conn)
            }
            Err(err) => {
                let mut state = self.state();
                state.size = state.size.saturating_sub(1);
                state.in_use = state.in_use.saturating_sub(1);
                self.grant_slot_locked(&mut state);
                drop(state);
                Err(err)
            }
        }
    }

    /// Close a connection counted as in-use and free its slot.
    fn discard_in_use(&self, conn: Connection) {
        {
            let mut state = self.state();
            state.in_use = state.in_use.saturating_sub(1);
            state.size = state.size.saturating_sub(1);
            state.closed_total += 1;
            self.grant_slot_locked(&mut state);
        }
        conn.close();
    }

    /// Offer a freed slot to the earliest waiter that is still listening.
    fn grant_slot_locked(&self, state: &mut PoolState) {
        while state.size < self.cfg.max_size {
            let Some(waiter) = state.waiters.pop_front() else {
                break;
            };
            state.size += 1;
            state.in_use += 1;
            if waiter.grant.send(Grant::Slot).is_ok() {
                break;
            }
            state.size -= 1;
            state.in_use -= 1;
        }
    }

    /// Remove a timed-out waiter, or undo a grant that raced the timeout.
    fn abandon_waiter(&self, id: u64, mut rx: oneshot::Receiver<Grant>) {
        let removed = {
            let mut state = self.state();
            let before = state.waiters.len();
            state.waiters.retain(|w| w.id != id);
            state.waiters.len() != before
        };
        if removed {
            return;
        }
        // Grant sends happen under the state lock, so by now any grant for
        // this waiter is either consumed above or sitting in the channel.
        match rx.try_recv() {
            Ok(Grant::Conn(conn)) => self.release(conn, true),
            Ok(Grant::Slot) => {
                let mut state = self.state();
                state.size = state.size.saturating_sub(1);
                state.in_use = state.in_use.saturating_sub(1);
                self.grant_slot_locked(&mut state);
            }
            Err(_) => {}
        }
    }

    /// Retirement criteria applied on acquire and release: health, age, and
    /// use count. Idle time is the sweep's business.
    fn should_retire(&self, conn: &Connection) -> bool {
        if !conn.healthy() {
            return true;
        }
        if let Some(max_age) = self.cfg.recycle_after()
            && conn.age() >= max_age
        {
            return true;
        }
        self.cfg.max_queries > 0 && conn.use_count() >= self.cfg.max_queries
    }

    /// Periodic pass over the idle list: retire unhealthy, over-age, and
    /// long-idle connections (the latter only while above `min_size`).
    fn sweep(&self) {
        let mut dropped: Vec<Connection> = Vec::new();
        {
            let mut state = self.state();
            if state.closed {
                return;
            }
            let max_idle = self.cfg.max_idle();
            let mut kept = VecDeque::with_capacity(state.idle.len());
            while let Some(conn) = state.idle.pop_front() {
                let idle_expired =
                    state.size > self.cfg.min_size && conn.idle_for() >= max_idle;
                if self.should_retire(&conn) || idle_expired {
                    state.size -= 1;
                    state.closed_total += 1;
                    dropped.push(conn);
                } else {
                    kept.push_back(conn);
                }
            }
            state.idle = kept;
        }
        if !dropped.is_empty() {
            debug!(
                target: "web_sqlite3::pool",
                retired = dropped.len(),
                "idle sweep retired connections"
            );
        }
        drop(dropped);
    }

    fn sweep_interval(&self) -> Duration {
        let half = self.cfg.max_idle_time / 2.0;
        Duration::from_secs_f64(half.clamp(0.25, 30.0))
    }

    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
