use serde::Serialize;

use crate::config::Config;

/// Pool counters at a point in time. `in_use + available == size` holds at
/// every snapshot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolStats {
    pub size: usize,
    pub in_use: usize,
    pub available: usize,
    pub created_total: u64,
    pub closed_total: u64,
    pub waiters: usize,
}

/// Executor counters at a point in time. Each request lands in exactly one
/// of `total_executed`, `total_failed`, or `total_timed_out`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutorStats {
    pub queue_size: usize,
    pub workers: usize,
    pub active_workers: usize,
    pub total_executed: u64,
    pub total_failed: u64,
    pub total_timed_out: u64,
}

/// Snapshot returned by `Client::stats`, including an echo of the input
/// configuration.
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub initialized: bool,
    pub pool: PoolStats,
    pub executor: ExecutorStats,
    pub config: Config,
}
