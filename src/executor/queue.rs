use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::{Notify, oneshot};

use crate::connection::RequestKind;
use crate::error::WebSqlite3Error;
use crate::results::QueryResult;
use crate::types::Priority;

/// One submitted unit of work, waiting to be dispatched.
pub(crate) struct Request {
    pub kind: RequestKind,
    pub priority: Priority,
    /// Absolute time past which the request must fail with `Timeout`;
    /// `None` means no deadline.
    pub deadline: Option<Instant>,
    pub respond_to: oneshot::Sender<Result<QueryResult, WebSqlite3Error>>,
}

struct Entry {
    seq: u64,
    request: Request,
}

impl Entry {
    fn key(&self) -> (Priority, std::cmp::Reverse<u64>) {
        (self.request.priority, std::cmp::Reverse(self.seq))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

struct Inner {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
    closed: bool,
}

/// Pending requests ordered by `(priority descending, submission order)`.
///
/// `pop` blocks until a request arrives or the queue closes; a `None`
/// return is the worker-exit sentinel.
pub(crate) struct PriorityQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl PriorityQueue {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                next_seq: 0,
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Enqueue a request, assigning its submission sequence number.
    ///
    /// # Errors
    /// Hands the request back if the queue is closed.
    pub(crate) fn push(&self, request: Request) -> Result<(), Request> {
        {
            let mut inner = self.inner();
            if inner.closed {
                return Err(request);
            }
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.heap.push(Entry { seq, request });
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Take the highest-priority request, waiting for one if necessary.
    /// Returns `None` once the queue is closed.
    pub(crate) async fn pop(&self) -> Option<Request> {
        loop {
            {
                let mut inner = self.inner();
                if let Some(entry) = inner.heap.pop() {
                    return Some(entry.request);
                }
                if inner.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Refuse further submissions and hand back everything still queued.
    pub(crate) fn close(&self) -> Vec<Request> {
        let drained: Vec<Request> = {
            let mut inner = self.inner();
            inner.closed = true;
            inner.heap.drain().map(|entry| entry.request).collect()
        };
        self.notify.notify_waiters();
        drained
    }

    pub(crate) fn len(&self) -> usize {
        self.inner().heap.len()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
