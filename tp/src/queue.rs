//! Concurrent time-ordered task queue
//!
//! A binary heap keyed on due time, guarded by a mutex that is held only for
//! inspection and mutation, paired with a notification channel that wakes
//! blocked consumers on insertion and on stop. Consumers re-validate the
//! queue state after every wake; the wake reason alone is never trusted.

use std::collections::BinaryHeap;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;
use tokio::time::{self, Instant};
use tracing::{debug, trace};

use crate::task::ScheduledTask;

/// Thread-safe queue of pending tasks, ordered by due time ascending with
/// FIFO insertion order as the tie-break
///
/// Producers insert from any thread (including from inside a running task);
/// workers consume via [`pop_when_due`](Self::pop_when_due), which blocks
/// until the earliest task is due or the queue is stopped.
pub struct TimerQueue {
    /// Pending tasks, earliest due time on top
    heap: Mutex<BinaryHeap<ScheduledTask>>,

    /// Wakes blocked consumers on insert (one waiter) and stop (all waiters)
    notify: Notify,

    /// One-way stop flag, readable without the queue lock
    stopped: AtomicBool,

    /// Insertion counter backing the FIFO tie-break
    seq: AtomicU64,
}

impl TimerQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
            stopped: AtomicBool::new(false),
            seq: AtomicU64::new(0),
        }
    }

    /// Lock the heap. Tasks never execute under this lock, so poisoning
    /// would mean a heap operation itself panicked.
    fn heap(&self) -> MutexGuard<'_, BinaryHeap<ScheduledTask>> {
        self.heap.lock().expect("timer queue lock poisoned")
    }

    /// Insert a task and wake one blocked worker so it re-evaluates the
    /// earliest due time
    ///
    /// Tasks inserted after [`stop`](Self::stop) are silently discarded;
    /// they could never run.
    pub fn insert(&self, mut task: ScheduledTask) {
        if self.is_stopped() {
            debug!("insert: queue stopped, discarding task");
            return;
        }

        task.seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let depth = {
            let mut heap = self.heap();
            heap.push(task);
            heap.len()
        };
        trace!(depth, "insert: task queued");

        // An unconsumed permit is retained, so a wake issued while no worker
        // is parked is not lost.
        self.notify.notify_one();
    }

    /// Block until the earliest task is due, then remove and return it
    ///
    /// Returns `None` when the queue has been stopped. While the earliest
    /// task lies in the future the caller waits out exactly the remaining
    /// time, waking early when a more urgent task arrives, when the queue
    /// drains, or when stop is requested; every wake re-validates the actual
    /// queue state before acting.
    pub async fn pop_when_due(&self) -> Option<ScheduledTask> {
        loop {
            let mut notified = pin!(self.notify.notified());

            let deadline = {
                let mut heap = self.heap();

                if self.is_stopped() {
                    debug!("pop_when_due: stop requested, releasing worker");
                    return None;
                }

                match heap.peek().map(|head| head.due_at()) {
                    Some(due_at) if due_at <= Instant::now() => {
                        let task = heap.pop();
                        trace!(pending = heap.len(), "pop_when_due: head due, popping");
                        return task;
                    }
                    deadline => {
                        // Register for wake-ups while the lock is still held
                        // so an insert or stop between unlock and await
                        // cannot slip through unobserved.
                        notified.as_mut().enable();
                        deadline
                    }
                }
            };

            match deadline {
                // Head not due yet: wait out the remainder, but wake early
                // on insert or stop and re-evaluate.
                Some(due_at) => {
                    trace!(?due_at, "pop_when_due: head not due, timed wait");
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = time::sleep_until(due_at) => {}
                    }
                }
                // Empty queue: wait for an insert or stop.
                None => {
                    trace!("pop_when_due: queue empty, waiting");
                    notified.await;
                }
            }
        }
    }

    /// Request stop: a one-way, idempotent transition
    ///
    /// Wakes every blocked worker, whether parked on an empty queue or on a
    /// far-future due time. The flag store and the broadcast happen under
    /// the queue lock so they cannot slip between a worker's stop check and
    /// its wait registration.
    pub fn stop(&self) {
        debug!("stop: requested");
        let _heap = self.heap();
        self.stopped.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Whether stop has been requested. Lock-free; safe to call from a
    /// worker mid-cycle or from any other thread.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Number of pending tasks
    pub fn len(&self) -> usize {
        self.heap().len()
    }

    /// Whether no tasks are pending
    pub fn is_empty(&self) -> bool {
        self.heap().is_empty()
    }
}

impl Default for TimerQueue {
    fn default() -> Self {
        Self::new()
    }
}
