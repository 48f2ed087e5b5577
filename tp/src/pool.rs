//! Fixed-size worker pool executing scheduled tasks at their due times

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::PoolConfig;
use crate::queue::TimerQueue;
use crate::task::ScheduledTask;

/// A fixed set of worker tasks sharing one [`TimerQueue`]
///
/// Workers block until the earliest pending task is due, execute it with no
/// lock held, and re-queue it according to its repeat policy. Construction
/// spawns the workers immediately, so it must happen inside a Tokio runtime.
///
/// Submission is infallible and safe from any thread, including from inside
/// a running task (capture an `Arc<TimerPool>` in the action).
///
/// A panic inside an action unwinds its worker task: the pool keeps running
/// with one fewer effective worker and [`shutdown`](Self::shutdown) reports
/// the loss as a warning. The pool never catches panics on the caller's
/// behalf.
///
/// [`shutdown`](Self::shutdown) is the full stop-and-join sequence; no task
/// runs after it returns. Dropping the pool without calling it still sets
/// the stop flag so workers wind down, but nothing waits for them.
pub struct TimerPool {
    config: PoolConfig,
    queue: Arc<TimerQueue>,

    /// Worker join handles, drained by shutdown
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TimerPool {
    /// Create a pool with `config.workers` workers
    ///
    /// A pool with zero workers is well-defined: submissions queue up but
    /// nothing ever executes them.
    pub fn new(config: PoolConfig) -> Self {
        debug!(workers = config.workers, "TimerPool::new: called");
        let queue = Arc::new(TimerQueue::new());
        let requeue_offset = config.requeue_offset();

        let workers = (0..config.workers)
            .map(|id| {
                let queue = Arc::clone(&queue);
                tokio::spawn(worker_loop(id, queue, requeue_offset))
            })
            .collect();

        info!(workers = config.workers, "timer pool started");
        Self {
            config,
            queue,
            workers: Mutex::new(workers),
        }
    }

    /// Schedule a one-shot task that runs once `delay` has elapsed
    ///
    /// A zero delay runs the task as soon as a worker is free.
    pub fn schedule_once(&self, action: impl FnMut() + Send + 'static, delay: Duration) {
        debug!(?delay, "schedule_once: called");
        self.queue
            .insert(ScheduledTask::once(Box::new(action), Instant::now() + delay));
    }

    /// Schedule a repeating task: first run after `delay`, then every
    /// `interval` until shutdown
    ///
    /// With `interval` zero this degenerates to a one-shot; use
    /// [`schedule_repeating_while`](Self::schedule_repeating_while) with a
    /// zero interval for as-fast-as-possible repetition.
    pub fn schedule_repeating(
        &self,
        action: impl FnMut() + Send + 'static,
        delay: Duration,
        interval: Duration,
    ) {
        debug!(?delay, ?interval, "schedule_repeating: called");
        self.queue.insert(ScheduledTask::repeating(
            Box::new(action),
            Instant::now() + delay,
            interval,
            None,
        ));
    }

    /// Schedule a repeating task that keeps running while `continuation`
    /// returns true
    ///
    /// The continuation is evaluated exactly once after each completed run.
    /// With `interval` zero the task re-queues as fast as possible, bounded
    /// by worker availability.
    pub fn schedule_repeating_while(
        &self,
        action: impl FnMut() + Send + 'static,
        delay: Duration,
        interval: Duration,
        continuation: impl FnMut() -> bool + Send + 'static,
    ) {
        debug!(?delay, ?interval, "schedule_repeating_while: called");
        self.queue.insert(ScheduledTask::repeating(
            Box::new(action),
            Instant::now() + delay,
            interval,
            Some(Box::new(continuation)),
        ));
    }

    /// Stop the pool and wait for every worker to terminate
    ///
    /// Pending, never-run tasks are discarded; a task mid-execution finishes
    /// its current run but is not re-queued. Returns only once all workers
    /// have fully stopped; no task runs after that. Idempotent.
    pub async fn shutdown(&self) {
        debug!("shutdown: called");
        self.queue.stop();

        let workers: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().expect("worker registry lock poisoned");
            workers.drain(..).collect()
        };

        for (id, handle) in workers.into_iter().enumerate() {
            if let Err(e) = handle.await {
                // A worker lost to a panicking action surfaces here instead
                // of failing the shutdown.
                warn!(worker = id, error = %e, "worker terminated abnormally");
            }
        }

        info!("timer pool shut down");
    }

    /// Number of workers this pool was built with
    pub fn worker_count(&self) -> usize {
        self.config.workers
    }

    /// Number of tasks currently queued
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Whether stop has been requested
    pub fn is_stopped(&self) -> bool {
        self.queue.is_stopped()
    }
}

impl Drop for TimerPool {
    fn drop(&mut self) {
        // Backstop for pools dropped without an explicit shutdown: wake the
        // workers so they exit. Joining them needs an async context, which
        // Drop does not have.
        if !self.queue.is_stopped() {
            self.queue.stop();
        }
    }
}

/// Main loop of a single worker
///
/// Pulls the next due task, executes it with no lock held, then decides
/// re-insertion. A stop observed at either point ends the task's repetition
/// and, on the next pop, the loop itself.
async fn worker_loop(id: usize, queue: Arc<TimerQueue>, requeue_offset: Duration) {
    debug!(worker = id, "worker_loop: started");

    while let Some(mut task) = queue.pop_when_due().await {
        trace!(worker = id, ?task, "worker_loop: executing task");
        task.run();

        // A stop that arrived during execution makes this run the task's
        // last; the next pop observes the flag and ends the loop.
        if queue.is_stopped() {
            continue;
        }

        if let Some(next) = task.next_run(requeue_offset) {
            trace!(worker = id, due_at = ?next.due_at(), "worker_loop: re-queueing task");
            queue.insert(next);
        }
    }

    debug!(worker = id, "worker_loop: stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_worker_count_matches_config() {
        let pool = TimerPool::new(PoolConfig::with_workers(3));
        assert_eq!(pool.worker_count(), 3);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_pending_counts_queued_tasks() {
        // Zero workers: nothing drains the queue
        let pool = TimerPool::new(PoolConfig::with_workers(0));
        assert_eq!(pool.pending(), 0);

        pool.schedule_once(|| {}, Duration::from_secs(60));
        pool.schedule_once(|| {}, Duration::from_secs(60));
        assert_eq!(pool.pending(), 2);

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let pool = TimerPool::new(PoolConfig::with_workers(2));
        pool.shutdown().await;
        pool.shutdown().await;
        assert!(pool.is_stopped());
    }

    #[tokio::test]
    async fn test_stopped_pool_discards_submissions() {
        let runs = Arc::new(AtomicUsize::new(0));
        let pool = TimerPool::new(PoolConfig::with_workers(2));
        pool.shutdown().await;

        let counter = Arc::clone(&runs);
        pool.schedule_once(
            move || {
                counter.fetch_add(1, Ordering::Relaxed);
            },
            Duration::ZERO,
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(pool.pending(), 0);
        assert_eq!(runs.load(Ordering::Relaxed), 0);
    }
}
