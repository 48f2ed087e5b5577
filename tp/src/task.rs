//! Scheduled task entity and repeat policy

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

/// The unit of work: a zero-argument callable with no return value
pub type TaskAction = Box<dyn FnMut() + Send + 'static>;

/// Continuation predicate: "should this task run again?"
pub type TaskCondition = Box<dyn FnMut() -> bool + Send + 'static>;

/// A task scheduled for execution at a future point in time
///
/// Owned by exactly one place at a time: the queue while pending, a single
/// worker while running. Repetition creates the next incarnation via
/// [`next_run`](Self::next_run) after the current run completes, so a task
/// never observes itself executing concurrently.
pub struct ScheduledTask {
    /// The code to run
    action: TaskAction,

    /// Evaluated once after each completed run; `false` stops repetition.
    /// Absent means "repeat forever" for interval tasks and "do not repeat"
    /// for zero-interval tasks.
    continuation: Option<TaskCondition>,

    /// When the task becomes eligible to run, on the monotonic clock
    due_at: Instant,

    /// Repeat interval; zero means immediate re-queue (with a minimal
    /// forward offset) when a continuation is present
    interval: Duration,

    /// Insertion order, assigned by the queue; equal due times pop FIFO
    pub(crate) seq: u64,
}

impl ScheduledTask {
    /// Create a one-shot task due at `due_at`
    pub fn once(action: TaskAction, due_at: Instant) -> Self {
        Self {
            action,
            continuation: None,
            due_at,
            interval: Duration::ZERO,
            seq: 0,
        }
    }

    /// Create a repeating task
    ///
    /// With `interval` zero and a continuation present the task re-queues as
    /// fast as possible; with `interval` zero and no continuation it is
    /// equivalent to [`once`](Self::once).
    pub fn repeating(
        action: TaskAction,
        due_at: Instant,
        interval: Duration,
        continuation: Option<TaskCondition>,
    ) -> Self {
        Self {
            action,
            continuation,
            due_at,
            interval,
            seq: 0,
        }
    }

    /// The instant at which this task becomes eligible to run
    pub fn due_at(&self) -> Instant {
        self.due_at
    }

    /// The repeat interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the repeat policy can produce another run
    pub fn is_repeating(&self) -> bool {
        !self.interval.is_zero() || self.continuation.is_some()
    }

    /// Execute the action. Called by a worker with no lock held.
    pub fn run(&mut self) {
        (self.action)();
    }

    /// Apply the repeat policy after a completed run
    ///
    /// Evaluates the continuation at most once, then either re-arms the task
    /// with its next due time or retires it. `zero_offset` is the strictly
    /// positive forward offset used in place of a zero interval.
    pub fn next_run(mut self, zero_offset: Duration) -> Option<Self> {
        if !self.is_repeating() {
            return None;
        }

        if let Some(continuation) = self.continuation.as_mut() {
            if !continuation() {
                trace!("next_run: continuation returned false, retiring task");
                return None;
            }
        }

        let now = Instant::now();
        self.due_at = if self.interval.is_zero() {
            now + zero_offset
        } else {
            now + self.interval
        };
        Some(self)
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("due_at", &self.due_at)
            .field("interval", &self.interval)
            .field("has_continuation", &self.continuation.is_some())
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

impl Eq for ScheduledTask {}

impl PartialEq for ScheduledTask {
    fn eq(&self, other: &Self) -> bool {
        self.due_at == other.due_at && self.seq == other.seq
    }
}

impl Ord for ScheduledTask {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Earliest due time first, then insertion order. Reversed so the
        // max-heap BinaryHeap surfaces the most urgent task.
        other
            .due_at
            .cmp(&self.due_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ScheduledTask {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn noop() -> TaskAction {
        Box::new(|| {})
    }

    #[test]
    fn test_earlier_due_time_has_priority() {
        let now = Instant::now();
        let soon = ScheduledTask::once(noop(), now + Duration::from_millis(10));
        let late = ScheduledTask::once(noop(), now + Duration::from_millis(20));

        // Earlier due time should come first (so it's "greater" in the heap)
        assert!(soon > late);
    }

    #[test]
    fn test_equal_due_times_break_ties_by_insertion_order() {
        let due = Instant::now();
        let mut first = ScheduledTask::once(noop(), due);
        first.seq = 1;
        let mut second = ScheduledTask::once(noop(), due);
        second.seq = 2;

        assert!(first > second);
    }

    #[test]
    fn test_one_shot_does_not_repeat() {
        let task = ScheduledTask::once(noop(), Instant::now());
        assert!(!task.is_repeating());
        assert!(task.next_run(Duration::from_micros(1)).is_none());
    }

    #[test]
    fn test_zero_interval_without_continuation_is_one_shot() {
        let task = ScheduledTask::repeating(noop(), Instant::now(), Duration::ZERO, None);
        assert!(!task.is_repeating());
        assert!(task.next_run(Duration::from_micros(1)).is_none());
    }

    #[test]
    fn test_interval_without_continuation_repeats_forever() {
        let interval = Duration::from_millis(100);
        let mut task = ScheduledTask::repeating(noop(), Instant::now(), interval, None);

        for _ in 0..3 {
            let before = Instant::now();
            task = task.next_run(Duration::from_micros(1)).expect("should repeat");
            assert!(task.due_at() >= before + interval);
        }
    }

    #[test]
    fn test_continuation_is_evaluated_once_per_run() {
        let evals = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&evals);
        let continuation: TaskCondition = Box::new(move || {
            counter.fetch_add(1, AtomicOrdering::Relaxed);
            true
        });

        let task = ScheduledTask::repeating(
            noop(),
            Instant::now(),
            Duration::from_millis(50),
            Some(continuation),
        );

        let task = task.next_run(Duration::from_micros(1)).expect("should repeat");
        assert_eq!(evals.load(AtomicOrdering::Relaxed), 1);

        let _ = task.next_run(Duration::from_micros(1)).expect("should repeat");
        assert_eq!(evals.load(AtomicOrdering::Relaxed), 2);
    }

    #[test]
    fn test_continuation_false_retires_task() {
        let continuation: TaskCondition = Box::new(|| false);
        let task = ScheduledTask::repeating(
            noop(),
            Instant::now(),
            Duration::from_millis(50),
            Some(continuation),
        );

        assert!(task.is_repeating());
        assert!(task.next_run(Duration::from_micros(1)).is_none());
    }

    #[test]
    fn test_zero_interval_requeues_with_forward_offset() {
        let offset = Duration::from_micros(1);
        let continuation: TaskCondition = Box::new(|| true);
        let task =
            ScheduledTask::repeating(noop(), Instant::now(), Duration::ZERO, Some(continuation));

        let before = Instant::now();
        let next = task.next_run(offset).expect("should repeat");

        // Strictly in the future so heap ordering stays well-defined
        assert!(next.due_at() > before);
        assert!(next.interval().is_zero());
    }
}
