//! Delayed-callback schedulers that drive the countdown
//!
//! The timer never sleeps itself. It hands a one-shot task to a [`Scheduler`]
//! and keeps the returned [`ScheduledTask`] so it can cancel it. Two
//! implementations are provided:
//!
//! - [`ManualScheduler`]: a virtual clock advanced explicitly, for tests and
//!   for hosts that already own a frame/tick loop.
//! - [`TokioScheduler`]: real delays on the current `LocalSet`.

use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    rc::Rc,
    time::Duration,
};
use tokio::task::JoinHandle;
use tracing::trace;

/// One-shot callback run by a scheduler
pub type Task = Box<dyn FnOnce() + 'static>;

/// Handle to a pending task
pub trait ScheduledTask {
    /// Prevent the task from running. Calling it after the task ran is a no-op.
    fn cancel(&mut self);
}

/// Runs tasks after a delay on the owning thread
pub trait Scheduler {
    /// Run `task` once after `delay`
    fn schedule(&self, delay: Duration, task: Task) -> Box<dyn ScheduledTask>;
}

/// Queue key: due time, then insertion order for equal due times
type QueueKey = (Duration, u64);

#[derive(Default)]
struct ManualQueue {
    now: Cell<Duration>,
    next_seq: Cell<u64>,
    tasks: RefCell<BTreeMap<QueueKey, Task>>,
}

/// Virtual-clock scheduler
///
/// Clones share the same clock and queue, so a test can keep one clone while
/// the timer owns another.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    queue: Rc<ManualQueue>,
}

impl ManualScheduler {
    /// Create a scheduler with its clock at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time since creation
    pub fn now(&self) -> Duration {
        self.queue.now.get()
    }

    /// Number of tasks waiting to run
    pub fn pending(&self) -> usize {
        self.queue.tasks.borrow().len()
    }

    /// Move the clock forward, running every task that falls due on the way
    ///
    /// Tasks scheduled by running tasks are picked up if they fall due before
    /// the target time. Returns the number of tasks run.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now() + by;
        let mut ran = 0;

        loop {
            // The queue borrow must end before the task runs, since tasks reschedule.
            let next = {
                let mut tasks = self.queue.tasks.borrow_mut();
                match tasks.keys().next().copied() {
                    Some(key) if key.0 <= target => tasks.remove(&key).map(|task| (key, task)),
                    _ => None,
                }
            };

            let Some(((due, _), task)) = next else { break };
            self.queue.now.set(due);
            task();
            ran += 1;
        }

        self.queue.now.set(target);
        ran
    }

    /// Shorthand for `advance(Duration::from_millis(ms))`
    pub fn advance_ms(&self, ms: u64) -> usize {
        self.advance(Duration::from_millis(ms))
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> Box<dyn ScheduledTask> {
        let seq = self.queue.next_seq.get();
        self.queue.next_seq.set(seq + 1);

        let key = (self.now() + delay, seq);
        self.queue.tasks.borrow_mut().insert(key, task);
        trace!("Scheduled virtual task #{} due at {:?}", seq, key.0);

        Box::new(ManualTask {
            queue: Rc::downgrade(&self.queue),
            key,
        })
    }
}

struct ManualTask {
    queue: std::rc::Weak<ManualQueue>,
    key: QueueKey,
}

impl ScheduledTask for ManualTask {
    fn cancel(&mut self) {
        if let Some(queue) = self.queue.upgrade() {
            queue.tasks.borrow_mut().remove(&self.key);
        }
    }
}

/// Scheduler backed by `tokio::time::sleep` on the current `LocalSet`
///
/// Tasks are spawned with `spawn_local`, so scheduling outside a `LocalSet`
/// panics the way `spawn_local` does.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl TokioScheduler {
    /// Create a scheduler for the current `LocalSet`
    pub fn new() -> Self {
        Self
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> Box<dyn ScheduledTask> {
        let handle = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            task();
        });
        Box::new(TokioTask { handle })
    }
}

struct TokioTask {
    handle: JoinHandle<()>,
}

impl ScheduledTask for TokioTask {
    fn cancel(&mut self) {
        self.handle.abort();
    }
}
