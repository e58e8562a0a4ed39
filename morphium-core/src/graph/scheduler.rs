//! Deferred Task Queue
//!
//! Batched subscriptions do not deliver paths as they happen. They schedule a
//! flush task here instead, and the task runs when the owner of the store
//! drains the queue (see `Store::flush` and `Store::batch`). Everything
//! scheduled before a drain, plus anything scheduled while it runs, executes
//! in that drain, which gives the "after the current synchronous work"
//! semantics of a microtask queue without any runtime.
//!
//! Tasks are cancellable: a batched subscription that reschedules its flush,
//! or gets unsubscribed, cancels the task it queued earlier.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// A deferred unit of work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Identifier of a scheduled task, used for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// FIFO queue of deferred tasks.
#[derive(Default)]
pub struct TaskQueue {
    queue: Mutex<VecDeque<(TaskId, Task)>>,
}

impl TaskQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a task behind everything already scheduled.
    pub fn schedule<F>(&self, task: F) -> TaskId
    where
        F: FnOnce() + Send + 'static,
    {
        let id = TaskId::next();
        self.queue.lock().push_back((id, Box::new(task)));
        id
    }

    /// Drop a task that has not run yet. Returns false if it already ran or
    /// was never scheduled here.
    pub fn cancel(&self, id: TaskId) -> bool {
        let mut queue = self.queue.lock();
        match queue.iter().position(|(queued, _)| *queued == id) {
            Some(index) => queue.remove(index).is_some(),
            None => false,
        }
    }

    /// Take the oldest task. The lock is released before the caller runs it,
    /// so tasks may schedule further tasks.
    pub fn pop(&self) -> Option<(TaskId, Task)> {
        self.queue.lock().pop_front()
    }

    /// Drop every waiting task without running it. Returns how many there
    /// were. The tasks are dropped after the queue lock is released.
    pub fn clear(&self) -> usize {
        let dropped: Vec<_> = self.queue.lock().drain(..).collect();
        dropped.len()
    }

    /// Number of tasks waiting.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue").field("pending", &self.len()).finish()
    }
}
