//! Task ready queue
use std::ops::RangeTo;

use kestrel_core::kernel::Priority;

use super::TaskId;
use crate::utils::{PrioQueue, QueueKey};

/// Tracks the tasks in the Ready state, sorted by priority. Tasks with
/// identical priorities are dispatched in the order they became Ready.
#[derive(Debug)]
pub(crate) struct ReadyQueue {
    queue: PrioQueue<TaskId>,
}

impl ReadyQueue {
    pub(crate) const fn new() -> Self {
        Self {
            queue: PrioQueue::new(),
        }
    }

    /// Return a flag indicating whether there's a task in Ready state whose
    /// priority is in the specified range.
    #[inline]
    pub(crate) fn has_ready_task_in_priority_range(&self, range: RangeTo<Priority>) -> bool {
        self.queue.has_entry_in_priority_range(range)
    }

    /// Insert the specified task behind every Ready task having an equal or
    /// more urgent priority.
    #[inline]
    pub(crate) fn push_back_task(&mut self, task: TaskId, priority: Priority) -> QueueKey {
        self.queue.push_back(priority, task)
    }

    /// Remove the task identified by `key`, which was returned by
    /// [`Self::push_back_task`].
    #[inline]
    pub(crate) fn remove_task(&mut self, key: QueueKey) {
        self.queue.remove(key);
    }

    /// Remove and return the task to dispatch next.
    #[inline]
    pub(crate) fn pop_front_task(&mut self) -> Option<TaskId> {
        self.queue.pop_front()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
