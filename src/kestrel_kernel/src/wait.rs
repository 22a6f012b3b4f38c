//! Wait queues
use kestrel_core::kernel::Priority;

use crate::{
    task::TaskId,
    utils::{PrioQueue, QueueKey},
};

/// Identifies a waiting task's entry in a [`WaitQueue`].
pub(crate) type WaitKey = QueueKey;

/// A queue of tasks waiting for an object, served by priority and then by
/// arrival order.
///
/// An entry may outlive the wait it represents: a task aborted while waiting
/// leaves its entry behind until its own host thread gets around to removing
/// it, so consumers must check that a popped task is still waiting.
#[derive(Debug)]
pub(crate) struct WaitQueue {
    waits: PrioQueue<TaskId>,
}

/// How a wait operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitOutcome {
    /// Another task woke the waiter up (e.g., by handing over a mutex).
    Woken,
    /// The deadline passed while the waiter was still waiting.
    TimedOut,
    /// The waiter was aborted, or the kernel stopped.
    Aborted,
}

impl WaitQueue {
    pub(crate) const fn new() -> Self {
        Self {
            waits: PrioQueue::new(),
        }
    }

    /// Insert `task` behind every waiter having an equal or more urgent
    /// priority.
    #[inline]
    pub(crate) fn push(&mut self, task: TaskId, priority: Priority) -> WaitKey {
        self.waits.push_back(priority, task)
    }

    /// Remove a waiter. Returns `false` if it was not in the queue anymore.
    #[inline]
    pub(crate) fn remove(&mut self, key: WaitKey) -> bool {
        self.waits.remove(key).is_some()
    }

    /// Remove and return the first waiter.
    #[inline]
    pub(crate) fn pop_front(&mut self) -> Option<TaskId> {
        self.waits.pop_front()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.waits.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.waits.is_empty()
    }

    #[inline]
    pub(crate) fn clear(&mut self) {
        self.waits.clear();
    }

    /// Iterate over the waiters in the order they will be served.
    #[inline]
    pub(crate) fn iter(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.waits.iter().copied()
    }
}
