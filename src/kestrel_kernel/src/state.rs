//! The global kernel state, protected by CPU Lock
use std::{any::Any, fmt, sync::Arc};

use slab::Slab;

use crate::{
    fatal::FatalReport,
    klock::{self, CpuLockGuard},
    kernel::KernelInner,
    task::{self, readyqueue::ReadyQueue, TaskCb, TaskId, TaskSt},
    threading::{self, ThreadRole},
};

/// Why the kernel stopped running.
pub(crate) enum RunOutcome {
    /// The main thread returned (or aborted itself).
    Finished,
    /// A privileged thread committed a fatal violation.
    Halted(FatalReport),
    /// The main thread was terminated by a fatal violation.
    MainTerminated(FatalReport),
    /// No thread can ever make progress again.
    Deadlocked,
    /// A thread panicked. The payload is re-raised by `Kernel::run`.
    Panicked(Box<dyn Any + Send>),
}

impl fmt::Debug for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finished => f.write_str("Finished"),
            Self::Halted(r) => f.debug_tuple("Halted").field(r).finish(),
            Self::MainTerminated(r) => f.debug_tuple("MainTerminated").field(r).finish(),
            Self::Deadlocked => f.write_str("Deadlocked"),
            Self::Panicked(_) => f.write_str("Panicked(..)"),
        }
    }
}

pub(crate) struct State {
    /// Task control blocks. Entries are never removed, so a `TaskId` stays
    /// valid for the lifetime of the kernel.
    tasks: Slab<TaskCb>,
    pub(crate) ready_queue: ReadyQueue,
    /// The task that currently owns the (simulated) processor.
    pub(crate) running_task: Option<TaskId>,
    pub(crate) main_task: Option<TaskId>,
    /// Set once the kernel has stopped. Never cleared.
    stopped: bool,
    /// Why the kernel stopped. The first outcome wins.
    outcome: Option<RunOutcome>,
}

impl State {
    pub(crate) fn new() -> Self {
        Self {
            tasks: Slab::new(),
            ready_queue: ReadyQueue::new(),
            running_task: None,
            main_task: None,
            stopped: false,
            outcome: None,
        }
    }

    /// Get the identifier the next call to [`Self::insert_task`] will return.
    #[inline]
    pub(crate) fn next_task_id(&self) -> TaskId {
        TaskId::from_index(self.tasks.vacant_key())
    }

    pub(crate) fn insert_task(&mut self, task_cb: TaskCb) -> TaskId {
        TaskId::from_index(self.tasks.insert(task_cb))
    }

    #[inline]
    pub(crate) fn task(&self, task: TaskId) -> &TaskCb {
        &self.tasks[task.index()]
    }

    #[inline]
    pub(crate) fn task_mut(&mut self, task: TaskId) -> &mut TaskCb {
        &mut self.tasks[task.index()]
    }

    pub(crate) fn tasks(&self) -> impl Iterator<Item = (TaskId, &TaskCb)> + '_ {
        self.tasks
            .iter()
            .map(|(index, task_cb)| (TaskId::from_index(index), task_cb))
    }

    #[inline]
    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Stop the kernel. Every parked thread unwinds as soon as it notices.
    pub(crate) fn stop(&mut self, outcome: RunOutcome) {
        if !self.stopped {
            log::debug!("stopping the kernel: {:?}", outcome);
            self.stopped = true;
            self.outcome = Some(outcome);
        }
    }

    pub(crate) fn take_outcome(&mut self) -> Option<RunOutcome> {
        self.outcome.take()
    }

    /// Return a flag indicating whether no task can ever become Ready again.
    ///
    /// Only tasks can wake other tasks, and a Waiting task with a deadline
    /// will eventually become Ready by itself.
    pub(crate) fn is_deadlocked(&self) -> bool {
        self.running_task.is_none()
            && self.ready_queue.is_empty()
            && !self
                .tasks
                .iter()
                .any(|(_, task_cb)| matches!(task_cb.st, TaskSt::Waiting(_)) && task_cb.deadline.is_some())
    }
}

/// The calling thread's kernel and task, resolved from the thread-local
/// binding established when the task's host thread was started.
pub(crate) struct Current {
    pub(crate) kernel: Arc<KernelInner>,
    pub(crate) task: TaskId,
}

impl Current {
    /// Get the current context.
    ///
    /// Panics if the calling thread was not started by a kernel. Kernel
    /// services can't be called from an arbitrary host thread.
    #[track_caller]
    pub(crate) fn get() -> Self {
        match threading::current() {
            Some((kernel, task)) => Self { kernel, task },
            None => panic!("kernel services can only be called from a thread managed by a kernel"),
        }
    }

    /// Acquire CPU Lock to perform a kernel service on behalf of the current
    /// context.
    ///
    /// If the current task has been aborted or the kernel has stopped in the
    /// meantime, this unwinds the current task instead of returning.
    pub(crate) fn lock(&self) -> CpuLockGuard<'_> {
        let lock = klock::lock_cpu(&self.kernel);
        if lock.is_stopped() || lock.task(self.task).st == TaskSt::Exited {
            task::unwind_current(lock);
        }
        lock
    }

    #[inline]
    pub(crate) fn role(&self) -> ThreadRole {
        threading::current_role()
    }

    /// Get a flag indicating whether the current context is an interrupt
    /// context.
    #[inline]
    pub(crate) fn in_interrupt(&self) -> bool {
        self.role() == ThreadRole::Interrupt
    }
}
