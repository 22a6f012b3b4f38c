//! Host threads backing the kernel's tasks.
//!
//! Every task runs on its own host thread. A host thread only executes task
//! code while its task is the running task; the rest of the time it's parked
//! in a kernel wait loop. Tasks leave the kernel's control by unwinding with
//! an [`Unwind`] payload, which [`run_task`] catches.
use std::{
    cell::{Cell, RefCell},
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread,
};

use crate::{
    fatal::FatalReport,
    kernel::KernelInner,
    klock::{self, CpuLockGuard},
    state::RunOutcome,
    task::{self, TaskId},
};

/// The role of a host thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ThreadRole {
    /// Not managed by a kernel.
    Unknown,
    /// The backing thread of a task, executing task code.
    Task,
    /// The backing thread of a task, executing an interrupt handler on top of
    /// the interrupted task (see `irq_offload`).
    Interrupt,
}

thread_local! {
    /// The current thread's role. It's automatically assigned after the
    /// creation of a thread managed by a kernel.
    static THREAD_ROLE: Cell<ThreadRole> = const { Cell::new(ThreadRole::Unknown) };

    /// The kernel and the task the current thread belongs to.
    static BINDING: RefCell<Option<(Arc<KernelInner>, TaskId)>> = const { RefCell::new(None) };
}

/// The panic payload used to leave task code for good.
pub(crate) enum Unwind {
    /// The task is done. Its bookkeeping (if any) has been taken care of.
    Exited,
    /// The interrupt handler was aborted by a fatal violation.
    InterruptAborted(FatalReport),
}

/// Unwind the current host thread with `payload`, without invoking the panic
/// hook.
pub(crate) fn unwind(payload: Unwind) -> ! {
    panic::resume_unwind(Box::new(payload))
}

pub(crate) fn current() -> Option<(Arc<KernelInner>, TaskId)> {
    BINDING.with(|b| {
        b.borrow()
            .as_ref()
            .map(|(kernel, task)| (Arc::clone(kernel), *task))
    })
}

#[inline]
pub(crate) fn current_role() -> ThreadRole {
    THREAD_ROLE.with(|r| r.get())
}

/// Change the current thread's role, returning the previous one.
pub(crate) fn replace_role(role: ThreadRole) -> ThreadRole {
    THREAD_ROLE.with(|r| r.replace(role))
}

/// Start a host thread for `task`. It'll wait until the task is dispatched
/// and then call `entry`.
///
/// The caller must hold CPU Lock so that `Kernel::run` can't miss the new
/// join handle.
pub(crate) fn spawn_task_thread(
    lock: &CpuLockGuard<'_>,
    kernel: &Arc<KernelInner>,
    task: TaskId,
    stack_size: usize,
    entry: Box<dyn FnOnce() + Send>,
) {
    debug_assert!(std::ptr::eq(lock.kernel(), &**kernel));
    let kernel2 = Arc::clone(kernel);
    let join_handle = thread::Builder::new()
        .name(format!("kestrel {task}"))
        .stack_size(stack_size)
        .spawn(move || run_task(kernel2, task, entry))
        .unwrap_or_else(|e| panic!("failed to spawn a host thread for {task}: {e}"));
    kernel.host_threads.lock().push(join_handle);
}

/// The body of a task's host thread.
fn run_task(kernel: Arc<KernelInner>, task: TaskId, entry: Box<dyn FnOnce() + Send>) {
    BINDING.with(|b| *b.borrow_mut() = Some((Arc::clone(&kernel), task)));
    THREAD_ROLE.with(|role| role.set(ThreadRole::Task));

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let lock = klock::lock_cpu(&kernel);
        // Wait for the start delay (if any) and the first dispatch
        drop(task::wait_until_ready_and_running(lock, task));

        log::debug!("{task} is starting");
        entry();

        let mut lock = klock::lock_cpu(&kernel);
        log::debug!("{task} exited");
        task::exit_task(&mut lock, task);
    }));

    if let Err(payload) = result {
        if !payload.is::<Unwind>() {
            let mut lock = klock::lock_cpu(&kernel);
            log::error!("{task} panicked");
            lock.stop(RunOutcome::Panicked(payload));
            task::exit_task(&mut lock, task);
        }
    }

    THREAD_ROLE.with(|role| role.set(ThreadRole::Unknown));
    BINDING.with(|b| *b.borrow_mut() = None);
}
