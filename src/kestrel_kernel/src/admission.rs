//! Thread admission: validation of creation parameters and hand-off of new
//! threads to the scheduler.
use std::cmp;

use kestrel_core::{
    kernel::{Priority, ThreadOptions, Violation},
    time::Timeout,
};

use crate::{
    cfg::KernelConfig,
    fatal,
    state::Current,
    task::{self, TaskCb, ThreadId, Thread, WaitKind},
    threading,
};

/// The entry point of a thread. Receives the three parameters specified by
/// [`ThreadDefiner::params`].
pub type ThreadEntry = fn(usize, usize, usize);

/// Describes the memory region reserved for a thread's stack.
///
/// Threads run on host threads with host-allocated stacks. The region is
/// validated and recorded, but never written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StackRegion {
    base: usize,
    len: usize,
}

impl StackRegion {
    /// The start address of the region.
    #[inline]
    pub fn base(&self) -> usize {
        self.base
    }

    /// The size of the region in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Statically allocated stack memory for a thread.
#[repr(align(16))]
pub struct ThreadStack<const LEN: usize> {
    storage: [u8; LEN],
}

impl<const LEN: usize> ThreadStack<LEN> {
    pub const fn new() -> Self {
        Self { storage: [0; LEN] }
    }

    /// The usable size of the stack.
    pub const fn size(&self) -> usize {
        LEN
    }

    pub fn region(&'static self) -> StackRegion {
        StackRegion {
            base: self.storage.as_ptr() as usize,
            len: LEN,
        }
    }
}

impl<const LEN: usize> Default for ThreadStack<LEN> {
    fn default() -> Self {
        Self::new()
    }
}

/// The raw creation parameters of a thread.
///
/// Every field is taken as-is; nothing is checked until the thread is
/// created. Optional fields model parameters that a caller may omit by
/// mistake, which the kernel reports as a violation.
#[derive(Debug, Clone, Copy)]
pub struct ThreadAttr {
    pub entry: Option<ThreadEntry>,
    pub params: [usize; 3],
    pub stack: Option<StackRegion>,
    /// The requested stack size in bytes.
    pub stack_size: usize,
    pub priority: Priority,
    pub options: ThreadOptions,
    /// How long to wait before the new thread becomes Ready.
    /// [`Timeout::Forever`] keeps it suspended until [`Thread::start`] is
    /// called.
    pub delay: Timeout,
}

impl Default for ThreadAttr {
    fn default() -> Self {
        Self {
            entry: None,
            params: [0; 3],
            stack: None,
            stack_size: 0,
            priority: 0,
            options: ThreadOptions::empty(),
            delay: Timeout::NoWait,
        }
    }
}

/// The builder of a thread, returned by [`Thread::define`].
#[must_use = "call `spawn` to create the thread"]
#[derive(Debug, Clone, Copy)]
pub struct ThreadDefiner {
    attr: ThreadAttr,
}

impl ThreadDefiner {
    pub(crate) fn new() -> Self {
        Self {
            attr: ThreadAttr::default(),
        }
    }

    /// \[**Required**\] Specify the thread's entry point.
    pub fn start(mut self, entry: ThreadEntry) -> Self {
        self.attr.entry = Some(entry);
        self
    }

    /// Specify the parameters passed to the entry point. Defaults to zeros.
    pub fn params(mut self, p1: usize, p2: usize, p3: usize) -> Self {
        self.attr.params = [p1, p2, p3];
        self
    }

    /// \[**Required**\] Specify the thread's stack. This also sets the stack
    /// size to the size of `stack`.
    pub fn stack<const LEN: usize>(mut self, stack: &'static ThreadStack<LEN>) -> Self {
        self.attr.stack = Some(stack.region());
        self.attr.stack_size = LEN;
        self
    }

    /// Override the stack size.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.attr.stack_size = size;
        self
    }

    /// Specify the thread's priority. Defaults to `0`.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.attr.priority = priority;
        self
    }

    /// Specify the thread's options. Defaults to none (a privileged thread).
    pub fn options(mut self, options: ThreadOptions) -> Self {
        self.attr.options = options;
        self
    }

    /// Specify the start delay. Defaults to [`Timeout::NoWait`].
    pub fn delay(mut self, delay: Timeout) -> Self {
        self.attr.delay = delay;
        self
    }

    /// Get the parameters collected so far.
    pub fn into_attr(self) -> ThreadAttr {
        self.attr
    }

    /// Create the thread in `slot`.
    ///
    /// Invalid parameters are fatal violations; see [`crate::raw::thread_create`].
    pub fn spawn(self, slot: &'static Thread) -> ThreadId {
        create_thread(Some(slot), self.attr)
    }
}

/// What the admission checks need to know about the creating thread.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Creator {
    pub(crate) priority: Priority,
    pub(crate) privileged: bool,
}

/// The parameters of a thread that passed every check.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Admitted {
    pub(crate) entry: ThreadEntry,
    pub(crate) stack: StackRegion,
}

/// Check the creation parameters, in the order they are reported.
pub(crate) fn validate(
    attr: &ThreadAttr,
    creator: Creator,
    cfg: &KernelConfig,
) -> Result<Admitted, Violation> {
    let entry = attr.entry.ok_or(Violation::NullEntry)?;
    let stack = attr.stack.ok_or(Violation::NullStack)?;

    if attr.stack_size == 0 {
        return Err(Violation::ZeroStackSize);
    }
    let total = attr
        .stack_size
        .checked_add(cfg.stack_reserved)
        .ok_or(Violation::StackSizeOverflow)?;
    if total > cfg.max_stack_size {
        return Err(Violation::StackSizeOverflow);
    }
    if attr.stack_size > stack.len() {
        return Err(Violation::StackExceedsRegion);
    }

    if !cfg.priority_range.contains(&attr.priority) {
        return Err(Violation::InvalidPriority);
    }
    if !creator.privileged && attr.priority < creator.priority {
        return Err(Violation::PriorityTooHigh);
    }

    if !creator.privileged && attr.options.is_privileged() {
        return Err(Violation::PrivilegeEscalation);
    }

    Ok(Admitted { entry, stack })
}

/// Create a thread in `slot`.
pub(crate) fn create_thread(slot: Option<&'static Thread>, attr: ThreadAttr) -> ThreadId {
    let cur = Current::get();
    let mut lock = cur.lock();

    if cur.in_interrupt() {
        fatal::raise_fatal(lock, &cur, Violation::CreateInInterrupt);
    }
    let Some(slot) = slot else {
        fatal::raise_fatal(lock, &cur, Violation::NullThread);
    };
    if slot.id().is_some() {
        fatal::raise_fatal(lock, &cur, Violation::ThreadAlreadyInitialized);
    }

    let creator = {
        let task_cb = lock.task(cur.task);
        Creator {
            priority: task_cb.priority,
            privileged: task_cb.is_privileged(),
        }
    };
    let cfg = &cur.kernel.cfg;
    let admitted = match validate(&attr, creator, cfg) {
        Ok(admitted) => admitted,
        Err(violation) => fatal::raise_fatal(lock, &cur, violation),
    };

    // CPU Lock only excludes the threads of this kernel. Another kernel may
    // have claimed the slot since the check above.
    let task = lock.next_task_id();
    if !slot.claim(&lock, task::slot_binding(&cur.kernel, task)) {
        fatal::raise_fatal(lock, &cur, Violation::ThreadAlreadyInitialized);
    }
    let inserted = lock.insert_task(TaskCb::new(attr.priority, attr.options, Some(admitted.stack)));
    debug_assert_eq!(inserted, task);

    match attr.delay {
        Timeout::NoWait => task::make_ready(&mut lock, task),
        Timeout::After(delay) if delay.is_zero() => task::make_ready(&mut lock, task),
        Timeout::After(delay) => {
            let task_cb = lock.task_mut(task);
            task_cb.st = task::TaskSt::Waiting(WaitKind::Delay);
            task_cb.deadline = task::deadline_after(delay);
        }
        // Stays in `Waiting(Start)`
        Timeout::Forever => {}
    }

    log::debug!(
        "{} created {task} (priority = {}, options = {:?}, delay = {:?})",
        cur.task,
        attr.priority,
        attr.options,
        attr.delay,
    );

    let entry = admitted.entry;
    let [p1, p2, p3] = attr.params;
    threading::spawn_task_thread(
        &lock,
        &cur.kernel,
        task,
        cmp::max(attr.stack_size, cfg.host_stack_size),
        Box::new(move || entry(p1, p2, p3)),
    );

    task::unlock_cpu_and_check_preemption(lock, cur.task);
    task
}
