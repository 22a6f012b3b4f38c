//! Threads and the scheduler
use std::{
    fmt,
    num::NonZeroUsize,
    sync::{Arc, Weak},
    time::{Duration, Instant},
};

use kestrel_core::kernel::{
    AbortThreadError, Priority, StartThreadError, ThreadOptions, ThreadState, Violation,
};
use spin::Mutex as SpinMutex;

use crate::{
    admission::{StackRegion, ThreadDefiner},
    fatal,
    kernel::KernelInner,
    klock::{self, CpuLockGuard},
    state::{Current, RunOutcome, State},
    threading::{self, Unwind},
    utils::QueueKey,
    wait::WaitOutcome,
};

pub(crate) mod readyqueue;

/// Identifies a thread within a kernel.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(NonZeroUsize);

pub(crate) type TaskId = ThreadId;

impl ThreadId {
    #[inline]
    pub(crate) fn from_index(index: usize) -> Self {
        Self(NonZeroUsize::MIN.saturating_add(index))
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0.get() - 1
    }

    /// Get the raw value of the identifier. The first thread of a kernel
    /// (the main thread) has the value `1`.
    #[inline]
    pub fn get(self) -> NonZeroUsize {
        self.0
    }
}

impl fmt::Debug for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ThreadId({})", self.0)
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread {}", self.0)
    }
}

/// *Task control block* - the state data of a task.
#[derive(Debug)]
pub(crate) struct TaskCb {
    pub(crate) priority: Priority,
    pub(crate) options: ThreadOptions,
    /// `None` for the main task, whose stack is provided by the host.
    pub(crate) stack: Option<StackRegion>,
    pub(crate) st: TaskSt,
    /// The time when a task in the Waiting state wakes up by itself.
    pub(crate) deadline: Option<Instant>,
    /// The task's position in the ready queue while it's Ready.
    pub(crate) ready_key: Option<QueueKey>,
}

impl TaskCb {
    pub(crate) fn new(
        priority: Priority,
        options: ThreadOptions,
        stack: Option<StackRegion>,
    ) -> Self {
        Self {
            priority,
            options,
            stack,
            st: TaskSt::Waiting(WaitKind::Start),
            deadline: None,
            ready_key: None,
        }
    }

    #[inline]
    pub(crate) fn is_privileged(&self) -> bool {
        self.options.is_privileged()
    }
}

/// Task state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskSt {
    Ready,
    /// The task owns the processor.
    Running,
    Waiting(WaitKind),
    /// The task exited or was aborted. Terminal.
    Exited,
}

/// What a Waiting task is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitKind {
    /// A mutex to be handed over.
    Mutex,
    Sleep,
    /// The start delay to elapse.
    Delay,
    /// `Thread::start`.
    Start,
}

impl TaskSt {
    pub(crate) fn to_thread_state(self) -> ThreadState {
        match self {
            Self::Ready => ThreadState::Ready,
            Self::Running => ThreadState::Running,
            Self::Waiting(WaitKind::Mutex) => ThreadState::BlockedOnMutex,
            Self::Waiting(WaitKind::Sleep | WaitKind::Delay) => ThreadState::Sleeping,
            Self::Waiting(WaitKind::Start) => ThreadState::Suspended,
            Self::Exited => ThreadState::Terminated,
        }
    }
}

// Scheduling
// ---------------------------------------------------------------------------

/// Transition the task into the Ready state and append it to the ready
/// queue.
pub(crate) fn make_ready(state: &mut State, task: TaskId) {
    let priority = state.task(task).priority;
    let key = state.ready_queue.push_back_task(task, priority);
    let task_cb = state.task_mut(task);
    debug_assert!(matches!(task_cb.st, TaskSt::Waiting(_) | TaskSt::Running));
    task_cb.st = TaskSt::Ready;
    task_cb.deadline = None;
    task_cb.ready_key = Some(key);
}

/// Dispatch the most urgent Ready task. Must be called only when no task is
/// running.
///
/// If there's nothing to dispatch and nothing will ever become Ready, the
/// kernel is stopped as deadlocked.
pub(crate) fn choose_next_running_task(state: &mut State) {
    debug_assert!(state.running_task.is_none());
    if state.is_stopped() {
        return;
    }

    if let Some(next) = state.ready_queue.pop_front_task() {
        let task_cb = state.task_mut(next);
        task_cb.st = TaskSt::Running;
        task_cb.ready_key = None;
        state.running_task = Some(next);
        log::trace!("dispatching {next}");
    } else if state.is_deadlocked() {
        log::warn!("no thread can make progress; the system is deadlocked");
        state.stop(RunOutcome::Deadlocked);
    } else {
        log::trace!("idle");
    }
}

/// Dispatch a task if the processor is idle.
pub(crate) fn dispatch_if_idle(state: &mut State) {
    if state.running_task.is_none() {
        choose_next_running_task(state);
    }
}

/// Make a Waiting task Ready (e.g., because it was handed a mutex).
pub(crate) fn wake_up(state: &mut State, task: TaskId) {
    debug_assert!(matches!(state.task(task).st, TaskSt::Waiting(_)));
    make_ready(state, task);
    dispatch_if_idle(state);
}

/// Transition the running task into the Waiting state and give the processor
/// to someone else. The caller must follow this with one of the wait
/// functions.
pub(crate) fn block_current(
    state: &mut State,
    task: TaskId,
    kind: WaitKind,
    deadline: Option<Instant>,
) {
    debug_assert_eq!(state.running_task, Some(task));
    let task_cb = state.task_mut(task);
    task_cb.st = TaskSt::Waiting(kind);
    task_cb.deadline = deadline;
    log::trace!("{task} is waiting ({kind:?}, deadline = {deadline:?})");
    state.running_task = None;
    choose_next_running_task(state);
}

/// Put the task into the Exited state. If it's the running task, the
/// processor is given to someone else. If it's the main task, the kernel
/// stops.
pub(crate) fn exit_task(state: &mut State, task: TaskId) {
    let task_cb = state.task_mut(task);
    if task_cb.st == TaskSt::Exited {
        return;
    }
    let ready_key = task_cb.ready_key.take();
    task_cb.st = TaskSt::Exited;
    task_cb.deadline = None;

    if let Some(key) = ready_key {
        state.ready_queue.remove_task(key);
    }

    if state.main_task == Some(task) {
        state.stop(RunOutcome::Finished);
    }

    if state.running_task == Some(task) {
        state.running_task = None;
        choose_next_running_task(state);
    }
}

/// Compute the deadline of a wait that starts now. A deadline too far in the
/// future to be represented is treated as no deadline.
pub(crate) fn deadline_after(duration: Duration) -> Option<Instant> {
    Instant::now().checked_add(duration)
}

/// Leave task code for good. The task's bookkeeping must already be
/// complete (or the kernel stopped).
pub(crate) fn unwind_current(lock: CpuLockGuard<'_>) -> ! {
    drop(lock);
    threading::unwind(Unwind::Exited)
}

/// Wait until the task is no longer in the Waiting state or its deadline
/// passes. When woken up, this also waits until the task is dispatched.
pub(crate) fn wait_until_woken_up<'a>(
    mut lock: CpuLockGuard<'a>,
    task: TaskId,
) -> (CpuLockGuard<'a>, WaitOutcome) {
    loop {
        if lock.is_stopped() {
            return (lock, WaitOutcome::Aborted);
        }

        let (st, deadline) = {
            let task_cb = lock.task(task);
            (task_cb.st, task_cb.deadline)
        };
        match st {
            TaskSt::Exited => return (lock, WaitOutcome::Aborted),
            TaskSt::Ready | TaskSt::Running => break,
            TaskSt::Waiting(_) => {}
        }

        lock = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return (lock, WaitOutcome::TimedOut);
                }
                lock.wait_timeout(deadline - now)
            }
            None => lock.wait(),
        };
    }

    match wait_until_running(lock, task) {
        Ok(lock) => (lock, WaitOutcome::Woken),
        Err(lock) => (lock, WaitOutcome::Aborted),
    }
}

/// Wait until the task is dispatched. Fails if the task is aborted or the
/// kernel stops in the meantime.
pub(crate) fn wait_until_running<'a>(
    mut lock: CpuLockGuard<'a>,
    task: TaskId,
) -> Result<CpuLockGuard<'a>, CpuLockGuard<'a>> {
    loop {
        if lock.is_stopped() || lock.task(task).st == TaskSt::Exited {
            return Err(lock);
        }
        if lock.running_task == Some(task) {
            return Ok(lock);
        }
        lock = lock.wait();
    }
}

/// Handle a wait whose deadline passed: make the task Ready and wait until
/// it's dispatched again.
pub(crate) fn resume_after_timeout<'a>(mut lock: CpuLockGuard<'a>, task: TaskId) -> CpuLockGuard<'a> {
    make_ready(&mut lock, task);
    dispatch_if_idle(&mut lock);
    match wait_until_running(lock, task) {
        Ok(lock) => lock,
        Err(lock) => unwind_current(lock),
    }
}

/// Wait until the task is Ready and then running, whether it's woken up or
/// its deadline passes. Used by sleeping and by a new task's host thread.
pub(crate) fn wait_until_ready_and_running(lock: CpuLockGuard<'_>, task: TaskId) -> CpuLockGuard<'_> {
    match wait_until_woken_up(lock, task) {
        (lock, WaitOutcome::Woken) => lock,
        (lock, WaitOutcome::TimedOut) => resume_after_timeout(lock, task),
        (lock, WaitOutcome::Aborted) => unwind_current(lock),
    }
}

/// Release CPU Lock, yielding the processor first if a more urgent task is
/// Ready.
///
/// Nothing happens in an interrupt context; the check is repeated when the
/// interrupt handler returns.
pub(crate) fn unlock_cpu_and_check_preemption(mut lock: CpuLockGuard<'_>, task: TaskId) {
    if threading::current_role() == threading::ThreadRole::Interrupt
        || lock.running_task != Some(task)
    {
        return;
    }

    let priority = lock.task(task).priority;
    if !lock.ready_queue.has_ready_task_in_priority_range(..priority) {
        return;
    }

    log::trace!("{task} is preempted");
    lock.running_task = None;
    make_ready(&mut lock, task);
    choose_next_running_task(&mut lock);

    if let Err(lock) = wait_until_running(lock, task) {
        unwind_current(lock);
    }
}

// Thread slots
// ---------------------------------------------------------------------------

/// A thread slot.
///
/// A slot is a `static` that a thread is created into. A slot can be created
/// into only once; it remembers the thread even after the thread terminates.
///
/// # Examples
///
/// ```
/// use kestrel_kernel::{Kernel, KernelConfig, Thread, ThreadStack, ThreadState};
///
/// static WORKER: Thread = Thread::new();
/// static WORKER_STACK: ThreadStack<1024> = ThreadStack::new();
///
/// fn worker(_: usize, _: usize, _: usize) {}
///
/// Kernel::new(KernelConfig::new())
///     .run(|| {
///         Thread::define()
///             .start(worker)
///             .stack(&WORKER_STACK)
///             .priority(5)
///             .spawn(&WORKER);
///         assert_eq!(WORKER.state(), ThreadState::Ready);
///     })
///     .unwrap();
/// ```
pub struct Thread {
    binding: SpinMutex<Option<SlotBinding>>,
}

#[derive(Clone)]
pub(crate) struct SlotBinding {
    pub(crate) kernel: Weak<KernelInner>,
    pub(crate) task: TaskId,
}

impl SlotBinding {
    /// A `TaskId` is only meaningful in the kernel that issued it.
    fn belongs_to(&self, kernel: &Arc<KernelInner>) -> bool {
        is_same_kernel(&self.kernel, kernel)
    }
}

impl Thread {
    /// Construct an uninitialized thread slot.
    pub const fn new() -> Self {
        Self {
            binding: SpinMutex::new(None),
        }
    }

    /// Start defining a thread to create in a slot.
    pub fn define() -> ThreadDefiner {
        ThreadDefiner::new()
    }

    /// Get the thread's identifier. Returns `None` if nothing has been
    /// created in the slot.
    pub fn id(&self) -> Option<ThreadId> {
        self.binding.lock().as_ref().map(|b| b.task)
    }

    /// Get the thread's current state.
    ///
    /// A thread whose kernel has finished running is reported as
    /// [`ThreadState::Terminated`].
    pub fn state(&self) -> ThreadState {
        let Some(binding) = self.binding() else {
            return ThreadState::Uninitialized;
        };
        let Some(kernel) = binding.kernel.upgrade() else {
            return ThreadState::Terminated;
        };
        let lock = klock::lock_cpu(&kernel);
        if lock.is_stopped() {
            return ThreadState::Terminated;
        }
        lock.task(binding.task).st.to_thread_state()
    }

    /// Terminate the thread.
    ///
    /// Aborting a thread that has already terminated does nothing. Aborting
    /// the current thread doesn't return. Mutexes owned by the aborted
    /// thread stay locked.
    pub fn abort(&self) -> Result<(), AbortThreadError> {
        let cur = Current::get();
        let mut lock = cur.lock();
        let Some(binding) = self.binding().filter(|b| b.belongs_to(&cur.kernel)) else {
            return Err(AbortThreadError::BadObjectState);
        };
        let task = binding.task;

        if task == cur.task {
            log::debug!("{task} aborts itself");
            exit_task(&mut lock, task);
            unwind_current(lock);
        }

        if lock.task(task).st != TaskSt::Exited {
            log::warn!("{} aborts {task}", cur.task);
            exit_task(&mut lock, task);
        }

        unlock_cpu_and_check_preemption(lock, cur.task);
        Ok(())
    }

    /// Start a thread that was created with [`Timeout::Forever`] as its start
    /// delay.
    ///
    /// [`Timeout::Forever`]: kestrel_core::time::Timeout::Forever
    pub fn start(&self) -> Result<(), StartThreadError> {
        let cur = Current::get();
        let mut lock = cur.lock();
        let Some(binding) = self.binding().filter(|b| b.belongs_to(&cur.kernel)) else {
            return Err(StartThreadError::BadObjectState);
        };
        if lock.task(binding.task).st != TaskSt::Waiting(WaitKind::Start) {
            return Err(StartThreadError::BadObjectState);
        }

        log::debug!("{} starts {}", cur.task, binding.task);
        wake_up(&mut lock, binding.task);
        unlock_cpu_and_check_preemption(lock, cur.task);
        Ok(())
    }

    fn binding(&self) -> Option<SlotBinding> {
        self.binding.lock().clone()
    }

    /// Claim the slot for a new task. Fails if the slot is already in use.
    ///
    /// The caller must hold CPU Lock so that the slot is claimed atomically
    /// with the creation of the task.
    pub(crate) fn claim(&self, _lock: &CpuLockGuard<'_>, binding: SlotBinding) -> bool {
        let mut slot = self.binding.lock();
        if slot.is_some() {
            false
        } else {
            *slot = Some(binding);
            true
        }
    }
}

impl Default for Thread {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Thread").field(&self.id()).finish()
    }
}

/// A snapshot of a thread's attributes, passed to the callback of
/// [`thread_foreach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: ThreadId,
    pub priority: Priority,
    pub options: ThreadOptions,
    /// The state at the time the snapshot was taken.
    pub state: ThreadState,
    /// `None` for the main thread.
    pub stack: Option<StackRegion>,
}

// Services for the current thread
// ---------------------------------------------------------------------------

/// Get the current thread's identifier.
pub fn current() -> ThreadId {
    Current::get().task
}

/// Get the current thread's priority.
pub fn current_priority() -> Priority {
    let cur = Current::get();
    let lock = cur.lock();
    lock.task(cur.task).priority
}

/// Block the current thread for the specified duration.
///
/// A zero duration yields the processor to Ready threads of a more urgent
/// priority, if any.
pub fn sleep(duration: Duration) {
    let cur = Current::get();
    let mut lock = cur.lock();
    if cur.in_interrupt() {
        fatal::raise_fatal(lock, &cur, Violation::WaitInInterrupt);
    }

    if duration.is_zero() {
        unlock_cpu_and_check_preemption(lock, cur.task);
        return;
    }

    block_current(&mut lock, cur.task, WaitKind::Sleep, deadline_after(duration));
    drop(wait_until_ready_and_running(lock, cur.task));
}

/// Block the current thread for the specified number of milliseconds.
pub fn msleep(ms: u64) {
    sleep(Duration::from_millis(ms));
}

/// Call `callback` for every thread created in the current kernel, including
/// terminated ones.
///
/// The callback receives a snapshot taken before the first call, so it may
/// call kernel services.
pub fn thread_foreach(mut callback: impl FnMut(&ThreadInfo)) {
    foreach_thread(Some(&mut callback))
}

pub(crate) fn foreach_thread(callback: Option<&mut dyn FnMut(&ThreadInfo)>) {
    let cur = Current::get();
    let lock = cur.lock();
    let Some(callback) = callback else {
        fatal::raise_fatal(lock, &cur, Violation::NullCallback);
    };

    let infos: Vec<ThreadInfo> = lock
        .tasks()
        .map(|(id, task_cb)| ThreadInfo {
            id,
            priority: task_cb.priority,
            options: task_cb.options,
            state: task_cb.st.to_thread_state(),
            stack: task_cb.stack,
        })
        .collect();
    drop(lock);

    for info in &infos {
        callback(info);
    }
}

/// Attach a new slot binding referring to `task` in `kernel`.
/// Check whether `weak` refers to `kernel`. The allocation behind a `Weak`
/// outlives the kernel, so a later kernel never shares its address.
pub(crate) fn is_same_kernel(weak: &Weak<KernelInner>, kernel: &Arc<KernelInner>) -> bool {
    Weak::as_ptr(weak) == Arc::as_ptr(kernel)
}

pub(crate) fn slot_binding(kernel: &Arc<KernelInner>, task: TaskId) -> SlotBinding {
    SlotBinding {
        kernel: Arc::downgrade(kernel),
        task,
    }
}
