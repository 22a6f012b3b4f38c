//! Mutexes
use std::{
    fmt,
    sync::{Arc, Weak},
    time::Instant,
};

use kestrel_core::{
    kernel::{InitMutexError, LockMutexError, ResultCode, Violation},
    time::Timeout,
};
use spin::Mutex as SpinMutex;

use crate::{
    fatal,
    kernel::KernelInner,
    state::Current,
    task::{self, TaskId, TaskSt, ThreadId, WaitKind},
    wait::{WaitOutcome, WaitQueue},
};

/// A recursive mutex.
///
/// A thread that owns a mutex can lock it again without blocking; the mutex
/// is released when it has been unlocked as many times as it was locked.
/// Threads waiting for a mutex are served by priority, then in the order
/// they started waiting.
///
/// A `Mutex` is usable as soon as it's constructed, so it can be defined as
/// a `static`. [`Mutex::init`] resets an unowned mutex at run time; the
/// result is indistinguishable from a freshly constructed one.
///
/// The lock state is private. Code that doesn't own a mutex can't change it
/// except through the operations below:
///
/// ```compile_fail
/// let m = kestrel_kernel::Mutex::new();
/// m.cb.lock().lock_count = 0;
/// ```
///
/// # Examples
///
/// ```
/// use kestrel_kernel::{Kernel, KernelConfig, Mutex, Timeout};
///
/// static M: Mutex = Mutex::new();
///
/// Kernel::new(KernelConfig::new())
///     .run(|| {
///         M.lock(Timeout::Forever).unwrap();
///         M.lock(Timeout::NoWait).unwrap();
///         assert_eq!(M.lock_count(), 2);
///         M.unlock();
///         M.unlock();
///         assert!(!M.is_locked());
///     })
///     .unwrap();
/// ```
pub struct Mutex {
    cb: SpinMutex<MutexCb>,
}

/// *Mutex control block* - the state data of a mutex.
///
/// Lock order: CPU Lock, then this. Read-only queries may take this alone.
struct MutexCb {
    /// The thread that currently owns the mutex lock. `None` iff
    /// `lock_count == 0`.
    owner: Option<TaskId>,
    lock_count: u32,
    wait_queue: WaitQueue,
    /// The kernel that `owner` and the entries of `wait_queue` belong to.
    /// `None` while the mutex is unowned and nobody is waiting.
    kernel: Option<Weak<KernelInner>>,
}

impl MutexCb {
    /// Check whether the mutex is free to be used by `kernel`, i.e., no
    /// thread of another kernel owns it or waits for it.
    fn is_usable_by(&self, kernel: &Arc<KernelInner>) -> bool {
        self.kernel
            .as_ref()
            .map_or(true, |k| task::is_same_kernel(k, kernel))
    }

    fn release_kernel_if_idle(&mut self) {
        if self.owner.is_none() && self.wait_queue.is_empty() {
            self.kernel = None;
        }
    }
}

impl Mutex {
    /// Construct an unowned mutex.
    pub const fn new() -> Self {
        Self {
            cb: SpinMutex::new(MutexCb {
                owner: None,
                lock_count: 0,
                wait_queue: WaitQueue::new(),
                kernel: None,
            }),
        }
    }

    /// (Re-)initialize the mutex.
    ///
    /// It's a fatal violation to initialize a mutex that some thread owns.
    pub fn init(&self) -> Result<(), InitMutexError> {
        init_mutex(Some(self))
    }

    /// Acquire the mutex, waiting for up to `timeout` if another thread owns
    /// it. If the current thread already owns it, this increments the lock
    /// count and returns immediately.
    ///
    /// It's a fatal violation to call this from an interrupt context or
    /// while the threads of another kernel own or wait for the mutex.
    pub fn lock(&self, timeout: Timeout) -> Result<(), LockMutexError> {
        lock_mutex(Some(self), timeout)
    }

    /// Release one level of the mutex lock. The mutex is handed to the first
    /// waiter when the lock count reaches zero.
    ///
    /// It's a fatal violation to unlock a mutex that the current thread
    /// doesn't own, to call this from an interrupt context, or to call this
    /// while the threads of another kernel own or wait for the mutex.
    pub fn unlock(&self) {
        unlock_mutex(Some(self))
    }

    /// Get a flag indicating whether some thread owns the mutex.
    pub fn is_locked(&self) -> bool {
        self.cb.lock().owner.is_some()
    }

    /// Get the number of times the owner has locked the mutex. `0` when
    /// unowned.
    pub fn lock_count(&self) -> u32 {
        self.cb.lock().lock_count
    }

    /// Get the thread that owns the mutex.
    pub fn owner(&self) -> Option<ThreadId> {
        self.cb.lock().owner
    }

    /// Get the number of threads waiting for the mutex.
    ///
    /// A thread aborted while waiting is counted until its host thread
    /// removes it, which happens shortly after.
    pub fn num_waiters(&self) -> usize {
        self.cb.lock().wait_queue.len()
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Mutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cb = self.cb.lock();
        f.debug_struct("Mutex")
            .field("owner", &cb.owner)
            .field("lock_count", &cb.lock_count)
            .field("waiters", &cb.wait_queue.iter().collect::<Vec<_>>())
            .finish()
    }
}

pub(crate) fn init_mutex(mutex: Option<&Mutex>) -> Result<(), InitMutexError> {
    let cur = Current::get();
    let lock = cur.lock();

    let Some(mutex) = mutex else {
        let code = fatal::raise(lock, &cur, Violation::NullMutexInit);
        debug_assert_eq!(code, ResultCode::InvalidArgument);
        return Err(InitMutexError::InvalidArgument);
    };

    let mut cb = mutex.cb.lock();
    if cb.owner.is_some() {
        drop(cb);
        fatal::raise_fatal(lock, &cur, Violation::ReinitHeldMutex);
    }

    // An unowned mutex has no waiters, so this only matters if the mutex
    // was left inconsistent by a panic
    debug_assert!(cb.wait_queue.is_empty());
    cb.lock_count = 0;
    cb.wait_queue.clear();
    cb.kernel = None;
    log::trace!("{}: initialized {:p}", cur.task, mutex);
    Ok(())
}

pub(crate) fn lock_mutex(mutex: Option<&Mutex>, timeout: Timeout) -> Result<(), LockMutexError> {
    let cur = Current::get();
    let mut lock = cur.lock();

    if cur.in_interrupt() {
        fatal::raise_fatal(lock, &cur, Violation::MutexInInterrupt);
    }
    let Some(mutex) = mutex else {
        fatal::raise_fatal(lock, &cur, Violation::NullMutex);
    };

    let task = cur.task;
    let (wait_key, deadline) = {
        let mut cb = mutex.cb.lock();
        if !cb.is_usable_by(&cur.kernel) {
            drop(cb);
            fatal::raise_fatal(lock, &cur, Violation::MutexInOtherKernel);
        }

        let owner = cb.owner;
        match owner {
            None => {
                cb.owner = Some(task);
                cb.lock_count = 1;
                cb.kernel = Some(Arc::downgrade(&cur.kernel));
                log::trace!("{task}: acquired {mutex:p}");
                return Ok(());
            }
            Some(owner) if owner == task => {
                let Some(lock_count) = cb.lock_count.checked_add(1) else {
                    drop(cb);
                    fatal::raise_fatal(lock, &cur, Violation::LockCountOverflow);
                };
                cb.lock_count = lock_count;
                log::trace!("{task}: re-acquired {mutex:p} (lock_count = {lock_count})");
                return Ok(());
            }
            Some(_) => {}
        }

        if timeout.is_no_wait() {
            return Err(LockMutexError::Busy);
        }

        let deadline = timeout.duration().and_then(task::deadline_after);
        let priority = lock.task(task).priority;
        (cb.wait_queue.push(task, priority), deadline)
    };

    task::block_current(&mut lock, task, WaitKind::Mutex, deadline);

    let result = match task::wait_until_woken_up(lock, task) {
        (_, WaitOutcome::Woken) => {
            // The previous owner handed the mutex over to us
            debug_assert_eq!(mutex.owner(), Some(task));
            log::trace!("{task}: acquired {mutex:p} after waiting");
            Ok(())
        }
        (lock, WaitOutcome::TimedOut) => {
            // The handoff didn't happen in time. Withdraw from the queue
            // before anyone else can pick us. `unlock` may have discarded
            // the entry already.
            let mut cb = mutex.cb.lock();
            cb.wait_queue.remove(wait_key);
            cb.release_kernel_if_idle();
            drop(cb);
            log::trace!("{task}: timed out waiting for {mutex:p}");
            drop(task::resume_after_timeout(lock, task));
            Err(LockMutexError::Timeout)
        }
        (lock, WaitOutcome::Aborted) => {
            let mut cb = mutex.cb.lock();
            cb.wait_queue.remove(wait_key);
            cb.release_kernel_if_idle();
            drop(cb);
            task::unwind_current(lock);
        }
    };
    result
}

pub(crate) fn unlock_mutex(mutex: Option<&Mutex>) {
    let cur = Current::get();
    let mut lock = cur.lock();

    if cur.in_interrupt() {
        fatal::raise_fatal(lock, &cur, Violation::MutexInInterrupt);
    }
    let Some(mutex) = mutex else {
        fatal::raise_fatal(lock, &cur, Violation::NullMutex);
    };

    let task = cur.task;
    {
        let mut cb = mutex.cb.lock();
        if !cb.is_usable_by(&cur.kernel) {
            drop(cb);
            fatal::raise_fatal(lock, &cur, Violation::MutexInOtherKernel);
        }
        if cb.owner != Some(task) {
            drop(cb);
            fatal::raise_fatal(lock, &cur, Violation::UnlockNotOwner);
        }

        cb.lock_count -= 1;
        if cb.lock_count > 0 {
            log::trace!("{task}: released one level of {mutex:p} (lock_count = {})", cb.lock_count);
            return;
        }

        // Hand the mutex over to the first waiter that is still waiting.
        // Aborted waiters may have left their entries behind, and a waiter
        // whose deadline has passed is about to time out.
        cb.owner = None;
        let now = Instant::now();
        while let Some(next) = cb.wait_queue.pop_front() {
            let task_cb = lock.task(next);
            if task_cb.st != TaskSt::Waiting(WaitKind::Mutex) {
                continue;
            }
            if task_cb.deadline.map_or(false, |deadline| deadline <= now) {
                log::trace!("{task}: skipping {next}, whose wait for {mutex:p} has expired");
                continue;
            }
            cb.owner = Some(next);
            cb.lock_count = 1;
            task::wake_up(&mut lock, next);
            break;
        }
        cb.release_kernel_if_idle();
        log::trace!("{task}: released {mutex:p}, new owner = {:?}", cb.owner);
    }

    task::unlock_cpu_and_check_preemption(lock, task);
}
