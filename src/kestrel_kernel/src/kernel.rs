//! Kernel instances
use std::{
    fmt, mem,
    panic,
    sync::{Arc, Condvar, Mutex},
    thread::JoinHandle,
};

use spin::Mutex as SpinMutex;

use crate::{
    cfg::KernelConfig,
    fatal::FatalReport,
    klock,
    state::{RunOutcome, State},
    task::{self, TaskCb},
    threading,
};

/// A kernel instance.
///
/// A kernel simulates a uniprocessor: any number of threads, exactly one of
/// which runs at a time. [`Kernel::run`] starts the main thread and returns
/// when the main thread returns.
///
/// # Examples
///
/// ```
/// use kestrel_kernel::{current_priority, Kernel, KernelConfig};
///
/// Kernel::new(KernelConfig::new().main_priority(3))
///     .run(|| assert_eq!(current_priority(), 3))
///     .unwrap();
/// ```
pub struct Kernel {
    inner: Arc<KernelInner>,
}

pub(crate) struct KernelInner {
    pub(crate) state: Mutex<State>,
    /// Signaled whenever CPU Lock is released.
    pub(crate) dispatch: Condvar,
    pub(crate) cfg: KernelConfig,
    /// The host threads backing the kernel's tasks. Pushed to only while
    /// CPU Lock is held.
    pub(crate) host_threads: SpinMutex<Vec<JoinHandle<()>>>,
}

/// The reason [`Kernel::run`] failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunError {
    /// A privileged thread committed a fatal violation and the system was
    /// halted.
    Halted(FatalReport),
    /// The main thread was terminated because of a fatal violation.
    MainTerminated(FatalReport),
    /// Every thread was blocked with no deadline; nothing could ever run
    /// again.
    Deadlocked,
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Halted(report) => write!(f, "the system was halted: {report}"),
            Self::MainTerminated(report) => {
                write!(f, "the main thread was terminated: {report}")
            }
            Self::Deadlocked => f.write_str("the system deadlocked"),
        }
    }
}

impl std::error::Error for RunError {}

impl RunError {
    /// Get the fatal report that caused the failure, if any.
    pub fn report(&self) -> Option<&FatalReport> {
        match self {
            Self::Halted(report) | Self::MainTerminated(report) => Some(report),
            Self::Deadlocked => None,
        }
    }
}

impl Kernel {
    /// Construct a kernel.
    ///
    /// Panics if `cfg` is inconsistent.
    pub fn new(cfg: KernelConfig) -> Self {
        cfg.validate();
        Self {
            inner: Arc::new(KernelInner {
                state: Mutex::new(State::new()),
                dispatch: Condvar::new(),
                cfg,
                host_threads: SpinMutex::new(Vec::new()),
            }),
        }
    }

    /// Run `main` as the main thread and wait until the kernel stops.
    ///
    /// The kernel stops when the main thread returns or aborts itself;
    /// every other thread is terminated at that point. If any thread
    /// panics, the panic is propagated to the caller.
    pub fn run(self, main: impl FnOnce() + Send + 'static) -> Result<(), RunError> {
        let inner = self.inner;

        {
            let mut lock = klock::lock_cpu(&inner);
            let cfg = &inner.cfg;
            let main_task =
                lock.insert_task(TaskCb::new(cfg.main_priority, cfg.main_options, None));
            lock.main_task = Some(main_task);
            task::make_ready(&mut lock, main_task);
            task::choose_next_running_task(&mut lock);
            log::trace!("starting the main thread ({main_task})");

            threading::spawn_task_thread(
                &lock,
                &inner,
                main_task,
                cfg.host_stack_size,
                Box::new(main),
            );
        }

        // Wait until the kernel stops
        let mut lock = klock::lock_cpu(&inner);
        while !lock.is_stopped() {
            lock = lock.wait();
        }
        drop(lock);

        // Every host thread will notice that the kernel has stopped and
        // unwind
        let host_threads = mem::take(&mut *inner.host_threads.lock());
        log::trace!("joining {} host thread(s)", host_threads.len());
        for join_handle in host_threads {
            if let Err(e) = join_handle.join() {
                // Panics in task code are caught by the host thread itself;
                // this is a bug in the kernel
                panic::resume_unwind(e);
            }
        }

        let outcome = klock::lock_cpu(&inner).take_outcome();
        match outcome {
            Some(RunOutcome::Finished) => Ok(()),
            Some(RunOutcome::Halted(report)) => Err(RunError::Halted(report)),
            Some(RunOutcome::MainTerminated(report)) => Err(RunError::MainTerminated(report)),
            Some(RunOutcome::Deadlocked) => Err(RunError::Deadlocked),
            // Propagate any panic that occurred in a task
            Some(RunOutcome::Panicked(payload)) => panic::resume_unwind(payload),
            None => unreachable!(),
        }
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("cfg", &self.inner.cfg)
            .finish_non_exhaustive()
    }
}
