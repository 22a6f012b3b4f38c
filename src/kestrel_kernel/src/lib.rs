//! A hosted Kestrel kernel.
//!
//! This crate runs kernel threads on host threads while simulating a single
//! processor: exactly one thread runs at a time, and the most urgent Ready
//! thread is dispatched whenever a kernel service gives up or hands over the
//! processor. On top of this it provides
//!
//!  - [`Mutex`], a recursive mutex with a priority-ordered wait queue,
//!  - thread admission ([`Thread::define`], [`raw::thread_create`]), which
//!    validates creation parameters before a thread reaches the scheduler,
//!  - a fatal error channel ([`FatalHandler`]) fed by the classification in
//!    [`kestrel_core::kernel::classify`], and
//!  - interrupt context simulation ([`irq_offload`]).
//!
//! # Fatal violations
//!
//! Misusing a kernel service is a *violation*. Apart from the few that are
//! reported as error codes, violations are fatal: the [`FatalHandler`] is
//! called and then
//!
//!  - an interrupt handler that committed one is aborted,
//!  - a restricted ([`ThreadOptions::USER`]) thread that committed one is
//!    terminated, and
//!  - a privileged thread that committed one halts the system;
//!    [`Kernel::run`] returns [`RunError::Halted`].
//!
//! # Examples
//!
//! ```
//! use kestrel_kernel::{msleep, Kernel, KernelConfig, Mutex, Thread, ThreadStack, Timeout};
//!
//! static M: Mutex = Mutex::new();
//! static WORKER: Thread = Thread::new();
//! static WORKER_STACK: ThreadStack<1024> = ThreadStack::new();
//!
//! fn worker(_: usize, _: usize, _: usize) {
//!     M.lock(Timeout::Forever).unwrap();
//!     M.unlock();
//! }
//!
//! Kernel::new(KernelConfig::new())
//!     .run(|| {
//!         M.lock(Timeout::Forever).unwrap();
//!         Thread::define()
//!             .start(worker)
//!             .stack(&WORKER_STACK)
//!             .priority(1)
//!             .spawn(&WORKER);
//!         msleep(10); // `worker` blocks on `M`
//!         assert_eq!(M.num_waiters(), 1);
//!         M.unlock(); // hands `M` to `worker`
//!         assert_eq!(M.owner(), WORKER.id());
//!     })
//!     .unwrap();
//! ```
#![warn(rust_2018_idioms)]

mod admission;
mod cfg;
mod fatal;
mod interrupt;
mod kernel;
mod klock;
mod mutex;
pub mod raw;
mod state;
mod task;
mod threading;
mod utils;
mod wait;

pub use kestrel_core::{
    kernel::{
        AbortThreadError, CallerSnapshot, InitMutexError, LockMutexError, Priority, ResultCode,
        Scope, StartThreadError, ThreadOptions, ThreadState, Violation,
    },
    time::Timeout,
};

pub use self::{
    admission::{StackRegion, ThreadAttr, ThreadDefiner, ThreadEntry, ThreadStack},
    cfg::KernelConfig,
    fatal::{FatalHandler, FatalReport, LogFatalHandler},
    interrupt::{irq_offload, is_in_isr},
    kernel::{Kernel, RunError},
    mutex::Mutex,
    task::{
        current, current_priority, msleep, sleep, thread_foreach, Thread, ThreadId, ThreadInfo,
    },
};
