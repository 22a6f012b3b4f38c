//! Interrupt context simulation
use std::panic::{self, AssertUnwindSafe};

use crate::{
    fatal::FatalReport,
    state::Current,
    task,
    threading::{self, ThreadRole, Unwind},
};

/// Run `handler` in an interrupt context on top of the current thread, as if
/// an interrupt had been taken and serviced synchronously.
///
/// Kernel services called by `handler` see an interrupt context: blocking
/// services and thread creation are fatal violations there. If `handler`
/// commits a fatal violation, it's aborted and this returns the report;
/// the interrupted thread carries on.
///
/// Threads made Ready by `handler` are not dispatched until it returns.
///
/// # Examples
///
/// ```
/// use kestrel_kernel::{irq_offload, is_in_isr, Kernel, KernelConfig};
///
/// Kernel::new(KernelConfig::new())
///     .run(|| {
///         assert!(!is_in_isr());
///         assert_eq!(irq_offload(|| is_in_isr()), Ok(true));
///     })
///     .unwrap();
/// ```
pub fn irq_offload<R>(handler: impl FnOnce() -> R) -> Result<R, FatalReport> {
    let cur = Current::get();
    drop(cur.lock());

    let prev_role = threading::replace_role(ThreadRole::Interrupt);
    log::trace!("{}: entering an interrupt handler", cur.task);
    let result = panic::catch_unwind(AssertUnwindSafe(handler));
    threading::replace_role(prev_role);
    log::trace!("{}: leaving an interrupt handler", cur.task);

    let result = match result {
        Ok(x) => Ok(x),
        Err(payload) => match payload.downcast::<Unwind>() {
            Ok(unwind) => match *unwind {
                Unwind::InterruptAborted(report) => Err(report),
                other => threading::unwind(other),
            },
            Err(payload) => panic::resume_unwind(payload),
        },
    };

    // The handler may have readied a more urgent thread
    task::unlock_cpu_and_check_preemption(cur.lock(), cur.task);

    result
}

/// Get a flag indicating whether the caller is running in an interrupt
/// context (i.e., inside [`irq_offload`]).
pub fn is_in_isr() -> bool {
    threading::current_role() == ThreadRole::Interrupt
}
