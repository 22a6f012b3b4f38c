//! The fatal error channel
use std::fmt;

use kestrel_core::kernel::{classify, CallerSnapshot, FatalAction, ResultCode, Scope, Violation};

use crate::{
    klock::{self, CpuLockGuard},
    state::{Current, RunOutcome},
    task::{self, ThreadId},
    threading::{self, Unwind},
};

/// Describes a fatal violation. Passed to [`FatalHandler::handle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatalReport {
    /// What went wrong.
    pub violation: Violation,
    /// The execution state of the offending caller.
    pub caller: CallerSnapshot,
    /// The offending thread (or, in an interrupt context, the interrupted
    /// thread).
    pub thread: ThreadId,
    /// What is terminated after the handler returns.
    pub scope: Scope,
}

impl fmt::Display for FatalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fatal error in {}{}: {} (terminating: {:?})",
            self.thread,
            if self.caller.in_interrupt {
                " (interrupt context)"
            } else {
                ""
            },
            self.violation,
            self.scope
        )
    }
}

/// Receives every fatal violation before the termination it calls for is
/// carried out.
///
/// The handler runs on the offending thread without CPU Lock. It must not
/// call blocking kernel services.
pub trait FatalHandler: Send + Sync + 'static {
    fn handle(&self, report: &FatalReport);
}

/// The default [`FatalHandler`], which logs the report with
/// [`log::error!`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFatalHandler;

impl FatalHandler for LogFatalHandler {
    fn handle(&self, report: &FatalReport) {
        log::error!("{report}");
    }
}

/// Report a violation by the current context.
///
/// Returns the error code to report to the caller if the violation is
/// recoverable. Otherwise, this calls the fatal handler and then terminates
/// whatever [`classify`] says, never returning.
pub(crate) fn raise(lock: CpuLockGuard<'_>, cur: &Current, violation: Violation) -> ResultCode {
    let caller = CallerSnapshot {
        privileged: lock.task(cur.task).is_privileged(),
        in_interrupt: cur.in_interrupt(),
    };

    let scope = match classify(violation, caller) {
        FatalAction::ReturnError(code) => {
            log::debug!("{}: {violation} (returning {code:?})", cur.task);
            return code;
        }
        FatalAction::Terminate(scope) => scope,
    };

    let report = FatalReport {
        violation,
        caller,
        thread: cur.task,
        scope,
    };
    log::warn!("{report}");

    drop(lock);
    cur.kernel.cfg.fatal_handler.handle(&report);

    // Don't use `cur.lock()`, which would unwind without terminating
    // anything if the kernel stopped in the meantime
    let mut lock = klock::lock_cpu(&cur.kernel);
    match scope {
        Scope::Interrupt => {
            drop(lock);
            threading::unwind(Unwind::InterruptAborted(report));
        }
        Scope::Context => {
            if lock.main_task == Some(cur.task) {
                lock.stop(RunOutcome::MainTerminated(report));
            }
            task::exit_task(&mut lock, cur.task);
            task::unwind_current(lock);
        }
        Scope::System => {
            lock.stop(RunOutcome::Halted(report));
            task::unwind_current(lock);
        }
    }
}

/// Report a violation that is never recoverable.
pub(crate) fn raise_fatal(lock: CpuLockGuard<'_>, cur: &Current, violation: Violation) -> ! {
    let code = raise(lock, cur, violation);
    unreachable!("{violation:?} was classified as recoverable ({code:?})");
}
