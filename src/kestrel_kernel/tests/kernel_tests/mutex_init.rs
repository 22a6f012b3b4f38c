//! Initializing mutexes: the recoverable missing-mutex case and the fatal
//! re-initialization of a held mutex.
use assert_matches::assert_matches;
use kestrel_kernel::{
    current, raw, FatalReport, InitMutexError, KernelConfig, Mutex, RunError, Scope, Thread,
    ThreadOptions, ThreadStack, ThreadState, Timeout, Violation,
};

use crate::utils::{run_with_log, SeqTracker};

#[test]
fn missing_mutex_is_an_error_code() {
    let (result, fatal_log) = run_with_log(KernelConfig::new(), || {
        assert_eq!(raw::mutex_init(None), Err(InitMutexError::InvalidArgument));
    });
    assert_eq!(result, Ok(()));
    assert_eq!(fatal_log.count(), 0);

    // The same for a restricted caller
    let (result, fatal_log) = run_with_log(
        KernelConfig::new().main_options(ThreadOptions::USER),
        || {
            assert_eq!(raw::mutex_init(None), Err(InitMutexError::InvalidArgument));
        },
    );
    assert_eq!(result, Ok(()));
    assert_eq!(fatal_log.count(), 0);
}

#[test]
fn reinit_held_by_user_terminates_caller() {
    static M: Mutex = Mutex::new();
    static CHILD: Thread = Thread::new();
    static CHILD_STACK: ThreadStack<1024> = ThreadStack::new();
    static SEQ: SeqTracker = SeqTracker::new();

    fn child_body(_: usize, _: usize, _: usize) {
        SEQ.expect_and_replace(1, 2);
        let _ = M.init();
        unreachable!();
    }

    let (result, fatal_log) = run_with_log(KernelConfig::new(), || {
        M.lock(Timeout::Forever).unwrap();

        SEQ.expect_and_replace(0, 1);
        // `child` is more urgent, so it runs immediately
        Thread::define()
            .start(child_body)
            .stack(&CHILD_STACK)
            .priority(-1)
            .options(ThreadOptions::USER)
            .spawn(&CHILD);
        SEQ.expect_and_replace(2, 3);

        assert_eq!(CHILD.state(), ThreadState::Terminated);

        // The mutex is intact
        assert_eq!(M.owner(), Some(current()));
        assert_eq!(M.lock_count(), 1);
        M.unlock();
    });

    assert_eq!(result, Ok(()));
    assert_eq!(fatal_log.violations(), [Violation::ReinitHeldMutex]);
    let report = fatal_log.reports()[0];
    assert_eq!(report.scope, Scope::Context);
    assert!(!report.caller.privileged);
    assert!(!report.caller.in_interrupt);
    assert_eq!(Some(report.thread), CHILD.id());
}

#[test]
fn reinit_held_by_kernel_halts() {
    static M: Mutex = Mutex::new();

    let (result, fatal_log) = run_with_log(KernelConfig::new(), || {
        M.lock(Timeout::Forever).unwrap();
        M.lock(Timeout::Forever).unwrap();
        let _ = M.init();
        unreachable!();
    });

    assert_matches!(
        result,
        Err(RunError::Halted(FatalReport {
            violation: Violation::ReinitHeldMutex,
            scope: Scope::System,
            ..
        }))
    );
    assert_eq!(fatal_log.count(), 1);
    // Nothing was reset
    assert_eq!(M.lock_count(), 2);
}
