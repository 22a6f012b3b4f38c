//! Thread creation with invalid parameters. Every case is a fatal violation.
use std::sync::{Arc, Barrier};

use assert_matches::assert_matches;
use kestrel_kernel::{
    irq_offload, raw, FatalReport, KernelConfig, RunError, Scope, StackRegion, Thread, ThreadAttr,
    ThreadOptions, ThreadStack, ThreadState, Violation,
};

use crate::utils::{run_with_log, FatalLog};

fn entry(_: usize, _: usize, _: usize) {}

fn valid_attr(stack: &'static ThreadStack<1024>) -> ThreadAttr {
    Thread::define()
        .start(entry)
        .stack(stack)
        .priority(5)
        .options(ThreadOptions::USER)
        .into_attr()
}

/// Create a thread with `attr` and return what the fatal handler received.
/// The thread must not be created.
#[track_caller]
fn expect_rejection(
    cfg: KernelConfig,
    slot: Option<&'static Thread>,
    attr: ThreadAttr,
) -> (RunError, FatalReport) {
    let (result, fatal_log) = run_with_log(cfg, move || {
        raw::thread_create(slot, attr);
    });
    let error = result.expect_err("the thread was created");
    assert_single_report(&fatal_log, error)
}

#[track_caller]
fn assert_single_report(fatal_log: &FatalLog, error: RunError) -> (RunError, FatalReport) {
    let reports = fatal_log.reports();
    assert_eq!(reports.len(), 1, "{reports:?}");
    assert_eq!(error.report(), Some(&reports[0]));
    (error, reports[0])
}

fn user() -> KernelConfig {
    KernelConfig::new().main_options(ThreadOptions::USER)
}

#[test]
fn missing_slot() {
    static STACK: ThreadStack<1024> = ThreadStack::new();
    let (error, report) = expect_rejection(KernelConfig::new(), None, valid_attr(&STACK));
    assert_matches!(error, RunError::Halted(_));
    assert_eq!(report.violation, Violation::NullThread);
    assert_eq!(report.scope, Scope::System);
}

#[test]
fn missing_entry() {
    static SLOT: Thread = Thread::new();
    static STACK: ThreadStack<1024> = ThreadStack::new();
    let attr = ThreadAttr {
        entry: None,
        ..valid_attr(&STACK)
    };
    let (error, report) = expect_rejection(user(), Some(&SLOT), attr);
    assert_matches!(error, RunError::MainTerminated(_));
    assert_eq!(report.violation, Violation::NullEntry);
    assert_eq!(report.scope, Scope::Context);
    assert_eq!(SLOT.state(), ThreadState::Uninitialized);
}

#[test]
fn missing_stack() {
    static SLOT: Thread = Thread::new();
    static STACK: ThreadStack<1024> = ThreadStack::new();
    let attr = ThreadAttr {
        stack: None,
        ..valid_attr(&STACK)
    };
    let (_, report) = expect_rejection(user(), Some(&SLOT), attr);
    assert_eq!(report.violation, Violation::NullStack);
    assert_eq!(SLOT.id(), None);
}

#[test]
fn zero_stack_size() {
    static SLOT: Thread = Thread::new();
    static STACK: ThreadStack<1024> = ThreadStack::new();
    let attr = Thread::define()
        .start(entry)
        .stack(&STACK)
        .stack_size(0)
        .into_attr();
    let (error, report) = expect_rejection(KernelConfig::new(), Some(&SLOT), attr);
    assert_matches!(error, RunError::Halted(_));
    assert_eq!(report.violation, Violation::ZeroStackSize);
}

#[test]
fn max_stack_size_overflows() {
    static SLOT: Thread = Thread::new();
    static STACK: ThreadStack<1024> = ThreadStack::new();
    let attr = ThreadAttr {
        stack_size: usize::MAX,
        ..valid_attr(&STACK)
    };
    let (_, report) = expect_rejection(user(), Some(&SLOT), attr);
    assert_eq!(report.violation, Violation::StackSizeOverflow);
    assert_eq!(SLOT.state(), ThreadState::Uninitialized);
}

#[test]
fn stack_size_exceeds_region() {
    static SLOT: Thread = Thread::new();
    static STACK: ThreadStack<1024> = ThreadStack::new();
    let region: StackRegion = STACK.region();
    let attr = ThreadAttr {
        stack_size: region.len() + 1,
        ..valid_attr(&STACK)
    };
    let (_, report) = expect_rejection(user(), Some(&SLOT), attr);
    assert_eq!(report.violation, Violation::StackExceedsRegion);
}

#[test]
fn priority_out_of_range() {
    static SLOT: Thread = Thread::new();
    static STACK: ThreadStack<1024> = ThreadStack::new();
    let attr = ThreadAttr {
        priority: 100,
        ..valid_attr(&STACK)
    };
    let (error, report) = expect_rejection(KernelConfig::new(), Some(&SLOT), attr);
    assert_matches!(error, RunError::Halted(_));
    assert_eq!(report.violation, Violation::InvalidPriority);
}

#[test]
fn user_priority_above_own() {
    static SLOT: Thread = Thread::new();
    static STACK: ThreadStack<1024> = ThreadStack::new();
    let attr = ThreadAttr {
        priority: 4,
        ..valid_attr(&STACK)
    };
    let (_, report) = expect_rejection(user().main_priority(5), Some(&SLOT), attr);
    assert_eq!(report.violation, Violation::PriorityTooHigh);
    assert!(!report.caller.privileged);
}

#[test]
fn user_creates_privileged() {
    static SLOT: Thread = Thread::new();
    static STACK: ThreadStack<1024> = ThreadStack::new();
    let attr = ThreadAttr {
        options: ThreadOptions::empty(),
        ..valid_attr(&STACK)
    };
    let (_, report) = expect_rejection(user(), Some(&SLOT), attr);
    assert_eq!(report.violation, Violation::PrivilegeEscalation);
}

#[test]
fn user_creates_user_inheriting_permissions() {
    static SLOT: Thread = Thread::new();
    static STACK: ThreadStack<1024> = ThreadStack::new();

    // `INHERIT_PERMS` alongside `USER` doesn't make the new thread
    // privileged
    let (result, fatal_log) = run_with_log(user(), || {
        let attr = ThreadAttr {
            options: ThreadOptions::USER | ThreadOptions::INHERIT_PERMS,
            ..valid_attr(&STACK)
        };
        let id = raw::thread_create(Some(&SLOT), attr);
        assert_eq!(SLOT.id(), Some(id));
        assert_eq!(SLOT.state(), ThreadState::Ready);
    });

    assert_eq!(result, Ok(()));
    assert_eq!(fatal_log.count(), 0);
}

#[test]
fn create_twice() {
    static SLOT: Thread = Thread::new();
    static STACK: ThreadStack<1024> = ThreadStack::new();

    let (result, fatal_log) = run_with_log(KernelConfig::new(), || {
        let id = raw::thread_create(Some(&SLOT), valid_attr(&STACK));
        assert_eq!(SLOT.id(), Some(id));
        assert_eq!(SLOT.state(), ThreadState::Ready);

        raw::thread_create(Some(&SLOT), valid_attr(&STACK));
    });

    let (error, report) = assert_single_report(&fatal_log, result.unwrap_err());
    assert_matches!(error, RunError::Halted(_));
    assert_eq!(report.violation, Violation::ThreadAlreadyInitialized);
}

#[test]
fn create_in_slot_of_other_kernel() {
    static SLOT: Thread = Thread::new();
    static STACK: ThreadStack<1024> = ThreadStack::new();

    let (result, fatal_log) = run_with_log(KernelConfig::new(), || {
        raw::thread_create(Some(&SLOT), valid_attr(&STACK));
    });
    assert_eq!(result, Ok(()));
    assert_eq!(fatal_log.count(), 0);
    assert_eq!(SLOT.state(), ThreadState::Terminated);

    // The slot stays bound to the first kernel
    let (error, report) = expect_rejection(KernelConfig::new(), Some(&SLOT), valid_attr(&STACK));
    assert_matches!(error, RunError::Halted(_));
    assert_eq!(report.violation, Violation::ThreadAlreadyInitialized);
}

#[test]
fn concurrent_kernels_create_in_same_slot() {
    static SLOT: Thread = Thread::new();
    static STACK1: ThreadStack<1024> = ThreadStack::new();
    static STACK2: ThreadStack<1024> = ThreadStack::new();

    // Exactly one kernel gets the slot however the two creations interleave
    let barrier = Arc::new(Barrier::new(2));
    let spawn_kernel = |stack: &'static ThreadStack<1024>| {
        let barrier = Arc::clone(&barrier);
        std::thread::spawn(move || {
            run_with_log(KernelConfig::new(), move || {
                barrier.wait();
                raw::thread_create(Some(&SLOT), valid_attr(stack));
            })
        })
    };
    let kernels = [spawn_kernel(&STACK1), spawn_kernel(&STACK2)];
    let outcomes: Vec<_> = kernels.into_iter().map(|k| k.join().unwrap()).collect();

    let (accepted, rejected): (Vec<_>, Vec<_>) =
        outcomes.into_iter().partition(|(result, _)| result.is_ok());
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].1.count(), 0);
    let [(result, fatal_log)] = <[_; 1]>::try_from(rejected).unwrap();
    let (error, report) = assert_single_report(&fatal_log, result.unwrap_err());
    assert_matches!(error, RunError::Halted(_));
    assert_eq!(report.violation, Violation::ThreadAlreadyInitialized);
}

#[test]
fn create_in_interrupt_context() {
    static SLOT: Thread = Thread::new();
    static STACK: ThreadStack<1024> = ThreadStack::new();

    let (result, fatal_log) = run_with_log(KernelConfig::new(), || {
        let report = irq_offload(|| {
            raw::thread_create(Some(&SLOT), valid_attr(&STACK));
        })
        .unwrap_err();
        assert_eq!(report.violation, Violation::CreateInInterrupt);
        assert_eq!(report.scope, Scope::Interrupt);
        assert!(report.caller.in_interrupt);

        // The interrupted thread carries on
        assert_eq!(SLOT.state(), ThreadState::Uninitialized);
    });

    assert_eq!(result, Ok(()));
    assert_eq!(fatal_log.violations(), [Violation::CreateInInterrupt]);
}

#[test]
fn foreach_without_callback() {
    let (result, fatal_log) = run_with_log(user(), || {
        raw::thread_foreach(None);
    });

    let (_, report) = assert_single_report(&fatal_log, result.unwrap_err());
    assert_eq!(report.violation, Violation::NullCallback);
    assert_eq!(report.scope, Scope::Context);
}
