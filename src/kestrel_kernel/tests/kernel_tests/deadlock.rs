//! Threads that wait for each other forever.
//!
//! 1. `main` locks `A` and creates `task1`, which preempts `main`.
//! 2. `task1` locks `B` and starts waiting for `A`.
//! 3. `main` starts waiting for `B`. No thread can run anymore.
use kestrel_kernel::{KernelConfig, Mutex, RunError, Thread, ThreadStack, Timeout};

use crate::utils::run;

static A: Mutex = Mutex::new();
static B: Mutex = Mutex::new();
static TASK1: Thread = Thread::new();
static TASK1_STACK: ThreadStack<1024> = ThreadStack::new();

fn task1_body(_: usize, _: usize, _: usize) {
    B.lock(Timeout::Forever).unwrap();
    A.lock(Timeout::Forever).unwrap();
    unreachable!();
}

#[test]
fn detected() {
    let result = run(KernelConfig::new(), || {
        A.lock(Timeout::Forever).unwrap();
        Thread::define()
            .start(task1_body)
            .stack(&TASK1_STACK)
            .priority(-1)
            .spawn(&TASK1);
        B.lock(Timeout::Forever).unwrap();
        unreachable!();
    });

    assert_eq!(result, Err(RunError::Deadlocked));

    // The waiters withdrew when the kernel stopped. The owners didn't.
    assert_eq!(A.num_waiters(), 0);
    assert_eq!(B.num_waiters(), 0);
    assert_eq!(B.owner(), TASK1.id());
    assert!(A.is_locked());
}

#[test]
#[should_panic(expected = "a thread panicked")]
fn panic_is_propagated() {
    static CHILD: Thread = Thread::new();
    static CHILD_STACK: ThreadStack<1024> = ThreadStack::new();

    fn child_body(_: usize, _: usize, _: usize) {
        panic!("a thread panicked");
    }

    let _ = run(KernelConfig::new(), || {
        Thread::define()
            .start(child_body)
            .stack(&CHILD_STACK)
            .priority(-1)
            .spawn(&CHILD);
        unreachable!();
    });
}
