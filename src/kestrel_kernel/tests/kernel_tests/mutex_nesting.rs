//! The owner of a mutex locks it recursively while another thread waits.
//!
//! 1. (`seq`: 0 → 1) `main` locks the mutex twice and creates `waiter`, then
//!    starts sleeping.
//! 2. (`seq`: 1 → 2) `waiter` starts waiting for the mutex.
//! 3. (`seq`: 2 → 3) `main` wakes up and unlocks the mutex once, which
//!    doesn't wake up `waiter`. The second unlock hands the mutex over to
//!    `waiter`. `main` fails to lock the mutex without waiting and then waits
//!    for up to one second.
//! 4. (`seq`: 3 → 4) `waiter` runs, holds the mutex for a while, and
//!    releases it, which hands it over to `main` and preempts `waiter`.
//! 5. (`seq`: 4 → 5) `main` sees that the wait was successful.
use assert_matches::assert_matches;
use kestrel_kernel::{
    current, msleep, KernelConfig, LockMutexError, Mutex, Thread, ThreadStack, ThreadState,
    Timeout,
};
use quickcheck_macros::quickcheck;
use std::{sync::Arc, time::Duration};

use crate::utils::{run, SeqTracker};

static M: Mutex = Mutex::new();
static WAITER: Thread = Thread::new();
static WAITER_STACK: ThreadStack<1024> = ThreadStack::new();
static SEQ: SeqTracker = SeqTracker::new();

fn waiter_body(_: usize, _: usize, _: usize) {
    SEQ.expect_and_replace(1, 2);

    // Blocks until `main` releases every level
    assert_eq!(M.lock(Timeout::Forever), Ok(()));

    SEQ.expect_and_replace(3, 4);
    assert_eq!(M.owner(), Some(current()));
    assert_eq!(M.lock_count(), 1);

    msleep(100);
    M.unlock();
}

#[test]
fn recursive_owner_and_waiter() {
    run(KernelConfig::new(), || {
        SEQ.expect_and_replace(0, 1);

        assert_eq!(M.lock(Timeout::NoWait), Ok(()));
        assert_eq!(M.lock(Timeout::NoWait), Ok(()));
        assert_eq!(M.lock_count(), 2);

        Thread::define()
            .start(waiter_body)
            .stack(&WAITER_STACK)
            .priority(12)
            .spawn(&WAITER);

        // Let `waiter` block on the mutex
        msleep(50);
        SEQ.expect_and_replace(2, 3);
        assert_eq!(WAITER.state(), ThreadState::BlockedOnMutex);
        assert_eq!(M.num_waiters(), 1);

        // Releasing one level doesn't wake up `waiter`
        M.unlock();
        assert_eq!(M.owner(), Some(current()));
        assert_eq!(M.lock_count(), 1);
        assert_eq!(WAITER.state(), ThreadState::BlockedOnMutex);

        // The last level hands the mutex over. `waiter` is less urgent, so
        // it doesn't preempt us.
        M.unlock();
        assert_eq!(M.owner(), WAITER.id());
        assert_eq!(M.num_waiters(), 0);
        assert_eq!(WAITER.state(), ThreadState::Ready);

        assert_eq!(M.lock(Timeout::NoWait), Err(LockMutexError::Busy));
        assert_eq!(
            M.lock(Timeout::After(Duration::ZERO)),
            Err(LockMutexError::Busy)
        );
        assert_eq!(M.lock(Timeout::from_secs(1)), Ok(()));

        SEQ.expect_and_replace(4, 5);
        assert_eq!(M.owner(), Some(current()));
        M.unlock();
        assert!(!M.is_locked());
    })
    .unwrap();
}

#[test]
fn init_resets_unowned_mutex() {
    static M: Mutex = Mutex::new();

    run(KernelConfig::new(), || {
        assert_eq!(M.lock_count(), 0);
        assert_eq!(M.init(), Ok(()));
        assert_eq!(M.lock_count(), 0);
        assert_eq!(M.lock(Timeout::NoWait), Ok(()));
        M.unlock();

        // A mutex initialized at run time is indistinguishable from a
        // statically constructed one
        assert_eq!(M.init(), Ok(()));
        assert!(!M.is_locked());
        assert_eq!(M.owner(), None);
        assert_eq!(M.num_waiters(), 0);
    })
    .unwrap();
}

/// Locking `n` times without unlocking sets the lock count to `n`. Only the
/// last of `n` unlocks releases the mutex.
#[quickcheck]
fn lock_count_tracks_nesting(n: u8) -> bool {
    let n = u32::from(n % 64) + 1;
    let m = Arc::new(Mutex::new());
    let m2 = Arc::clone(&m);

    run(KernelConfig::new(), move || {
        for i in 1..=n {
            assert_eq!(m2.lock(Timeout::NoWait), Ok(()));
            assert_eq!(m2.lock_count(), i);
        }
        for i in (0..n).rev() {
            assert!(m2.is_locked());
            m2.unlock();
            assert_eq!(m2.lock_count(), i);
        }
        assert_matches!(m2.owner(), None);
    })
    .is_ok()
        && !m.is_locked()
}
