//! Enumerating threads.
use kestrel_kernel::{
    current, raw, thread_foreach, KernelConfig, Thread, ThreadInfo, ThreadOptions, ThreadStack,
    ThreadState, Timeout,
};

use crate::utils::run;

static READY: Thread = Thread::new();
static READY_STACK: ThreadStack<1024> = ThreadStack::new();
static SUSPENDED: Thread = Thread::new();
static SUSPENDED_STACK: ThreadStack<2048> = ThreadStack::new();

fn body(_: usize, _: usize, _: usize) {}

#[test]
fn lists_every_thread() {
    run(KernelConfig::new().main_priority(2), || {
        Thread::define()
            .start(body)
            .stack(&READY_STACK)
            .priority(3)
            .options(ThreadOptions::USER)
            .spawn(&READY);
        Thread::define()
            .start(body)
            .stack(&SUSPENDED_STACK)
            .priority(-4)
            .delay(Timeout::Forever)
            .spawn(&SUSPENDED);

        let mut infos = Vec::new();
        thread_foreach(|info| infos.push(*info));
        log::debug!("{infos:#?}");

        assert_eq!(
            infos,
            [
                ThreadInfo {
                    id: current(),
                    priority: 2,
                    options: ThreadOptions::empty(),
                    state: ThreadState::Running,
                    stack: None,
                },
                ThreadInfo {
                    id: READY.id().unwrap(),
                    priority: 3,
                    options: ThreadOptions::USER,
                    state: ThreadState::Ready,
                    stack: Some(READY_STACK.region()),
                },
                ThreadInfo {
                    id: SUSPENDED.id().unwrap(),
                    priority: -4,
                    options: ThreadOptions::empty(),
                    state: ThreadState::Suspended,
                    stack: Some(SUSPENDED_STACK.region()),
                },
            ]
        );

        // The callback may call kernel services
        let mut count = 0;
        let mut callback = |info: &ThreadInfo| {
            if info.id == SUSPENDED.id().unwrap() {
                assert_eq!(SUSPENDED.start(), Ok(()));
            }
            count += 1;
        };
        raw::thread_foreach(Some(&mut callback as &mut dyn FnMut(&ThreadInfo)));
        assert_eq!(count, 3);
        assert_eq!(SUSPENDED.state(), ThreadState::Terminated);
    })
    .unwrap();
}
