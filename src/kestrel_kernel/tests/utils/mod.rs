#![allow(dead_code)] // not every test case uses every utility
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use kestrel_kernel::{FatalHandler, FatalReport, Kernel, KernelConfig, RunError, Violation};

/// An atomic counter for checking an execution sequence.
pub(crate) struct SeqTracker {
    counter: AtomicUsize,
}

impl SeqTracker {
    /// Construct `SeqTracker`.
    pub(crate) const fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }

    pub(crate) fn get(&self) -> usize {
        self.counter.load(Ordering::Relaxed)
    }

    /// Assert that the counter is equal to `old` and then replace it with
    /// `new`.
    #[track_caller]
    pub(crate) fn expect_and_replace(&self, old: usize, new: usize) {
        let got = self.counter.load(Ordering::Relaxed);
        log::debug!("{} (expected: {}) → {}", got, old, new);
        assert_eq!(got, old, "expected {}, got {}", old, got);
        self.counter.store(new, Ordering::Relaxed);
    }
}

/// A [`FatalHandler`] that records every report it receives.
#[derive(Debug, Default)]
pub(crate) struct FatalLog {
    reports: Mutex<Vec<FatalReport>>,
}

impl FatalLog {
    pub(crate) fn new() -> Arc<Self> {
        Arc::default()
    }

    pub(crate) fn reports(&self) -> Vec<FatalReport> {
        self.reports.lock().unwrap().clone()
    }

    pub(crate) fn count(&self) -> usize {
        self.reports.lock().unwrap().len()
    }

    pub(crate) fn violations(&self) -> Vec<Violation> {
        self.reports().iter().map(|r| r.violation).collect()
    }
}

impl FatalHandler for FatalLog {
    fn handle(&self, report: &FatalReport) {
        log::info!("fatal handler called: {report}");
        self.reports.lock().unwrap().push(*report);
    }
}

/// Run `main` in a new kernel.
pub(crate) fn run(cfg: KernelConfig, main: impl FnOnce() + Send + 'static) -> Result<(), RunError> {
    let _ = env_logger::try_init();
    Kernel::new(cfg).run(main)
}

/// Run `main` in a new kernel with a [`FatalLog`] installed.
pub(crate) fn run_with_log(
    cfg: KernelConfig,
    main: impl FnOnce() + Send + 'static,
) -> (Result<(), RunError>, Arc<FatalLog>) {
    let fatal_log = FatalLog::new();
    let result = run(cfg.fatal_handler(fatal_log.clone()), main);
    (result, fatal_log)
}
