//! Kernel state locking mechanism
//!
//! All kernel bookkeeping ([`State`]) lives behind a single host mutex, which
//! plays the role of CPU Lock on the simulated uniprocessor. The guard also
//! carries the dispatch condition variable, on which every thread that is
//! not the running thread parks. Parked threads are woken up whenever CPU
//! Lock is released after a modification to the kernel state.
use std::{
    ops,
    sync::{MutexGuard, PoisonError},
    time::Duration,
};

use crate::{kernel::KernelInner, state::State};

/// Acquire CPU Lock.
///
/// A task that panicked while holding CPU Lock leaves the lock poisoned. The
/// state is still consistent enough to shut the kernel down, so poisoning is
/// ignored.
pub(crate) fn lock_cpu(kernel: &KernelInner) -> CpuLockGuard<'_> {
    CpuLockGuard {
        kernel,
        state: Some(kernel.state.lock().unwrap_or_else(PoisonError::into_inner)),
        dirty: false,
    }
}

/// RAII guard for CPU Lock.
///
/// Releasing CPU Lock after mutably borrowing the state wakes up every parked
/// thread so that it can re-examine the kernel state.
pub(crate) struct CpuLockGuard<'a> {
    kernel: &'a KernelInner,
    /// Always `Some(_)` except while it's being moved in and out of
    /// `Condvar::wait`.
    state: Option<MutexGuard<'a, State>>,
    /// Set by `deref_mut`.
    dirty: bool,
}

impl<'a> CpuLockGuard<'a> {
    #[inline]
    pub(crate) fn kernel(&self) -> &'a KernelInner {
        self.kernel
    }

    /// Release CPU Lock until another thread modifies the kernel state.
    pub(crate) fn wait(mut self) -> Self {
        let state = self.take_for_wait();
        let state = self
            .kernel
            .dispatch
            .wait(state)
            .unwrap_or_else(PoisonError::into_inner);
        self.state = Some(state);
        self
    }

    /// Release CPU Lock until another thread modifies the kernel state or
    /// the specified duration elapses.
    pub(crate) fn wait_timeout(mut self, duration: Duration) -> Self {
        let state = self.take_for_wait();
        let (state, _) = self
            .kernel
            .dispatch
            .wait_timeout(state, duration)
            .unwrap_or_else(PoisonError::into_inner);
        self.state = Some(state);
        self
    }

    fn take_for_wait(&mut self) -> MutexGuard<'a, State> {
        if std::mem::take(&mut self.dirty) {
            self.kernel.dispatch.notify_all();
        }
        self.state.take().unwrap()
    }
}

impl Drop for CpuLockGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            drop(state);
            if self.dirty {
                self.kernel.dispatch.notify_all();
            }
        }
    }
}

impl ops::Deref for CpuLockGuard<'_> {
    type Target = State;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.state.as_ref().unwrap()
    }
}

impl ops::DerefMut for CpuLockGuard<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.dirty = true;
        self.state.as_mut().unwrap()
    }
}
