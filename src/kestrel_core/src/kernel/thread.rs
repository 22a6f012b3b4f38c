use core::fmt;

/// Thread priority. A lower value means a higher urgency; the scheduler
/// always runs the most urgent ready thread.
pub type Priority = i32;

bitflags::bitflags! {
    /// Options specified at thread creation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ThreadOptions: u32 {
        /// The thread runs in restricted (user) mode. A thread without this
        /// flag is privileged.
        const USER = 1 << 2;
        /// The thread inherits the kernel object permissions of its creator.
        const INHERIT_PERMS = 1 << 3;
    }
}

impl ThreadOptions {
    /// Get a flag indicating whether a thread created with these options
    /// runs in privileged mode.
    #[inline]
    pub fn is_privileged(self) -> bool {
        !self.contains(Self::USER)
    }
}

/// The observable lifecycle state of a thread slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadState {
    /// Nothing has been created in the slot.
    Uninitialized,
    /// The thread is waiting to be dispatched.
    Ready,
    /// The thread is currently running.
    Running,
    /// The thread is waiting for a mutex to be handed over to it.
    BlockedOnMutex,
    /// The thread is sleeping or waiting for its start delay to elapse.
    Sleeping,
    /// The thread was created with an indefinite start delay and is waiting
    /// to be started explicitly.
    Suspended,
    /// The thread has exited or has been aborted. The slot can't be reused.
    Terminated,
}

impl ThreadState {
    /// Get a flag indicating whether the thread is alive, i.e., created and
    /// not yet terminated.
    #[inline]
    pub fn is_alive(self) -> bool {
        !matches!(self, Self::Uninitialized | Self::Terminated)
    }
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
