//! The system call boundary.
//!
//! The services in this module take object references that may be absent,
//! as they would be when passed through a C ABI as possibly-null pointers.
//! Absent objects are programming violations and are reported as such.
//! Safe code normally uses the methods of [`Mutex`] and [`Thread`], which
//! can't express an absent object.
use kestrel_core::{
    kernel::{InitMutexError, LockMutexError},
    time::Timeout,
};

use crate::{
    admission::{self, ThreadAttr},
    mutex::{self, Mutex},
    task::{self, Thread, ThreadId, ThreadInfo},
};

/// Initialize a mutex.
///
/// Without a mutex, this fails with [`InitMutexError::InvalidArgument`] in
/// any context; this is the only recoverable violation.
pub fn mutex_init(mutex: Option<&Mutex>) -> Result<(), InitMutexError> {
    mutex::init_mutex(mutex)
}

/// Lock a mutex. Fatal without a mutex.
pub fn mutex_lock(mutex: Option<&Mutex>, timeout: Timeout) -> Result<(), LockMutexError> {
    mutex::lock_mutex(mutex, timeout)
}

/// Unlock a mutex. Fatal without a mutex.
pub fn mutex_unlock(mutex: Option<&Mutex>) {
    mutex::unlock_mutex(mutex)
}

/// Create a thread in `slot`.
///
/// The checks below are made in this order. Each failure is a fatal
/// violation:
///
///  1. The caller is not in an interrupt context.
///  2. `slot` is present and uninitialized.
///  3. `attr.entry` is present.
///  4. `attr.stack` is present.
///  5. `attr.stack_size` is nonzero, doesn't overflow when the reserved area
///     is added, doesn't exceed the configured maximum, and fits in
///     `attr.stack`.
///  6. `attr.priority` is in the configured range and, if the caller is
///     restricted, not more urgent than the caller's.
///  7. If the caller is restricted, `attr.options` includes
///     [`ThreadOptions::USER`](crate::ThreadOptions::USER).
pub fn thread_create(slot: Option<&'static Thread>, attr: ThreadAttr) -> ThreadId {
    admission::create_thread(slot, attr)
}

/// Enumerate threads. Fatal without a callback.
pub fn thread_foreach(callback: Option<&mut dyn FnMut(&ThreadInfo)>) {
    task::foreach_thread(callback)
}
