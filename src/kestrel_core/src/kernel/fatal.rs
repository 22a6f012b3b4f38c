//! Classification of programming violations.
//!
//! Every misuse of a kernel service that a kernel detects is described by a
//! [`Violation`]. Whether the misuse is reported to the caller as an error or
//! ends in the termination of something, and what that something is, is
//! decided by [`classify`], which looks only at the violation and at a
//! [`CallerSnapshot`]. Keeping the decision in one pure function lets every
//! validation site share it.
use core::fmt;

use super::ResultCode;

macro_rules! define_violations {
    (
        $( #[$meta:meta] )*
        pub enum Violation {
            $(
                $( #[$vmeta:meta] )*
                $vname:ident => $desc:literal
            ),* $(,)*
        }
    ) => {
        $( #[$meta] )*
        pub enum Violation {
            $(
                $( #[$vmeta] )*
                $vname
            ),*
        }

        impl Violation {
            /// All violation kinds.
            pub const ALL: &'static [Self] = &[$(Self::$vname),*];

            /// Get a short human-readable description of the violation.
            pub fn description(self) -> &'static str {
                match self {
                    $(
                        Self::$vname => $desc,
                    )*
                }
            }
        }
    };
}

define_violations! {
    /// A programming violation detected by a kernel service.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum Violation {
        /// `init` was called without a mutex.
        NullMutexInit => "mutex initialization without a mutex",
        /// `lock` or `unlock` was called without a mutex.
        NullMutex => "mutex operation without a mutex",
        /// A mutex was initialized while some thread owns it.
        ReinitHeldMutex => "reinitialization of a held mutex",
        /// A mutex was unlocked by a thread that doesn't own it.
        UnlockNotOwner => "unlock by a thread that doesn't own the mutex",
        /// The recursive lock count of a mutex would overflow.
        LockCountOverflow => "mutex lock count overflow",
        /// A mutex was locked or unlocked from an interrupt context.
        MutexInInterrupt => "mutex operation in an interrupt context",
        /// A mutex owned or awaited by the threads of one kernel was used
        /// from another kernel.
        MutexInOtherKernel => "mutex operation from a kernel that doesn't hold it",
        /// A thread was created without a thread slot.
        NullThread => "thread creation without a thread slot",
        /// A thread was created in a slot that is already in use.
        ThreadAlreadyInitialized => "thread creation in an initialized slot",
        /// A thread was created without an entry point.
        NullEntry => "thread creation without an entry point",
        /// A thread was created without a stack region.
        NullStack => "thread creation without a stack",
        /// A thread was created with a stack size of zero.
        ZeroStackSize => "thread creation with a zero stack size",
        /// The requested stack size overflows the size computation or
        /// exceeds the platform maximum.
        StackSizeOverflow => "thread stack size overflow",
        /// The requested stack size is larger than the supplied stack region.
        StackExceedsRegion => "thread stack size exceeds the stack region",
        /// The requested priority is outside the configured range.
        InvalidPriority => "thread priority out of range",
        /// A restricted thread requested a priority more urgent than its own.
        PriorityTooHigh => "thread priority more urgent than the creator's",
        /// A restricted thread tried to create a privileged thread.
        PrivilegeEscalation => "privileged thread creation by a restricted thread",
        /// A thread was created from an interrupt context.
        CreateInInterrupt => "thread creation in an interrupt context",
        /// A blocking service was called from an interrupt context.
        WaitInInterrupt => "blocking call in an interrupt context",
        /// Thread enumeration was requested without a callback.
        NullCallback => "thread enumeration without a callback",
    }
}

impl Violation {
    /// Get the error code reported for this violation when it is
    /// recoverable. Returns `None` for violations that are always fatal.
    #[inline]
    pub fn recovery_code(self) -> Option<ResultCode> {
        match self {
            Self::NullMutexInit => Some(ResultCode::InvalidArgument),
            _ => None,
        }
    }

    /// Get a flag indicating whether the violation is always fatal.
    #[inline]
    pub fn is_fatal(self) -> bool {
        self.recovery_code().is_none()
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// The execution state of the caller at the moment a violation was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallerSnapshot {
    /// The caller runs in privileged (kernel) mode.
    pub privileged: bool,
    /// The caller runs in an interrupt context.
    pub in_interrupt: bool,
}

/// What gets terminated by a fatal violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// The interrupt handler that made the call is aborted. The interrupted
    /// thread continues.
    Interrupt,
    /// Only the offending thread is terminated.
    Context,
    /// The whole system is halted.
    System,
}

/// The outcome of [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FatalAction {
    /// Report the violation to the caller with an error code.
    ReturnError(ResultCode),
    /// Report the violation to the fatal handler and terminate.
    Terminate(Scope),
}

/// Decide how a violation is handled.
///
///  - Recoverable violations are reported with their error code in any
///    context.
///  - Otherwise, a caller in an interrupt context loses the interrupt
///    handler, a restricted caller loses its thread, and a privileged caller
///    takes the whole system down.
///
/// # Examples
///
/// ```
/// use kestrel_core::kernel::{classify, CallerSnapshot, FatalAction, Scope, Violation};
/// let user = CallerSnapshot { privileged: false, in_interrupt: false };
/// assert_eq!(
///     classify(Violation::ReinitHeldMutex, user),
///     FatalAction::Terminate(Scope::Context),
/// );
/// ```
pub fn classify(violation: Violation, caller: CallerSnapshot) -> FatalAction {
    if let Some(code) = violation.recovery_code() {
        FatalAction::ReturnError(code)
    } else if caller.in_interrupt {
        FatalAction::Terminate(Scope::Interrupt)
    } else if caller.privileged {
        FatalAction::Terminate(Scope::System)
    } else {
        FatalAction::Terminate(Scope::Context)
    }
}
