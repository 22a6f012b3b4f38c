//! Kernel configuration
use std::{fmt, ops::RangeInclusive, sync::Arc};

use kestrel_core::kernel::{Priority, ThreadOptions};

use crate::fatal::{FatalHandler, LogFatalHandler};

/// The configuration of a [`Kernel`](crate::Kernel).
///
/// # Examples
///
/// ```
/// use kestrel_kernel::{KernelConfig, ThreadOptions};
/// let cfg = KernelConfig::new()
///     .main_priority(2)
///     .main_options(ThreadOptions::USER)
///     .priority_range(-4..=10);
/// ```
#[derive(Clone)]
pub struct KernelConfig {
    pub(crate) main_priority: Priority,
    pub(crate) main_options: ThreadOptions,
    pub(crate) priority_range: RangeInclusive<Priority>,
    pub(crate) stack_reserved: usize,
    pub(crate) max_stack_size: usize,
    pub(crate) host_stack_size: usize,
    pub(crate) fatal_handler: Arc<dyn FatalHandler>,
}

impl KernelConfig {
    /// Construct `KernelConfig` with the default settings.
    pub fn new() -> Self {
        Self {
            main_priority: 0,
            main_options: ThreadOptions::empty(),
            priority_range: -16..=14,
            stack_reserved: 64,
            max_stack_size: 1 << 20,
            host_stack_size: 256 << 10,
            fatal_handler: Arc::new(LogFatalHandler),
        }
    }

    /// Specify the priority of the main thread. Defaults to `0`.
    pub fn main_priority(mut self, priority: Priority) -> Self {
        self.main_priority = priority;
        self
    }

    /// Specify the options of the main thread. Defaults to none, i.e., the
    /// main thread is privileged. Specify [`ThreadOptions::USER`] to run it
    /// in restricted mode.
    pub fn main_options(mut self, options: ThreadOptions) -> Self {
        self.main_options = options;
        self
    }

    /// Specify the range of valid thread priorities. Defaults to `-16..=14`.
    pub fn priority_range(mut self, range: RangeInclusive<Priority>) -> Self {
        self.priority_range = range;
        self
    }

    /// Specify the number of bytes each thread stack implicitly reserves on
    /// top of the requested size. Defaults to `64`.
    pub fn stack_reserved(mut self, size: usize) -> Self {
        self.stack_reserved = size;
        self
    }

    /// Specify the largest stack size (including the reserved part) a thread
    /// can be created with. Defaults to 1 MiB.
    pub fn max_stack_size(mut self, size: usize) -> Self {
        self.max_stack_size = size;
        self
    }

    /// Specify the minimum stack size of the host threads backing the
    /// kernel's threads. Defaults to 256 KiB.
    pub fn host_stack_size(mut self, size: usize) -> Self {
        self.host_stack_size = size;
        self
    }

    /// Specify the fatal error handler. Defaults to [`LogFatalHandler`].
    pub fn fatal_handler(mut self, handler: Arc<dyn FatalHandler>) -> Self {
        self.fatal_handler = handler;
        self
    }

    /// Panic if the configuration is inconsistent.
    pub(crate) fn validate(&self) {
        assert!(
            !self.priority_range.is_empty(),
            "the priority range `{:?}` is empty",
            self.priority_range
        );
        assert!(
            self.priority_range.contains(&self.main_priority),
            "the main thread's priority `{}` is outside the priority range `{:?}`",
            self.main_priority,
            self.priority_range
        );
        assert!(
            self.stack_reserved < self.max_stack_size,
            "`stack_reserved` must be smaller than `max_stack_size`"
        );
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KernelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelConfig")
            .field("main_priority", &self.main_priority)
            .field("main_options", &self.main_options)
            .field("priority_range", &self.priority_range)
            .field("stack_reserved", &self.stack_reserved)
            .field("max_stack_size", &self.max_stack_size)
            .field("host_stack_size", &self.host_stack_size)
            .finish_non_exhaustive()
    }
}
