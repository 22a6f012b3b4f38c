use core::fmt;

/// The macro to define [`ResultCode`].
macro_rules! define_result_code {
    (
        $( #[$meta:meta] )*
        pub enum ResultCode {
            $(
                $( #[$vmeta:meta] )*
                $vname:ident = $vd:expr
            ),* $(,)*
        }
    ) => {
        $( #[$meta] )*
        pub enum ResultCode {
            $(
                $( #[$vmeta] )*
                $vname = $vd
            ),*
        }

        impl ResultCode {
            /// Get the short name of the result code.
            ///
            /// # Examples
            ///
            /// ```
            /// use kestrel_core::kernel::ResultCode;
            /// assert_eq!(ResultCode::Busy.as_str(), "Busy");
            /// ```
            pub fn as_str(self) -> &'static str {
                match self {
                    $(
                        Self::$vname => stringify!($vname),
                    )*
                }
            }

            /// Convert a raw value back to `ResultCode`. Returns `None` if
            /// the value does not name any result code.
            pub fn from_raw(raw: i8) -> Option<Self> {
                match raw {
                    $(
                        x if x == Self::$vname as i8 => Some(Self::$vname),
                    )*
                    _ => None,
                }
            }
        }

        impl fmt::Debug for ResultCode {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl fmt::Display for ResultCode {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

define_result_code! {
    /// All result codes (including success) that a kernel service can
    /// return.
    ///
    /// The values are the negated POSIX `errno` values of the closest
    /// equivalents so that they survive a trip through a C ABI unchanged.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    #[repr(i8)]
    pub enum ResultCode {
        /// The operation was successful. No additional information is available.
        Success = 0,
        /// A target object is in a state that disallows the operation
        /// (`EPERM`).
        BadObjectState = -1,
        /// The operation timed out (`EAGAIN`).
        Timeout = -11,
        /// The resource is held by someone else and the caller asked not to
        /// wait (`EBUSY`).
        Busy = -16,
        /// A parameter is invalid (`EINVAL`).
        InvalidArgument = -22,
    }
}

impl ResultCode {
    /// Get a flag indicating whether the code represents a failure.
    ///
    /// Failure codes have negative values.
    #[inline]
    pub fn is_err(self) -> bool {
        (self as i8) < 0
    }

    /// Get a flag indicating whether the code represents a success.
    ///
    /// Success codes have non-negative values.
    #[inline]
    pub fn is_ok(self) -> bool {
        !self.is_err()
    }
}

macro_rules! define_error {
    (
        mod $mod_name:ident {}
        $( #[$meta:meta] )*
        $vis:vis enum $name:ident {
            $(
                $( #[$vmeta:meta] )*
                $vname:ident
            ),* $(,)*
        }
    ) => {
        $( #[$meta] )*
        ///
        /// See [`ResultCode`] for all result codes and generic descriptions.
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(i8)]
        $vis enum $name {
            $(
                $( #[$vmeta] )*
                // Use the same discriminants as `ResultCode`
                $vname = ResultCode::$vname as i8
            ),*
        }

        impl fmt::Debug for $name {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(&ResultCode::from(*self), f)
            }
        }

        impl fmt::Display for $name {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&ResultCode::from(*self), f)
            }
        }

        impl From<$name> for ResultCode {
            #[inline]
            fn from(x: $name) -> Self {
                match x {
                    $(
                        $name::$vname => Self::$vname,
                    )*
                }
            }
        }

        impl From<Result<(), $name>> for ResultCode {
            #[inline]
            fn from(x: Result<(), $name>) -> Self {
                match x {
                    Ok(()) => Self::Success,
                    Err(e) => Self::from(e),
                }
            }
        }

        impl TryFrom<ResultCode> for $name {
            type Error = ResultCode;

            /// Narrow a `ResultCode` down to this error type. Fails with the
            /// original code if the code is not one of this type's variants.
            #[inline]
            fn try_from(x: ResultCode) -> Result<Self, ResultCode> {
                match x {
                    $(
                        ResultCode::$vname => Ok(Self::$vname),
                    )*
                    other => Err(other),
                }
            }
        }

        #[cfg(test)]
        mod $mod_name {
            use super::*;

            #[test]
            fn to_result_code() {
                $(
                    assert_eq!(
                        ResultCode::$vname,
                        ResultCode::from($name::$vname),
                    );
                    assert_eq!(
                        ResultCode::$vname as i8,
                        $name::$vname as i8,
                    );
                )*
            }

            #[test]
            fn result_to_result_code() {
                $(
                    assert_eq!(
                        ResultCode::$vname,
                        ResultCode::from(Err($name::$vname)),
                    );
                )*
                assert_eq!(
                    ResultCode::Success,
                    ResultCode::from(Result::<(), $name>::Ok(())),
                );
            }

            #[test]
            fn narrow_from_result_code() {
                $(
                    assert_eq!(
                        Ok($name::$vname),
                        $name::try_from(ResultCode::$vname),
                    );
                )*
                assert_eq!(
                    Err(ResultCode::Success),
                    $name::try_from(ResultCode::Success),
                );
            }
        }
    };
}

define_error! {
    mod init_mutex_error {}
    /// Error type for `Mutex::init`.
    pub enum InitMutexError {
        /// No mutex was supplied.
        InvalidArgument,
    }
}

define_error! {
    mod lock_mutex_error {}
    /// Error type for `Mutex::lock`.
    pub enum LockMutexError {
        /// The mutex is owned by another thread and the caller specified
        /// [`Timeout::NoWait`](crate::time::Timeout::NoWait).
        Busy,
        /// The timeout period elapsed before the mutex was handed over to the
        /// caller.
        Timeout,
    }
}

define_error! {
    mod abort_thread_error {}
    /// Error type for `Thread::abort`.
    pub enum AbortThreadError {
        /// Nothing has been created in the thread slot.
        BadObjectState,
    }
}

define_error! {
    mod start_thread_error {}
    /// Error type for `Thread::start`.
    pub enum StartThreadError {
        /// The thread was not created with an indefinite start delay, or it
        /// has already been started.
        BadObjectState,
    }
}
