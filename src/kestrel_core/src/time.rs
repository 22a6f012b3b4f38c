//! Timeouts for blocking kernel services.
use core::time::Duration;

/// Specifies how long a blocking service may wait.
///
/// # Examples
///
/// ```
/// use core::time::Duration;
/// use kestrel_core::time::Timeout;
/// assert!(Timeout::NoWait.is_no_wait());
/// assert!(Timeout::After(Duration::ZERO).is_no_wait());
/// assert_eq!(Timeout::from_millis(5).duration(), Some(Duration::from_millis(5)));
/// assert_eq!(Timeout::Forever.duration(), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeout {
    /// Fail immediately instead of waiting.
    NoWait,
    /// Wait as long as it takes.
    Forever,
    /// Wait for up to the specified duration.
    After(Duration),
}

impl Timeout {
    /// Construct `Timeout::After` from milliseconds.
    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        Self::After(Duration::from_millis(ms))
    }

    /// Construct `Timeout::After` from seconds.
    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Self::After(Duration::from_secs(secs))
    }

    /// Get a flag indicating whether the timeout allows no waiting at all.
    /// This includes `After` with a zero duration.
    #[inline]
    pub fn is_no_wait(self) -> bool {
        match self {
            Self::NoWait => true,
            Self::Forever => false,
            Self::After(d) => d.is_zero(),
        }
    }

    /// Get the maximum waiting duration. Returns `None` for
    /// [`Self::Forever`].
    #[inline]
    pub fn duration(self) -> Option<Duration> {
        match self {
            Self::NoWait => Some(Duration::ZERO),
            Self::Forever => None,
            Self::After(d) => Some(d),
        }
    }
}

impl Default for Timeout {
    /// Returns [`Timeout::NoWait`].
    #[inline]
    fn default() -> Self {
        Self::NoWait
    }
}

impl From<Duration> for Timeout {
    #[inline]
    fn from(d: Duration) -> Self {
        Self::After(d)
    }
}
