//! Utility
mod prio_queue;
pub(crate) use self::prio_queue::*;
