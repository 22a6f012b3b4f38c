//! Kernel objects, their attributes, and the error types of the kernel
//! services.
mod error;
mod fatal;
mod thread;

pub use self::{error::*, fatal::*, thread::*};
