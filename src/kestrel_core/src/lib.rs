//! The API definition of the Kestrel kernel.
//!
//! This crate holds everything that both the kernel and its users need to
//! agree on: result codes and error types, timeouts, thread attributes, and
//! the classification of programming violations into error returns or
//! terminations. It does not contain a kernel; see `kestrel_kernel` for that.
#![cfg_attr(not(test), no_std)] // Link `std` only when building a test (`cfg(test)`)
#![warn(rust_2018_idioms)]
#![warn(missing_docs)]

pub mod kernel;
pub mod time;
