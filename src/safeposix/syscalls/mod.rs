//! This module holds the syscall-shaped entry points of the [`Cage`](crate::safeposix::cage::Cage),
//! divided into two categories: filesystem and network.
//!
//! ## System Calls
//!
//! Cage objects have methods for system calls. They return a non-negative
//! value on success or a negated value from the `Errno` enum.

pub mod fs_calls;
pub mod fs_constants;
pub mod net_calls;
pub mod net_constants;
pub use fs_constants::*;
pub use net_constants::*;
