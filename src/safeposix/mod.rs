//! This module handles system call requests from the sandboxed process.
//!
//! ## top-level features:
//!
//! - ### Dispatcher:
//!     - The dispatcher receives numbered system call requests with raw
//!       arguments, decodes them, and calls the method corresponding to the
//!       call number on the cage.
//!
//! - ### Cage Object:
//!
//!     - The cage owns the descriptor table, the path registry, the host
//!       name table and the persistent storage binding, all behind a single
//!       lock with a condition variable for calls that have to wait.
//!
//! - ### Descriptor Table:
//!     - A hash map from descriptor integers to slots. A slot is reserved
//!       (allocated, nothing attached yet), broken (the backend failed to
//!       attach) or bound to a shared resource handle.
//!
//! - ### Resources:
//!     - Every backend (console bridge, null sink, random source, tty,
//!       persistent storage file, TCP socket) implements the same
//!       `ResourceHandle` capability; paths reach them through registered
//!       `PathHandler` factories.
//!
//! - ### System Calls:
//!     - The cage has public methods corresponding to each system call,
//!       split into filesystem and network calls in their respective files.

pub mod cage;
pub mod config;
pub mod console;
pub mod devices;
pub mod dispatcher;
pub mod filesystem;
pub mod net;
pub mod storage;
pub mod stream;
pub mod syscall_numbers;
pub mod syscalls;
