//! The capability every backend resource implements.
//!
//! A descriptor slot holds an `Arc<dyn ResourceHandle>`; `dup`/`dup2` store a
//! second reference produced by [`ResourceHandle::dup`]. Backends release
//! their host resources when the last reference is dropped.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use crate::interface::{Errno, IoctlArg, StatData};
use crate::safeposix::syscalls::fs_constants::*;

pub type StreamResult<T> = Result<T, Errno>;

pub trait ResourceHandle: Send + Sync {
    fn read(&self, buf: &mut [u8]) -> StreamResult<usize>;

    fn write(&self, buf: &[u8]) -> StreamResult<usize>;

    fn seek(&self, _offset: i64, _whence: i32) -> StreamResult<i64> {
        Err(Errno::ESPIPE)
    }

    /// Called once per descriptor when that descriptor is closed. Dropping
    /// the last `Arc` is what finally tears the backend down.
    fn close(&self) {}

    /// Produces another reference for descriptor `newfd`, or `None` if this
    /// resource cannot be shared.
    fn dup(&self, newfd: i32) -> Option<Arc<dyn ResourceHandle>>;

    fn fstat(&self) -> StreamResult<StatData>;

    fn getdents(&self, _buf: &mut [u8]) -> StreamResult<usize> {
        Err(Errno::ENOTDIR)
    }

    fn isatty(&self) -> bool {
        false
    }

    fn fcntl(&self, cmd: i32, arg: i32) -> StreamResult<i32>;

    fn ioctl(&self, _request: u32, _arg: &mut IoctlArg<'_>) -> StreamResult<i32> {
        Err(Errno::ENOTTY)
    }

    fn is_read_ready(&self) -> bool;

    fn is_write_ready(&self) -> bool;

    fn is_exception(&self) -> bool {
        false
    }

    /// Whether `EAGAIN` from read/write should be returned to the caller
    /// instead of making the dispatcher wait.
    fn is_nonblocking(&self) -> bool {
        false
    }

    /// False for resources whose readiness changes without anyone calling
    /// `Cage::notify_readiness` (host sockets). Waiters re-poll those.
    fn signals_readiness(&self) -> bool {
        true
    }

    fn accept(&self, _newfd: i32) -> StreamResult<Arc<dyn ResourceHandle>> {
        Err(Errno::ENOTSOCK)
    }
}

/// Open-file status flags shared by every reference to one resource.
#[derive(Debug)]
pub struct StreamFlags {
    flags: AtomicI32,
}

impl StreamFlags {
    pub fn new(flags: i32) -> StreamFlags {
        StreamFlags { flags: AtomicI32::new(flags & !O_CLOEXEC) }
    }

    pub fn get(&self) -> i32 {
        self.flags.load(Ordering::Acquire)
    }

    pub fn is_nonblocking(&self) -> bool {
        self.get() & O_NONBLOCK != 0
    }

    pub fn can_read(&self) -> bool {
        !is_wronly(self.get())
    }

    pub fn can_write(&self) -> bool {
        !is_rdonly(self.get())
    }

    pub fn set_nonblocking(&self, nonblocking: bool) {
        if nonblocking {
            self.flags.fetch_or(O_NONBLOCK, Ordering::AcqRel);
        } else {
            self.flags.fetch_and(!O_NONBLOCK, Ordering::AcqRel);
        }
    }

    /// The F_GETFL / F_SETFL / F_GETFD / F_SETFD commands every backend
    /// answers the same way.
    pub fn fcntl(&self, cmd: i32, arg: i32) -> StreamResult<i32> {
        match cmd {
            F_GETFL => Ok(self.get()),
            F_SETFL => {
                let current = self.get();
                let updated = (current & !O_SETTABLEFLAGS) | (arg & O_SETTABLEFLAGS);
                self.flags.store(updated, Ordering::Release);
                Ok(0)
            }
            // close-on-exec means nothing without exec
            F_GETFD => Ok(0),
            F_SETFD => Ok(0),
            _ => Err(Errno::EINVAL),
        }
    }

    /// FIONBIO is handled identically by every backend that supports ioctl.
    pub fn ioctl_fionbio(&self, arg: &mut IoctlArg<'_>) -> StreamResult<i32> {
        match arg {
            IoctlArg::Int(value) => {
                self.set_nonblocking(**value != 0);
                Ok(0)
            }
            _ => Err(Errno::EFAULT),
        }
    }
}
