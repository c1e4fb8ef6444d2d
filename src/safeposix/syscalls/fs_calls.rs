//! This module contains all file-system related system calls.
//!
//! ## Notes:
//!
//! - These calls are implementations of the [`Cage`] struct in the
//!   [`safeposix`](crate::safeposix) crate. See the
//!   [`safeposix`](crate::safeposix) crate for more information.
//!   They have been structured as different modules for better
//!   maintainability and related functions. since they are tied to the
//!   `Cage` struct This module's rustdoc may turn up empty, thus they
//!   have been explicitly listed below for documentation purposes.
//!
//! ## File System Calls
//!
//! - open_syscall
//! - close_syscall
//! - read_syscall
//! - write_syscall
//! - lseek_syscall
//! - dup_syscall
//! - dup2_syscall
//! - stat_syscall
//! - fstat_syscall
//! - getdents_syscall
//! - isatty_syscall
//! - fcntl_syscall
//! - ioctl_syscall
//! - mkdir_syscall

use crate::interface::{syscall_error, Errno, IoctlArg, StatData};
use crate::safeposix::cage::{Cage, FdSlot};
use crate::safeposix::storage::Completion;

use super::fs_constants::*;

impl Cage {
    /// ## `open_syscall`
    ///
    /// ### Description
    /// Looks `path` up in the path registry (exact match) and asks its
    /// handler for a new resource bound to the lowest free descriptor. The
    /// descriptor is reserved while the handler builds the resource so no
    /// other allocation can take it.
    ///
    /// ### Arguments
    /// * `path` - registered path, compared verbatim
    /// * `flags` - `O_*` access mode and status flags, handed to the handler
    /// * `mode` - ignored; nothing is created outside persistent storage
    ///
    /// ### Returns
    /// The new descriptor.
    ///
    /// ### Errors
    /// * `ENOENT` - no handler is registered for `path`
    /// * `ENFILE` - the descriptor table is full
    /// * `EACCES` - the handler refused to open the resource
    pub fn open_syscall(&self, path: &str, flags: i32, _mode: u32) -> i32 {
        let mut state = self.state.lock();
        self.await_storage_path(&mut state, path);

        let handler = match state.paths.resolve(path) {
            Some(handler) => handler,
            None => return syscall_error(Errno::ENOENT, "open", "no handler is registered for the path"),
        };

        let fd = match self.get_next_fd(&state, None) {
            Some(fd) => fd,
            None => return syscall_error(Errno::ENFILE, "open", "no available file descriptor number could be found"),
        };

        state.reserve(fd);
        match handler.open(fd, path, flags) {
            Some(handle) => {
                state.fdtable.insert(fd, FdSlot::Bound(handle));
                fd
            }
            None => {
                state.fdtable.remove(&fd);
                syscall_error(Errno::EACCES, "open", "the backend refused to open the path")
            }
        }
    }

    /// ## `close_syscall`
    ///
    /// ### Description
    /// Removes `fd` from the table whatever it held. A bound resource is
    /// told that this descriptor went away; it is torn down once its last
    /// reference is gone.
    ///
    /// ### Errors
    /// * `EBADF` - `fd` is not in the table
    pub fn close_syscall(&self, fd: i32) -> i32 {
        let slot = {
            let mut state = self.state.lock();
            state.bind_ports.remove(&fd);
            match state.fdtable.remove(&fd) {
                Some(slot) => slot,
                None => return syscall_error(Errno::EBADF, "close", "invalid file descriptor"),
            }
        };

        if let FdSlot::Bound(handle) = slot {
            handle.close();
        }
        self.notify_readiness();
        0
    }

    /// ## `read_syscall`
    ///
    /// ### Description
    /// Reads from the resource behind `fd`. If the resource has nothing to
    /// deliver and the descriptor is blocking, the caller waits until a
    /// readiness notification (or the poll interval, for resources that
    /// cannot notify) and retries.
    ///
    /// ### Returns
    /// Number of bytes read, 0 at end of input.
    ///
    /// ### Errors
    /// * `EBADF` - `fd` is free, reserved or broken
    /// * anything the resource reports, unchanged
    pub fn read_syscall(&self, fd: i32, buf: &mut [u8]) -> i32 {
        let mut state = self.state.lock();
        loop {
            let handle = match Self::get_handle(&state, fd) {
                Ok(handle) => handle,
                Err(e) => return syscall_error(e, "read", "invalid file descriptor"),
            };
            match handle.read(buf) {
                Ok(nread) => return nread as i32,
                Err(Errno::EAGAIN) if !handle.is_nonblocking() => self.wait_for_handle(&mut state, &*handle),
                Err(e) => return syscall_error(e, "read", "the backend failed to read"),
            }
        }
    }

    /// ## `write_syscall`
    ///
    /// ### Description
    /// Writes `buf` to the resource behind `fd`, waiting the same way as
    /// [`Cage::read_syscall`] while a blocking resource is full. A
    /// successful write wakes every waiter, since it may have made some
    /// other descriptor readable.
    ///
    /// ### Returns
    /// Number of bytes written.
    ///
    /// ### Errors
    /// * `EBADF` - `fd` is free, reserved or broken
    /// * anything the resource reports, unchanged
    pub fn write_syscall(&self, fd: i32, buf: &[u8]) -> i32 {
        let mut state = self.state.lock();
        let nwritten = loop {
            let handle = match Self::get_handle(&state, fd) {
                Ok(handle) => handle,
                Err(e) => return syscall_error(e, "write", "invalid file descriptor"),
            };
            match handle.write(buf) {
                Ok(nwritten) => break nwritten,
                Err(Errno::EAGAIN) if !handle.is_nonblocking() => self.wait_for_handle(&mut state, &*handle),
                Err(e) => return syscall_error(e, "write", "the backend failed to write"),
            }
        };
        drop(state);
        self.notify_readiness();
        nwritten as i32
    }

    /// ## `lseek_syscall`
    ///
    /// ### Returns
    /// The new offset.
    ///
    /// ### Errors
    /// * `EBADF` - `fd` is free, reserved or broken
    /// * `ESPIPE` - the resource is not seekable
    /// * `EINVAL` - bad `whence`, or the offset is negative or does not fit
    pub fn lseek_syscall(&self, fd: i32, offset: i64, whence: i32) -> i32 {
        let state = self.state.lock();
        let handle = match Self::get_handle(&state, fd) {
            Ok(handle) => handle,
            Err(e) => return syscall_error(e, "lseek", "invalid file descriptor"),
        };
        match handle.seek(offset, whence) {
            Ok(newpos) if newpos <= i32::MAX as i64 => newpos as i32,
            Ok(_) => syscall_error(Errno::EINVAL, "lseek", "resulting offset does not fit"),
            Err(e) => syscall_error(e, "lseek", "the backend failed to seek"),
        }
    }

    /// ## `dup_syscall`
    ///
    /// ### Description
    /// Binds a second reference to the resource behind `fd` on the lowest
    /// free descriptor at or above `start_desc` (or the allocation offset).
    /// Both descriptors stay usable independently of each other.
    ///
    /// ### Errors
    /// * `EBADF` - `fd` is free, reserved or broken
    /// * `ENFILE` - no descriptor is free
    /// * `EACCES` - the resource cannot be shared
    pub fn dup_syscall(&self, fd: i32, start_desc: Option<i32>) -> i32 {
        let mut state = self.state.lock();
        let handle = match Self::get_handle(&state, fd) {
            Ok(handle) => handle,
            Err(e) => return syscall_error(e, "dup", "invalid file descriptor"),
        };

        let newfd = match self.get_next_fd(&state, start_desc) {
            Some(newfd) => newfd,
            None => return syscall_error(Errno::ENFILE, "dup", "no available file descriptor number could be found"),
        };

        state.reserve(newfd);
        match handle.dup(newfd) {
            Some(duplicate) => {
                state.fdtable.insert(newfd, FdSlot::Bound(duplicate));
                newfd
            }
            None => {
                state.fdtable.remove(&newfd);
                syscall_error(Errno::EACCES, "dup", "the resource cannot be duplicated")
            }
        }
    }

    /// ## `dup2_syscall`
    ///
    /// ### Description
    /// Makes `newfd` refer to the resource behind `oldfd`. The second
    /// reference is obtained first; only if that succeeds is whatever
    /// `newfd` held closed and replaced. On failure `newfd` is left exactly
    /// as it was.
    ///
    /// ### Returns
    /// `newfd`.
    ///
    /// ### Errors
    /// * `EBADF` - `oldfd` is free, reserved or broken, or `newfd` is out of
    ///   range
    /// * `EACCES` - the resource cannot be shared
    pub fn dup2_syscall(&self, oldfd: i32, newfd: i32) -> i32 {
        //checking if the new fd is out of range
        if newfd < 0 || newfd >= self.config.max_fd {
            return syscall_error(Errno::EBADF, "dup2", "provided file descriptor is out of range");
        }

        let mut state = self.state.lock();
        let handle = match Self::get_handle(&state, oldfd) {
            Ok(handle) => handle,
            Err(e) => return syscall_error(e, "dup2", "invalid old file descriptor"),
        };

        if newfd == oldfd {
            return newfd;
        }

        let duplicate = match handle.dup(newfd) {
            Some(duplicate) => duplicate,
            None => return syscall_error(Errno::EACCES, "dup2", "the resource cannot be duplicated"),
        };

        state.bind_ports.remove(&newfd);
        let previous = state.fdtable.insert(newfd, FdSlot::Bound(duplicate));
        drop(state);

        if let Some(FdSlot::Bound(previous)) = previous {
            previous.close();
        }
        self.notify_readiness();
        newfd
    }

    /// ## `stat_syscall`
    ///
    /// ### Description
    /// Asks the handler registered for `path` for its attributes without
    /// opening anything.
    ///
    /// ### Errors
    /// * `ENOENT` - no handler is registered for `path`
    /// * anything the handler reports, unchanged
    pub fn stat_syscall(&self, path: &str, statbuf: &mut StatData) -> i32 {
        let mut state = self.state.lock();
        self.await_storage_path(&mut state, path);

        let handler = match state.paths.resolve(path) {
            Some(handler) => handler,
            None => return syscall_error(Errno::ENOENT, "stat", "no handler is registered for the path"),
        };
        match handler.stat(path) {
            Ok(data) => {
                *statbuf = data;
                0
            }
            Err(e) => syscall_error(e, "stat", "the backend failed to stat"),
        }
    }

    pub fn fstat_syscall(&self, fd: i32, statbuf: &mut StatData) -> i32 {
        let state = self.state.lock();
        let handle = match Self::get_handle(&state, fd) {
            Ok(handle) => handle,
            Err(e) => return syscall_error(e, "fstat", "invalid file descriptor"),
        };
        match handle.fstat() {
            Ok(data) => {
                *statbuf = data;
                0
            }
            Err(e) => syscall_error(e, "fstat", "the backend failed to stat"),
        }
    }

    pub fn getdents_syscall(&self, fd: i32, buf: &mut [u8]) -> i32 {
        let state = self.state.lock();
        let handle = match Self::get_handle(&state, fd) {
            Ok(handle) => handle,
            Err(e) => return syscall_error(e, "getdents", "invalid file descriptor"),
        };
        match handle.getdents(buf) {
            Ok(nread) => nread as i32,
            Err(e) => syscall_error(e, "getdents", "the backend failed to list entries"),
        }
    }

    /// ## `isatty_syscall`
    ///
    /// ### Returns
    /// 1 if `fd` is a terminal, 0 if it is not.
    ///
    /// ### Errors
    /// * `EBADF` - `fd` is free, reserved or broken
    pub fn isatty_syscall(&self, fd: i32) -> i32 {
        let state = self.state.lock();
        match Self::get_handle(&state, fd) {
            Ok(handle) => handle.isatty() as i32,
            Err(e) => syscall_error(e, "isatty", "invalid file descriptor"),
        }
    }

    /// ## `fcntl_syscall`
    ///
    /// ### Description
    /// `F_DUPFD` duplicates onto the lowest free descriptor at or above
    /// `arg`. Every other command goes to the resource.
    ///
    /// ### Errors
    /// * `EBADF` - `fd` is free, reserved or broken
    /// * `EINVAL` - `F_DUPFD` with an out of range `arg`, or a command the
    ///   resource does not know
    pub fn fcntl_syscall(&self, fd: i32, cmd: i32, arg: i32) -> i32 {
        if cmd == F_DUPFD {
            if arg < 0 || arg >= self.config.max_fd {
                return syscall_error(Errno::EINVAL, "fcntl", "F_DUPFD argument out of range");
            }
            return self.dup_syscall(fd, Some(arg));
        }

        let state = self.state.lock();
        let handle = match Self::get_handle(&state, fd) {
            Ok(handle) => handle,
            Err(e) => return syscall_error(e, "fcntl", "invalid file descriptor"),
        };
        match handle.fcntl(cmd, arg) {
            Ok(ret) => ret,
            Err(e) => syscall_error(e, "fcntl", "the backend rejected the command"),
        }
    }

    pub fn ioctl_syscall(&self, fd: i32, request: u32, arg: &mut IoctlArg<'_>) -> i32 {
        let state = self.state.lock();
        let handle = match Self::get_handle(&state, fd) {
            Ok(handle) => handle,
            Err(e) => return syscall_error(e, "ioctl", "invalid file descriptor"),
        };
        match handle.ioctl(request, arg) {
            Ok(ret) => ret,
            Err(e) => syscall_error(e, "ioctl", "the backend rejected the request"),
        }
    }

    /// ## `mkdir_syscall`
    ///
    /// ### Description
    /// Creates `path` and its missing ancestors in persistent storage. Waits
    /// for the storage mount to resolve, then for the backend to report the
    /// directory creation. Neither wait has a timeout.
    ///
    /// ### Errors
    /// * `EIO` - storage is unavailable, or the backend failed or abandoned
    ///   the request
    pub fn mkdir_syscall(&self, path: &str, _mode: u32) -> i32 {
        let storage = {
            let mut state = self.state.lock();
            self.await_storage(&mut state);
            match state.storage.storage() {
                Some(storage) => storage,
                None => return syscall_error(Errno::EIO, "mkdir", "persistent storage is not available"),
            }
        };

        let (completion, result) = Completion::new(self.weak());
        storage.make_directory(path, completion);
        match result.recv() {
            Ok(Ok(())) => 0,
            Ok(Err(e)) => {
                log::debug!("mkdir of {} failed in storage: {}", path, e);
                syscall_error(Errno::EIO, "mkdir", "the storage backend failed to create the directory")
            }
            Err(_) => syscall_error(Errno::EIO, "mkdir", "the storage backend dropped the request"),
        }
    }
}
