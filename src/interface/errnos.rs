// Error numbers returned by the bridged syscalls
//
// Every `*_syscall` method hands back `-(errno)` on failure, so callers see
// the same integer they would get from a libc wrapper that stored errno.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Errno {
    EPERM = 1,
    ENOENT = 2,
    EINTR = 4,
    EIO = 5,
    EBADF = 9,
    EAGAIN = 11,
    ENOMEM = 12,
    EACCES = 13,
    EFAULT = 14,
    EEXIST = 17,
    ENOTDIR = 20,
    EISDIR = 21,
    EINVAL = 22,
    ENFILE = 23,
    ENOTTY = 25,
    ESPIPE = 29,
    EPIPE = 32,
    ERANGE = 34,
    ENOSYS = 38,
    EILSEQ = 84,
    ENOTSOCK = 88,
    EOPNOTSUPP = 95,
    EAFNOSUPPORT = 97,
    EADDRINUSE = 98,
    ECONNRESET = 104,
    EISCONN = 106,
    ENOTCONN = 107,
    ETIMEDOUT = 110,
    ECONNREFUSED = 111,
}

impl Errno {
    /// Maps a host `std::io::Error` onto the closest bridged errno, falling
    /// back to `EIO` for anything without a direct counterpart.
    pub fn from_io(err: &std::io::Error) -> Errno {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => Errno::ENOENT,
            ErrorKind::PermissionDenied => Errno::EACCES,
            ErrorKind::ConnectionRefused => Errno::ECONNREFUSED,
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => Errno::ECONNRESET,
            ErrorKind::NotConnected => Errno::ENOTCONN,
            ErrorKind::AddrInUse => Errno::EADDRINUSE,
            ErrorKind::AlreadyExists => Errno::EEXIST,
            ErrorKind::WouldBlock => Errno::EAGAIN,
            ErrorKind::InvalidInput => Errno::EINVAL,
            ErrorKind::TimedOut => Errno::ETIMEDOUT,
            ErrorKind::BrokenPipe => Errno::EPIPE,
            ErrorKind::Interrupted => Errno::EINTR,
            _ => Errno::EIO,
        }
    }

    pub fn as_ret(self) -> i32 {
        -(self as i32)
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, *self as i32)
    }
}

/// Logs the failure and returns the negated errno for the caller.
pub fn syscall_error(e: Errno, syscall: &str, message: &str) -> i32 {
    log::debug!("{}: {} ({})", syscall, message, e);
    e.as_ret()
}

#[cfg(test)]
mod errno_tests {
    use super::*;

    #[test]
    fn syscall_error_negates() {
        assert_eq!(syscall_error(Errno::EBADF, "read", "bad fd"), -9);
        assert_eq!(Errno::ECONNREFUSED.as_ret(), -111);
    }

    #[test]
    fn io_errors_map_to_errno() {
        let err = std::io::Error::from(std::io::ErrorKind::WouldBlock);
        assert_eq!(Errno::from_io(&err), Errno::EAGAIN);
        let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert_eq!(Errno::from_io(&err), Errno::EIO);
    }
}
