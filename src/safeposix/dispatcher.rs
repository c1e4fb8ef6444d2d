// Numeric entry point for the syscall-wrapping shim
//
// The shim hands every intercepted call over as a call number plus up to five
// raw `Arg` words. Each arm decodes the words it needs with the
// `interface::get_*` helpers, which already produce the negative errno for a
// bad pointer or value.

use super::cage::Cage;
use super::syscall_numbers::*;
use crate::interface::{self, syscall_error, Arg, Errno};

//this macro takes in a syscall invocation name (i.e. cage.open_syscall), and all of the arguments
//to the syscall. Then it unwraps the arguments, returning the error if any one of them is an error
//value, and returning the value of the function if not. It does this by using the ? operator in
//the body of a closure within the variadic macro
macro_rules! check_and_dispatch {
    ( $cage:ident . $func:ident, $($arg:expr),* ) => {
        match (|| Ok($cage.$func( $($arg?),* )))() {
            Ok(i) => i, Err(i) => i
        }
    };
}

macro_rules! get_onearg {
    ($arg: expr) => {
        match (move || Ok($arg?))() {
            Ok(okval) => okval,
            Err(e) => return e,
        }
    };
}

fn get_port(union_argument: Arg) -> Result<u16, i32> {
    let port = interface::get_uint(union_argument)?;
    u16::try_from(port).map_err(|_| syscall_error(Errno::EINVAL, "dispatcher", "port out of range"))
}

/// Runs call `callnum` on `cage`.
///
/// Buffers are described by a pointer word followed by a length word. Call
/// numbers the cage does not implement return `-ENOSYS`.
///
/// # Safety
///
/// Every pointer argument must be null or valid for the access the call
/// makes (reads of `len` bytes for write, writes for read, a NUL-terminated
/// string for paths and host names).
pub unsafe fn dispatcher(cage: &Cage, callnum: i32, arg1: Arg, arg2: Arg, arg3: Arg, arg4: Arg, arg5: Arg) -> i32 {
    match callnum {
        OPEN_SYSCALL => {
            check_and_dispatch!(cage.open_syscall, interface::get_cstr(arg1), interface::get_int(arg2), interface::get_uint(arg3))
        }
        CLOSE_SYSCALL => {
            check_and_dispatch!(cage.close_syscall, interface::get_int(arg1))
        }
        READ_SYSCALL => {
            let count = get_onearg!(interface::get_usize(arg3));
            check_and_dispatch!(cage.read_syscall, interface::get_int(arg1), interface::get_mutcbuf(arg2, count))
        }
        WRITE_SYSCALL => {
            let count = get_onearg!(interface::get_usize(arg3));
            check_and_dispatch!(cage.write_syscall, interface::get_int(arg1), interface::get_cbuf(arg2, count))
        }
        LSEEK_SYSCALL => {
            check_and_dispatch!(cage.lseek_syscall, interface::get_int(arg1), interface::get_long(arg2), interface::get_int(arg3))
        }
        XSTAT_SYSCALL => {
            check_and_dispatch!(cage.stat_syscall, interface::get_cstr(arg1), interface::get_statdatastruct(arg2))
        }
        FXSTAT_SYSCALL => {
            check_and_dispatch!(cage.fstat_syscall, interface::get_int(arg1), interface::get_statdatastruct(arg2))
        }
        GETDENTS_SYSCALL => {
            let count = get_onearg!(interface::get_usize(arg3));
            check_and_dispatch!(cage.getdents_syscall, interface::get_int(arg1), interface::get_mutcbuf(arg2, count))
        }
        DUP_SYSCALL => {
            check_and_dispatch!(cage.dup_syscall, interface::get_int(arg1), Ok::<Option<i32>, i32>(None))
        }
        DUP2_SYSCALL => {
            check_and_dispatch!(cage.dup2_syscall, interface::get_int(arg1), interface::get_int(arg2))
        }
        ISATTY_SYSCALL => {
            check_and_dispatch!(cage.isatty_syscall, interface::get_int(arg1))
        }
        FCNTL_SYSCALL => {
            check_and_dispatch!(cage.fcntl_syscall, interface::get_int(arg1), interface::get_int(arg2), interface::get_int(arg3))
        }
        IOCTL_SYSCALL => {
            let fd = get_onearg!(interface::get_int(arg1));
            let request = get_onearg!(interface::get_uint(arg2));
            let mut ioctlarg = get_onearg!(interface::get_ioctlarg(arg3, request));
            cage.ioctl_syscall(fd, request, &mut ioctlarg)
        }
        MKDIR_SYSCALL => {
            check_and_dispatch!(cage.mkdir_syscall, interface::get_cstr(arg1), interface::get_uint(arg2))
        }
        SELECT_SYSCALL => {
            check_and_dispatch!(
                cage.select_syscall,
                interface::get_int(arg1),
                interface::get_fdset(arg2),
                interface::get_fdset(arg3),
                interface::get_fdset(arg4),
                interface::get_timeout(arg5)
            )
        }
        SOCKET_SYSCALL => {
            check_and_dispatch!(cage.socket_syscall, interface::get_int(arg1), interface::get_int(arg2), interface::get_int(arg3))
        }
        CONNECT_SYSCALL => {
            check_and_dispatch!(cage.connect_syscall, interface::get_int(arg1), interface::get_uint(arg2), get_port(arg3))
        }
        BIND_SYSCALL => {
            check_and_dispatch!(cage.bind_syscall, interface::get_int(arg1), interface::get_uint(arg2), get_port(arg3))
        }
        LISTEN_SYSCALL => {
            check_and_dispatch!(cage.listen_syscall, interface::get_int(arg1), interface::get_int(arg2))
        }
        ACCEPT_SYSCALL => {
            check_and_dispatch!(cage.accept_syscall, interface::get_int(arg1))
        }
        GETHOSTBYNAME_SYSCALL => {
            // the address goes out through arg2, it does not fit the return value
            let name = get_onearg!(interface::get_cstr(arg1));
            let out = arg2.dispatch_intptr;
            if out.is_null() {
                return syscall_error(Errno::EFAULT, "gethostbyname", "output pointer was null");
            }
            let addr = cage.gethostbyname_syscall(name);
            *out = addr as i32;
            0
        }
        _ => syscall_error(Errno::ENOSYS, "dispatcher", "unknown syscall number"),
    }
}
