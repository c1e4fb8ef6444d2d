use crate::interface::errnos::{syscall_error, Errno};

pub const FD_SET_MAX_FD: i32 = 1024;

//derive eq attributes for testing whether the structs equal other statdata structs from stat/fstat
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
#[repr(C)]
pub struct StatData {
    pub st_dev: u64,
    pub st_ino: usize,
    pub st_mode: u32,
    pub st_nlink: u32,
    pub st_uid: u32,
    pub st_gid: u32,
    pub st_rdev: u64,
    pub st_size: usize,
    pub st_blksize: isize,
    pub st_blocks: usize,
    //currently we don't populate or care about the time bits here
    pub st_atim: (u64, u64),
    pub st_mtim: (u64, u64),
    pub st_ctim: (u64, u64),
}

/// Terminal geometry reported through `TIOCGWINSZ`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
#[repr(C)]
pub struct WinSize {
    pub ws_row: u16,
    pub ws_col: u16,
    pub ws_xpixel: u16,
    pub ws_ypixel: u16,
}

/// The variadic third argument of `ioctl`, narrowed to the shapes the
/// bridged backends understand.
#[derive(Debug)]
pub enum IoctlArg<'a> {
    None,
    Int(&'a mut i32),
    WinSize(&'a mut WinSize),
}

/// Fixed-size descriptor bitmap mirroring `fd_set`.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct FdSet {
    bits: [u64; (FD_SET_MAX_FD as usize) / 64],
}

impl FdSet {
    pub fn new() -> FdSet {
        FdSet { bits: [0; (FD_SET_MAX_FD as usize) / 64] }
    }

    fn in_range(fd: i32) -> bool {
        (0..FD_SET_MAX_FD).contains(&fd)
    }

    pub fn set(&mut self, fd: i32) {
        if Self::in_range(fd) {
            self.bits[fd as usize / 64] |= 1u64 << (fd as usize % 64);
        }
    }

    pub fn clear(&mut self, fd: i32) {
        if Self::in_range(fd) {
            self.bits[fd as usize / 64] &= !(1u64 << (fd as usize % 64));
        }
    }

    pub fn is_set(&self, fd: i32) -> bool {
        Self::in_range(fd) && (self.bits[fd as usize / 64] >> (fd as usize % 64)) & 1 == 1
    }

    pub fn clear_all(&mut self) {
        self.bits = [0; (FD_SET_MAX_FD as usize) / 64];
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|word| *word == 0)
    }

    pub fn count(&self) -> usize {
        self.bits.iter().map(|word| word.count_ones() as usize).sum()
    }
}

impl Default for FdSet {
    fn default() -> FdSet {
        FdSet::new()
    }
}

impl std::fmt::Debug for FdSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries((0..FD_SET_MAX_FD).filter(|fd| self.is_set(*fd))).finish()
    }
}

/// `struct timeval` as handed to `select`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
#[repr(C)]
pub struct TimeVal {
    pub tv_sec: i64,
    pub tv_usec: i64,
}

impl TimeVal {
    pub fn to_duration(&self) -> Option<std::time::Duration> {
        if self.tv_sec < 0 || self.tv_usec < 0 {
            return None;
        }
        Some(std::time::Duration::from_secs(self.tv_sec as u64) + std::time::Duration::from_micros(self.tv_usec as u64))
    }
}

//redefining the Arg union to carry raw syscall arguments through the dispatcher
#[derive(Clone, Copy)]
#[repr(C)]
pub union Arg {
    pub dispatch_int: i32,
    pub dispatch_uint: u32,
    pub dispatch_ulong: u64,
    pub dispatch_long: i64,
    pub dispatch_usize: usize,
    pub dispatch_isize: isize,
    pub dispatch_cbuf: *const u8,
    pub dispatch_mutcbuf: *mut u8,
    pub dispatch_cstr: *const libc::c_char,
    pub dispatch_statdatastruct: *mut StatData,
    pub dispatch_fdset: *mut FdSet,
    pub dispatch_timeval: *const TimeVal,
    pub dispatch_winsize: *mut WinSize,
    pub dispatch_intptr: *mut i32,
}

pub fn get_int(union_argument: Arg) -> Result<i32, i32> {
    let data = unsafe { union_argument.dispatch_long };
    // the upper half must be a sign extension of the lower half
    if data == (data as i32) as i64 || data >> 32 == 0 {
        return Ok(data as i32);
    }
    Err(syscall_error(Errno::EINVAL, "dispatcher", "input data not valid"))
}

pub fn get_uint(union_argument: Arg) -> Result<u32, i32> {
    let data = unsafe { union_argument.dispatch_ulong };
    if data >> 32 == 0 {
        return Ok(data as u32);
    }
    Err(syscall_error(Errno::EINVAL, "dispatcher", "input data not valid"))
}

pub fn get_long(union_argument: Arg) -> Result<i64, i32> {
    Ok(unsafe { union_argument.dispatch_long })
}

pub fn get_usize(union_argument: Arg) -> Result<usize, i32> {
    Ok(unsafe { union_argument.dispatch_usize })
}

pub fn get_cbuf<'a>(union_argument: Arg, len: usize) -> Result<&'a [u8], i32> {
    let data = unsafe { union_argument.dispatch_cbuf };
    if data.is_null() {
        return Err(syscall_error(Errno::EFAULT, "dispatcher", "input data not valid"));
    }
    Ok(unsafe { std::slice::from_raw_parts(data, len) })
}

pub fn get_mutcbuf<'a>(union_argument: Arg, len: usize) -> Result<&'a mut [u8], i32> {
    let data = unsafe { union_argument.dispatch_mutcbuf };
    if data.is_null() {
        return Err(syscall_error(Errno::EFAULT, "dispatcher", "input data not valid"));
    }
    Ok(unsafe { std::slice::from_raw_parts_mut(data, len) })
}

pub fn get_cstr<'a>(union_argument: Arg) -> Result<&'a str, i32> {
    //first we check that the pointer is not null
    //and then we check so that we can get data from the memory
    let pointer = unsafe { union_argument.dispatch_cstr };
    if pointer.is_null() {
        return Err(syscall_error(Errno::EFAULT, "dispatcher", "input data not valid"));
    }
    match unsafe { std::ffi::CStr::from_ptr(pointer) }.to_str() {
        Ok(ret_data) => Ok(ret_data),
        Err(_) => Err(syscall_error(Errno::EILSEQ, "dispatcher", "could not parse input data to a string")),
    }
}

pub fn get_statdatastruct<'a>(union_argument: Arg) -> Result<&'a mut StatData, i32> {
    let pointer = unsafe { union_argument.dispatch_statdatastruct };
    if !pointer.is_null() {
        return Ok(unsafe { &mut *pointer });
    }
    Err(syscall_error(Errno::EFAULT, "dispatcher", "input data not valid"))
}

// a null fd_set is legal for select, it just means the set is not watched
pub fn get_fdset<'a>(union_argument: Arg) -> Result<Option<&'a mut FdSet>, i32> {
    let pointer = unsafe { union_argument.dispatch_fdset };
    if pointer.is_null() {
        return Ok(None);
    }
    Ok(Some(unsafe { &mut *pointer }))
}

pub fn get_timeout(union_argument: Arg) -> Result<Option<std::time::Duration>, i32> {
    let pointer = unsafe { union_argument.dispatch_timeval };
    if pointer.is_null() {
        return Ok(None);
    }
    match unsafe { (*pointer).to_duration() } {
        Some(duration) => Ok(Some(duration)),
        None => Err(syscall_error(Errno::EINVAL, "select", "negative timeout")),
    }
}

pub fn get_ioctlarg<'a>(union_argument: Arg, request: u32) -> Result<IoctlArg<'a>, i32> {
    use crate::safeposix::syscalls::fs_constants::{FIONBIO, FIONREAD, TIOCGWINSZ, TIOCSWINSZ};
    match request {
        TIOCGWINSZ | TIOCSWINSZ => {
            let pointer = unsafe { union_argument.dispatch_winsize };
            if pointer.is_null() {
                return Err(syscall_error(Errno::EFAULT, "ioctl", "winsize pointer was null"));
            }
            Ok(IoctlArg::WinSize(unsafe { &mut *pointer }))
        }
        FIONBIO | FIONREAD => {
            let pointer = unsafe { union_argument.dispatch_intptr };
            if pointer.is_null() {
                return Err(syscall_error(Errno::EFAULT, "ioctl", "int pointer was null"));
            }
            Ok(IoctlArg::Int(unsafe { &mut *pointer }))
        }
        _ => Ok(IoctlArg::None),
    }
}

#[cfg(test)]
mod types_tests {
    use super::*;

    #[test]
    fn fdset_tracks_bits() {
        let mut set = FdSet::new();
        assert!(set.is_empty());
        set.set(0);
        set.set(65);
        set.set(FD_SET_MAX_FD); // ignored, out of range
        assert!(set.is_set(0));
        assert!(set.is_set(65));
        assert!(!set.is_set(64));
        assert_eq!(set.count(), 2);
        set.clear(0);
        assert_eq!(set.count(), 1);
        set.clear_all();
        assert!(set.is_empty());
    }

    #[test]
    fn timeval_converts() {
        let tv = TimeVal { tv_sec: 1, tv_usec: 500 };
        assert_eq!(tv.to_duration(), Some(std::time::Duration::from_micros(1_000_500)));
        assert_eq!(TimeVal { tv_sec: -1, tv_usec: 0 }.to_duration(), None);
    }
}
