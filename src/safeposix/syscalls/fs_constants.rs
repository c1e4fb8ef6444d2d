// File system related constants
#![allow(dead_code)]

// descriptors 0, 1 and 2 belong to the console bridge
pub const STDIN_FILENO: i32 = 0;
pub const STDOUT_FILENO: i32 = 1;
pub const STDERR_FILENO: i32 = 2;

// the allocator never hands out anything below this
pub const FILE_ID_OFFSET: i32 = 3;
pub const MAXFD: i32 = 1024;

pub const O_RDONLY: i32 = 0o0;
pub const O_WRONLY: i32 = 0o1;
pub const O_RDWR: i32 = 0o2;
pub const O_RDWRFLAGS: i32 = 0o3;

pub const O_CREAT: i32 = 0o100;
pub const O_EXCL: i32 = 0o200;
pub const O_NOCTTY: i32 = 0o400;
pub const O_TRUNC: i32 = 0o1000;
pub const O_APPEND: i32 = 0o2000;
pub const O_NONBLOCK: i32 = 0o4000;
pub const O_CLOEXEC: i32 = 0o2000000;

// flags F_SETFL is allowed to change
pub const O_SETTABLEFLAGS: i32 = O_APPEND | O_NONBLOCK;

pub const DEFAULT_UID: u32 = 1000;
pub const DEFAULT_GID: u32 = 1000;

//Standard flag combinations
pub const S_IRWXA: u32 = 0o777;
pub const S_IRUSR: u32 = 0o400;
pub const S_IWUSR: u32 = 0o200;
pub const S_IRGRP: u32 = 0o040;
pub const S_IWGRP: u32 = 0o020;
pub const S_IROTH: u32 = 0o004;
pub const S_IWOTH: u32 = 0o002;
pub const S_IRWALL: u32 = S_IRUSR | S_IWUSR | S_IRGRP | S_IWGRP | S_IROTH | S_IWOTH;

//Commands for FCNTL
pub const F_DUPFD: i32 = 0;
pub const F_GETFD: i32 = 1;
pub const F_SETFD: i32 = 2;
pub const F_GETFL: i32 = 3;
pub const F_SETFL: i32 = 4;

pub const FD_CLOEXEC: i32 = 1;

//Requests for IOCTL
pub const TIOCGWINSZ: u32 = 0x5413;
pub const TIOCSWINSZ: u32 = 0x5414;
pub const FIONREAD: u32 = 0x541B;
pub const FIONBIO: u32 = 0x5421;

//File types for open/stat etc.
pub const S_IFCHR: u32 = 0o20000;
pub const S_IFDIR: u32 = 0o40000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFSOCK: u32 = 0o140000;
pub const S_FILETYPEFLAGS: u32 = 0o170000;

pub const SEEK_SET: i32 = 0;
pub const SEEK_CUR: i32 = 1;
pub const SEEK_END: i32 = 2;

//device info for char files
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct DevNo {
    pub major: u32,
    pub minor: u32,
}
pub const NULLDEVNO: DevNo = DevNo { major: 1, minor: 3 };
pub const RANDOMDEVNO: DevNo = DevNo { major: 1, minor: 8 };
pub const TTYDEVNO: DevNo = DevNo { major: 5, minor: 0 };
pub const CONSOLEDEVNO: DevNo = DevNo { major: 136, minor: 0 };

pub const STORAGE_DEV_ID: u64 = 20;
pub const BRIDGE_DEV_ID: u64 = 21;
pub const STORAGE_BLKSIZE: isize = 4096;

pub fn is_reg(mode: u32) -> bool {
    (mode & S_FILETYPEFLAGS) == S_IFREG
}

pub fn is_chr(mode: u32) -> bool {
    (mode & S_FILETYPEFLAGS) == S_IFCHR
}

pub fn is_wronly(flags: i32) -> bool {
    (flags & O_RDWRFLAGS) == O_WRONLY
}

pub fn is_rdonly(flags: i32) -> bool {
    (flags & O_RDWRFLAGS) == O_RDONLY
}

//the same as the glibc makedev
pub fn makedev(dev: &DevNo) -> u64 {
    ((dev.major as u64 & 0x00000fff) << 8)
        | ((dev.major as u64 & 0xfffff000) << 32)
        | (dev.minor as u64 & 0x000000ff)
        | ((dev.minor as u64 & 0xffffff00) << 12)
}

//the same as the glibc major and minor functions
pub fn major(devnum: u64) -> u32 {
    (((devnum & 0x00000000000fff00) >> 8) | ((devnum & 0xfffff00000000000) >> 32)) as u32
}

pub fn minor(devnum: u64) -> u32 {
    ((devnum & 0x00000000000000ff) | ((devnum & 0x00000ffffff00000) >> 12)) as u32
}
