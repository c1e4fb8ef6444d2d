// Call numbers understood by the dispatcher
#![allow(dead_code)]

pub const XSTAT_SYSCALL: i32 = 9;
pub const OPEN_SYSCALL: i32 = 10;
pub const CLOSE_SYSCALL: i32 = 11;
pub const READ_SYSCALL: i32 = 12;
pub const WRITE_SYSCALL: i32 = 13;
pub const LSEEK_SYSCALL: i32 = 14;
pub const IOCTL_SYSCALL: i32 = 15;
pub const FXSTAT_SYSCALL: i32 = 17;
pub const GETDENTS_SYSCALL: i32 = 23;
pub const DUP_SYSCALL: i32 = 24;
pub const DUP2_SYSCALL: i32 = 25;
pub const FCNTL_SYSCALL: i32 = 28;

pub const BIND_SYSCALL: i32 = 33;
pub const CONNECT_SYSCALL: i32 = 38;
pub const LISTEN_SYSCALL: i32 = 39;
pub const ACCEPT_SYSCALL: i32 = 40;

pub const SELECT_SYSCALL: i32 = 46;
pub const ISATTY_SYSCALL: i32 = 60;
pub const GETHOSTBYNAME_SYSCALL: i32 = 126;

pub const MKDIR_SYSCALL: i32 = 131;
pub const SOCKET_SYSCALL: i32 = 136;
