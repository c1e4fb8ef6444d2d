// Network related constants
#![allow(dead_code)]

pub const SOCK_STREAM: i32 = 1; //stream socket
pub const SOCK_DGRAM: i32 = 2; //datagram socket

pub const AF_UNSPEC: i32 = 0;
pub const AF_INET: i32 = 2; /* Internet IP Protocol  */
pub const PF_INET: i32 = AF_INET;

pub const IPPROTO_IP: i32 = 0;
pub const IPPROTO_TCP: i32 = 6;

// 127.0.0.1, host byte order
pub const LOCALHOST_ADDR: u32 = 0x7F00_0001;
pub const LOCALHOST_NAME: &str = "localhost";

// first synthetic address handed out by gethostbyname, 254.0.0.1
pub const FIRST_SYNTHETIC_ADDR: u32 = 0xFE00_0001;

pub const DEFAULT_BACKLOG: i32 = 5;
