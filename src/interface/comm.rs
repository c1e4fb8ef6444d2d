// Host socket wrappers for the emulated TCP descriptors
//
// Sockets are always non-blocking on the host side; whether a sandboxed
// descriptor blocks is decided by the dispatcher, which waits on its
// condition variable and re-polls.

use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, Shutdown, TcpListener, TcpStream, ToSocketAddrs};
use std::os::unix::io::{AsRawFd, RawFd};

extern crate libc;

pub const LOOPBACK_ADDR: u32 = 0x7F00_0001;

/// Formats an address stored in network byte order as dotted decimal.
pub fn ipv4_to_string(addr_be: u32) -> String {
    Ipv4Addr::from(u32::from_be(addr_be)).to_string()
}

/// Parses dotted decimal into network byte order.
pub fn ipv4_from_string(string: &str) -> Option<u32> {
    let v4candidate: Vec<&str> = string.split('.').collect();
    if v4candidate.len() != 4 {
        return None;
    }
    let mut bytearr = [0u8; 4];
    for (index, byte) in v4candidate.iter().enumerate() {
        bytearr[index] = byte.parse::<u8>().ok()?;
    }
    Some(u32::from_ne_bytes(bytearr))
}

// Zero-timeout poll of a single host descriptor, returning revents
fn poll_revents(fd: RawFd, events: i16) -> i16 {
    let mut pollfd = libc::pollfd { fd, events, revents: 0 };
    let ret = unsafe { libc::poll(&mut pollfd as *mut libc::pollfd, 1, 0) };
    if ret < 0 {
        return libc::POLLERR;
    }
    pollfd.revents
}

#[derive(Debug)]
pub struct HostStream {
    stream: TcpStream,
}

impl HostStream {
    pub fn connect(host: &str, port: u16) -> io::Result<HostStream> {
        let mut last_err = io::Error::new(io::ErrorKind::ConnectionRefused, "no addresses resolved");
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect(addr) {
                Ok(stream) => return Self::from_stream(stream),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    pub fn from_stream(stream: TcpStream) -> io::Result<HostStream> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(HostStream { stream })
    }

    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        (&self.stream).read(buf)
    }

    pub fn send(&self, buf: &[u8]) -> io::Result<usize> {
        (&self.stream).write(buf)
    }

    pub fn shutdown(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }

    pub fn check_select_read(&self) -> bool {
        poll_revents(self.stream.as_raw_fd(), libc::POLLIN) & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0
    }

    pub fn check_select_write(&self) -> bool {
        poll_revents(self.stream.as_raw_fd(), libc::POLLOUT) & (libc::POLLOUT | libc::POLLERR) != 0
    }

    pub fn check_select_except(&self) -> bool {
        poll_revents(self.stream.as_raw_fd(), libc::POLLPRI) & (libc::POLLPRI | libc::POLLERR | libc::POLLNVAL) != 0
    }
}

#[derive(Debug)]
pub struct HostListener {
    listener: TcpListener,
}

impl HostListener {
    // listeners ignore the requested address and always bind to loopback
    pub fn bind_loopback(port: u16) -> io::Result<HostListener> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))?;
        listener.set_nonblocking(true)?;
        Ok(HostListener { listener })
    }

    pub fn accept(&self) -> io::Result<HostStream> {
        let (stream, _addr) = self.listener.accept()?;
        HostStream::from_stream(stream)
    }

    pub fn local_port(&self) -> io::Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    pub fn check_select_read(&self) -> bool {
        poll_revents(self.listener.as_raw_fd(), libc::POLLIN) & libc::POLLIN != 0
    }
}
