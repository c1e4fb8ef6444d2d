//! Emulated TCP networking.
//!
//! There is no resolver in the sandbox. `gethostbyname` hands out synthetic
//! addresses from the [`HostTable`], and `connect` maps them back to the
//! hostname so the [`NetworkBridge`] can connect to the real host.

use std::sync::Arc;

use crate::interface::{self, Errno, HostListener, HostStream, IoctlArg, StatData};
use crate::safeposix::stream::{ResourceHandle, StreamFlags, StreamResult};
use crate::safeposix::syscalls::fs_constants::*;
use crate::safeposix::syscalls::net_constants::*;

/// Bidirectional hostname / synthetic address map. Addresses are kept in
/// host byte order internally.
#[derive(Debug)]
pub struct HostTable {
    by_name: interface::RustHashMap<String, u32>,
    by_addr: interface::RustHashMap<u32, String>,
    next_addr: u32,
}

impl HostTable {
    pub fn new() -> HostTable {
        let mut table = HostTable {
            by_name: interface::RustHashMap::new(),
            by_addr: interface::RustHashMap::new(),
            next_addr: FIRST_SYNTHETIC_ADDR,
        };
        table.insert(LOCALHOST_NAME, LOCALHOST_ADDR);
        table
    }

    fn insert(&mut self, name: &str, addr: u32) {
        self.by_name.insert(name.to_string(), addr);
        self.by_addr.insert(addr, name.to_string());
    }

    /// Returns the address for `name` in network byte order, allocating the
    /// next synthetic one on first sight.
    pub fn lookup_or_allocate(&mut self, name: &str) -> u32 {
        if let Some(addr) = self.by_name.get(name) {
            return addr.to_be();
        }
        let addr = self.next_free_addr();
        self.insert(name, addr);
        log::debug!("allocated {} for {}", interface::ipv4_to_string(addr.to_be()), name);
        addr.to_be()
    }

    // past the top of the address space the search restarts at 0.0.0.1;
    // addresses already handed out are skipped
    fn next_free_addr(&mut self) -> u32 {
        loop {
            let addr = self.next_addr;
            self.next_addr = self.next_addr.checked_add(1).unwrap_or(1);
            if !self.by_addr.contains_key(&addr) {
                return addr;
            }
        }
    }

    /// `addr_be` is in network byte order.
    pub fn reverse_lookup(&self, addr_be: u32) -> Option<&str> {
        self.by_addr.get(&u32::from_be(addr_be)).map(|name| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl Default for HostTable {
    fn default() -> HostTable {
        HostTable::new()
    }
}

/// The host side of socket creation.
pub trait NetworkBridge: Send + Sync {
    /// Connects descriptor `fd` to `host:port`. Blocks until the connection
    /// is established or refused.
    fn connect(&self, fd: i32, host: &str, port: u16) -> StreamResult<Arc<dyn ResourceHandle>>;

    /// Starts listening on loopback `port` for descriptor `fd`.
    fn listen(&self, fd: i32, port: u16, backlog: i32) -> StreamResult<Arc<dyn ResourceHandle>>;
}

/// [`NetworkBridge`] over the host's own TCP stack.
#[derive(Debug, Default)]
pub struct HostNetwork;

impl NetworkBridge for HostNetwork {
    fn connect(&self, _fd: i32, host: &str, port: u16) -> StreamResult<Arc<dyn ResourceHandle>> {
        let stream = HostStream::connect(host, port).map_err(|e| Errno::from_io(&e))?;
        Ok(Arc::new(TcpSocket::new(stream, O_RDWR)))
    }

    fn listen(&self, _fd: i32, port: u16, _backlog: i32) -> StreamResult<Arc<dyn ResourceHandle>> {
        let listener = HostListener::bind_loopback(port).map_err(|e| Errno::from_io(&e))?;
        if let Ok(bound) = listener.local_port() {
            log::info!("listening on 127.0.0.1:{}", bound);
        }
        Ok(Arc::new(TcpServerSocket { listener, flags: StreamFlags::new(O_RDWR) }))
    }
}

fn socket_stat() -> StatData {
    StatData {
        st_dev: BRIDGE_DEV_ID,
        st_mode: S_IFSOCK | S_IRWALL,
        st_nlink: 1,
        st_uid: DEFAULT_UID,
        st_gid: DEFAULT_GID,
        st_blksize: 4096,
        ..Default::default()
    }
}

struct TcpInner {
    stream: HostStream,
    flags: StreamFlags,
}

impl Drop for TcpInner {
    fn drop(&mut self) {
        self.stream.shutdown();
    }
}

/// A connected TCP socket. Duplicates share the connection.
#[derive(Clone)]
pub struct TcpSocket {
    inner: Arc<TcpInner>,
}

impl TcpSocket {
    pub fn new(stream: HostStream, flags: i32) -> TcpSocket {
        TcpSocket { inner: Arc::new(TcpInner { stream, flags: StreamFlags::new(flags) }) }
    }
}

impl ResourceHandle for TcpSocket {
    fn read(&self, buf: &mut [u8]) -> StreamResult<usize> {
        self.inner.stream.recv(buf).map_err(|e| Errno::from_io(&e))
    }

    fn write(&self, buf: &[u8]) -> StreamResult<usize> {
        self.inner.stream.send(buf).map_err(|e| Errno::from_io(&e))
    }

    fn dup(&self, _newfd: i32) -> Option<Arc<dyn ResourceHandle>> {
        Some(Arc::new(self.clone()))
    }

    fn fstat(&self) -> StreamResult<StatData> {
        Ok(socket_stat())
    }

    fn fcntl(&self, cmd: i32, arg: i32) -> StreamResult<i32> {
        self.inner.flags.fcntl(cmd, arg)
    }

    fn ioctl(&self, request: u32, arg: &mut IoctlArg<'_>) -> StreamResult<i32> {
        match request {
            FIONBIO => self.inner.flags.ioctl_fionbio(arg),
            _ => Err(Errno::ENOTTY),
        }
    }

    fn is_read_ready(&self) -> bool {
        self.inner.stream.check_select_read()
    }

    fn is_write_ready(&self) -> bool {
        self.inner.stream.check_select_write()
    }

    fn is_exception(&self) -> bool {
        self.inner.stream.check_select_except()
    }

    fn is_nonblocking(&self) -> bool {
        self.inner.flags.is_nonblocking()
    }

    fn signals_readiness(&self) -> bool {
        false
    }
}

/// A listening socket. It cannot be read, written or duplicated.
pub struct TcpServerSocket {
    listener: HostListener,
    flags: StreamFlags,
}

impl TcpServerSocket {
    pub fn local_port(&self) -> StreamResult<u16> {
        self.listener.local_port().map_err(|e| Errno::from_io(&e))
    }
}

impl ResourceHandle for TcpServerSocket {
    fn read(&self, _buf: &mut [u8]) -> StreamResult<usize> {
        Err(Errno::ENOTCONN)
    }

    fn write(&self, _buf: &[u8]) -> StreamResult<usize> {
        Err(Errno::ENOTCONN)
    }

    fn dup(&self, _newfd: i32) -> Option<Arc<dyn ResourceHandle>> {
        None
    }

    fn fstat(&self) -> StreamResult<StatData> {
        Ok(socket_stat())
    }

    fn fcntl(&self, cmd: i32, arg: i32) -> StreamResult<i32> {
        self.flags.fcntl(cmd, arg)
    }

    fn ioctl(&self, request: u32, arg: &mut IoctlArg<'_>) -> StreamResult<i32> {
        match request {
            FIONBIO => self.flags.ioctl_fionbio(arg),
            _ => Err(Errno::ENOTTY),
        }
    }

    fn is_read_ready(&self) -> bool {
        self.listener.check_select_read()
    }

    fn is_write_ready(&self) -> bool {
        false
    }

    fn is_nonblocking(&self) -> bool {
        self.flags.is_nonblocking()
    }

    fn signals_readiness(&self) -> bool {
        false
    }

    fn accept(&self, _newfd: i32) -> StreamResult<Arc<dyn ResourceHandle>> {
        let stream = self.listener.accept().map_err(|e| Errno::from_io(&e))?;
        Ok(Arc::new(TcpSocket::new(stream, O_RDWR)))
    }
}
