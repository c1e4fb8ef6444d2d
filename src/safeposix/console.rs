//! Console streams bridged to the embedding terminal UI.
//!
//! Output is handed straight to the [`ConsoleBridge`]. Input arrives
//! asynchronously: the embedder calls `Cage::push_console_input`, which lands
//! in the [`ConsoleHub`] pipe for that bridge descriptor and wakes anyone
//! blocked in `read` or `select`.

use dashmap::DashMap;
use std::sync::Arc;

use crate::interface::{self, Errno, InputPipe, IoctlArg, StatData, WinSize};
use crate::safeposix::filesystem::PathHandler;
use crate::safeposix::stream::{ResourceHandle, StreamFlags, StreamResult};
use crate::safeposix::syscalls::fs_constants::*;

const DEFAULT_WINSIZE: WinSize = WinSize { ws_row: 24, ws_col: 80, ws_xpixel: 0, ws_ypixel: 0 };

/// The embedder side of the console bridge.
pub trait ConsoleBridge: Send + Sync {
    /// Announces a bridged descriptor. Returning false refuses it.
    fn open(&self, fd: i32, path: Option<&str>, flags: i32) -> bool;

    fn write(&self, fd: i32, data: &[u8]) -> StreamResult<usize>;

    /// The last reference to bridged descriptor `fd` went away.
    fn close(&self, fd: i32);

    fn window_size(&self, _fd: i32) -> Option<WinSize> {
        None
    }
}

/// Input pipes of every open bridged descriptor, keyed by the descriptor
/// number the bridge knows it under.
#[derive(Debug, Default)]
pub struct ConsoleHub {
    inputs: DashMap<i32, Arc<InputPipe>>,
}

impl ConsoleHub {
    pub fn new() -> ConsoleHub {
        ConsoleHub { inputs: DashMap::new() }
    }

    fn attach(&self, bridge_fd: i32) -> Arc<InputPipe> {
        let pipe = Arc::new(InputPipe::new_with_capacity(interface::CONSOLE_PIPE_SIZE));
        self.inputs.insert(bridge_fd, pipe.clone());
        pipe
    }

    // a newer stream may have taken over the number, leave that one alone
    fn detach(&self, bridge_fd: i32, pipe: &Arc<InputPipe>) {
        self.inputs.remove_if(&bridge_fd, |_, current| Arc::ptr_eq(current, pipe));
    }

    /// Returns the number of bytes accepted, or `None` if nothing is bridged
    /// under `bridge_fd`.
    pub fn push_input(&self, bridge_fd: i32, data: &[u8]) -> Option<usize> {
        let pipe = self.inputs.get(&bridge_fd)?.clone();
        Some(pipe.push(data))
    }

    pub fn close_input(&self, bridge_fd: i32) -> bool {
        match self.inputs.get(&bridge_fd) {
            Some(pipe) => {
                pipe.set_eof();
                true
            }
            None => false,
        }
    }
}

struct ConsoleInner {
    bridge_fd: i32,
    flags: StreamFlags,
    bridge: Arc<dyn ConsoleBridge>,
    hub: Arc<ConsoleHub>,
    input: Arc<InputPipe>,
}

impl ConsoleInner {
    fn read(&self, buf: &mut [u8]) -> StreamResult<usize> {
        match self.input.pop(buf) {
            Some(nread) => Ok(nread),
            None => Err(Errno::EAGAIN),
        }
    }

    fn ioctl(&self, request: u32, arg: &mut IoctlArg<'_>) -> StreamResult<i32> {
        match (request, arg) {
            (TIOCGWINSZ, IoctlArg::WinSize(winsize)) => {
                **winsize = self.bridge.window_size(self.bridge_fd).unwrap_or(DEFAULT_WINSIZE);
                Ok(0)
            }
            (FIONREAD, IoctlArg::Int(count)) => {
                **count = self.input.available() as i32;
                Ok(0)
            }
            (FIONBIO, arg) => self.flags.ioctl_fionbio(arg),
            (TIOCGWINSZ, _) | (FIONREAD, _) => Err(Errno::EFAULT),
            _ => Err(Errno::EINVAL),
        }
    }
}

impl Drop for ConsoleInner {
    fn drop(&mut self) {
        self.hub.detach(self.bridge_fd, &self.input);
        self.bridge.close(self.bridge_fd);
    }
}

fn console_stat() -> StatData {
    StatData {
        st_dev: BRIDGE_DEV_ID,
        st_mode: S_IFCHR | 0o620,
        st_nlink: 1,
        st_uid: DEFAULT_UID,
        st_gid: DEFAULT_GID,
        st_rdev: makedev(&CONSOLEDEVNO),
        st_blksize: 1024,
        ..Default::default()
    }
}

/// One of the stdin/stdout/stderr-like bridged streams, or any path the
/// embedder agreed to serve.
#[derive(Clone)]
pub struct ConsoleStream {
    inner: Arc<ConsoleInner>,
}

impl ConsoleStream {
    /// Asks the bridge to open `bridge_fd`; `None` if it refuses.
    pub fn open(bridge: Arc<dyn ConsoleBridge>, hub: Arc<ConsoleHub>, bridge_fd: i32, path: Option<&str>, flags: i32) -> Option<ConsoleStream> {
        if !bridge.open(bridge_fd, path, flags) {
            log::warn!("console bridge refused descriptor {}", bridge_fd);
            return None;
        }
        let input = hub.attach(bridge_fd);
        Some(ConsoleStream {
            inner: Arc::new(ConsoleInner { bridge_fd, flags: StreamFlags::new(flags), bridge, hub, input }),
        })
    }

    pub fn bridge_fd(&self) -> i32 {
        self.inner.bridge_fd
    }
}

impl ResourceHandle for ConsoleStream {
    fn read(&self, buf: &mut [u8]) -> StreamResult<usize> {
        if !self.inner.flags.can_read() {
            return Err(Errno::EBADF);
        }
        self.inner.read(buf)
    }

    fn write(&self, buf: &[u8]) -> StreamResult<usize> {
        if !self.inner.flags.can_write() {
            return Err(Errno::EBADF);
        }
        self.inner.bridge.write(self.inner.bridge_fd, buf)
    }

    fn dup(&self, _newfd: i32) -> Option<Arc<dyn ResourceHandle>> {
        Some(Arc::new(self.clone()))
    }

    fn fstat(&self) -> StreamResult<StatData> {
        Ok(console_stat())
    }

    fn isatty(&self) -> bool {
        true
    }

    fn fcntl(&self, cmd: i32, arg: i32) -> StreamResult<i32> {
        self.inner.flags.fcntl(cmd, arg)
    }

    fn ioctl(&self, request: u32, arg: &mut IoctlArg<'_>) -> StreamResult<i32> {
        self.inner.ioctl(request, arg)
    }

    fn is_read_ready(&self) -> bool {
        self.inner.flags.can_read() && self.inner.input.check_select_read()
    }

    fn is_write_ready(&self) -> bool {
        self.inner.flags.can_write()
    }

    fn is_nonblocking(&self) -> bool {
        self.inner.flags.is_nonblocking()
    }
}

/// `/dev/tty`: reads the console input, writes the console output.
#[derive(Clone)]
pub struct TtyStream {
    stdin: Arc<ConsoleInner>,
    stdout: Arc<ConsoleInner>,
    flags: Arc<StreamFlags>,
}

impl ResourceHandle for TtyStream {
    fn read(&self, buf: &mut [u8]) -> StreamResult<usize> {
        if !self.flags.can_read() {
            return Err(Errno::EBADF);
        }
        self.stdin.read(buf)
    }

    fn write(&self, buf: &[u8]) -> StreamResult<usize> {
        if !self.flags.can_write() {
            return Err(Errno::EBADF);
        }
        self.stdout.bridge.write(self.stdout.bridge_fd, buf)
    }

    fn dup(&self, _newfd: i32) -> Option<Arc<dyn ResourceHandle>> {
        Some(Arc::new(self.clone()))
    }

    fn fstat(&self) -> StreamResult<StatData> {
        Ok(StatData { st_rdev: makedev(&TTYDEVNO), ..console_stat() })
    }

    fn isatty(&self) -> bool {
        true
    }

    fn fcntl(&self, cmd: i32, arg: i32) -> StreamResult<i32> {
        self.flags.fcntl(cmd, arg)
    }

    fn ioctl(&self, request: u32, arg: &mut IoctlArg<'_>) -> StreamResult<i32> {
        match request {
            FIONBIO => self.flags.ioctl_fionbio(arg),
            FIONREAD => self.stdin.ioctl(request, arg),
            _ => self.stdout.ioctl(request, arg),
        }
    }

    fn is_read_ready(&self) -> bool {
        self.flags.can_read() && self.stdin.input.check_select_read()
    }

    fn is_write_ready(&self) -> bool {
        self.flags.can_write()
    }

    fn is_nonblocking(&self) -> bool {
        self.flags.is_nonblocking()
    }
}

pub struct DevTtyHandler {
    stdin: ConsoleStream,
    stdout: ConsoleStream,
}

impl DevTtyHandler {
    pub fn new(stdin: ConsoleStream, stdout: ConsoleStream) -> DevTtyHandler {
        DevTtyHandler { stdin, stdout }
    }
}

impl PathHandler for DevTtyHandler {
    fn open(&self, _fd: i32, _path: &str, flags: i32) -> Option<Arc<dyn ResourceHandle>> {
        Some(Arc::new(TtyStream {
            stdin: self.stdin.inner.clone(),
            stdout: self.stdout.inner.clone(),
            flags: Arc::new(StreamFlags::new(flags)),
        }))
    }

    fn stat(&self, _path: &str) -> StreamResult<StatData> {
        Ok(StatData { st_rdev: makedev(&TTYDEVNO), ..console_stat() })
    }
}

/// Serves a path entirely through the console bridge; the embedder decides
/// what the bytes are.
pub struct BridgeFileHandler {
    bridge: Arc<dyn ConsoleBridge>,
    hub: Arc<ConsoleHub>,
}

impl BridgeFileHandler {
    pub fn new(bridge: Arc<dyn ConsoleBridge>, hub: Arc<ConsoleHub>) -> BridgeFileHandler {
        BridgeFileHandler { bridge, hub }
    }
}

impl PathHandler for BridgeFileHandler {
    fn open(&self, fd: i32, path: &str, flags: i32) -> Option<Arc<dyn ResourceHandle>> {
        let stream = ConsoleStream::open(self.bridge.clone(), self.hub.clone(), fd, Some(path), flags)?;
        Some(Arc::new(stream))
    }

    fn stat(&self, _path: &str) -> StreamResult<StatData> {
        Ok(console_stat())
    }
}
