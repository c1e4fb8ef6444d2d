mod net_tests;

use std::collections::{HashMap, HashSet, VecDeque};
use std::ffi::CString;

use crate::interface::{self, Errno, RustMutex, RustRfc, StatData, WinSize};
use crate::safeposix::cage::{Cage, CageBackends};
use crate::safeposix::config::FsConfig;
use crate::safeposix::console::ConsoleBridge;
use crate::safeposix::filesystem::PathHandler;
use crate::safeposix::net::{HostNetwork, NetworkBridge};
use crate::safeposix::storage::{Completion, HostDirStorage, MountCompletion, PersistentStorage};
use crate::safeposix::stream::{ResourceHandle, StreamFlags, StreamResult};
use crate::safeposix::syscalls::fs_constants::*;
use crate::safeposix::syscalls::net_constants::{AF_INET, SOCK_STREAM};

pub const LOOP_PATH: &str = "/dev/loop";
pub const NODUP_PATH: &str = "/dev/nodup";
pub const REFUSE_PATH: &str = "/dev/refuse";

/// Console bridge that records everything the cage tells it.
#[derive(Default)]
pub struct RecordingConsole {
    output: RustMutex<HashMap<i32, Vec<u8>>>,
    opened: RustMutex<Vec<(i32, Option<String>, i32)>>,
    closed: RustMutex<Vec<i32>>,
    refused: HashSet<i32>,
}

impl RecordingConsole {
    pub fn new() -> RustRfc<RecordingConsole> {
        RustRfc::new(RecordingConsole::default())
    }

    pub fn refusing(fds: &[i32]) -> RustRfc<RecordingConsole> {
        RustRfc::new(RecordingConsole { refused: fds.iter().copied().collect(), ..Default::default() })
    }

    pub fn output(&self, fd: i32) -> Vec<u8> {
        self.output.lock().get(&fd).cloned().unwrap_or_default()
    }

    pub fn opened(&self) -> Vec<(i32, Option<String>, i32)> {
        self.opened.lock().clone()
    }

    pub fn closed(&self) -> Vec<i32> {
        self.closed.lock().clone()
    }
}

impl ConsoleBridge for RecordingConsole {
    fn open(&self, fd: i32, path: Option<&str>, flags: i32) -> bool {
        if self.refused.contains(&fd) {
            return false;
        }
        self.opened.lock().push((fd, path.map(str::to_string), flags));
        true
    }

    fn write(&self, fd: i32, data: &[u8]) -> StreamResult<usize> {
        self.output.lock().entry(fd).or_default().extend_from_slice(data);
        Ok(data.len())
    }

    fn close(&self, fd: i32) {
        self.closed.lock().push(fd);
    }

    fn window_size(&self, _fd: i32) -> Option<WinSize> {
        Some(WinSize { ws_row: 40, ws_col: 120, ws_xpixel: 0, ws_ypixel: 0 })
    }
}

struct LoopbackPipe {
    buffer: RustMutex<VecDeque<u8>>,
    flags: StreamFlags,
}

/// In-memory pipe whose write end and read end are the same descriptor.
#[derive(Clone)]
pub struct LoopbackHandle {
    pipe: RustRfc<LoopbackPipe>,
    shareable: bool,
}

impl ResourceHandle for LoopbackHandle {
    fn read(&self, buf: &mut [u8]) -> StreamResult<usize> {
        let mut buffer = self.pipe.buffer.lock();
        if buffer.is_empty() {
            return Err(Errno::EAGAIN);
        }
        let count = buf.len().min(buffer.len());
        for (slot, byte) in buf.iter_mut().zip(buffer.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }

    fn write(&self, buf: &[u8]) -> StreamResult<usize> {
        self.pipe.buffer.lock().extend(buf.iter().copied());
        Ok(buf.len())
    }

    fn dup(&self, _newfd: i32) -> Option<RustRfc<dyn ResourceHandle>> {
        if !self.shareable {
            return None;
        }
        Some(RustRfc::new(self.clone()))
    }

    fn fstat(&self) -> StreamResult<StatData> {
        Ok(StatData { st_mode: S_IFCHR | S_IRWALL, ..Default::default() })
    }

    fn fcntl(&self, cmd: i32, arg: i32) -> StreamResult<i32> {
        self.pipe.flags.fcntl(cmd, arg)
    }

    fn is_read_ready(&self) -> bool {
        !self.pipe.buffer.lock().is_empty()
    }

    fn is_write_ready(&self) -> bool {
        true
    }

    fn is_nonblocking(&self) -> bool {
        self.pipe.flags.is_nonblocking()
    }
}

pub struct LoopbackHandler {
    shareable: bool,
    refuse: bool,
}

impl PathHandler for LoopbackHandler {
    fn open(&self, _fd: i32, _path: &str, flags: i32) -> Option<RustRfc<dyn ResourceHandle>> {
        if self.refuse {
            return None;
        }
        let pipe = LoopbackPipe { buffer: RustMutex::new(VecDeque::new()), flags: StreamFlags::new(flags) };
        Some(RustRfc::new(LoopbackHandle { pipe: RustRfc::new(pipe), shareable: self.shareable }))
    }

    fn stat(&self, _path: &str) -> StreamResult<StatData> {
        if self.refuse {
            return Err(Errno::EACCES);
        }
        Ok(StatData { st_mode: S_IFCHR | S_IRWALL, ..Default::default() })
    }
}

pub fn test_paths() -> Vec<(String, RustRfc<dyn PathHandler>)> {
    vec![
        (LOOP_PATH.to_string(), RustRfc::new(LoopbackHandler { shareable: true, refuse: false }) as RustRfc<dyn PathHandler>),
        (NODUP_PATH.to_string(), RustRfc::new(LoopbackHandler { shareable: false, refuse: false })),
        (REFUSE_PATH.to_string(), RustRfc::new(LoopbackHandler { shareable: true, refuse: true })),
    ]
}

/// Storage whose mount stays pending until the test completes it, and
/// which can be told to abandon directory requests.
pub struct ManualStorage {
    inner: HostDirStorage,
    mount: RustMutex<Option<MountCompletion>>,
    abandon_mkdir: bool,
}

impl ManualStorage {
    pub fn new(root: &interface::RustPath, abandon_mkdir: bool) -> RustRfc<ManualStorage> {
        RustRfc::new(ManualStorage { inner: HostDirStorage::new(root), mount: RustMutex::new(None), abandon_mkdir })
    }

    pub fn finish_mount(&self, result: Result<(), Errno>) {
        let completion = self.mount.lock().take();
        if let Some(completion) = completion {
            if result.is_ok() {
                let _ = interface::create_dir_all(self.inner.root());
            }
            completion.complete(result);
        }
    }
}

impl PersistentStorage for ManualStorage {
    fn mount(&self, _quota: u64, completion: MountCompletion) {
        *self.mount.lock() = Some(completion);
    }

    fn open(&self, fd: i32, path: &str, flags: i32) -> Option<RustRfc<dyn ResourceHandle>> {
        self.inner.open(fd, path, flags)
    }

    fn stat(&self, path: &str) -> StreamResult<StatData> {
        self.inner.stat(path)
    }

    fn make_directory(&self, path: &str, completion: Completion) {
        if self.abandon_mkdir {
            drop(completion);
            return;
        }
        self.inner.make_directory(path, completion)
    }
}

/// Network bridge that refuses everything and remembers where it was asked
/// to connect.
#[derive(Default)]
pub struct RefusingNetwork {
    pub attempts: RustMutex<Vec<(String, u16)>>,
}

impl NetworkBridge for RefusingNetwork {
    fn connect(&self, _fd: i32, host: &str, port: u16) -> StreamResult<RustRfc<dyn ResourceHandle>> {
        self.attempts.lock().push((host.to_string(), port));
        Err(Errno::ECONNREFUSED)
    }

    fn listen(&self, _fd: i32, _port: u16, _backlog: i32) -> StreamResult<RustRfc<dyn ResourceHandle>> {
        Err(Errno::EADDRINUSE)
    }
}

/// Network bridge that, while connecting or listening, closes the
/// descriptor and lets another socket() take the same number.
#[derive(Default)]
pub struct ReusingNetwork {
    pub cage: RustMutex<Option<interface::RustWeak<Cage>>>,
    pub reused: RustMutex<Vec<i32>>,
}

impl ReusingNetwork {
    fn reuse(&self, fd: i32) -> RustRfc<dyn ResourceHandle> {
        let cage = self.cage.lock().as_ref().and_then(|cage| cage.upgrade());
        if let Some(cage) = cage {
            assert_eq!(cage.close_syscall(fd), 0);
            self.reused.lock().push(cage.socket_syscall(AF_INET, SOCK_STREAM, 0));
        }
        let pipe = LoopbackPipe { buffer: RustMutex::new(VecDeque::new()), flags: StreamFlags::new(O_RDWR) };
        RustRfc::new(LoopbackHandle { pipe: RustRfc::new(pipe), shareable: true })
    }
}

impl NetworkBridge for ReusingNetwork {
    fn connect(&self, fd: i32, _host: &str, _port: u16) -> StreamResult<RustRfc<dyn ResourceHandle>> {
        Ok(self.reuse(fd))
    }

    fn listen(&self, fd: i32, _port: u16, _backlog: i32) -> StreamResult<RustRfc<dyn ResourceHandle>> {
        Ok(self.reuse(fd))
    }
}

pub fn backends(console: RustRfc<RecordingConsole>) -> CageBackends {
    CageBackends { console, storage: None, network: RustRfc::new(HostNetwork), extra_paths: test_paths() }
}

/// A cage with a recording console, the test paths, the host network and
/// no persistent storage.
pub fn test_cage() -> (RustRfc<Cage>, RustRfc<RecordingConsole>) {
    let console = RecordingConsole::new();
    let cage = Cage::new(FsConfig::default(), backends(console.clone()));
    (cage, console)
}

pub fn str2cbuf(ruststr: &str) -> *const u8 {
    ruststr.as_ptr()
}

pub fn str2cstr(ruststr: &str) -> CString {
    CString::new(ruststr).unwrap()
}

pub fn sizecbuf(size: usize) -> Box<[u8]> {
    vec![0u8; size].into_boxed_slice()
}

pub fn cbuf2str(buf: &[u8]) -> &str {
    std::str::from_utf8(buf).unwrap()
}
