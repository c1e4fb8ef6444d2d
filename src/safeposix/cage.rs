//! The descriptor table and the state it shares with the path registry, the
//! host table and the storage binding.
//!
//! Everything lives behind one mutex paired with one condition variable.
//! Calls that have to wait (`select`, `mkdir`, blocking reads and writes,
//! anything touching storage before the mount resolved) release the mutex
//! while parked on the condition variable and re-check their predicate
//! after every wake-up.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::interface::{self, Errno, RustCondvar, RustMutex, RustMutexGuard, RustRfc, RustWeak};
use crate::safeposix::config::FsConfig;
use crate::safeposix::console::{BridgeFileHandler, ConsoleBridge, ConsoleHub, ConsoleStream, DevTtyHandler};
use crate::safeposix::devices::{DevNullHandler, DevRandomHandler};
use crate::safeposix::filesystem::{PathHandler, PathRegistry};
use crate::safeposix::net::{HostTable, NetworkBridge};
use crate::safeposix::storage::{MountCompletion, PersistentStorage, StorageBinding, StorageFileHandler};
use crate::safeposix::stream::ResourceHandle;
use crate::safeposix::syscalls::fs_constants::*;

// only one cage may exist per process
static CAGE_LIVE: AtomicBool = AtomicBool::new(false);

// clears the flag when the cage goes away, or when construction unwinds
struct LiveToken;

impl Drop for LiveToken {
    fn drop(&mut self) {
        CAGE_LIVE.store(false, Ordering::SeqCst);
    }
}

/// What a known descriptor currently refers to. A descriptor that is not in
/// the table at all is free.
pub enum FdSlot {
    /// Allocated, no handle attached yet (socket before connect, or a
    /// handle under construction). The token tells one reservation of a
    /// descriptor number from a later one.
    Reserved(u64),
    /// The backend failed to attach.
    Broken,
    Bound(RustRfc<dyn ResourceHandle>),
}

/// The collaborators a cage is wired to.
pub struct CageBackends {
    pub console: RustRfc<dyn ConsoleBridge>,
    pub storage: Option<RustRfc<dyn PersistentStorage>>,
    pub network: RustRfc<dyn NetworkBridge>,
    /// Registered alongside the built-in device paths.
    pub extra_paths: Vec<(String, RustRfc<dyn PathHandler>)>,
}

pub struct FsState {
    pub fdtable: interface::RustHashMap<i32, FdSlot>,
    pub paths: PathRegistry,
    pub hosts: HostTable,
    pub storage: StorageBinding,
    // ports recorded by bind, consumed by listen
    pub bind_ports: interface::RustHashMap<i32, u16>,
    next_reservation: u64,
}

impl FsState {
    /// Marks `fd` as allocated with nothing attached and returns the token
    /// of this reservation.
    pub fn reserve(&mut self, fd: i32) -> u64 {
        self.next_reservation += 1;
        self.fdtable.insert(fd, FdSlot::Reserved(self.next_reservation));
        self.next_reservation
    }
}

pub struct Cage {
    pub config: FsConfig,
    pub(crate) state: RustMutex<FsState>,
    pub(crate) cond: RustCondvar,
    pub(crate) network: RustRfc<dyn NetworkBridge>,
    console_hub: RustRfc<ConsoleHub>,
    me: RustWeak<Cage>,
    _live: LiveToken,
}

impl Cage {
    /// ### Description
    ///
    /// Builds the cage: registers the device paths, seeds the host table,
    /// opens the console triple on descriptors 0, 1 and 2, and finally asks
    /// the storage backend to mount.
    ///
    /// ### Panics
    ///
    /// * another `Cage` is still alive in this process
    /// * `config` does not validate
    /// * two handlers are registered for the same path
    pub fn new(config: FsConfig, backends: CageBackends) -> RustRfc<Cage> {
        assert!(config.validate().is_ok(), "invalid descriptor layer configuration: {:?}", config);
        assert!(!CAGE_LIVE.swap(true, Ordering::SeqCst), "a Cage is already live in this process");
        let live = LiveToken;

        let CageBackends { console, storage, network, extra_paths } = backends;
        let console_hub = RustRfc::new(ConsoleHub::new());

        let mut fdtable = interface::RustHashMap::new();
        let stdin = ConsoleStream::open(console.clone(), console_hub.clone(), STDIN_FILENO, None, O_RDONLY);
        let stdout = ConsoleStream::open(console.clone(), console_hub.clone(), STDOUT_FILENO, None, O_WRONLY);
        let stderr = ConsoleStream::open(console.clone(), console_hub.clone(), STDERR_FILENO, None, O_WRONLY);
        for (fd, stream) in [(STDIN_FILENO, &stdin), (STDOUT_FILENO, &stdout), (STDERR_FILENO, &stderr)] {
            let slot = match stream {
                Some(stream) => FdSlot::Bound(RustRfc::new(stream.clone())),
                None => FdSlot::Broken,
            };
            fdtable.insert(fd, slot);
        }

        let mut paths = PathRegistry::new();
        paths.register(&config.null_path, RustRfc::new(DevNullHandler));
        match (stdin, stdout) {
            (Some(stdin), Some(stdout)) => paths.register(&config.tty_path, RustRfc::new(DevTtyHandler::new(stdin, stdout))),
            _ => log::warn!("console unavailable, {} not registered", config.tty_path),
        }
        if interface::host_random_available() {
            paths.register(&config.random_path, RustRfc::new(DevRandomHandler::host()));
        } else {
            log::warn!("host entropy source unavailable, serving {} through the console bridge", config.random_path);
            paths.register(&config.random_path, RustRfc::new(BridgeFileHandler::new(console.clone(), console_hub.clone())));
        }
        for (path, handler) in extra_paths {
            paths.register(&path, handler);
        }

        let binding = match storage {
            Some(_) => StorageBinding::Pending,
            None => StorageBinding::Unavailable,
        };

        let state = FsState {
            fdtable,
            paths,
            hosts: HostTable::new(),
            storage: binding,
            bind_ports: interface::RustHashMap::new(),
            next_reservation: 0,
        };

        let cage = RustRfc::new_cyclic(|me| Cage {
            config,
            state: RustMutex::new(state),
            cond: RustCondvar::new(),
            network,
            console_hub,
            me: me.clone(),
            _live: live,
        });

        // the lock is free here, so a backend may complete synchronously
        if let Some(storage) = storage {
            storage.mount(cage.config.storage_quota, MountCompletion::new(RustRfc::downgrade(&cage), storage.clone()));
        }
        cage
    }

    pub(crate) fn weak(&self) -> RustWeak<Cage> {
        self.me.clone()
    }

    /// Wakes every waiter so it re-evaluates its predicate. Backends call
    /// this whenever readiness may have changed. Must not be called while
    /// the caller is inside a cage operation.
    pub fn notify_readiness(&self) {
        let _guard = self.state.lock();
        self.cond.notify_all();
    }

    /// Delivers terminal input for bridged descriptor `bridge_fd`. Returns
    /// the number of bytes accepted, or `None` if nothing is open under that
    /// number.
    pub fn push_console_input(&self, bridge_fd: i32, data: &[u8]) -> Option<usize> {
        let accepted = self.console_hub.push_input(bridge_fd, data)?;
        self.notify_readiness();
        Some(accepted)
    }

    /// Marks the input of `bridge_fd` as finished; reads then return 0.
    pub fn close_console_input(&self, bridge_fd: i32) -> bool {
        let closed = self.console_hub.close_input(bridge_fd);
        if closed {
            self.notify_readiness();
        }
        closed
    }

    pub(crate) fn storage_mounted(&self, storage: RustRfc<dyn PersistentStorage>, result: Result<(), Errno>) {
        let mut state = self.state.lock();
        match result {
            Ok(()) => {
                log::info!("persistent storage mounted, {} bytes requested", self.config.storage_quota);
                state.paths.register(&self.config.known_hosts_path, RustRfc::new(StorageFileHandler::new(storage.clone())));
                state.storage = StorageBinding::Available(storage);
            }
            Err(e) => {
                log::info!("persistent storage unavailable: {}", e);
                state.storage = StorageBinding::Unavailable;
            }
        }
        self.cond.notify_all();
    }

    /// Parks until the storage binding leaves `Pending`.
    pub(crate) fn await_storage(&self, state: &mut RustMutexGuard<FsState>) {
        while !state.storage.is_resolved() {
            self.cond.wait(state);
        }
    }

    // storage-backed paths only show up once the mount succeeded
    pub(crate) fn await_storage_path(&self, state: &mut RustMutexGuard<FsState>, path: &str) {
        if path == self.config.known_hosts_path {
            self.await_storage(state);
        }
    }

    /// Parks a caller whose handle returned `EAGAIN`. Handles that never
    /// notify are re-polled after the poll interval.
    pub(crate) fn wait_for_handle(&self, state: &mut RustMutexGuard<FsState>, handle: &dyn ResourceHandle) {
        if handle.signals_readiness() {
            self.cond.wait(state);
        } else {
            self.cond.wait_for(state, self.config.poll_interval());
        }
    }

    /// Lowest free descriptor at or above `startfd` (never below the
    /// configured offset).
    pub fn get_next_fd(&self, state: &FsState, startfd: Option<i32>) -> Option<i32> {
        let start = startfd.unwrap_or(self.config.fd_offset).max(self.config.fd_offset);
        (start..self.config.max_fd).find(|fd| !state.fdtable.contains_key(fd))
    }

    /// The live handle behind `fd`, or `EBADF` for free, reserved and broken
    /// descriptors.
    pub fn get_handle(state: &FsState, fd: i32) -> Result<RustRfc<dyn ResourceHandle>, Errno> {
        match state.fdtable.get(&fd) {
            Some(FdSlot::Bound(handle)) => Ok(handle.clone()),
            _ => Err(Errno::EBADF),
        }
    }

    pub fn is_known_descriptor(&self, fd: i32) -> bool {
        self.state.lock().fdtable.contains_key(&fd)
    }

    /// Every descriptor currently in the table, ascending.
    pub fn known_descriptors(&self) -> Vec<i32> {
        let state = self.state.lock();
        let mut fds: Vec<i32> = state.fdtable.keys().copied().collect();
        fds.sort_unstable();
        fds
    }

    pub fn is_path_registered(&self, path: &str) -> bool {
        self.state.lock().paths.contains(path)
    }

    pub fn storage_available(&self) -> bool {
        matches!(self.state.lock().storage, StorageBinding::Available(_))
    }
}

impl Drop for Cage {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for (_, slot) in state.fdtable.drain() {
            if let FdSlot::Bound(handle) = slot {
                handle.close();
            }
        }
        state.bind_ports.clear();
        state.paths.clear();
        state.storage = StorageBinding::Unavailable;
    }
}
