//! Host-provided persistent storage.
//!
//! The storage area is mounted asynchronously after the [`Cage`] comes up.
//! Until the mount reports back, the binding is [`StorageBinding::Pending`]
//! and anything that needs storage waits on the cage's condition variable.
//! Directory creation is also asynchronous; the caller blocks on a one-shot
//! channel that the backend's [`Completion`] fills exactly once.

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::thread;

use crate::interface::{self, Errno, RustPathBuf, StatData, StorageFile};
use crate::safeposix::cage::Cage;
use crate::safeposix::filesystem::PathHandler;
use crate::safeposix::stream::{ResourceHandle, StreamFlags, StreamResult};
use crate::safeposix::syscalls::fs_constants::*;

/// The embedder's durable storage.
pub trait PersistentStorage: Send + Sync {
    /// Requests a storage area of `quota` bytes. `completion` must be
    /// completed exactly once, from any thread, possibly before `mount`
    /// returns.
    fn mount(&self, quota: u64, completion: MountCompletion);

    /// Opens `path` for descriptor `fd`; `None` if the backend refuses.
    fn open(&self, fd: i32, path: &str, flags: i32) -> Option<Arc<dyn ResourceHandle>>;

    fn stat(&self, path: &str) -> StreamResult<StatData>;

    /// Creates `path` together with any missing ancestors.
    fn make_directory(&self, path: &str, completion: Completion);
}

pub enum StorageBinding {
    Pending,
    Available(Arc<dyn PersistentStorage>),
    Unavailable,
}

impl StorageBinding {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, StorageBinding::Pending)
    }

    pub fn storage(&self) -> Option<Arc<dyn PersistentStorage>> {
        match self {
            StorageBinding::Available(storage) => Some(storage.clone()),
            _ => None,
        }
    }
}

/// Reports the outcome of [`PersistentStorage::mount`] back to the cage.
pub struct MountCompletion {
    cage: Weak<Cage>,
    storage: Arc<dyn PersistentStorage>,
}

impl MountCompletion {
    pub(crate) fn new(cage: Weak<Cage>, storage: Arc<dyn PersistentStorage>) -> MountCompletion {
        MountCompletion { cage, storage }
    }

    pub fn complete(self, result: Result<(), Errno>) {
        // the cage may already be gone if the host answered late
        if let Some(cage) = self.cage.upgrade() {
            cage.storage_mounted(self.storage, result);
        }
    }
}

/// One-shot result slot for an asynchronous storage request.
pub struct Completion {
    sender: Sender<Result<(), Errno>>,
    cage: Weak<Cage>,
}

impl Completion {
    pub(crate) fn new(cage: Weak<Cage>) -> (Completion, Receiver<Result<(), Errno>>) {
        let (sender, receiver) = bounded(1);
        (Completion { sender, cage }, receiver)
    }

    /// Delivers the result. Dropping a completion without calling this is
    /// reported to the waiter as `EIO`.
    pub fn complete(self, result: Result<(), Errno>) {
        // release the cage before the waiter can observe the result
        if let Some(cage) = self.cage.upgrade() {
            cage.notify_readiness();
        }
        let _ = self.sender.send(result);
    }
}

/// A registered path whose contents live in persistent storage.
pub struct StorageFileHandler {
    storage: Arc<dyn PersistentStorage>,
}

impl StorageFileHandler {
    pub fn new(storage: Arc<dyn PersistentStorage>) -> StorageFileHandler {
        StorageFileHandler { storage }
    }
}

impl PathHandler for StorageFileHandler {
    fn open(&self, fd: i32, path: &str, flags: i32) -> Option<Arc<dyn ResourceHandle>> {
        self.storage.open(fd, path, flags)
    }

    fn stat(&self, path: &str) -> StreamResult<StatData> {
        self.storage.stat(path)
    }
}

fn stat_from_metadata(meta: &std::fs::Metadata) -> StatData {
    use std::os::unix::fs::MetadataExt;
    let filetype = if meta.is_dir() { S_IFDIR } else { S_IFREG };
    StatData {
        st_dev: STORAGE_DEV_ID,
        st_ino: meta.ino() as usize,
        st_mode: filetype | (meta.mode() & S_IRWXA),
        st_nlink: 1,
        st_uid: DEFAULT_UID,
        st_gid: DEFAULT_GID,
        st_rdev: 0,
        st_size: meta.len() as usize,
        st_blksize: STORAGE_BLKSIZE,
        st_blocks: (meta.len() as usize).div_ceil(512),
        ..Default::default()
    }
}

/// Persistent storage backed by a directory on the host.
pub struct HostDirStorage {
    root: RustPathBuf,
    quota: Mutex<u64>,
}

impl HostDirStorage {
    pub fn new<P: Into<RustPathBuf>>(root: P) -> HostDirStorage {
        HostDirStorage { root: root.into(), quota: Mutex::new(0) }
    }

    pub fn root(&self) -> &interface::RustPath {
        &self.root
    }

    pub fn quota(&self) -> u64 {
        *self.quota.lock()
    }
}

impl PersistentStorage for HostDirStorage {
    // creating the root is immediate, so the mount completes in place
    fn mount(&self, quota: u64, completion: MountCompletion) {
        *self.quota.lock() = quota;
        let result = interface::create_dir_all(&self.root).map_err(|e| Errno::from_io(&e));
        completion.complete(result);
    }

    fn open(&self, _fd: i32, path: &str, flags: i32) -> Option<Arc<dyn ResourceHandle>> {
        let abs_path = interface::storage_path(&self.root, path).ok()?;
        if flags & O_CREAT != 0 && flags & O_EXCL != 0 && abs_path.exists() {
            return None;
        }
        let file = match StorageFile::open(
            abs_path,
            !is_wronly(flags),
            !is_rdonly(flags),
            flags & O_CREAT != 0,
            flags & O_TRUNC != 0,
        ) {
            Ok(file) => file,
            Err(e) => {
                log::debug!("storage open of {} failed: {}", path, e);
                return None;
            }
        };
        Some(Arc::new(StorageHandle {
            file: Arc::new(file),
            flags: Arc::new(StreamFlags::new(flags)),
            position: Arc::new(Mutex::new(0)),
        }))
    }

    fn stat(&self, path: &str) -> StreamResult<StatData> {
        let abs_path = interface::storage_path(&self.root, path)?;
        let meta = interface::metadata(&abs_path).map_err(|e| Errno::from_io(&e))?;
        Ok(stat_from_metadata(&meta))
    }

    fn make_directory(&self, path: &str, completion: Completion) {
        let abs_path = match interface::storage_path(&self.root, path) {
            Ok(abs_path) => abs_path,
            Err(e) => return completion.complete(Err(e)),
        };
        thread::spawn(move || {
            let result = interface::create_dir_all(&abs_path).map_err(|e| Errno::from_io(&e));
            completion.complete(result);
        });
    }
}

/// An open file in persistent storage. Duplicates share the position.
pub struct StorageHandle {
    file: Arc<StorageFile>,
    flags: Arc<StreamFlags>,
    position: Arc<Mutex<u64>>,
}

impl ResourceHandle for StorageHandle {
    fn read(&self, buf: &mut [u8]) -> StreamResult<usize> {
        if !self.flags.can_read() {
            return Err(Errno::EBADF);
        }
        let mut position = self.position.lock();
        let nread = self.file.readat(buf, *position).map_err(|e| Errno::from_io(&e))?;
        *position += nread as u64;
        Ok(nread)
    }

    fn write(&self, buf: &[u8]) -> StreamResult<usize> {
        if !self.flags.can_write() {
            return Err(Errno::EBADF);
        }
        let mut position = self.position.lock();
        if self.flags.get() & O_APPEND != 0 {
            *position = self.file.size().map_err(|e| Errno::from_io(&e))?;
        }
        let nwritten = self.file.writeat(buf, *position).map_err(|e| Errno::from_io(&e))?;
        *position += nwritten as u64;
        Ok(nwritten)
    }

    fn seek(&self, offset: i64, whence: i32) -> StreamResult<i64> {
        let mut position = self.position.lock();
        let base = match whence {
            SEEK_SET => 0,
            SEEK_CUR => *position as i64,
            SEEK_END => self.file.size().map_err(|e| Errno::from_io(&e))? as i64,
            _ => return Err(Errno::EINVAL),
        };
        let newpos = base.checked_add(offset).ok_or(Errno::EINVAL)?;
        if newpos < 0 {
            return Err(Errno::EINVAL);
        }
        *position = newpos as u64;
        Ok(newpos)
    }

    fn close(&self) {
        if self.flags.can_write() {
            if let Err(e) = self.file.fsync() {
                log::warn!("fsync of {} failed: {}", self.file.path().display(), e);
            }
        }
    }

    fn dup(&self, _newfd: i32) -> Option<Arc<dyn ResourceHandle>> {
        Some(Arc::new(StorageHandle {
            file: self.file.clone(),
            flags: self.flags.clone(),
            position: self.position.clone(),
        }))
    }

    fn fstat(&self) -> StreamResult<StatData> {
        let meta = interface::metadata(self.file.path()).map_err(|e| Errno::from_io(&e))?;
        Ok(stat_from_metadata(&meta))
    }

    fn fcntl(&self, cmd: i32, arg: i32) -> StreamResult<i32> {
        self.flags.fcntl(cmd, arg)
    }

    fn is_read_ready(&self) -> bool {
        true
    }

    fn is_write_ready(&self) -> bool {
        true
    }
}
