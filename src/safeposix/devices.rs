// Character devices served without any bridge: the null sink and the
// random-byte source.

use std::sync::Arc;

use crate::interface::{self, Errno, IoctlArg, StatData};
use crate::safeposix::filesystem::PathHandler;
use crate::safeposix::stream::{ResourceHandle, StreamFlags, StreamResult};
use crate::safeposix::syscalls::fs_constants::*;

fn chardev_stat(dev: &DevNo) -> StatData {
    StatData {
        st_dev: BRIDGE_DEV_ID,
        st_mode: S_IFCHR | S_IRWALL,
        st_nlink: 1,
        st_rdev: makedev(dev),
        st_blksize: 4096,
        ..Default::default()
    }
}

pub struct DevNull {
    flags: Arc<StreamFlags>,
}

impl ResourceHandle for DevNull {
    fn read(&self, _buf: &mut [u8]) -> StreamResult<usize> {
        if !self.flags.can_read() {
            return Err(Errno::EBADF);
        }
        Ok(0)
    }

    fn write(&self, buf: &[u8]) -> StreamResult<usize> {
        if !self.flags.can_write() {
            return Err(Errno::EBADF);
        }
        Ok(buf.len())
    }

    fn seek(&self, _offset: i64, _whence: i32) -> StreamResult<i64> {
        Ok(0)
    }

    fn dup(&self, _newfd: i32) -> Option<Arc<dyn ResourceHandle>> {
        Some(Arc::new(DevNull { flags: self.flags.clone() }))
    }

    fn fstat(&self) -> StreamResult<StatData> {
        Ok(chardev_stat(&NULLDEVNO))
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
        true
    }

    fn is_write_ready(&self) -> bool {
        true
    }
}

pub struct DevNullHandler;

impl PathHandler for DevNullHandler {
    fn open(&self, _fd: i32, _path: &str, flags: i32) -> Option<Arc<dyn ResourceHandle>> {
        Some(Arc::new(DevNull { flags: Arc::new(StreamFlags::new(flags)) }))
    }

    fn stat(&self, _path: &str) -> StreamResult<StatData> {
        Ok(chardev_stat(&NULLDEVNO))
    }
}

/// Source of random bytes for `/dev/random`.
pub type RandomSource = fn(&mut [u8]) -> std::io::Result<usize>;

pub struct DevRandom {
    flags: Arc<StreamFlags>,
    source: RandomSource,
}

impl ResourceHandle for DevRandom {
    fn read(&self, buf: &mut [u8]) -> StreamResult<usize> {
        if !self.flags.can_read() {
            return Err(Errno::EBADF);
        }
        (self.source)(buf).map_err(|e| Errno::from_io(&e))
    }

    // writes are accepted and discarded, like mixing entropy nobody uses
    fn write(&self, buf: &[u8]) -> StreamResult<usize> {
        if !self.flags.can_write() {
            return Err(Errno::EBADF);
        }
        Ok(buf.len())
    }

    fn dup(&self, _newfd: i32) -> Option<Arc<dyn ResourceHandle>> {
        Some(Arc::new(DevRandom { flags: self.flags.clone(), source: self.source }))
    }

    fn fstat(&self) -> StreamResult<StatData> {
        Ok(chardev_stat(&RANDOMDEVNO))
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

pub struct DevRandomHandler {
    source: RandomSource,
}

impl DevRandomHandler {
    pub fn new(source: RandomSource) -> DevRandomHandler {
        DevRandomHandler { source }
    }

    pub fn host() -> DevRandomHandler {
        DevRandomHandler::new(interface::fillrandom)
    }
}

impl PathHandler for DevRandomHandler {
    fn open(&self, _fd: i32, _path: &str, flags: i32) -> Option<Arc<dyn ResourceHandle>> {
        Some(Arc::new(DevRandom { flags: Arc::new(StreamFlags::new(flags)), source: self.source }))
    }

    fn stat(&self, _path: &str) -> StreamResult<StatData> {
        Ok(chardev_stat(&RANDOMDEVNO))
    }
}
