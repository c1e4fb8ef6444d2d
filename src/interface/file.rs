// Host file objects backing the persistent storage area
#![allow(dead_code)]

use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
pub use std::path::{Component as RustPathComponent, Path as RustPath, PathBuf as RustPathBuf};

use crate::interface::errnos::Errno;

/// Resolves a sandbox path against a storage root. Only plain components
/// are accepted so nothing can escape the root.
pub fn storage_path(root: &RustPath, sandbox_path: &str) -> Result<RustPathBuf, Errno> {
    let mut resolved = root.to_path_buf();
    let mut components = 0;
    for component in RustPath::new(sandbox_path).components() {
        match component {
            RustPathComponent::RootDir | RustPathComponent::CurDir => {}
            RustPathComponent::Normal(part) => {
                resolved.push(part);
                components += 1;
            }
            RustPathComponent::ParentDir | RustPathComponent::Prefix(_) => return Err(Errno::EACCES),
        }
    }
    if components == 0 {
        return Err(Errno::EINVAL);
    }
    Ok(resolved)
}

#[derive(Debug)]
pub struct StorageFile {
    abs_filename: RustPathBuf,
    fobj: Mutex<File>,
}

impl StorageFile {
    pub fn open(abs_filename: RustPathBuf, read: bool, write: bool, create: bool, truncate: bool) -> std::io::Result<StorageFile> {
        let f = OpenOptions::new()
            .read(read || !write)
            .write(write)
            .create(create && write)
            .truncate(truncate && write)
            .open(&abs_filename)?;
        Ok(StorageFile { abs_filename, fobj: Mutex::new(f) })
    }

    pub fn path(&self) -> &RustPath {
        &self.abs_filename
    }

    pub fn size(&self) -> std::io::Result<u64> {
        Ok(self.fobj.lock().metadata()?.len())
    }

    // Read from file at offset into buf
    pub fn readat(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
        let mut fobj = self.fobj.lock();
        fobj.seek(SeekFrom::Start(offset))?;
        fobj.read(buf)
    }

    // Write buf to file at offset, extending it as needed
    pub fn writeat(&self, buf: &[u8], offset: u64) -> std::io::Result<usize> {
        let mut fobj = self.fobj.lock();
        fobj.seek(SeekFrom::Start(offset))?;
        let bytes_written = fobj.write(buf)?;
        Ok(bytes_written)
    }

    pub fn fsync(&self) -> std::io::Result<()> {
        self.fobj.lock().sync_all()
    }
}

pub fn create_dir_all(abs_path: &RustPath) -> std::io::Result<()> {
    fs::create_dir_all(abs_path)
}

pub fn metadata(abs_path: &RustPath) -> std::io::Result<fs::Metadata> {
    fs::metadata(abs_path)
}

#[cfg(test)]
mod file_tests {
    use super::*;

    #[test]
    fn storage_path_rejects_escape() {
        let root = RustPath::new("/srv/storage");
        assert_eq!(storage_path(root, "/.ssh/known_hosts").unwrap(), RustPathBuf::from("/srv/storage/.ssh/known_hosts"));
        assert_eq!(storage_path(root, "/../etc/passwd"), Err(Errno::EACCES));
        assert_eq!(storage_path(root, "/"), Err(Errno::EINVAL));
    }

    #[test]
    fn readat_writeat() {
        let dir = tempfile::tempdir().unwrap();
        let file = StorageFile::open(dir.path().join("f"), true, true, true, false).unwrap();
        assert_eq!(file.writeat(b"hello world", 0).unwrap(), 11);
        let mut buf = [0u8; 5];
        assert_eq!(file.readat(&mut buf, 6).unwrap(), 5);
        assert_eq!(&buf, b"world");
        assert_eq!(file.size().unwrap(), 11);
    }
}
