// Runtime configuration of the descriptor layer
//
// The embedder may pass a CBOR map; any field it leaves out keeps its
// default.

use serde::{Deserialize, Serialize};

use crate::interface::Errno;
use crate::safeposix::syscalls::fs_constants::{FILE_ID_OFFSET, MAXFD};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsConfig {
    pub fd_offset: i32,
    pub max_fd: i32,
    pub storage_quota: u64,
    pub null_path: String,
    pub random_path: String,
    pub tty_path: String,
    pub known_hosts_path: String,
    pub poll_interval_ms: u64,
}

impl Default for FsConfig {
    fn default() -> FsConfig {
        FsConfig {
            fd_offset: FILE_ID_OFFSET,
            max_fd: MAXFD,
            storage_quota: 100 * 1024,
            null_path: "/dev/null".to_string(),
            random_path: "/dev/random".to_string(),
            tty_path: "/dev/tty".to_string(),
            known_hosts_path: "/.ssh/known_hosts".to_string(),
            poll_interval_ms: 50,
        }
    }
}

impl FsConfig {
    pub fn from_cbor(bytes: &[u8]) -> Result<FsConfig, Errno> {
        let config: FsConfig = serde_cbor::from_slice(bytes).map_err(|e| {
            log::warn!("rejecting configuration: {}", e);
            Errno::EINVAL
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_cbor(&self) -> Vec<u8> {
        // serializing plain strings and integers cannot fail
        serde_cbor::to_vec(self).unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), Errno> {
        if self.fd_offset < FILE_ID_OFFSET || self.max_fd > MAXFD || self.fd_offset >= self.max_fd {
            return Err(Errno::EINVAL);
        }
        if self.poll_interval_ms == 0 {
            return Err(Errno::EINVAL);
        }
        let paths = [&self.null_path, &self.random_path, &self.tty_path, &self.known_hosts_path];
        for (i, path) in paths.iter().enumerate() {
            if path.is_empty() || paths[..i].contains(path) {
                return Err(Errno::EINVAL);
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn defaults_are_valid() {
        let config = FsConfig::default();
        assert_eq!(config.fd_offset, 3);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn partial_cbor_keeps_defaults() {
        let mut map = BTreeMap::new();
        map.insert("fd_offset", 10);
        let bytes = serde_cbor::to_vec(&map).unwrap();
        let config = FsConfig::from_cbor(&bytes).unwrap();
        assert_eq!(config.fd_offset, 10);
        assert_eq!(config.max_fd, 1024);
        assert_eq!(config.null_path, "/dev/null");
    }

    #[test]
    fn rejects_bad_values() {
        let config = FsConfig { fd_offset: 1, ..Default::default() };
        assert_eq!(config.validate(), Err(Errno::EINVAL));
        let config = FsConfig { tty_path: "/dev/null".to_string(), ..Default::default() };
        assert_eq!(config.validate(), Err(Errno::EINVAL));
        assert_eq!(FsConfig::from_cbor(b"\xff\x00"), Err(Errno::EINVAL));
        let config = FsConfig { max_fd: 2048, ..Default::default() };
        assert_eq!(FsConfig::from_cbor(&config.to_cbor()), Err(Errno::EINVAL));
    }
}
